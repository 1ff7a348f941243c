//! Where processed messages go.

use std::fmt;

use indexmap::IndexMap;
use reqwest::Method;
use serde::Deserialize;

use crate::message::{to_json_string, Message};
use crate::template::{Template, TemplateError};

/// Method used when `output.http.method` is not set.
pub const DEFAULT_METHOD: &str = "POST";

/// Error type for publishing
#[derive(Debug)]
pub enum OutputError {
    /// The URL template failed to parse or render
    Template(TemplateError),
    /// The configured method is not a valid HTTP method
    Method(String),
    /// The processed message could not be encoded
    Encode(serde_json::Error),
    /// The request could not be sent
    Http(reqwest::Error),
    /// The response status is not in the configured whitelist
    Status { status: u16, expected: Vec<u16> },
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::Template(e) => write!(f, "rendering output URL: {}", e),
            OutputError::Method(m) => write!(f, "invalid HTTP method {:?}", m),
            OutputError::Encode(e) => write!(f, "encoding message: {}", e),
            OutputError::Http(e) => write!(f, "sending request: {}", e),
            OutputError::Status { status, expected } => write!(
                f,
                "unexpected status code: {} (expected one of {:?})",
                status, expected
            ),
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::Template(e) => Some(e),
            OutputError::Encode(e) => Some(e),
            OutputError::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TemplateError> for OutputError {
    fn from(err: TemplateError) -> Self {
        OutputError::Template(err)
    }
}

/// HTTP destination for processed messages.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HttpOutput {
    /// URL template, rendered against the original (unprocessed) message
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Accepted response statuses; any status is accepted when unset
    #[serde(default)]
    pub status_codes: Option<Vec<u16>>,
}

impl HttpOutput {
    /// The request method, defaulting to POST.
    pub fn method(&self) -> Result<Method, OutputError> {
        let name = self
            .method
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_METHOD)
            .trim()
            .to_uppercase();
        Method::from_bytes(name.as_bytes()).map_err(|_| OutputError::Method(name))
    }

    /// Render the URL for one message.
    pub fn render_url(&self, original: &Message) -> Result<String, OutputError> {
        let rendered = Template::parse(&self.url)?.render(original)?;
        Ok(rendered.trim().to_string())
    }

    async fn publish(
        &self,
        client: &reqwest::Client,
        original: &Message,
        processed: &Message,
    ) -> Result<(), OutputError> {
        let mut body = to_json_string(processed).map_err(OutputError::Encode)?;
        body.push('\n');

        let url = self.render_url(original)?;
        let method = self.method()?;
        tracing::debug!("{} {}", method, url);

        let mut request = client.request(method, &url).body(body);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(OutputError::Http)?;

        let status = response.status().as_u16();
        if let Some(expected) = &self.status_codes {
            if !expected.contains(&status) {
                let detail = response.text().await.unwrap_or_default();
                tracing::warn!(
                    "unexpected status code {} from {} (expected {:?}): {}",
                    status,
                    url,
                    expected,
                    detail
                );
                return Err(OutputError::Status {
                    status,
                    expected: expected.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Output configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Output {
    #[serde(default)]
    pub http: Option<HttpOutput>,
}

impl Output {
    /// The configured HTTP destination, if its URL is non-empty.
    pub fn http(&self) -> Option<&HttpOutput> {
        self.http.as_ref().filter(|http| !http.url.is_empty())
    }

    /// Send `processed` to every configured destination.
    ///
    /// # Arguments
    /// * `original` - The message as read from input, used to render the URL
    /// * `processed` - The pipeline result, sent as the request body
    pub async fn publish(
        &self,
        client: &reqwest::Client,
        original: &Message,
        processed: &Message,
    ) -> Result<(), OutputError> {
        if let Some(http) = self.http() {
            http.publish(client, original, processed).await?;
        }
        Ok(())
    }
}
