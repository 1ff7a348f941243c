//! Where a run's document comes from.

use std::fmt;

use indexmap::IndexMap;
use serde::Deserialize;

/// Error type for reading input
#[derive(Debug)]
pub enum InputError {
    /// Neither `http.url` nor `raw` is set
    NotConfigured,
    /// The request failed or returned a non-success status
    Http { url: String, source: reqwest::Error },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::NotConfigured => write!(f, "no input source configured"),
            InputError::Http { url, source } => write!(f, "reading {}: {}", url, source),
        }
    }
}

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InputError::Http { source, .. } => Some(source),
            InputError::NotConfigured => None,
        }
    }
}

/// HTTP endpoint returning the input document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HttpInput {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

/// Input configuration. When both are set, `http` wins.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Input {
    #[serde(default)]
    pub http: Option<HttpInput>,
    /// Literal JSON document
    #[serde(default)]
    pub raw: Option<String>,
}

impl Input {
    /// The configured HTTP source, if its URL is non-empty.
    fn http(&self) -> Option<&HttpInput> {
        self.http.as_ref().filter(|http| !http.url.is_empty())
    }

    /// The configured literal document, if non-empty.
    fn raw(&self) -> Option<&str> {
        self.raw.as_deref().filter(|raw| !raw.is_empty())
    }

    pub fn is_configured(&self) -> bool {
        self.http().is_some() || self.raw().is_some()
    }

    /// Fetch the input document.
    ///
    /// # Arguments
    /// * `client` - HTTP client used for `http` input
    ///
    /// # Returns
    /// The raw bytes of a JSON array or object
    pub async fn read(&self, client: &reqwest::Client) -> Result<Vec<u8>, InputError> {
        if let Some(http) = self.http() {
            return read_http(client, http).await;
        }
        match self.raw() {
            Some(raw) => Ok(raw.as_bytes().to_vec()),
            None => Err(InputError::NotConfigured),
        }
    }
}

async fn read_http(client: &reqwest::Client, http: &HttpInput) -> Result<Vec<u8>, InputError> {
    let wrap = |source| InputError::Http {
        url: http.url.clone(),
        source,
    };

    tracing::info!("fetching input from {}", http.url);
    let mut request = client.get(&http.url);
    for (name, value) in &http.headers {
        request = request.header(name, value);
    }
    let response = request
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(wrap)?;
    let body = response.bytes().await.map_err(wrap)?;
    Ok(body.to_vec())
}
