//! A complete run: input, pipeline, output.
//!
//! A plan is loaded from YAML:
//!
//! ```yaml
//! input:
//!   http:
//!     url: https://example.com/nodes
//!     headers:
//!       Authorization: "Bearer ${TOKEN}"
//! pipeline:
//!   processors:
//!     - filter:
//!         query: '{{ if eq .protocol "udp" }}true{{ end }}'
//!     - transform:
//!         fields:
//!           udpEnabled: true
//! output:
//!   http:
//!     url: "https://example.com/nodes/{{ .uid }}"
//!     method: PUT
//!     status_codes: [200, 204]
//! ```
//!
//! Running it reads the input document, sends every message through the
//! pipeline, records an audit entry per message and publishes the survivors.

pub mod env;
pub mod input;
pub mod output;

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::sync::watch;

use crate::message::{decode_document, message_label};
use crate::pipeline::{Pipeline, ProcessError, Session};
use crate::report::{Aggregator, ReportError, ReportSummary, Reporter};
use crate::serialization::{NdjsonWriter, SerializationError};
use crate::template::{Template, TemplateError};

pub use env::expand_env;
pub use input::{HttpInput, Input, InputError};
pub use output::{HttpOutput, Output, OutputError};

/// Error type for loading and validating a plan
#[derive(Debug)]
pub enum ConfigError {
    /// The plan file could not be read
    Io { path: PathBuf, source: std::io::Error },
    /// The YAML is malformed or does not describe a plan
    Yaml(serde_yaml::Error),
    /// A template in the plan does not parse
    Template(TemplateError),
    /// The plan is structurally incomplete
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "reading plan {}: {}", path.display(), source)
            }
            ConfigError::Yaml(e) => write!(f, "parsing plan: {}", e),
            ConfigError::Template(e) => write!(f, "invalid template: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid plan: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Yaml(e) => Some(e),
            ConfigError::Template(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

impl From<TemplateError> for ConfigError {
    fn from(err: TemplateError) -> Self {
        ConfigError::Template(err)
    }
}

/// Error type for a run
#[derive(Debug)]
pub enum PlanError {
    Input(InputError),
    /// The input document is not valid JSON
    Decode(serde_json::Error),
    /// The pipeline failed on a message
    Process { label: String, source: ProcessError },
    /// Publishing a processed message failed
    Output { label: String, source: OutputError },
    /// Writing to the NDJSON sink failed
    Sink(SerializationError),
    Report(ReportError),
    /// The run stopped on the cancellation signal
    Cancelled,
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::Input(e) => write!(f, "reading input: {}", e),
            PlanError::Decode(e) => write!(f, "parsing input: {}", e),
            PlanError::Process { label, source } => {
                write!(f, "processing message {}: {}", label, source)
            }
            PlanError::Output { label, source } => {
                write!(f, "publishing message {}: {}", label, source)
            }
            PlanError::Sink(e) => write!(f, "writing output: {}", e),
            PlanError::Report(e) => write!(f, "{}", e),
            PlanError::Cancelled => write!(f, "run cancelled"),
        }
    }
}

impl std::error::Error for PlanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlanError::Input(e) => Some(e),
            PlanError::Decode(e) => Some(e),
            PlanError::Process { source, .. } => Some(source),
            PlanError::Output { source, .. } => Some(source),
            PlanError::Sink(e) => Some(e),
            PlanError::Report(e) => Some(e),
            PlanError::Cancelled => None,
        }
    }
}

impl From<InputError> for PlanError {
    fn from(err: InputError) -> Self {
        PlanError::Input(err)
    }
}

impl From<ReportError> for PlanError {
    fn from(err: ReportError) -> Self {
        PlanError::Report(err)
    }
}

/// Per-run settings that are not part of the plan file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run the pipeline and reporting but skip HTTP output
    pub dry_run: bool,
    /// Parent directory for audit logs; `None` disables reporting
    pub report_root: Option<PathBuf>,
}

/// Counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages that went through the pipeline
    pub processed: usize,
    /// Messages handed to the output
    pub published: usize,
    /// Messages the pipeline dropped
    pub dropped: usize,
    /// Audit summary, when reporting was enabled
    pub report: Option<ReportSummary>,
}

/// Configuration for one run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub input: Input,
    #[serde(default)]
    pub pipeline: Pipeline,
    #[serde(default)]
    pub output: Output,
}

impl Plan {
    /// Parse a plan from YAML text after expanding environment references.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env(text);
        Ok(serde_yaml::from_str(&expanded)?)
    }

    /// Read and parse a plan file.
    ///
    /// # Arguments
    /// * `path` - Path to the plan YAML
    ///
    /// # Errors
    /// Returns error if the file can't be read or doesn't describe a plan
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Check the plan without running it: an input source is configured and
    /// every template compiles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.input.is_configured() {
            return Err(ConfigError::Invalid(
                "no input source configured (set input.http.url or input.raw)".to_string(),
            ));
        }
        for source in self.pipeline.templates() {
            Template::parse(source)?;
        }
        if let Some(http) = self.output.http() {
            Template::parse(&http.url)?;
            http.method().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    /// Execute the plan.
    ///
    /// # Arguments
    /// * `options` - Dry-run flag and report location
    /// * `cancel` - Set to `true` to stop between messages
    pub async fn run(
        &self,
        options: &RunOptions,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunSummary, PlanError> {
        self.run_with_writer::<std::io::Sink>(options, cancel, None)
            .await
    }

    /// Execute the plan, also writing every surviving message to `writer`.
    ///
    /// The writer receives messages in dry-run mode too; only HTTP output is
    /// suppressed.
    pub async fn run_with_writer<W: Write>(
        &self,
        options: &RunOptions,
        cancel: watch::Receiver<bool>,
        writer: Option<&mut NdjsonWriter<W>>,
    ) -> Result<RunSummary, PlanError> {
        let aggregator = match &options.report_root {
            Some(root) => Some(Aggregator::start(root, cancel.clone())?),
            None => None,
        };

        let outcome = self.drive(options, &cancel, aggregator.as_ref(), writer).await;

        let report = match aggregator {
            Some(aggregator) => Some(aggregator.shutdown().await?),
            None => None,
        };
        let summary = outcome?;

        tracing::info!(
            "run finished: {} processed, {} published, {} dropped",
            summary.processed,
            summary.published,
            summary.dropped
        );
        Ok(RunSummary { report, ..summary })
    }

    async fn drive<W: Write>(
        &self,
        options: &RunOptions,
        cancel: &watch::Receiver<bool>,
        aggregator: Option<&Aggregator>,
        mut writer: Option<&mut NdjsonWriter<W>>,
    ) -> Result<RunSummary, PlanError> {
        let client = reqwest::Client::new();
        let document = self.input.read(&client).await?;
        let messages = decode_document(&document).map_err(PlanError::Decode)?;
        tracing::info!("read {} message(s)", messages.len());

        let mut summary = RunSummary::default();
        for original in &messages {
            if *cancel.borrow() {
                tracing::warn!("stopping after {} message(s): cancelled", summary.processed);
                return Err(PlanError::Cancelled);
            }

            let label = message_label(original);
            tracing::debug!("processing {}", label);

            let mut reporter = Reporter::new(label.clone());
            let processed = self
                .pipeline
                .process(&mut Session::new(&mut reporter), original)
                .map_err(|source| PlanError::Process {
                    label: label.clone(),
                    source,
                })?;
            summary.processed += 1;
            tracing::info!("{}: {}", label, reporter.disposition());

            if let Some(aggregator) = aggregator {
                aggregator
                    .submit(reporter)
                    .await
                    .map_err(|e| submit_error(e, cancel))?;
            }

            let Some(processed) = processed else {
                summary.dropped += 1;
                continue;
            };

            if !options.dry_run {
                self.output
                    .publish(&client, original, &processed)
                    .await
                    .map_err(|source| PlanError::Output {
                        label: label.clone(),
                        source,
                    })?;
            }
            if let Some(writer) = writer.as_deref_mut() {
                writer.write(&processed).map_err(PlanError::Sink)?;
            }
            summary.published += 1;
        }

        if let Some(writer) = writer {
            writer.flush().map_err(PlanError::Sink)?;
            tracing::debug!("wrote {} message(s) to the output stream", writer.written());
        }
        Ok(summary)
    }
}

/// The aggregator closes its stream on cancellation, so a closed stream with
/// the flag set is a cancelled run rather than a reporting failure.
fn submit_error(err: ReportError, cancel: &watch::Receiver<bool>) -> PlanError {
    match err {
        ReportError::Closed if *cancel.borrow() => PlanError::Cancelled,
        other => PlanError::Report(other),
    }
}
