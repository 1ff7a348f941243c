//! Ordered processor chain applied to each message.
//!
//! Pipelines are declared in YAML as a list of single-key maps, the key naming
//! the processor kind:
//!
//! ```yaml
//! processors:
//!   - filter:
//!       prefix:
//!         name: bam
//!   - map:
//!       field: config.gateway
//!   - transform:
//!       fields:
//!         udpEnabled: true
//! ```
//!
//! A message is deep-copied, then fed through every processor in order. A
//! processor that yields no message (or JSON `null`) ends the chain and the
//! message is dropped; a processor error ends the chain and propagates.

pub mod filter;
pub mod map;
pub mod replace;
pub mod transform;

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;

use crate::message::{deep_copy, Message};
use crate::report::Reporter;
use crate::template::TemplateError;

pub use filter::Filter;
pub use map::Map;
pub use replace::Replace;
pub use transform::Transform;

/// Processor kinds accepted as keys in `pipeline.processors`.
pub const PROCESSOR_KINDS: &[&str] = &["filter", "transform", "replace", "map"];

/// Error type for message processing
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessError {
    /// A template failed to parse or render
    Template(TemplateError),
    /// A processor received a message of the wrong shape
    TypeMismatch {
        processor: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    /// A processor that records audit data ran without a reporter
    MissingContext { processor: &'static str },
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::Template(e) => write!(f, "{}", e),
            ProcessError::TypeMismatch {
                processor,
                expected,
                actual,
            } => write!(
                f,
                "{} processor expects input to be {}, got {}",
                processor, expected, actual
            ),
            ProcessError::MissingContext { processor } => write!(
                f,
                "{} processor requires a reporter in the processing session",
                processor
            ),
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessError::Template(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TemplateError> for ProcessError {
    fn from(err: TemplateError) -> Self {
        ProcessError::Template(err)
    }
}

/// Per-message processing state passed to every processor.
///
/// Holds the reporter of the message currently being processed. A detached
/// session has none; processors that record audit data reject it with
/// `ProcessError::MissingContext`.
pub struct Session<'a> {
    reporter: Option<&'a mut Reporter>,
}

impl<'a> Session<'a> {
    /// Session recording into `reporter`.
    pub fn new(reporter: &'a mut Reporter) -> Self {
        Self {
            reporter: Some(reporter),
        }
    }

    /// Session without a reporter.
    pub fn detached() -> Self {
        Self { reporter: None }
    }

    /// The active reporter, required by `processor`.
    pub fn reporter(&mut self, processor: &'static str) -> Result<&mut Reporter, ProcessError> {
        self.reporter
            .as_deref_mut()
            .ok_or(ProcessError::MissingContext { processor })
    }
}

/// A single pipeline step.
pub trait Operation {
    /// Process one message.
    ///
    /// # Returns
    /// * `Ok(Some(message))` - message continues down the pipeline
    /// * `Ok(None)` - message is dropped
    /// * `Err(e)` - processing of this message failed
    fn process(
        &self,
        session: &mut Session<'_>,
        message: Message,
    ) -> Result<Option<Message>, ProcessError>;

    /// Template expressions this step evaluates, for up-front validation.
    fn templates(&self) -> Vec<&str> {
        Vec::new()
    }
}

/// One configured pipeline step.
#[derive(Debug, Clone, PartialEq)]
pub enum Processor {
    Filter(Filter),
    Transform(Transform),
    Replace(Replace),
    Map(Map),
}

impl Processor {
    /// Configuration key of this processor.
    pub fn kind(&self) -> &'static str {
        match self {
            Processor::Filter(_) => "filter",
            Processor::Transform(_) => "transform",
            Processor::Replace(_) => "replace",
            Processor::Map(_) => "map",
        }
    }

    fn operation(&self) -> &dyn Operation {
        match self {
            Processor::Filter(op) => op,
            Processor::Transform(op) => op,
            Processor::Replace(op) => op,
            Processor::Map(op) => op,
        }
    }
}

impl Operation for Processor {
    fn process(
        &self,
        session: &mut Session<'_>,
        message: Message,
    ) -> Result<Option<Message>, ProcessError> {
        self.operation().process(session, message)
    }

    fn templates(&self) -> Vec<&str> {
        self.operation().templates()
    }
}

impl<'de> Deserialize<'de> for Processor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ProcessorVisitor)
    }
}

struct ProcessorVisitor;

impl<'de> Visitor<'de> for ProcessorVisitor {
    type Value = Processor;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a map with exactly one of the keys {}", PROCESSOR_KINDS.join(", "))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Processor, A::Error> {
        let kind: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("each processor must have exactly one key, got 0"))?;

        let processor = match kind.as_str() {
            "filter" => Processor::Filter(map.next_value()?),
            "transform" => Processor::Transform(map.next_value()?),
            "replace" => Processor::Replace(map.next_value()?),
            "map" => Processor::Map(map.next_value()?),
            other => return Err(de::Error::unknown_variant(other, PROCESSOR_KINDS)),
        };

        if let Some(extra) = map.next_key::<String>()? {
            return Err(de::Error::custom(format!(
                "each processor must have exactly one key, found {:?} after {:?}",
                extra, kind
            )));
        }
        Ok(processor)
    }
}

/// Ordered chain of processors.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pipeline {
    #[serde(default)]
    pub processors: Vec<Processor>,
}

impl Pipeline {
    pub fn new(processors: Vec<Processor>) -> Self {
        Self { processors }
    }

    /// Run `message` through every processor in order.
    ///
    /// The input is deep-copied first, so nothing a processor does is visible
    /// through the caller's reference.
    ///
    /// # Returns
    /// * `Ok(Some(message))` - the processed message
    /// * `Ok(None)` - a processor dropped the message
    /// * `Err(e)` - a processor failed; later processors did not run
    pub fn process(
        &self,
        session: &mut Session<'_>,
        message: &Message,
    ) -> Result<Option<Message>, ProcessError> {
        let mut current = deep_copy(message);
        for processor in &self.processors {
            tracing::debug!(processor = processor.kind(), "running processor");
            match processor.process(session, current)? {
                None | Some(Value::Null) => return Ok(None),
                Some(next) => current = next,
            }
        }
        Ok((!current.is_null()).then_some(current))
    }

    /// Every template expression used by the pipeline.
    pub fn templates(&self) -> Vec<&str> {
        self.processors.iter().flat_map(|p| p.templates()).collect()
    }
}

/// Deserialize a map of template (or affix) strings, accepting YAML scalars of
/// any type as their text form so `enabled: true` means the template `true`.
pub(crate) fn deserialize_scalar_map<'de, D>(
    deserializer: D,
) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let scalars: IndexMap<String, ScalarText> = IndexMap::deserialize(deserializer)?;
    Ok(scalars.into_iter().map(|(k, v)| (k, v.0)).collect())
}

/// Text of a scalar configuration value.
struct ScalarText(String);

impl<'de> Deserialize<'de> for ScalarText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ScalarTextVisitor)
    }
}

struct ScalarTextVisitor;

impl<'de> Visitor<'de> for ScalarTextVisitor {
    type Value = ScalarText;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a string, number or boolean")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<ScalarText, E> {
        Ok(ScalarText(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<ScalarText, E> {
        Ok(ScalarText(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<ScalarText, E> {
        Ok(ScalarText(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<ScalarText, E> {
        Ok(ScalarText(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<ScalarText, E> {
        Ok(ScalarText(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<ScalarText, E> {
        Ok(ScalarText(v.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<ScalarText, E> {
        Ok(ScalarText(String::new()))
    }
}
