//! Map processor: narrows a message to one of its nested values.

use serde::Deserialize;

use super::{Operation, ProcessError, Session};
use crate::message::{widened, Message};
use crate::path::FieldPath;

/// Replaces the message with the value at `field`, or `default` when the path
/// does not resolve. Without a default an unresolved path drops the message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Map {
    /// Dot-separated path
    pub field: String,
    #[serde(default)]
    pub default: Option<Message>,
}

impl Operation for Map {
    fn process(
        &self,
        _session: &mut Session<'_>,
        message: Message,
    ) -> Result<Option<Message>, ProcessError> {
        let path = FieldPath::from_dotted(&self.field);
        match path.resolve(&message) {
            Some(value) => Ok(Some(value.clone())),
            None => {
                tracing::debug!(field = %path, "field not found, using default");
                Ok(self.default.clone().map(widened))
            }
        }
    }
}
