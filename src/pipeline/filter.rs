//! Filter processor: drops messages that fail any configured criterion.

use indexmap::IndexMap;
use serde::Deserialize;

use super::{deserialize_scalar_map, Operation, ProcessError, Session};
use crate::message::Message;
use crate::path::FieldPath;
use crate::template::{Template, TemplateError};

/// Keeps a message only if it satisfies every criterion.
///
/// Criteria are checked in order: all prefixes, all suffixes, then the query.
/// The first failing criterion becomes the message's skip reason.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    /// Field path -> required string prefix
    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub prefix: IndexMap<String, String>,
    /// Field path -> required string suffix
    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub suffix: IndexMap<String, String>,
    /// Template that must render to exactly `true`
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Clone, Copy)]
enum Affix {
    Prefix,
    Suffix,
}

impl Affix {
    fn name(self) -> &'static str {
        match self {
            Affix::Prefix => "prefix",
            Affix::Suffix => "suffix",
        }
    }

    fn matches(self, text: &str, affix: &str) -> bool {
        match self {
            Affix::Prefix => text.starts_with(affix),
            Affix::Suffix => text.ends_with(affix),
        }
    }
}

impl Filter {
    /// Reason the message is rejected, or `None` if it passes.
    ///
    /// # Errors
    /// Returns a `TemplateError` if the query fails to parse or render.
    pub fn rejection(&self, message: &Message) -> Result<Option<String>, TemplateError> {
        let affix_checks = [(Affix::Prefix, &self.prefix), (Affix::Suffix, &self.suffix)];
        for (affix, criteria) in affix_checks {
            for (path, expected) in criteria {
                let value = FieldPath::from_dotted(path).resolve(message);
                let Some(value) = value else {
                    return Ok(Some(format!(
                        "missing field {:?} for {} check",
                        path,
                        affix.name()
                    )));
                };
                let matched = value
                    .as_str()
                    .is_some_and(|text| affix.matches(text, expected));
                if !matched {
                    return Ok(Some(format!(
                        "field {:?} does not have {} {:?}",
                        path,
                        affix.name(),
                        expected
                    )));
                }
            }
        }

        if let Some(query) = self.query.as_deref().filter(|q| !q.is_empty()) {
            let rendered = Template::parse(query)?.render(message)?;
            let result = rendered.trim();
            if result != "true" {
                return Ok(Some(format!("query {:?} evaluated to {:?}", query, result)));
            }
        }

        Ok(None)
    }
}

impl Operation for Filter {
    fn process(
        &self,
        session: &mut Session<'_>,
        message: Message,
    ) -> Result<Option<Message>, ProcessError> {
        let reporter = session.reporter("filter")?;
        match self.rejection(&message)? {
            Some(reason) => {
                tracing::debug!(label = reporter.label(), %reason, "message filtered");
                reporter.skip(reason);
                Ok(None)
            }
            None => Ok(Some(message)),
        }
    }

    fn templates(&self) -> Vec<&str> {
        self.query.as_deref().into_iter().collect()
    }
}
