//! Per-message audit records.
//!
//! A [`Reporter`] is opened for each message the driver processes. Filters
//! record why they dropped a message, transforms record every field they
//! change, and at the end of the message the reporter is handed to the
//! [`Aggregator`](aggregator::Aggregator), which writes it to one of three CSV
//! logs:
//!
//! - `filtered.csv` - `name,filter`
//! - `changes.csv` - `name,field,before,after` (one row per change)
//! - `noops.csv` - `name`

pub mod aggregator;
pub mod writer;

use std::fmt;

use crate::message::Message;
use crate::template::{format_value, NO_VALUE};

pub use aggregator::{Aggregator, ReportError, ReportSummary};
pub use writer::AuditWriter;

/// One field rewrite recorded by a transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Field name
    pub field: String,
    /// Value before the rewrite (`None` when the field was absent)
    pub before: Option<Message>,
    /// Value after the rewrite (`None` when the field was removed)
    pub after: Option<Message>,
}

impl Change {
    /// Text written to the `before` column.
    pub fn before_text(&self) -> String {
        self.before.as_ref().map_or_else(|| "<nil>".to_string(), format_value)
    }

    /// Text written to the `after` column.
    pub fn after_text(&self) -> String {
        self.after.as_ref().map_or_else(|| NO_VALUE.to_string(), format_value)
    }
}

/// Final classification of a processed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    Filtered,
    Changed,
    Noop,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Filtered => write!(f, "filtered"),
            Disposition::Changed => write!(f, "changed"),
            Disposition::Noop => write!(f, "no-op"),
        }
    }
}

/// Audit record for a single message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reporter {
    label: String,
    skipped: Option<String>,
    changes: Vec<Change>,
}

impl Reporter {
    /// Open a reporter for the message identified by `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            skipped: None,
            changes: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Record why the message was dropped. Only the first reason is kept.
    pub fn skip(&mut self, reason: impl Into<String>) {
        if self.skipped.is_none() {
            self.skipped = Some(reason.into());
        }
    }

    /// Record a field rewrite.
    pub fn change(&mut self, field: impl Into<String>, before: Option<Message>, after: Option<Message>) {
        self.changes.push(Change {
            field: field.into(),
            before,
            after,
        });
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skipped.as_deref()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// A skip reason wins over changes; a reporter with neither is a no-op.
    pub fn disposition(&self) -> Disposition {
        if self.skipped.is_some() {
            Disposition::Filtered
        } else if !self.changes.is_empty() {
            Disposition::Changed
        } else {
            Disposition::Noop
        }
    }
}
