//! # jsonplan: Configuration-Driven JSON Transformation
//!
//! jsonplan reads a JSON document, runs every message in it through an ordered
//! pipeline of processors declared in YAML, records what happened to each
//! message in CSV audit logs, and publishes the survivors.
//!
//! ## Features
//!
//! - **Four processors**: `filter`, `transform`, `replace` and `map`
//! - **Template expressions**: `{{ }}` actions with field access, conditionals
//!   and string predicates, coerced back to typed JSON values
//! - **Audit reports**: `filtered.csv`, `changes.csv` and `noops.csv` per run
//! - **HTTP input and output** with environment references in the plan
//!
//! ## Example: Enabling UDP on gateways
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
//!     - map:
//!         field: config.gateway
//!     - transform:
//!         fields:
//!           udpEnabled: true
//!           udpPort: "{{ if .udpPort }}{{ .udpPort }}{{ else }}{{ .port }}{{ end }}"
//! output:
//!   http:
//!     url: "https://example.com/nodes/{{ .uid }}/gateway"
//!     method: PUT
//! ```

// Message model and navigation
pub mod message;
pub mod path;

// Expression language
pub mod template;

// Processors
pub mod pipeline;

// Audit logs
pub mod report;

// Plan loading and the run driver
pub mod plan;
pub mod serialization;

// Re-export key types
pub use message::Message;
pub use path::{dive, FieldPath};
pub use pipeline::{Filter, Map, Operation, Pipeline, ProcessError, Processor, Replace, Session, Transform};
pub use plan::{ConfigError, Plan, PlanError, RunOptions, RunSummary};
pub use report::{Aggregator, Disposition, ReportError, ReportSummary, Reporter};
pub use serialization::NdjsonWriter;
pub use template::{Coerced, Template, TemplateError};
