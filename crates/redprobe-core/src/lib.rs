//! Shared types for the redprobe engine: the template data model, the
//! per-run result state machine, report structures, manifest persistence,
//! and the error taxonomy every other crate builds on.

pub mod error;
pub mod manifest;
pub mod result;
pub mod source;
pub mod template;

pub use error::{Error, Result};
pub use manifest::{Manifest, ManifestEntry, MANIFEST_SCHEMA_VERSION};
pub use result::{Report, ReportFormat, ReportSuite, ReportSummary, TemplateResult, TemplateStatus};
pub use source::{FileInfo, RepositoryConfig, TemplateSource};
pub use template::{
    is_valid_id, is_valid_version, variable_references, DetectionRule, DetectionType, Severity,
    Template, VariableSpec,
};
