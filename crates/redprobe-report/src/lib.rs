//! Reporter — result aggregation and format-polymorphic emission
//!
//! Built-in emitters cover the formats in [`ReportFormat`]; callers may
//! register additional named formatters at runtime. Dispatch misses return
//! `UnsupportedFormat`.

pub mod formats;

use redprobe_core::{Error, Report, ReportFormat, Result, TemplateResult};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A custom emitter: report in, bytes out.
pub type FormatterFn = Arc<dyn Fn(&Report) -> Result<Vec<u8>> + Send + Sync>;

#[derive(Default)]
pub struct Reporter {
    custom: RwLock<HashMap<String, FormatterFn>>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a report from a result snapshot (sorted, summarized).
    pub fn build(
        &self,
        title: impl Into<String>,
        format: ReportFormat,
        results: Vec<TemplateResult>,
    ) -> Report {
        Report::new(title, format, results)
    }

    /// Register a named formatter. Custom names shadow built-ins.
    pub fn register_formatter<F>(&self, name: &str, formatter: F)
    where
        F: Fn(&Report) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.custom
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_ascii_lowercase(), Arc::new(formatter));
    }

    /// Emit using the report's own format.
    pub fn generate(&self, report: &Report) -> Result<Vec<u8>> {
        self.emit_builtin(report, report.format)
    }

    /// Emit by format name, consulting custom formatters first.
    pub fn generate_named(&self, report: &Report, name: &str) -> Result<Vec<u8>> {
        let custom = {
            let formatters = self.custom.read().unwrap_or_else(|e| e.into_inner());
            formatters.get(&name.to_ascii_lowercase()).cloned()
        };
        if let Some(formatter) = custom {
            debug!(format = name, "custom formatter dispatch");
            return formatter(report);
        }
        match ReportFormat::from_str(name) {
            Ok(format) => self.emit_builtin(report, format),
            Err(_) => Err(Error::UnsupportedFormat(name.to_string())),
        }
    }

    fn emit_builtin(&self, report: &Report, format: ReportFormat) -> Result<Vec<u8>> {
        match format {
            ReportFormat::Json => formats::json::emit(report),
            ReportFormat::Yaml => formats::yaml::emit(report),
            ReportFormat::Csv => formats::csv::emit(report),
            ReportFormat::Markdown => formats::markdown::emit(report),
            ReportFormat::Html => formats::html::emit(report),
            ReportFormat::Excel => formats::excel::emit(report),
            ReportFormat::Jsonl => formats::jsonl::emit(report),
            ReportFormat::Pdf => formats::pdf::emit(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redprobe_core::Severity;

    fn result(id: &str, detected: bool) -> TemplateResult {
        let mut r = TemplateResult::new(id, Severity::High);
        r.category = "prompt-injection".into();
        r.start();
        r.detected = detected;
        r.score = if detected { 100 } else { 0 };
        r.complete();
        r
    }

    fn sample_report(format: ReportFormat) -> Report {
        Reporter::new().build(
            "nightly scan",
            format,
            vec![result("b_v1.0", true), result("a_v1.0", false)],
        )
    }

    #[test]
    fn every_builtin_format_emits() {
        let reporter = Reporter::new();
        for format in [
            ReportFormat::Json,
            ReportFormat::Yaml,
            ReportFormat::Csv,
            ReportFormat::Markdown,
            ReportFormat::Html,
            ReportFormat::Excel,
            ReportFormat::Jsonl,
        ] {
            let report = sample_report(format);
            let bytes = reporter.generate(&report).unwrap();
            assert!(!bytes.is_empty(), "{:?} emitted nothing", format);
        }
    }

    #[test]
    fn pdf_is_not_implemented() {
        let reporter = Reporter::new();
        let report = sample_report(ReportFormat::Pdf);
        assert!(reporter.generate(&report).is_err());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let reporter = Reporter::new();
        let report = sample_report(ReportFormat::Json);
        assert!(matches!(
            reporter.generate_named(&report, "docx"),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn custom_formatter_shadows_builtins() {
        let reporter = Reporter::new();
        reporter.register_formatter("json", |report: &Report| {
            Ok(format!("custom:{}", report.results.len()).into_bytes())
        });
        let report = sample_report(ReportFormat::Json);
        let bytes = reporter.generate_named(&report, "json").unwrap();
        assert_eq!(bytes, b"custom:2");
    }

    #[test]
    fn json_summary_roundtrips() {
        let reporter = Reporter::new();
        let report = sample_report(ReportFormat::Json);
        let bytes = reporter.generate(&report).unwrap();
        let parsed: Report = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.summary, report.summary);
        assert_eq!(parsed.results.len(), report.results.len());
    }

    #[test]
    fn results_are_ordered_by_template_id() {
        let report = sample_report(ReportFormat::Json);
        assert_eq!(report.results[0].template_id, "a_v1.0");
        assert_eq!(report.results[1].template_id, "b_v1.0");
    }
}
