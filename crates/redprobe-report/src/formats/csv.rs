//! RFC 4180 CSV emission

use redprobe_core::{Error, Report, Result};

/// Fixed column order; downstream tooling depends on it.
pub const HEADER: [&str; 11] = [
    "template_id",
    "status",
    "severity",
    "category",
    "detected",
    "score",
    "duration_ms",
    "start_time",
    "end_time",
    "error",
    "response",
];

pub fn emit(report: &Report) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(HEADER)
        .map_err(|e| Error::Config(format!("csv: {}", e)))?;
    for result in &report.results {
        writer
            .write_record([
                result.template_id.as_str(),
                &result.status.to_string(),
                &result.severity.to_string(),
                result.category.as_str(),
                if result.detected { "true" } else { "false" },
                &result.score.to_string(),
                &result.duration_ms.to_string(),
                &result.start_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
                &result.end_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
                result.error.as_deref().unwrap_or(""),
                result.response.as_deref().unwrap_or(""),
            ])
            .map_err(|e| Error::Config(format!("csv: {}", e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::Config(format!("csv: {}", e)))
}
