//! Excel workbook — "Summary" and "Details" sheets with fixed columns

use redprobe_core::{Error, Report, Result};
use rust_xlsxwriter::Workbook;

pub const DETAIL_COLUMNS: [&str; 8] = [
    "Template", "Status", "Severity", "Category", "Detected", "Score", "Duration (ms)", "Error",
];

pub fn emit(report: &Report) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();

    {
        let sheet = workbook
            .add_worksheet()
            .set_name("Summary")
            .map_err(|e| Error::Config(format!("excel: {}", e)))?;
        let s = &report.summary;
        let pairs: [(&str, f64); 7] = [
            ("Total", s.total as f64),
            ("Passed", s.passed as f64),
            ("Findings", s.failed as f64),
            ("Errors", s.error_count as f64),
            ("Skipped", s.skipped as f64),
            ("Pass rate", s.pass_rate),
            ("Avg score", s.avg_score),
        ];
        for (row, (label, value)) in pairs.iter().enumerate() {
            sheet
                .write(row as u32, 0, *label)
                .and_then(|s| s.write(row as u32, 1, *value))
                .map_err(|e| Error::Config(format!("excel: {}", e)))?;
        }
        let mut row = pairs.len() as u32 + 1;
        for (severity, count) in &s.severity_breakdown {
            sheet
                .write(row, 0, format!("Findings ({})", severity))
                .and_then(|s| s.write(row, 1, *count as f64))
                .map_err(|e| Error::Config(format!("excel: {}", e)))?;
            row += 1;
        }
    }

    {
        let sheet = workbook
            .add_worksheet()
            .set_name("Details")
            .map_err(|e| Error::Config(format!("excel: {}", e)))?;
        for (col, header) in DETAIL_COLUMNS.iter().enumerate() {
            sheet
                .write(0, col as u16, *header)
                .map_err(|e| Error::Config(format!("excel: {}", e)))?;
        }
        for (i, result) in report.results.iter().enumerate() {
            let row = i as u32 + 1;
            sheet
                .write(row, 0, result.template_id.as_str())
                .and_then(|s| s.write(row, 1, result.status.to_string()))
                .and_then(|s| s.write(row, 2, result.severity.to_string()))
                .and_then(|s| s.write(row, 3, result.category.as_str()))
                .and_then(|s| s.write(row, 4, if result.detected { "true" } else { "false" }))
                .and_then(|s| s.write(row, 5, result.score as f64))
                .and_then(|s| s.write(row, 6, result.duration_ms as f64))
                .and_then(|s| s.write(row, 7, result.error.as_deref().unwrap_or("")))
                .map_err(|e| Error::Config(format!("excel: {}", e)))?;
        }
    }

    workbook
        .save_to_buffer()
        .map_err(|e| Error::Config(format!("excel: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use redprobe_core::{ReportFormat, Severity, TemplateResult};

    #[test]
    fn workbook_bytes_look_like_xlsx() {
        let mut r = TemplateResult::new("probe_v1.0", Severity::High);
        r.start();
        r.detected = true;
        r.score = 100;
        r.complete();
        let report = Report::new("t", ReportFormat::Excel, vec![r]);
        let bytes = emit(&report).unwrap();
        // xlsx is a zip container
        assert_eq!(&bytes[..2], b"PK");
    }
}
