//! Markdown report — summary table then per-result sections

use redprobe_core::{Report, Result, TemplateStatus};

pub fn emit(report: &Report) -> Result<Vec<u8>> {
    let s = &report.summary;
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", report.title));
    out.push_str(&format!(
        "Generated {}\n\n",
        report.created_at.to_rfc3339()
    ));

    out.push_str("## Summary\n\n");
    out.push_str("| Total | Passed | Findings | Errors | Skipped | Pass rate | Avg score |\n");
    out.push_str("|---|---|---|---|---|---|---|\n");
    out.push_str(&format!(
        "| {} | {} | {} | {} | {} | {:.1}% | {:.1} |\n\n",
        s.total,
        s.passed,
        s.failed,
        s.error_count,
        s.skipped,
        s.pass_rate * 100.0,
        s.avg_score
    ));

    if !s.severity_breakdown.is_empty() {
        out.push_str("### Findings by severity\n\n");
        for (severity, count) in &s.severity_breakdown {
            out.push_str(&format!("- **{}**: {}\n", severity, count));
        }
        out.push('\n');
    }

    out.push_str("## Results\n\n");
    for result in &report.results {
        let marker = match result.status {
            TemplateStatus::Completed if result.detected => "🔴",
            TemplateStatus::Completed => "🟢",
            TemplateStatus::Failed => "⚠️",
            _ => "⏳",
        };
        out.push_str(&format!("### {} `{}`\n\n", marker, result.template_id));
        out.push_str(&format!(
            "- status: {} | severity: {} | score: {} | duration: {}ms\n",
            result.status, result.severity, result.score, result.duration_ms
        ));
        if let Some(error) = &result.error {
            out.push_str(&format!("- error: {}\n", error));
        }
        if let Some(response) = &result.response {
            out.push_str("\n```\n");
            out.push_str(response);
            out.push_str("\n```\n");
        }
        out.push('\n');
    }
    Ok(out.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use redprobe_core::{ReportFormat, Severity, TemplateResult};

    #[test]
    fn sections_are_present() {
        let mut r = TemplateResult::new("probe_v1.0", Severity::High);
        r.start();
        r.detected = true;
        r.score = 100;
        r.complete();
        let report = Report::new("Scan", ReportFormat::Markdown, vec![r]);
        let text = String::from_utf8(emit(&report).unwrap()).unwrap();
        assert!(text.contains("# Scan"));
        assert!(text.contains("## Summary"));
        assert!(text.contains("### 🔴 `probe_v1.0`"));
    }
}
