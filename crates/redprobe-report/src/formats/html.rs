//! Self-contained HTML report (inline CSS, no external assets)

use redprobe_core::{Report, Result, TemplateStatus};

const STYLE: &str = "\
body{font-family:system-ui,sans-serif;margin:2rem auto;max-width:60rem;color:#1a1a2e}\
h1{border-bottom:2px solid #e63946;padding-bottom:.3rem}\
table{border-collapse:collapse;width:100%;margin:1rem 0}\
th,td{border:1px solid #ccc;padding:.4rem .6rem;text-align:left}\
th{background:#f1f1f6}\
.finding{color:#e63946;font-weight:600}\
.pass{color:#2a9d8f}\
.error{color:#e07a00}\
pre{background:#f7f7fa;padding:.6rem;overflow-x:auto;border-radius:4px}";

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn emit(report: &Report) -> Result<Vec<u8>> {
    let s = &report.summary;
    let mut rows = String::new();
    for result in &report.results {
        let (class, verdict) = match result.status {
            TemplateStatus::Completed if result.detected => ("finding", "finding"),
            TemplateStatus::Completed => ("pass", "pass"),
            TemplateStatus::Failed => ("error", "error"),
            _ => ("", "skipped"),
        };
        rows.push_str(&format!(
            "<tr><td>{}</td><td class=\"{}\">{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}ms</td><td>{}</td></tr>\n",
            escape(&result.template_id),
            class,
            verdict,
            escape(&result.severity.to_string()),
            escape(&result.category),
            result.score,
            result.duration_ms,
            escape(result.error.as_deref().unwrap_or("")),
        ));
    }

    let html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{style}</style>\n</head>\n<body>\n\
         <h1>{title}</h1>\n\
         <p>Generated {created}</p>\n\
         <h2>Summary</h2>\n\
         <table><tr><th>Total</th><th>Passed</th><th>Findings</th><th>Errors</th>\
         <th>Skipped</th><th>Pass rate</th><th>Avg score</th></tr>\n\
         <tr><td>{total}</td><td>{passed}</td><td>{failed}</td><td>{errors}</td>\
         <td>{skipped}</td><td>{rate:.1}%</td><td>{avg:.1}</td></tr></table>\n\
         <h2>Results</h2>\n\
         <table><tr><th>Template</th><th>Verdict</th><th>Severity</th><th>Category</th>\
         <th>Score</th><th>Duration</th><th>Error</th></tr>\n{rows}</table>\n\
         </body>\n</html>\n",
        title = escape(&report.title),
        style = STYLE,
        created = report.created_at.to_rfc3339(),
        total = s.total,
        passed = s.passed,
        failed = s.failed,
        errors = s.error_count,
        skipped = s.skipped,
        rate = s.pass_rate * 100.0,
        avg = s.avg_score,
        rows = rows,
    );
    Ok(html.into_bytes())
}
