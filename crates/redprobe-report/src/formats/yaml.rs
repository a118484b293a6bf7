//! Block-style YAML; report metadata is mirrored as header comments

use redprobe_core::{Report, Result};

pub fn emit(report: &Report) -> Result<Vec<u8>> {
    let mut out = String::new();
    out.push_str(&format!("# report: {}\n", report.title));
    for (key, value) in &report.metadata {
        out.push_str(&format!("# {}: {}\n", key, compact(value)));
    }
    out.push_str(&serde_yaml::to_string(report)?);
    Ok(out.into_bytes())
}

fn compact(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redprobe_core::ReportFormat;

    #[test]
    fn metadata_becomes_comments() {
        let mut report = Report::new("scan", ReportFormat::Yaml, vec![]);
        report
            .metadata
            .insert("target".into(), serde_json::json!("https://llm.example"));
        let text = String::from_utf8(emit(&report).unwrap()).unwrap();
        assert!(text.starts_with("# report: scan\n"));
        assert!(text.contains("# target: https://llm.example"));
        assert!(text.contains("summary:"));
    }
}
