//! JSONL — one result per line, streamable

use redprobe_core::{Report, Result, TemplateResult};
use std::io::Write;

/// Stream results into `writer` one JSON object per line.
pub fn write_results<W: Write>(results: &[TemplateResult], mut writer: W) -> Result<()> {
    for result in results {
        serde_json::to_writer(&mut writer, result)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

pub fn emit(report: &Report) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_results(&report.results, &mut out)?;
    Ok(out)
}
