//! Indented JSON with RFC3339 timestamps

use redprobe_core::{Report, Result};

pub fn emit(report: &Report) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(report)?;
    bytes.push(b'\n');
    Ok(bytes)
}
