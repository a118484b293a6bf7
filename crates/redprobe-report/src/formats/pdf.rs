//! PDF emission — requires an external renderer, which is not bundled

use redprobe_core::{Error, Report, Result};

pub fn emit(_report: &Report) -> Result<Vec<u8>> {
    Err(Error::UnsupportedFormat(
        "pdf: no renderer available".to_string(),
    ))
}
