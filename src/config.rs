//! Engine configuration — serde structs for redprobe.yaml
//!
//! The config path comes from `LLM_RED_TEAM_CONFIG`, falling back to
//! `./redprobe.yaml`. Every section has sensible defaults so an empty file
//! (or none at all) still yields a working engine.

use redprobe_core::{Error, Result, TemplateSource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "LLM_RED_TEAM_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "redprobe.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedprobeConfig {
    pub sources: Vec<TemplateSource>,
    pub provider: ProviderSection,
    pub executor: ExecutorSection,
    pub cache: CacheSection,
    pub loader: LoaderSection,
    pub report: ReportSection,
    /// Threshold gates, keyed `metric` or `metric.stat`.
    pub thresholds: HashMap<String, f64>,
    /// Directory holding `templates/manifest.json` and `modules/manifest.json`.
    pub manifest_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub name: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            endpoint: None,
            model: None,
            max_tokens: Some(1024),
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub fail_fast: bool,
    pub max_attempts: u32,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout_secs: 60,
            fail_fast: false,
            max_attempts: 3,
        }
    }
}

impl ExecutorSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub capacity: usize,
    pub ttl_secs: Option<u64>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl_secs: Some(3600),
        }
    }
}

impl CacheSection {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSection {
    pub workers: usize,
    pub file_glob: String,
}

impl Default for LoaderSection {
    fn default() -> Self {
        let defaults = redprobe_template::LoaderOptions::default();
        Self {
            workers: defaults.workers,
            file_glob: defaults.file_glob,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub default_format: String,
    pub output_dir: PathBuf,
    pub performance_dir: PathBuf,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            default_format: "json".to_string(),
            output_dir: PathBuf::from("reports"),
            performance_dir: PathBuf::from("performance-reports"),
        }
    }
}

impl RedprobeConfig {
    /// Resolve the config path from the environment.
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        serde_yaml::from_str(&text).map_err(Error::from)
    }

    /// Load the file if present, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path.as_ref(), serde_yaml::to_string(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = RedprobeConfig::default();
        assert_eq!(config.executor.concurrency, 4);
        assert_eq!(config.cache.capacity, 256);
        assert_eq!(config.report.default_format, "json");
        assert!(config.sources.is_empty());
    }

    #[test]
    fn partial_yaml_fills_the_rest() {
        let yaml = "executor:\n  concurrency: 16\n";
        let config: RedprobeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.executor.concurrency, 16);
        assert_eq!(config.executor.timeout_secs, 60);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redprobe.yaml");
        let mut config = RedprobeConfig::default();
        config.sources.push(TemplateSource {
            name: "local".into(),
            source_type: "local".into(),
            url: "./templates".into(),
            branch: None,
            token: None,
        });
        config.save(&path).unwrap();
        let loaded = RedprobeConfig::load(&path).unwrap();
        assert_eq!(loaded.sources.len(), 1);
        assert_eq!(loaded.sources[0].name, "local");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = RedprobeConfig::load_or_default("/nonexistent/redprobe.yaml").unwrap();
        assert_eq!(config.executor.concurrency, 4);
    }
}
