//! Manifest files — persisted index of installed templates and modules

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const MANIFEST_SCHEMA_VERSION: &str = "1.0";

/// One installed artifact (template or module).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ManifestEntry {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub category: String,
    /// Repository path the artifact was loaded from.
    #[serde(default)]
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// On-disk index, written to `templates/manifest.json` and
/// `modules/manifest.json`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Manifest {
    pub schema_version: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub templates: BTreeMap<String, ManifestEntry>,
    #[serde(default)]
    pub modules: BTreeMap<String, ManifestEntry>,
    /// category → artifact ids
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    /// artifact type → artifact ids
    #[serde(default)]
    pub types: BTreeMap<String, Vec<String>>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            last_updated: Utc::now(),
            templates: BTreeMap::new(),
            modules: BTreeMap::new(),
            categories: BTreeMap::new(),
            types: BTreeMap::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let manifest: Manifest = serde_json::from_slice(&bytes)?;
        if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "unsupported manifest schema version: {}",
                manifest.schema_version
            )));
        }
        Ok(manifest)
    }

    /// Load the manifest at `path`, or start a fresh one if none exists.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Atomic write: serialize to a sibling temp file, then rename over.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn upsert_template(&mut self, id: &str, entry: ManifestEntry) {
        self.index(id, &entry.category, "template");
        self.templates.insert(id.to_string(), entry);
        self.last_updated = Utc::now();
    }

    pub fn upsert_module(&mut self, id: &str, entry: ManifestEntry) {
        self.index(id, &entry.category, "module");
        self.modules.insert(id.to_string(), entry);
        self.last_updated = Utc::now();
    }

    pub fn remove_template(&mut self, id: &str) -> bool {
        let removed = self.templates.remove(id).is_some();
        if removed {
            for ids in self.categories.values_mut() {
                ids.retain(|x| x != id);
            }
            for ids in self.types.values_mut() {
                ids.retain(|x| x != id);
            }
            self.last_updated = Utc::now();
        }
        removed
    }

    fn index(&mut self, id: &str, category: &str, artifact_type: &str) {
        if !category.is_empty() {
            let ids = self.categories.entry(category.to_string()).or_default();
            if !ids.iter().any(|x| x == id) {
                ids.push(id.to_string());
            }
        }
        let ids = self.types.entry(artifact_type.to_string()).or_default();
        if !ids.iter().any(|x| x == id) {
            ids.push(id.to_string());
        }
    }
}
