//! Source descriptors and repository listing types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where to fetch templates from, as written in config.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateSource {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Resolved backend configuration used to instantiate a repository.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(rename = "type")]
    pub repo_type: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<String>,
}

impl RepositoryConfig {
    /// Resolve a source descriptor into a backend config.
    /// The token falls back to `GIT_TOKEN` for git-host types.
    pub fn from_source(source: &TemplateSource) -> Self {
        let token = source.token.clone().or_else(|| {
            matches!(source.source_type.as_str(), "github" | "gitlab")
                .then(|| std::env::var("GIT_TOKEN").ok())
                .flatten()
        });
        Self {
            repo_type: source.source_type.clone(),
            name: source.name.clone(),
            url: source.url.clone(),
            branch: source.branch.clone().unwrap_or_else(|| "main".to_string()),
            username: None,
            password: None,
            token,
            cert_path: None,
        }
    }
}

/// A file entry returned by a repository listing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    pub is_dir: bool,
}

impl FileInfo {
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            last_modified: None,
            is_dir: false,
        }
    }
}
