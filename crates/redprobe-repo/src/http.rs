//! Plain HTTP backend — a base URL with a JSON index endpoint

use crate::{RepoError, RepoResult, Repository};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use globset::GlobBuilder;
use redprobe_core::{FileInfo, RepositoryConfig};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const INDEX_FILE: &str = "index.json";

/// Treats the URL as a directory base. Listing requires an `index.json`
/// endpoint (`[{path, size, modified}]` or a bare array of paths); existence
/// checks fall back to a HEAD probe when the index is absent.
pub struct HttpRepository {
    client: Client,
    name: String,
    url: String,
    base: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndexEntry {
    Detailed {
        path: String,
        #[serde(default)]
        size: u64,
        #[serde(default)]
        modified: Option<DateTime<Utc>>,
    },
    Bare(String),
}

impl HttpRepository {
    pub fn new(config: &RepositoryConfig) -> RepoResult<Self> {
        if !config.url.starts_with("http://") && !config.url.starts_with("https://") {
            return Err(RepoError::InvalidUrl(config.url.clone()));
        }
        Ok(Self {
            client: Client::new(),
            name: config.name.clone(),
            url: config.url.clone(),
            base: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn file_url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    fn check_status(status: reqwest::StatusCode, what: &str) -> RepoResult<()> {
        if status.is_success() {
            return Ok(());
        }
        match status.as_u16() {
            401 | 403 => Err(RepoError::AuthFailed(format!("{}: {}", what, status))),
            404 => Err(RepoError::NotFound(what.to_string())),
            _ => Err(RepoError::Backend(format!("{}: {}", what, status))),
        }
    }
}

#[async_trait::async_trait]
impl Repository for HttpRepository {
    async fn connect(&self) -> RepoResult<()> {
        // HEAD against the base; an index-less server answering the probe
        // is still usable for direct fetches.
        let response = self.client.head(&self.base).send().await?;
        if response.status().is_server_error() {
            return Err(RepoError::Connect(format!(
                "{}: {}",
                self.base,
                response.status()
            )));
        }
        Ok(())
    }

    async fn disconnect(&self) -> RepoResult<()> {
        Ok(())
    }

    async fn list_files(&self, glob: &str) -> RepoResult<Vec<FileInfo>> {
        let matcher = GlobBuilder::new(glob)
            .literal_separator(false)
            .build()
            .map_err(|e| RepoError::List(format!("invalid glob '{}': {}", glob, e)))?
            .compile_matcher();

        let index_url = self.file_url(INDEX_FILE);
        let response = self.client.get(&index_url).send().await?;
        Self::check_status(response.status(), INDEX_FILE)
            .map_err(|e| RepoError::List(format!("index endpoint required: {}", e)))?;
        let entries: Vec<IndexEntry> = response.json().await?;

        let files: Vec<FileInfo> = entries
            .into_iter()
            .map(|e| match e {
                IndexEntry::Detailed {
                    path,
                    size,
                    modified,
                } => FileInfo {
                    path,
                    size,
                    last_modified: modified,
                    is_dir: false,
                },
                IndexEntry::Bare(path) => FileInfo::file(path, 0),
            })
            .filter(|f| matcher.is_match(&f.path))
            .collect();
        debug!(base = %self.base, glob, count = files.len(), "http listing");
        Ok(files)
    }

    async fn get_file(&self, path: &str) -> RepoResult<Bytes> {
        let response = self.client.get(self.file_url(path)).send().await?;
        Self::check_status(response.status(), path)?;
        Ok(response.bytes().await?)
    }

    async fn file_exists(&self, path: &str) -> RepoResult<bool> {
        let response = self.client.head(self.file_url(path)).send().await?;
        Ok(response.status().is_success())
    }

    async fn last_modified(&self, path: &str) -> RepoResult<Option<DateTime<Utc>>> {
        let response = self.client.head(self.file_url(path)).send().await?;
        Self::check_status(response.status(), path)?;
        let parsed = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Ok(parsed)
    }

    fn repo_type(&self) -> &str {
        "http"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_urls() {
        let result = HttpRepository::new(&RepositoryConfig {
            repo_type: "http".into(),
            name: "t".into(),
            url: "ftp://example.com".into(),
            ..Default::default()
        });
        assert!(matches!(result, Err(RepoError::InvalidUrl(_))));
    }

    #[test]
    fn file_urls_join_cleanly() {
        let repo = HttpRepository::new(&RepositoryConfig {
            repo_type: "http".into(),
            name: "t".into(),
            url: "https://example.com/templates/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            repo.file_url("/sub/a.yaml"),
            "https://example.com/templates/sub/a.yaml"
        );
    }

    #[test]
    fn index_entry_accepts_both_shapes() {
        let detailed: Vec<IndexEntry> =
            serde_json::from_str(r#"[{"path":"a.yaml","size":12}]"#).unwrap();
        assert!(matches!(&detailed[0], IndexEntry::Detailed { path, .. } if path == "a.yaml"));
        let bare: Vec<IndexEntry> = serde_json::from_str(r#"["b.yaml"]"#).unwrap();
        assert!(matches!(&bare[0], IndexEntry::Bare(p) if p == "b.yaml"));
    }
}
