//! Local filesystem backend

use crate::{RepoError, RepoResult, Repository};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use globset::GlobBuilder;
use redprobe_core::{FileInfo, RepositoryConfig};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Path-rooted filesystem source. The URL is `file://path` or a bare path.
pub struct LocalRepository {
    name: String,
    url: String,
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(config: &RepositoryConfig) -> RepoResult<Self> {
        let root = config
            .url
            .strip_prefix("file://")
            .unwrap_or(&config.url)
            .to_string();
        if root.is_empty() {
            return Err(RepoError::InvalidUrl(config.url.clone()));
        }
        Ok(Self {
            name: config.name.clone(),
            url: config.url.clone(),
            root: PathBuf::from(root),
        })
    }

    fn absolute(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait::async_trait]
impl Repository for LocalRepository {
    async fn connect(&self) -> RepoResult<()> {
        if !self.root.is_dir() {
            return Err(RepoError::NotFound(format!(
                "root directory {}",
                self.root.display()
            )));
        }
        Ok(())
    }

    async fn disconnect(&self) -> RepoResult<()> {
        Ok(())
    }

    async fn list_files(&self, glob: &str) -> RepoResult<Vec<FileInfo>> {
        self.connect().await?;
        let matcher = GlobBuilder::new(glob)
            .literal_separator(false)
            .build()
            .map_err(|e| RepoError::List(format!("invalid glob '{}': {}", glob, e)))?
            .compile_matcher();

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.map_err(|e| RepoError::List(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path());
            if !matcher.is_match(rel) {
                continue;
            }
            let meta = entry.metadata().map_err(|e| RepoError::List(e.to_string()))?;
            let modified = meta.modified().ok().map(DateTime::<Utc>::from);
            files.push(FileInfo {
                path: rel.to_string_lossy().replace('\\', "/"),
                size: meta.len(),
                last_modified: modified,
                is_dir: false,
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(root = %self.root.display(), glob, count = files.len(), "local listing");
        Ok(files)
    }

    async fn get_file(&self, path: &str) -> RepoResult<Bytes> {
        let full = self.absolute(path);
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RepoError::NotFound(path.to_string()))
            }
            Err(e) => Err(RepoError::Io(e)),
        }
    }

    async fn file_exists(&self, path: &str) -> RepoResult<bool> {
        Ok(self.absolute(path).is_file())
    }

    async fn last_modified(&self, path: &str) -> RepoResult<Option<DateTime<Utc>>> {
        let meta = tokio::fs::metadata(self.absolute(path))
            .await
            .map_err(|_| RepoError::NotFound(path.to_string()))?;
        Ok(meta.modified().ok().map(DateTime::<Utc>::from))
    }

    fn repo_type(&self) -> &str {
        "local"
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

    fn repo_at(root: &Path) -> LocalRepository {
        LocalRepository::new(&RepositoryConfig {
            repo_type: "local".into(),
            name: "test".into(),
            url: root.to_string_lossy().to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn connect_fails_on_missing_root() {
        let repo = repo_at(Path::new("/nonexistent/redprobe/root"));
        assert!(matches!(repo.connect().await, Err(RepoError::NotFound(_))));
    }

    #[tokio::test]
    async fn listing_honors_glob() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), "x").unwrap();
        std::fs::write(dir.path().join("b.json"), "y").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.yaml"), "z").unwrap();

        let repo = repo_at(dir.path());
        let yamls = repo.list_files("**/*.yaml").await.unwrap();
        let paths: Vec<_> = yamls.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.yaml", "sub/c.yaml"]);
    }

    #[tokio::test]
    async fn get_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t.yaml"), b"id: probe_v1.0").unwrap();
        let repo = repo_at(dir.path());
        assert_eq!(&repo.get_file("t.yaml").await.unwrap()[..], b"id: probe_v1.0");
        assert!(matches!(
            repo.get_file("missing.yaml").await,
            Err(RepoError::NotFound(_))
        ));
        assert!(repo.file_exists("t.yaml").await.unwrap());
        assert!(!repo.file_exists("missing.yaml").await.unwrap());
        assert!(repo.last_modified("t.yaml").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn file_url_prefix_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t.yaml"), "x").unwrap();
        let repo = LocalRepository::new(&RepositoryConfig {
            repo_type: "local".into(),
            name: "test".into(),
            url: format!("file://{}", dir.path().display()),
            ..Default::default()
        })
        .unwrap();
        assert!(repo.connect().await.is_ok());
    }
}
