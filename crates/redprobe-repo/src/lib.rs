//! Repository backends — uniform file access over heterogeneous template
//! sources (local filesystem, GitHub/GitLab, plain HTTP, SQLite, S3).
//!
//! One trait, flat implementations, a factory keyed by type string. Backends
//! are registered in [`RepositoryFactory::with_defaults`]; adding a transport
//! means implementing [`Repository`] and registering a constructor.

pub mod database;
pub mod github;
pub mod gitlab;
pub mod http;
pub mod local;
pub mod s3;

pub use database::DatabaseRepository;
pub use github::GithubRepository;
pub use gitlab::GitlabRepository;
pub use http::HttpRepository;
pub use local::LocalRepository;
pub use s3::S3Repository;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use redprobe_core::{FileInfo, RepositoryConfig};
use std::collections::HashMap;
use std::sync::Arc;

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error types
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("list failed: {0}")]
    List(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid repository url: {0}")]
    InvalidUrl(String),

    #[error("unsupported repository type: {0}")]
    UnsupportedType(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

impl RepoError {
    /// Map into the engine-level taxonomy, tagging the source name.
    pub fn into_source_error(self, source: &str) -> redprobe_core::Error {
        match self {
            Self::NotFound(what) => {
                redprobe_core::Error::source(source, format!("not found: {}", what))
            }
            other => redprobe_core::Error::source(source, other.to_string()),
        }
    }
}

/// Uniform contract over a template source.
///
/// `connect` is idempotent and `disconnect` is always safe to call.
/// Transient network failures propagate to the caller; retry policy lives
/// above this layer. Auth failures fail closed. A listing either covers the
/// whole source or errors — no partial results.
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    async fn connect(&self) -> RepoResult<()>;
    async fn disconnect(&self) -> RepoResult<()>;

    /// List files whose repository-relative path matches `glob`.
    async fn list_files(&self, glob: &str) -> RepoResult<Vec<FileInfo>>;

    /// Fetch the full contents of one file.
    async fn get_file(&self, path: &str) -> RepoResult<Bytes>;

    async fn file_exists(&self, path: &str) -> RepoResult<bool>;
    async fn last_modified(&self, path: &str) -> RepoResult<Option<DateTime<Utc>>>;

    fn repo_type(&self) -> &str;
    fn url(&self) -> &str;
    fn name(&self) -> &str;
}

type Constructor =
    Arc<dyn Fn(&RepositoryConfig) -> RepoResult<Arc<dyn Repository>> + Send + Sync>;

/// Factory of repository constructors keyed by type string.
pub struct RepositoryFactory {
    constructors: HashMap<String, Constructor>,
}

impl Default for RepositoryFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl RepositoryFactory {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Factory with every built-in backend registered.
    pub fn with_defaults() -> Self {
        let mut factory = Self::empty();
        factory.register("local", |config| {
            Ok(Arc::new(LocalRepository::new(config)?) as Arc<dyn Repository>)
        });
        factory.register("github", |config| {
            Ok(Arc::new(GithubRepository::new(config)?) as Arc<dyn Repository>)
        });
        factory.register("gitlab", |config| {
            Ok(Arc::new(GitlabRepository::new(config)?) as Arc<dyn Repository>)
        });
        factory.register("http", |config| {
            Ok(Arc::new(HttpRepository::new(config)?) as Arc<dyn Repository>)
        });
        factory.register("database", |config| {
            Ok(Arc::new(DatabaseRepository::new(config)?) as Arc<dyn Repository>)
        });
        factory.register("s3", |config| {
            Ok(Arc::new(S3Repository::new(config)?) as Arc<dyn Repository>)
        });
        factory
    }

    /// Register a constructor. Replaces any existing one for the same type.
    pub fn register<F>(&mut self, repo_type: &str, constructor: F)
    where
        F: Fn(&RepositoryConfig) -> RepoResult<Arc<dyn Repository>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(repo_type.to_string(), Arc::new(constructor));
    }

    pub fn supports(&self, repo_type: &str) -> bool {
        self.constructors.contains_key(repo_type)
    }

    pub fn registered_types(&self) -> Vec<&str> {
        self.constructors.keys().map(|s| s.as_str()).collect()
    }

    pub fn create(&self, config: &RepositoryConfig) -> RepoResult<Arc<dyn Repository>> {
        match self.constructors.get(&config.repo_type) {
            Some(ctor) => ctor(config),
            None => Err(RepoError::UnsupportedType(config.repo_type.clone())),
        }
    }

    /// Instantiate a backend by sniffing the URL grammar.
    pub fn create_for_url(&self, url: &str) -> RepoResult<Arc<dyn Repository>> {
        let repo_type = sniff_repo_type(url)
            .ok_or_else(|| RepoError::InvalidUrl(url.to_string()))?;
        let config = RepositoryConfig {
            repo_type: repo_type.to_string(),
            name: url.to_string(),
            url: url.to_string(),
            branch: "main".to_string(),
            ..Default::default()
        };
        self.create(&config)
    }
}

/// Map a repository URL onto a backend type.
///
/// `file://` or bare paths → local; `sqlite://dsn#table` → database;
/// `s3://bucket/prefix` → s3; git hosts by domain; any other `http(s)://`
/// → plain http.
pub fn sniff_repo_type(url: &str) -> Option<&'static str> {
    if url.starts_with("file://") {
        return Some("local");
    }
    if url.starts_with("sqlite://") {
        return Some("database");
    }
    if url.starts_with("s3://") {
        return Some("s3");
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        let host = url.splitn(4, '/').nth(2).unwrap_or("");
        if host.contains("github.com") {
            return Some("github");
        }
        if host.contains("gitlab") {
            return Some("gitlab");
        }
        return Some("http");
    }
    if !url.contains("://") {
        return Some("local");
    }
    None
}
