//! GitHub backend — tree/blob access over the REST API

use crate::{RepoError, RepoResult, Repository};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use globset::GlobBuilder;
use redprobe_core::{FileInfo, RepositoryConfig};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("redprobe/", env!("CARGO_PKG_VERSION"));

pub struct GithubRepository {
    client: Client,
    name: String,
    url: String,
    owner: String,
    repo: String,
    branch: String,
    token: Option<String>,
    api_base: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
    #[serde(default)]
    size: u64,
}

#[derive(Deserialize)]
struct CommitInfo {
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    committer: CommitActor,
}

#[derive(Deserialize)]
struct CommitActor {
    date: DateTime<Utc>,
}

/// Split `https://host/owner/repo` into (owner, repo).
pub(crate) fn parse_repo_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let mut parts = rest.trim_end_matches('/').trim_end_matches(".git").split('/');
    let _host = parts.next()?;
    let owner = parts.next()?.to_string();
    let repo = parts.next()?.to_string();
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner, repo))
}

impl GithubRepository {
    pub fn new(config: &RepositoryConfig) -> RepoResult<Self> {
        let (owner, repo) =
            parse_repo_url(&config.url).ok_or_else(|| RepoError::InvalidUrl(config.url.clone()))?;
        Ok(Self {
            client: Client::new(),
            name: config.name.clone(),
            url: config.url.clone(),
            owner,
            repo,
            branch: if config.branch.is_empty() {
                "main".to_string()
            } else {
                config.branch.clone()
            },
            token: config.token.clone(),
            api_base: GITHUB_API.to_string(),
        })
    }

    /// Point API calls at a different host (tests, GitHub Enterprise).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url).header("user-agent", USER_AGENT);
        if let Some(token) = &self.token {
            req = req.header("authorization", format!("Bearer {}", token));
        }
        req
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
impl Repository for GithubRepository {
    async fn connect(&self) -> RepoResult<()> {
        let url = format!("{}/repos/{}/{}", self.api_base, self.owner, self.repo);
        let response = self.request(&url).send().await?;
        Self::check_status(response.status(), &format!("{}/{}", self.owner, self.repo))
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

        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, self.owner, self.repo, self.branch
        );
        let response = self.request(&url).send().await?;
        Self::check_status(response.status(), "tree listing")?;
        let tree: TreeResponse = response.json().await?;
        // A truncated tree would silently hide files; fail the whole list.
        if tree.truncated {
            return Err(RepoError::List(format!(
                "tree listing for {}/{} is truncated",
                self.owner, self.repo
            )));
        }

        let files: Vec<FileInfo> = tree
            .tree
            .into_iter()
            .filter(|e| e.entry_type == "blob" && matcher.is_match(&e.path))
            .map(|e| FileInfo::file(e.path, e.size))
            .collect();
        debug!(owner = %self.owner, repo = %self.repo, glob, count = files.len(), "github listing");
        Ok(files)
    }

    async fn get_file(&self, path: &str) -> RepoResult<Bytes> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.api_base, self.owner, self.repo, path, self.branch
        );
        let response = self
            .request(&url)
            .header("accept", "application/vnd.github.raw+json")
            .send()
            .await?;
        Self::check_status(response.status(), path)?;
        Ok(response.bytes().await?)
    }

    async fn file_exists(&self, path: &str) -> RepoResult<bool> {
        match self.get_file(path).await {
            Ok(_) => Ok(true),
            Err(RepoError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn last_modified(&self, path: &str) -> RepoResult<Option<DateTime<Utc>>> {
        let url = format!(
            "{}/repos/{}/{}/commits?path={}&sha={}&per_page=1",
            self.api_base, self.owner, self.repo, path, self.branch
        );
        let response = self.request(&url).send().await?;
        Self::check_status(response.status(), path)?;
        let commits: Vec<CommitInfo> = response.json().await?;
        Ok(commits.first().map(|c| c.commit.committer.date))
    }

    fn repo_type(&self) -> &str {
        "github"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn name(&self) -> &str {
        &self.name
    }
}
