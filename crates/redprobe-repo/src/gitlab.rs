//! GitLab backend — repository tree/raw-file access over the v4 API

use crate::github::parse_repo_url;
use crate::{RepoError, RepoResult, Repository};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use globset::GlobBuilder;
use redprobe_core::{FileInfo, RepositoryConfig};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

pub struct GitlabRepository {
    client: Client,
    name: String,
    url: String,
    /// URL-encoded `group/project` path.
    project: String,
    branch: String,
    token: Option<String>,
    api_base: String,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
}

fn encode_path(path: &str) -> String {
    path.replace('/', "%2F").replace('.', "%2E")
}

impl GitlabRepository {
    pub fn new(config: &RepositoryConfig) -> RepoResult<Self> {
        let (group, project) =
            parse_repo_url(&config.url).ok_or_else(|| RepoError::InvalidUrl(config.url.clone()))?;
        let host = config
            .url
            .strip_prefix("https://")
            .or_else(|| config.url.strip_prefix("http://"))
            .and_then(|rest| rest.split('/').next())
            .unwrap_or("gitlab.com");
        Ok(Self {
            client: Client::new(),
            name: config.name.clone(),
            url: config.url.clone(),
            project: encode_path(&format!("{}/{}", group, project)),
            branch: if config.branch.is_empty() {
                "main".to_string()
            } else {
                config.branch.clone()
            },
            token: config.token.clone(),
            api_base: format!("https://{}/api/v4", host),
        })
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url);
        if let Some(token) = &self.token {
            req = req.header("PRIVATE-TOKEN", token.clone());
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
impl Repository for GitlabRepository {
    async fn connect(&self) -> RepoResult<()> {
        let url = format!("{}/projects/{}", self.api_base, self.project);
        let response = self.request(&url).send().await?;
        Self::check_status(response.status(), &self.project)
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

        let mut files = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}/projects/{}/repository/tree?recursive=true&ref={}&per_page=100&page={}",
                self.api_base, self.project, self.branch, page
            );
            let response = self.request(&url).send().await?;
            Self::check_status(response.status(), "tree listing")?;
            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u32>().ok());
            let entries: Vec<TreeEntry> = response.json().await?;
            for entry in entries {
                if entry.entry_type == "blob" && matcher.is_match(&entry.path) {
                    files.push(FileInfo::file(entry.path, 0));
                }
            }
            match next_page {
                Some(next) => page = next,
                None => break,
            }
        }
        debug!(project = %self.project, glob, count = files.len(), "gitlab listing");
        Ok(files)
    }

    async fn get_file(&self, path: &str) -> RepoResult<Bytes> {
        let url = format!(
            "{}/projects/{}/repository/files/{}/raw?ref={}",
            self.api_base,
            self.project,
            encode_path(path),
            self.branch
        );
        let response = self.request(&url).send().await?;
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
        #[derive(Deserialize)]
        struct Commit {
            committed_date: DateTime<Utc>,
        }
        let url = format!(
            "{}/projects/{}/repository/commits?path={}&ref_name={}&per_page=1",
            self.api_base,
            self.project,
            encode_path(path),
            self.branch
        );
        let response = self.request(&url).send().await?;
        Self::check_status(response.status(), path)?;
        let commits: Vec<Commit> = response.json().await?;
        Ok(commits.first().map(|c| c.committed_date))
    }

    fn repo_type(&self) -> &str {
        "gitlab"
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
    fn project_path_is_encoded() {
        let repo = GitlabRepository::new(&RepositoryConfig {
            repo_type: "gitlab".into(),
            name: "t".into(),
            url: "https://gitlab.com/acme/templates".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(repo.project, "acme%2Ftemplates");
        assert!(repo.api_base.starts_with("https://gitlab.com/api/v4"));
    }

    #[test]
    fn self_hosted_host_is_kept() {
        let repo = GitlabRepository::new(&RepositoryConfig {
            repo_type: "gitlab".into(),
            name: "t".into(),
            url: "https://git.corp.example/acme/templates".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(repo.api_base, "https://git.corp.example/api/v4");
    }
}
