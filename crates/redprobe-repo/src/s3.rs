//! Object-store backend — S3 bucket + prefix
//!
//! Credentials come from the SDK default chain (environment, shared config,
//! instance metadata), so `AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY` work
//! without any extra wiring.

use crate::{RepoError, RepoResult, Repository};
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use globset::GlobBuilder;
use redprobe_core::{FileInfo, RepositoryConfig};
use tokio::sync::OnceCell;
use tracing::debug;

pub struct S3Repository {
    name: String,
    url: String,
    bucket: String,
    prefix: String,
    region: Option<String>,
    client: OnceCell<Client>,
}

fn parse_s3_url(url: &str) -> Option<(String, String, Option<String>)> {
    let rest = url.strip_prefix("s3://")?;
    let (location, query) = match rest.split_once('?') {
        Some((l, q)) => (l, Some(q)),
        None => (rest, None),
    };
    let (bucket, prefix) = match location.split_once('/') {
        Some((b, p)) => (b.to_string(), p.trim_end_matches('/').to_string()),
        None => (location.to_string(), String::new()),
    };
    if bucket.is_empty() {
        return None;
    }
    let region = query.and_then(|q| {
        q.split('&')
            .find_map(|pair| pair.strip_prefix("region=").map(str::to_string))
    });
    Some((bucket, prefix, region))
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
}

impl S3Repository {
    pub fn new(config: &RepositoryConfig) -> RepoResult<Self> {
        let (bucket, prefix, region) =
            parse_s3_url(&config.url).ok_or_else(|| RepoError::InvalidUrl(config.url.clone()))?;
        Ok(Self {
            name: config.name.clone(),
            url: config.url.clone(),
            bucket,
            prefix,
            region,
            client: OnceCell::new(),
        })
    }

    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if let Some(region) = &self.region {
                    loader = loader.region(aws_sdk_s3::config::Region::new(region.clone()));
                }
                Client::new(&loader.load().await)
            })
            .await
    }

    fn object_key(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix, path.trim_start_matches('/'))
        }
    }

    fn relative_path(&self, key: &str) -> String {
        key.strip_prefix(&self.prefix)
            .map(|p| p.trim_start_matches('/'))
            .unwrap_or(key)
            .to_string()
    }
}

#[async_trait::async_trait]
impl Repository for S3Repository {
    async fn connect(&self) -> RepoResult<()> {
        let client = self.client().await;
        client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| RepoError::Connect(e.into_service_error().to_string()))?;
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

        let client = self.client().await;
        let mut files = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut request = client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&self.prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token.clone());
            }
            let response = request
                .send()
                .await
                .map_err(|e| RepoError::List(e.into_service_error().to_string()))?;
            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                let path = self.relative_path(key);
                if path.is_empty() || !matcher.is_match(&path) {
                    continue;
                }
                files.push(FileInfo {
                    path,
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified().and_then(to_chrono),
                    is_dir: false,
                });
            }
            match response.next_continuation_token() {
                Some(token) if response.is_truncated() == Some(true) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(bucket = %self.bucket, prefix = %self.prefix, glob, count = files.len(), "s3 listing");
        Ok(files)
    }

    async fn get_file(&self, path: &str) -> RepoResult<Bytes> {
        let client = self.client().await;
        let response = client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(path))
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    RepoError::NotFound(path.to_string())
                } else {
                    RepoError::Backend(service.to_string())
                }
            })?;
        let body = response
            .body
            .collect()
            .await
            .map_err(|e| RepoError::Backend(e.to_string()))?;
        Ok(body.into_bytes())
    }

    async fn file_exists(&self, path: &str) -> RepoResult<bool> {
        let client = self.client().await;
        match client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(path))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service = e.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    Err(RepoError::Backend(service.to_string()))
                }
            }
        }
    }

    async fn last_modified(&self, path: &str) -> RepoResult<Option<DateTime<Utc>>> {
        let client = self.client().await;
        let response = client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(path))
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_not_found() {
                    RepoError::NotFound(path.to_string())
                } else {
                    RepoError::Backend(service.to_string())
                }
            })?;
        Ok(response.last_modified().and_then(to_chrono))
    }

    fn repo_type(&self) -> &str {
        "s3"
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
    fn s3_url_parsing() {
        assert_eq!(
            parse_s3_url("s3://bucket/templates/llm?region=eu-west-1"),
            Some(("bucket".into(), "templates/llm".into(), Some("eu-west-1".into())))
        );
        assert_eq!(
            parse_s3_url("s3://bucket"),
            Some(("bucket".into(), String::new(), None))
        );
        assert_eq!(parse_s3_url("s3://"), None);
        assert_eq!(parse_s3_url("gs://bucket"), None);
    }

    #[test]
    fn key_mapping_respects_prefix() {
        let repo = S3Repository::new(&RepositoryConfig {
            repo_type: "s3".into(),
            name: "t".into(),
            url: "s3://bucket/templates".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(repo.object_key("a.yaml"), "templates/a.yaml");
        assert_eq!(repo.relative_path("templates/a.yaml"), "a.yaml");
    }
}
