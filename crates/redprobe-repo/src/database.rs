//! Database backend — template files as rows in a SQLite table

use crate::{RepoError, RepoResult, Repository};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use redprobe_core::{FileInfo, RepositoryConfig};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// `sqlite://dsn#table`; rows are `(path TEXT, content BLOB, modified TEXT)`.
pub struct DatabaseRepository {
    name: String,
    url: String,
    dsn: String,
    table: String,
    conn: Arc<Mutex<Option<Connection>>>,
}

fn parse_db_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("sqlite://")?;
    let (dsn, table) = rest.split_once('#')?;
    if dsn.is_empty() || table.is_empty() {
        return None;
    }
    // Table names are spliced into SQL; restrict to identifier characters.
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((dsn.to_string(), table.to_string()))
}

fn parse_modified(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl DatabaseRepository {
    pub fn new(config: &RepositoryConfig) -> RepoResult<Self> {
        let (dsn, table) =
            parse_db_url(&config.url).ok_or_else(|| RepoError::InvalidUrl(config.url.clone()))?;
        Ok(Self {
            name: config.name.clone(),
            url: config.url.clone(),
            dsn,
            table,
            conn: Arc::new(Mutex::new(None)),
        })
    }

    /// Run `f` against the open connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> RepoResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        self.connect().await?;
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| RepoError::Backend("connection lock poisoned".into()))?;
            match guard.as_ref() {
                Some(c) => f(c).map_err(|e| RepoError::Backend(e.to_string())),
                None => Err(RepoError::Connect("not connected".into())),
            }
        })
        .await
        .map_err(|e| RepoError::Backend(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait::async_trait]
impl Repository for DatabaseRepository {
    async fn connect(&self) -> RepoResult<()> {
        {
            let guard = self
                .conn
                .lock()
                .map_err(|_| RepoError::Backend("connection lock poisoned".into()))?;
            if guard.is_some() {
                return Ok(());
            }
        }
        let dsn = self.dsn.clone();
        let opened = tokio::task::spawn_blocking(move || Connection::open(dsn))
            .await
            .map_err(|e| RepoError::Backend(format!("blocking task failed: {}", e)))?
            .map_err(|e| RepoError::Connect(e.to_string()))?;
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| RepoError::Backend("connection lock poisoned".into()))?;
        // A concurrent connect may have won; keep the first connection.
        if guard.is_none() {
            *guard = Some(opened);
        }
        Ok(())
    }

    async fn disconnect(&self) -> RepoResult<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| RepoError::Backend("connection lock poisoned".into()))?;
        guard.take();
        Ok(())
    }

    async fn list_files(&self, glob: &str) -> RepoResult<Vec<FileInfo>> {
        let table = self.table.clone();
        let pattern = glob.to_string();
        // SQLite GLOB treats `*` as crossing `/`, so `**/x` misses root-level
        // rows; probe the stripped pattern as well.
        let stripped = pattern
            .strip_prefix("**/")
            .map(str::to_string)
            .unwrap_or_else(|| pattern.clone());
        let files = self
            .with_conn(move |conn| {
                let sql = format!(
                    "SELECT path, LENGTH(content), modified FROM {} \
                     WHERE path GLOB ?1 OR path GLOB ?2 ORDER BY path",
                    table
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params![pattern, stripped], |row| {
                    let path: String = row.get(0)?;
                    let size: i64 = row.get(1)?;
                    let modified: Option<String> = row.get(2)?;
                    Ok(FileInfo {
                        path,
                        size: size.max(0) as u64,
                        last_modified: parse_modified(modified),
                        is_dir: false,
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;
        debug!(table = %self.table, glob, count = files.len(), "database listing");
        Ok(files)
    }

    async fn get_file(&self, path: &str) -> RepoResult<Bytes> {
        let table = self.table.clone();
        let key = path.to_string();
        let content = self
            .with_conn(move |conn| {
                let sql = format!("SELECT content FROM {} WHERE path = ?1", table);
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(rusqlite::params![key])?;
                match rows.next()? {
                    Some(row) => row.get::<_, Vec<u8>>(0).map(Some),
                    None => Ok(None),
                }
            })
            .await?;
        match content {
            Some(bytes) => Ok(Bytes::from(bytes)),
            None => Err(RepoError::NotFound(path.to_string())),
        }
    }

    async fn file_exists(&self, path: &str) -> RepoResult<bool> {
        let table = self.table.clone();
        let key = path.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT 1 FROM {} WHERE path = ?1", table);
            let mut stmt = conn.prepare(&sql)?;
            stmt.exists(rusqlite::params![key])
        })
        .await
    }

    async fn last_modified(&self, path: &str) -> RepoResult<Option<DateTime<Utc>>> {
        let table = self.table.clone();
        let key = path.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT modified FROM {} WHERE path = ?1", table);
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(rusqlite::params![key])?;
            match rows.next()? {
                Some(row) => Ok(parse_modified(row.get::<_, Option<String>>(0)?)),
                None => Ok(None),
            }
        })
        .await
    }

    fn repo_type(&self) -> &str {
        "database"
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

    fn seeded_repo(dir: &std::path::Path) -> DatabaseRepository {
        let db_path = dir.join("templates.db");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE templates (path TEXT PRIMARY KEY, content BLOB, modified TEXT);
             INSERT INTO templates VALUES
               ('probe.yaml', X'69643A2070726F6265', '2026-01-15T10:00:00Z'),
               ('sub/leak.yaml', X'00', NULL),
               ('notes.txt', X'00', NULL);",
        )
        .unwrap();
        drop(conn);
        DatabaseRepository::new(&RepositoryConfig {
            repo_type: "database".into(),
            name: "db".into(),
            url: format!("sqlite://{}#templates", db_path.display()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn url_parsing() {
        assert_eq!(
            parse_db_url("sqlite://templates.db#templates"),
            Some(("templates.db".into(), "templates".into()))
        );
        assert_eq!(parse_db_url("sqlite://templates.db"), None);
        assert_eq!(parse_db_url("sqlite://db#bad-table"), None);
        assert_eq!(parse_db_url("mysql://db#t"), None);
    }

    #[tokio::test]
    async fn listing_globs_rows() {
        let dir = tempfile::tempdir().unwrap();
        let repo = seeded_repo(dir.path());
        let files = repo.list_files("**/*.yaml").await.unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["probe.yaml", "sub/leak.yaml"]);
        assert!(files[0].last_modified.is_some());
    }

    #[tokio::test]
    async fn get_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        let repo = seeded_repo(dir.path());
        let bytes = repo.get_file("probe.yaml").await.unwrap();
        assert_eq!(&bytes[..], b"id: probe");
        assert!(repo.file_exists("probe.yaml").await.unwrap());
        assert!(!repo.file_exists("ghost.yaml").await.unwrap());
        assert!(matches!(
            repo.get_file("ghost.yaml").await,
            Err(RepoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn disconnect_then_reuse_reconnects() {
        let dir = tempfile::tempdir().unwrap();
        let repo = seeded_repo(dir.path());
        repo.connect().await.unwrap();
        repo.disconnect().await.unwrap();
        assert!(repo.file_exists("probe.yaml").await.unwrap());
    }
}
