//! Loader pipeline — repository files to registered templates
//!
//! A batch either lands completely or not at all: any fetch, parse,
//! validation, or duplicate failure unwinds registrations made for the
//! batch before the error surfaces.

use crate::cache::{CacheStats, TemplateCache};
use crate::parser;
use crate::registry::TemplateRegistry;
use futures::StreamExt;
use redprobe_core::{Error, Result, Template, TemplateSource};
use redprobe_repo::{Repository, RepositoryFactory};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone, Debug)]
pub struct LoaderOptions {
    /// Parallel fetch+parse bound within one batch.
    pub workers: usize,
    /// Listing glob for bulk loads.
    pub file_glob: String,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            file_glob: "**/*.{yaml,yml,json}".to_string(),
        }
    }
}

pub struct TemplateLoader {
    factory: Arc<RepositoryFactory>,
    registry: Arc<TemplateRegistry>,
    cache: Arc<TemplateCache>,
    options: LoaderOptions,
}

impl TemplateLoader {
    pub fn new(
        factory: Arc<RepositoryFactory>,
        registry: Arc<TemplateRegistry>,
        cache: Arc<TemplateCache>,
        options: LoaderOptions,
    ) -> Self {
        Self {
            factory,
            registry,
            cache,
            options,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn open_repository(&self, source: &TemplateSource) -> Result<Arc<dyn Repository>> {
        if !self.factory.supports(&source.source_type) {
            return Err(Error::source(
                &source.name,
                format!("no backend accepts source type '{}'", source.source_type),
            ));
        }
        let config = redprobe_core::RepositoryConfig::from_source(source);
        let repo = self
            .factory
            .create(&config)
            .map_err(|e| e.into_source_error(&source.name))?;
        repo.connect()
            .await
            .map_err(|e| e.into_source_error(&source.name))?;
        Ok(repo)
    }

    /// Load, validate, and register a single template file.
    pub async fn load_template(
        &self,
        source: &TemplateSource,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<Template>> {
        let repo = self.open_repository(source).await?;
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = repo.get_file(path) => {
                result.map_err(|e| e.into_source_error(&source.name))?
            }
        };
        let template = parser::parse_template(&bytes, path)?;
        parser::validate(&template)?;
        let arc = self.registry.register(template)?;
        self.cache.set(&arc.id, &arc);
        info!(template = %arc.id, source = %source.name, "loaded template");
        Ok(arc)
    }

    /// Single-file load bounded by a deadline.
    pub async fn load_template_with_timeout(
        &self,
        source: &TemplateSource,
        path: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Arc<Template>> {
        match tokio::time::timeout(timeout, self.load_template(source, path, cancel)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    /// Bulk-load every template file the source lists.
    pub async fn load_templates(
        &self,
        source: &TemplateSource,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<Template>>> {
        let repo = self.open_repository(source).await?;
        let files = repo
            .list_files(&self.options.file_glob)
            .await
            .map_err(|e| e.into_source_error(&source.name))?;
        debug!(source = %source.name, files = files.len(), "batch listing complete");

        // Fetch and parse in parallel; the first failure aborts the batch
        // and dropping the stream stops in-flight peers.
        let batch_cancel = cancel.child_token();
        let fetches = files.into_iter().map(|file| {
            let repo = repo.clone();
            let source_name = source.name.clone();
            let token = batch_cancel.clone();
            async move {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(Error::Cancelled),
                    result = repo.get_file(&file.path) => {
                        let bytes = result.map_err(|e| e.into_source_error(&source_name))?;
                        let template = parser::parse_template(&bytes, &file.path)?;
                        parser::validate(&template)?;
                        Ok(template)
                    }
                }
            }
        });
        let stream = futures::stream::iter(fetches).buffer_unordered(self.options.workers.max(1));
        tokio::pin!(stream);

        let mut parsed: Vec<Template> = Vec::new();
        while let Some(result) = stream.next().await {
            match result {
                Ok(template) => parsed.push(template),
                Err(e) => {
                    batch_cancel.cancel();
                    return Err(e);
                }
            }
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Batch-level invariants before anything touches the registry.
        let mut seen: HashSet<&str> = HashSet::new();
        for template in &parsed {
            if !seen.insert(&template.id) {
                return Err(Error::DuplicateId(template.id.clone()));
            }
            if self.registry.contains(&template.id) {
                return Err(Error::DuplicateId(template.id.clone()));
            }
        }
        parser::check_include_cycles(&parsed)?;

        // Deterministic registration order.
        parsed.sort_by(|a, b| a.id.cmp(&b.id));
        let mut registered: Vec<Arc<Template>> = Vec::with_capacity(parsed.len());
        for template in parsed {
            match self.registry.register(template) {
                Ok(arc) => registered.push(arc),
                Err(e) => {
                    // Unwind this batch; nothing partial survives.
                    for done in &registered {
                        let _ = self.registry.unregister(&done.id);
                    }
                    return Err(e);
                }
            }
        }
        for arc in &registered {
            self.cache.set(&arc.id, arc);
        }
        info!(source = %source.name, count = registered.len(), "batch loaded");
        Ok(registered)
    }
}
