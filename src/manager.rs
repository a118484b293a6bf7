//! Manager facade — the one entry point external callers see
//!
//! Composes the repository factory, loader, registry, cache, executor,
//! reporter, and profiler into a single service. Hooks and the provider are
//! fixed at construction; every method takes a cancellation token and stops
//! at the first safe point once it fires.

use crate::config::RedprobeConfig;
use redprobe_core::{
    Error, ManifestEntry, Report, ReportFormat, Result, Template, TemplateResult, TemplateSource,
};
use redprobe_exec::{
    ExecuteOptions, Executor, HookChain, HttpProvider, Provider, ProviderOptions, RetryPolicy,
    Runner, Scorer, StubProvider,
};
use redprobe_profile::Profiler;
use redprobe_report::Reporter;
use redprobe_repo::RepositoryFactory;
use redprobe_template::{CacheStats, LoaderOptions, TemplateCache, TemplateLoader, TemplateRegistry};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

const LOAD_TIMER: &str = "template.load.time";
const EXECUTE_TIMER: &str = "template.execute.time";
const CACHE_HIT_RATE: &str = "cache.hit_rate";

pub struct ManagerBuilder {
    config: RedprobeConfig,
    provider: Option<Arc<dyn Provider>>,
    hooks: HookChain,
    scorer: Option<Scorer>,
    factory: Option<RepositoryFactory>,
}

impl ManagerBuilder {
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Hook lists are frozen once `build` runs.
    pub fn hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn factory(mut self, factory: RepositoryFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn build(self) -> Manager {
        let config = self.config;
        let cache = Arc::new(TemplateCache::new(
            config.cache.capacity,
            config.cache.ttl(),
        ));
        let registry = Arc::new(TemplateRegistry::with_cache(cache.clone()));
        let factory = Arc::new(self.factory.unwrap_or_default());
        let loader = TemplateLoader::new(
            factory.clone(),
            registry.clone(),
            cache.clone(),
            LoaderOptions {
                workers: config.loader.workers,
                file_glob: config.loader.file_glob.clone(),
            },
        );

        let provider = self.provider.unwrap_or_else(|| match &config.provider.endpoint {
            Some(endpoint) => Arc::new(
                HttpProvider::new(config.provider.name.clone(), endpoint.clone()),
            ),
            // No endpoint configured: a deterministic stub keeps dry runs
            // and template development working offline.
            None => Arc::new(StubProvider::constant("")),
        });
        let mut executor = Executor::new(provider).with_hooks(self.hooks);
        if let Some(scorer) = self.scorer {
            executor = executor.with_scorer(scorer);
        }
        let runner = Runner::new(
            Arc::new(executor),
            RetryPolicy {
                max_attempts: config.executor.max_attempts.max(1),
                ..Default::default()
            },
        );

        let profiler = Arc::new(Profiler::new());
        for (key, value) in &config.thresholds {
            profiler.set_threshold(key, *value);
        }

        Manager {
            config,
            cache,
            registry,
            loader,
            runner,
            reporter: Reporter::new(),
            profiler,
        }
    }
}

pub struct Manager {
    config: RedprobeConfig,
    cache: Arc<TemplateCache>,
    registry: Arc<TemplateRegistry>,
    loader: TemplateLoader,
    runner: Runner,
    reporter: Reporter,
    profiler: Arc<Profiler>,
}

impl Manager {
    pub fn builder(config: RedprobeConfig) -> ManagerBuilder {
        ManagerBuilder {
            config,
            provider: None,
            hooks: HookChain::new(),
            scorer: None,
            factory: None,
        }
    }

    pub fn config(&self) -> &RedprobeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TemplateRegistry> {
        &self.registry
    }

    pub fn profiler(&self) -> &Arc<Profiler> {
        &self.profiler
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Execution options derived from config; callers layer variables on top.
    pub fn execute_options(&self, variables: HashMap<String, String>) -> ExecuteOptions {
        ExecuteOptions {
            variables,
            provider: ProviderOptions {
                model: self.config.provider.model.clone(),
                max_tokens: self.config.provider.max_tokens,
                temperature: self.config.provider.temperature,
                extra: Default::default(),
            },
            timeout: Some(self.config.executor.timeout()),
            concurrency_limit: self.config.executor.concurrency,
            fail_fast: self.config.executor.fail_fast,
        }
    }

    /// Load a single template file; validated and registered before return.
    pub async fn load_template(
        &self,
        source: &TemplateSource,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<Template>> {
        let timer = self.profiler.start_timer(LOAD_TIMER, BTreeMap::new());
        let loaded = self.loader.load_template(source, path, cancel).await?;
        timer.stop();
        self.update_manifest(std::slice::from_ref(&loaded), source)?;
        Ok(loaded)
    }

    /// Bulk-load one source; the batch is atomic.
    pub async fn load_templates(
        &self,
        source: &TemplateSource,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<Template>>> {
        let timer = self.profiler.start_timer(LOAD_TIMER, BTreeMap::new());
        let loaded = self.loader.load_templates(source, cancel).await?;
        timer.stop();
        self.update_manifest(&loaded, source)?;
        Ok(loaded)
    }

    /// Load every configured source in order.
    pub async fn load_templates_from_sources(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<Template>>> {
        let mut all = Vec::new();
        for source in self.config.sources.clone() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let mut loaded = self.load_templates(&source, cancel).await?;
            all.append(&mut loaded);
        }
        info!(count = all.len(), "all sources loaded");
        Ok(all)
    }

    fn lookup(&self, id: &str) -> Result<Arc<Template>> {
        // Cache first; the registry stays authoritative.
        if let Some(template) = self.cache.get(id) {
            return Ok(template);
        }
        self.registry
            .get(id)
            .inspect(|template| self.cache.set(id, template))
            .ok_or_else(|| Error::TemplateNotFound(id.to_string()))
    }

    /// Execute one registered template through the retrying runner.
    pub async fn execute_template(
        &self,
        id: &str,
        options: &ExecuteOptions,
        cancel: &CancellationToken,
    ) -> Result<TemplateResult> {
        let template = self.lookup(id)?;
        let timer = self.profiler.start_timer(EXECUTE_TIMER, BTreeMap::new());
        let result = self.runner.run(&template, options, cancel).await;
        timer.stop();
        self.record_cache_hit_rate();
        Ok(result)
    }

    /// Execute a set of registered templates as one bounded batch. Results
    /// align positionally with `ids`.
    pub async fn execute_templates(
        &self,
        ids: &[String],
        options: &ExecuteOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<TemplateResult>> {
        let templates: Vec<Arc<Template>> = ids
            .iter()
            .map(|id| self.lookup(id))
            .collect::<Result<_>>()?;
        let timer = self.profiler.start_timer(EXECUTE_TIMER, BTreeMap::new());
        let results = self
            .runner
            .executor()
            .execute_batch(&templates, options, cancel)
            .await;
        timer.stop();
        self.record_cache_hit_rate();
        Ok(results)
    }

    pub fn build_report(
        &self,
        title: impl Into<String>,
        format: ReportFormat,
        results: Vec<TemplateResult>,
    ) -> Report {
        self.reporter.build(title, format, results)
    }

    /// Emit a result snapshot in the given format.
    pub fn generate_report(
        &self,
        results: Vec<TemplateResult>,
        format: ReportFormat,
    ) -> Result<Vec<u8>> {
        let report = self.reporter.build("redprobe scan", format, results);
        self.reporter.generate(&report)
    }

    /// Emit by format name, honoring custom registered formatters.
    pub fn generate_report_named(
        &self,
        results: Vec<TemplateResult>,
        format_name: &str,
    ) -> Result<Vec<u8>> {
        let format = format_name.parse().unwrap_or(ReportFormat::Json);
        let report = self.reporter.build("redprobe scan", format, results);
        self.reporter.generate_named(&report, format_name)
    }

    fn record_cache_hit_rate(&self) {
        let stats = self.cache.stats();
        let lookups = stats.hits + stats.misses;
        if lookups > 0 {
            self.profiler.record_metric(
                CACHE_HIT_RATE,
                stats.hits as f64 / lookups as f64,
                BTreeMap::new(),
            );
        }
    }

    fn update_manifest(&self, loaded: &[Arc<Template>], source: &TemplateSource) -> Result<()> {
        let Some(dir) = &self.config.manifest_dir else {
            return Ok(());
        };
        let path = dir.join("templates").join("manifest.json");
        let mut manifest = redprobe_core::Manifest::load_or_default(&path)?;
        for template in loaded {
            manifest.upsert_template(
                &template.id,
                ManifestEntry {
                    name: template.name.clone(),
                    version: template.version.clone(),
                    category: template.category.clone(),
                    path: source.name.clone(),
                    last_modified: None,
                },
            );
        }
        manifest.save(&path)
    }

    /// Manifest path for the templates index, if persistence is configured.
    pub fn manifest_path(&self) -> Option<PathBuf> {
        self.config
            .manifest_dir
            .as_ref()
            .map(|dir| dir.join("templates").join("manifest.json"))
    }

    /// Persist performance reports and the threshold-status file.
    pub fn shutdown(&self) -> Result<()> {
        self.record_cache_hit_rate();
        self.profiler
            .write_reports(&self.config.report.performance_dir)?;
        Ok(())
    }
}
