//! Profiler — metric registry, baselines, threshold gates, CI reports

use crate::metrics::{MetricSeries, MetricSummary, MetricType, DEFAULT_MAX_SAMPLES};
use chrono::{DateTime, Utc};
use redprobe_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{debug, warn};

/// Metrics whose name contains one of these substrings are higher-is-better;
/// everything else is treated as lower-is-better.
const HIGHER_IS_BETTER: [&str; 2] = ["throughput", "hit_rate"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricRecord {
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub unit: String,
    pub summary: MetricSummary,
}

/// Snapshot of every series; also the serialized baseline format.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileReport {
    pub generated_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricRecord>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BaselineDiff {
    pub baseline: f64,
    pub current: f64,
    pub delta_pct: f64,
    pub regressed: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ThresholdStatus {
    pub value: f64,
    pub threshold: f64,
    pub exceeded: bool,
}

pub struct Profiler {
    series: RwLock<HashMap<String, Arc<Mutex<MetricSeries>>>>,
    thresholds: RwLock<HashMap<String, f64>>,
    baseline: RwLock<Option<ProfileReport>>,
    max_samples: usize,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Profiler {
    pub fn new() -> Self {
        Self::with_max_samples(DEFAULT_MAX_SAMPLES)
    }

    pub fn with_max_samples(max_samples: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            thresholds: RwLock::new(HashMap::new()),
            baseline: RwLock::new(None),
            max_samples,
        }
    }

    pub fn register_metric(&self, name: &str, metric_type: MetricType, unit: &str) {
        let mut series = self.series.write().unwrap_or_else(|e| e.into_inner());
        series.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(MetricSeries::with_capacity(
                name,
                metric_type,
                unit,
                self.max_samples,
            )))
        });
    }

    /// Record a sample, auto-registering a gauge for unknown names.
    pub fn record_metric(&self, name: &str, value: f64, labels: BTreeMap<String, String>) {
        let handle = self.series_handle(name, MetricType::Gauge, "");
        handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(value, labels);
    }

    /// Record a duration in milliseconds.
    pub fn record_duration(
        &self,
        name: &str,
        duration: std::time::Duration,
        labels: BTreeMap<String, String>,
    ) {
        let handle = self.series_handle(name, MetricType::Timer, "ms");
        handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(duration.as_secs_f64() * 1000.0, labels);
    }

    /// Start a timer; the guard records on `stop()` or drop.
    pub fn start_timer(&self, name: &str, labels: BTreeMap<String, String>) -> TimerGuard<'_> {
        TimerGuard {
            profiler: self,
            name: name.to_string(),
            labels: Some(labels),
            start: Instant::now(),
        }
    }

    fn series_handle(
        &self,
        name: &str,
        metric_type: MetricType,
        unit: &str,
    ) -> Arc<Mutex<MetricSeries>> {
        {
            let series = self.series.read().unwrap_or_else(|e| e.into_inner());
            if let Some(handle) = series.get(name) {
                return handle.clone();
            }
        }
        let mut series = self.series.write().unwrap_or_else(|e| e.into_inner());
        series
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(MetricSeries::with_capacity(
                    name,
                    metric_type,
                    unit,
                    self.max_samples,
                )))
            })
            .clone()
    }

    pub fn get_report(&self) -> ProfileReport {
        let handles: Vec<(String, Arc<Mutex<MetricSeries>>)> = {
            let series = self.series.read().unwrap_or_else(|e| e.into_inner());
            series
                .iter()
                .map(|(name, handle)| (name.clone(), handle.clone()))
                .collect()
        };
        let mut metrics = BTreeMap::new();
        for (name, handle) in handles {
            let mut series = handle.lock().unwrap_or_else(|e| e.into_inner());
            metrics.insert(
                name,
                MetricRecord {
                    metric_type: series.metric_type,
                    unit: series.unit.clone(),
                    summary: series.summary(),
                },
            );
        }
        ProfileReport {
            generated_at: Utc::now(),
            metrics,
        }
    }

    pub fn set_threshold(&self, key: &str, value: f64) {
        self.thresholds
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
    }

    pub fn set_baseline(&self, report: ProfileReport) {
        *self.baseline.write().unwrap_or_else(|e| e.into_inner()) = Some(report);
    }

    pub fn load_baseline(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = std::fs::read(path.as_ref())?;
        let report: ProfileReport = serde_json::from_slice(&bytes)?;
        self.set_baseline(report);
        Ok(())
    }

    pub fn save_baseline(&self, path: impl AsRef<Path>) -> Result<()> {
        let report = self.get_report();
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path.as_ref(), serde_json::to_vec_pretty(&report)?)?;
        Ok(())
    }

    /// Mean-vs-mean diff of every metric present in both runs.
    pub fn compare_with_baseline(&self) -> Option<BTreeMap<String, BaselineDiff>> {
        let baseline = self
            .baseline
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()?;
        let current = self.get_report();
        let mut diffs = BTreeMap::new();
        for (name, base_record) in &baseline.metrics {
            let Some(current_record) = current.metrics.get(name) else {
                continue;
            };
            let base = base_record.summary.mean;
            let now = current_record.summary.mean;
            let delta_pct = if base.abs() > f64::EPSILON {
                (now - base) / base * 100.0
            } else {
                0.0
            };
            let regressed = if higher_is_better(name) {
                now < base
            } else {
                now > base
            };
            diffs.insert(
                name.clone(),
                BaselineDiff {
                    baseline: base,
                    current: now,
                    delta_pct,
                    regressed,
                },
            );
        }
        Some(diffs)
    }

    /// Evaluate configured thresholds against the current report.
    ///
    /// Threshold keys are `metric` or `metric.stat` (`stat` one of
    /// min/max/mean/median/p95/p99/std_dev/count; default mean). Returns
    /// `(true, map)` when any gate fails.
    pub fn check_thresholds(&self) -> (bool, BTreeMap<String, ThresholdStatus>) {
        let thresholds = self
            .thresholds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let report = self.get_report();
        let mut statuses = BTreeMap::new();
        let mut any_exceeded = false;
        for (key, threshold) in thresholds {
            let (metric_name, stat) = split_threshold_key(&key);
            let Some(record) = report.metrics.get(metric_name) else {
                debug!(threshold = %key, "no samples for threshold metric");
                continue;
            };
            let Some(value) = record.summary.stat(stat) else {
                warn!(threshold = %key, stat, "unknown statistic in threshold key");
                continue;
            };
            let exceeded = if higher_is_better(metric_name) {
                value < threshold
            } else {
                value > threshold
            };
            any_exceeded |= exceeded;
            statuses.insert(
                key,
                ThresholdStatus {
                    value,
                    threshold,
                    exceeded,
                },
            );
        }
        (any_exceeded, statuses)
    }

    /// Surface a typed error for CI pipelines when any gate failed.
    pub fn enforce_thresholds(&self) -> Result<()> {
        let (exceeded, statuses) = self.check_thresholds();
        if !exceeded {
            return Ok(());
        }
        let failed: Vec<String> = statuses
            .iter()
            .filter(|(_, s)| s.exceeded)
            .map(|(k, s)| format!("{} = {:.2} (threshold {:.2})", k, s.value, s.threshold))
            .collect();
        Err(Error::ThresholdExceeded(failed.join(", ")))
    }

    /// Write text/json/html reports plus `threshold-status.json` under `dir`.
    pub fn write_reports(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let report = self.get_report();

        std::fs::write(
            dir.join("performance-report.json"),
            serde_json::to_vec_pretty(&report)?,
        )?;
        std::fs::write(dir.join("performance-report.txt"), text_report(&report))?;
        std::fs::write(dir.join("performance-report.html"), html_report(&report))?;

        let (exceeded, statuses) = self.check_thresholds();
        let status_doc = serde_json::json!({
            "exceeded": exceeded,
            "checked_at": Utc::now().to_rfc3339(),
            "thresholds": statuses,
        });
        std::fs::write(
            dir.join("threshold-status.json"),
            serde_json::to_vec_pretty(&status_doc)?,
        )?;
        Ok(())
    }
}

fn higher_is_better(name: &str) -> bool {
    HIGHER_IS_BETTER.iter().any(|s| name.contains(s))
}

fn split_threshold_key(key: &str) -> (&str, &str) {
    if let Some((metric, stat)) = key.rsplit_once('.') {
        if matches!(
            stat,
            "min" | "max" | "mean" | "median" | "p95" | "p99" | "std_dev" | "count"
        ) {
            return (metric, stat);
        }
    }
    (key, "mean")
}

fn text_report(report: &ProfileReport) -> String {
    let mut out = format!("performance report — {}\n\n", report.generated_at.to_rfc3339());
    for (name, record) in &report.metrics {
        let s = &record.summary;
        out.push_str(&format!(
            "{} [{}] min={:.2} mean={:.2} median={:.2} p95={:.2} p99={:.2} max={:.2} n={}\n",
            name, record.unit, s.min, s.mean, s.median, s.p95, s.p99, s.max, s.count
        ));
    }
    out
}

fn html_report(report: &ProfileReport) -> String {
    let mut rows = String::new();
    for (name, record) in &report.metrics {
        let s = &record.summary;
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td>\
             <td>{:.2}</td><td>{:.2}</td><td>{:.2}</td><td>{}</td></tr>\n",
            name, record.unit, s.min, s.mean, s.median, s.p95, s.p99, s.max, s.count
        ));
    }
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>performance report</title>\
         <style>body{{font-family:system-ui,sans-serif;margin:2rem}}table{{border-collapse:collapse}}\
         th,td{{border:1px solid #ccc;padding:.3rem .6rem}}</style></head><body>\
         <h1>Performance report</h1><p>{}</p>\
         <table><tr><th>Metric</th><th>Unit</th><th>Min</th><th>Mean</th><th>Median</th>\
         <th>P95</th><th>P99</th><th>Max</th><th>Count</th></tr>\n{}</table></body></html>\n",
        report.generated_at.to_rfc3339(),
        rows
    )
}

/// Records elapsed time when stopped or dropped.
pub struct TimerGuard<'a> {
    profiler: &'a Profiler,
    name: String,
    labels: Option<BTreeMap<String, String>>,
    start: Instant,
}

impl TimerGuard<'_> {
    pub fn stop(mut self) {
        self.record();
    }

    fn record(&mut self) {
        if let Some(labels) = self.labels.take() {
            self.profiler
                .record_duration(&self.name, self.start.elapsed(), labels);
        }
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.record();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_report() {
        let profiler = Profiler::new();
        profiler.register_metric("template.execute.time", MetricType::Timer, "ms");
        for v in [100.0, 200.0, 300.0] {
            profiler.record_metric("template.execute.time", v, BTreeMap::new());
        }
        let report = profiler.get_report();
        let record = &report.metrics["template.execute.time"];
        assert_eq!(record.summary.count, 3);
        assert_eq!(record.summary.mean, 200.0);
    }

    #[test]
    fn timer_guard_records_on_drop() {
        let profiler = Profiler::new();
        {
            let _timer = profiler.start_timer("op.time", BTreeMap::new());
        }
        let report = profiler.get_report();
        assert_eq!(report.metrics["op.time"].summary.count, 1);
    }

    #[test]
    fn threshold_gate_fails_pipeline() {
        let profiler = Profiler::new();
        // p95 lands at 600ms
        for _ in 0..20 {
            profiler.record_metric("template.execute.time", 600.0, BTreeMap::new());
        }
        profiler.set_threshold("template.execute.time.p95", 500.0);
        let (exceeded, statuses) = profiler.check_thresholds();
        assert!(exceeded);
        let status = &statuses["template.execute.time.p95"];
        assert!(status.exceeded);
        assert_eq!(status.value, 600.0);
        assert!(profiler.enforce_thresholds().is_err());
    }

    #[test]
    fn threshold_passes_under_limit() {
        let profiler = Profiler::new();
        for _ in 0..20 {
            profiler.record_metric("template.execute.time", 300.0, BTreeMap::new());
        }
        profiler.set_threshold("template.execute.time.p95", 500.0);
        let (exceeded, _) = profiler.check_thresholds();
        assert!(!exceeded);
        assert!(profiler.enforce_thresholds().is_ok());
    }

    #[test]
    fn higher_is_better_inverts_the_gate() {
        let profiler = Profiler::new();
        for _ in 0..10 {
            profiler.record_metric("cache.hit_rate", 0.4, BTreeMap::new());
        }
        profiler.set_threshold("cache.hit_rate", 0.8);
        let (exceeded, statuses) = profiler.check_thresholds();
        assert!(exceeded);
        assert!(statuses["cache.hit_rate"].exceeded);
    }

    #[test]
    fn baseline_comparison_flags_regressions() {
        let profiler = Profiler::new();
        for _ in 0..10 {
            profiler.record_metric("template.execute.time", 300.0, BTreeMap::new());
        }

        let current = Profiler::new();
        for _ in 0..10 {
            current.record_metric("template.execute.time", 600.0, BTreeMap::new());
        }
        current.set_baseline(profiler.get_report());
        let diffs = current.compare_with_baseline().unwrap();
        let diff = &diffs["template.execute.time"];
        assert!(diff.regressed);
        assert!((diff.delta_pct - 100.0).abs() < 0.01);
    }

    #[test]
    fn baseline_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        let profiler = Profiler::new();
        profiler.record_metric("loader.throughput", 42.0, BTreeMap::new());
        profiler.save_baseline(&path).unwrap();

        let fresh = Profiler::new();
        fresh.load_baseline(&path).unwrap();
        fresh.record_metric("loader.throughput", 21.0, BTreeMap::new());
        let diffs = fresh.compare_with_baseline().unwrap();
        assert!(diffs["loader.throughput"].regressed);
    }

    #[test]
    fn reports_and_status_file_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = Profiler::new();
        profiler.record_metric("x", 1.0, BTreeMap::new());
        profiler.set_threshold("x", 0.5);
        profiler.write_reports(dir.path()).unwrap();
        for file in [
            "performance-report.json",
            "performance-report.txt",
            "performance-report.html",
            "threshold-status.json",
        ] {
            assert!(dir.path().join(file).exists(), "missing {}", file);
        }
        let status: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("threshold-status.json")).unwrap())
                .unwrap();
        assert_eq!(status["exceeded"], serde_json::json!(true));
    }
}
