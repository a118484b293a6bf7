//! Metric series — ring-buffered samples with windowed summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

pub const DEFAULT_MAX_SAMPLES: usize = 1000;
/// Full summary recomputation interval, in samples.
const RECOMPUTE_EVERY: u64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Timer,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Statistics over the current ring window. `count` alone is monotonic over
/// the series' lifetime; everything else describes the window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
    pub std_dev: f64,
    pub count: u64,
}

impl MetricSummary {
    /// Read one statistic by name (used for threshold keys like `foo.p95`).
    pub fn stat(&self, name: &str) -> Option<f64> {
        match name {
            "min" => Some(self.min),
            "max" => Some(self.max),
            "mean" => Some(self.mean),
            "median" => Some(self.median),
            "p95" => Some(self.p95),
            "p99" => Some(self.p99),
            "std_dev" => Some(self.std_dev),
            "count" => Some(self.count as f64),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct MetricSeries {
    pub name: String,
    pub metric_type: MetricType,
    pub unit: String,
    max_samples: usize,
    samples: VecDeque<Sample>,
    count: u64,
    summary: MetricSummary,
    dirty: bool,
}

impl MetricSeries {
    pub fn new(name: impl Into<String>, metric_type: MetricType, unit: impl Into<String>) -> Self {
        Self::with_capacity(name, metric_type, unit, DEFAULT_MAX_SAMPLES)
    }

    pub fn with_capacity(
        name: impl Into<String>,
        metric_type: MetricType,
        unit: impl Into<String>,
        max_samples: usize,
    ) -> Self {
        Self {
            name: name.into(),
            metric_type,
            unit: unit.into(),
            max_samples: max_samples.max(1),
            samples: VecDeque::new(),
            count: 0,
            summary: MetricSummary::default(),
            dirty: false,
        }
    }

    pub fn record(&mut self, value: f64, labels: BTreeMap<String, String>) {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample {
            value,
            timestamp: Utc::now(),
            labels,
        });
        self.count += 1;
        self.dirty = true;
        if self.count % RECOMPUTE_EVERY == 0 {
            self.recompute();
        }
    }

    /// Current summary, recomputing first if samples arrived since the last
    /// periodic pass.
    pub fn summary(&mut self) -> MetricSummary {
        if self.dirty {
            self.recompute();
        }
        self.summary
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn total_count(&self) -> u64 {
        self.count
    }

    fn recompute(&mut self) {
        self.dirty = false;
        let mut values: Vec<f64> = self.samples.iter().map(|s| s.value).collect();
        if values.is_empty() {
            self.summary = MetricSummary {
                count: self.count,
                ..Default::default()
            };
            return;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = values.len();
        let sum: f64 = values.iter().sum();
        let mean = sum / n as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        self.summary = MetricSummary {
            min: values[0],
            max: values[n - 1],
            mean,
            median: percentile(&values, 50.0),
            p95: percentile(&values, 95.0),
            p99: percentile(&values, 99.0),
            std_dev: variance.sqrt(),
            count: self.count,
        };
    }
}

/// Nearest-rank percentile over an already sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (q / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}
