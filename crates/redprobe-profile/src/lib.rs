//! Profiling and monitoring: named metric series with ring-buffered samples,
//! baseline comparison, and threshold gates for CI pipelines.

pub mod metrics;
pub mod profiler;

pub use metrics::{MetricSeries, MetricSummary, MetricType, Sample, DEFAULT_MAX_SAMPLES};
pub use profiler::{
    BaselineDiff, MetricRecord, ProfileReport, Profiler, ThresholdStatus, TimerGuard,
};
