//! Per-run result state machine and aggregated report types

use crate::template::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a single template run. Terminal states: Completed, Failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateStatus {
    Loaded,
    Validated,
    Executing,
    Completed,
    Failed,
}

impl TemplateStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TemplateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded => write!(f, "loaded"),
            Self::Validated => write!(f, "validated"),
            Self::Executing => write!(f, "executing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of executing one template. Created on dispatch, mutated only by
/// the executor, owned by the caller afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateResult {
    pub template_id: String,
    pub status: TemplateStatus,
    pub severity: Severity,
    #[serde(default)]
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub detected: bool,
    pub score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl TemplateResult {
    pub fn new(template_id: impl Into<String>, severity: Severity) -> Self {
        Self {
            template_id: template_id.into(),
            status: TemplateStatus::Loaded,
            severity,
            category: String::new(),
            start_time: None,
            end_time: None,
            duration_ms: 0,
            response: None,
            detected: false,
            score: 0,
            error: None,
            details: BTreeMap::new(),
        }
    }

    pub fn mark_validated(&mut self) {
        self.status = TemplateStatus::Validated;
    }

    pub fn start(&mut self) {
        self.status = TemplateStatus::Executing;
        self.start_time = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.status = TemplateStatus::Completed;
        self.finish_clock();
    }

    pub fn fail(&mut self, error: impl fmt::Display) {
        self.status = TemplateStatus::Failed;
        self.error = Some(error.to_string());
        self.finish_clock();
    }

    /// Clamp into the 0..=100 contract.
    pub fn set_score(&mut self, score: u32) {
        self.score = score.min(100) as u8;
    }

    pub fn annotate(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.details.insert(key.into(), value);
    }

    fn finish_clock(&mut self) {
        let end = Utc::now();
        self.end_time = Some(end);
        if let Some(start) = self.start_time {
            self.duration_ms = (end - start).num_milliseconds().max(0) as u64;
        }
    }
}

/// Output format for a generated report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Yaml,
    Csv,
    Markdown,
    Html,
    Excel,
    Pdf,
    Jsonl,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Csv => "csv",
            Self::Markdown => "md",
            Self::Html => "html",
            Self::Excel => "xlsx",
            Self::Pdf => "pdf",
            Self::Jsonl => "jsonl",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.') {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "csv" => Some(Self::Csv),
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "xlsx" => Some(Self::Excel),
            "pdf" => Some(Self::Pdf),
            "jsonl" => Some(Self::Jsonl),
            _ => None,
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "csv" => Ok(Self::Csv),
            "md" | "markdown" => Ok(Self::Markdown),
            "html" => Ok(Self::Html),
            "excel" | "xlsx" => Ok(Self::Excel),
            "pdf" => Ok(Self::Pdf),
            "jsonl" => Ok(Self::Jsonl),
            other => Err(format!("unknown report format: {}", other)),
        }
    }
}

/// Aggregates computed in one pass over the result set.
///
/// "Passed" means the run completed and no detection rule fired; a fired
/// rule is a finding and counts as "failed". Runs that ended in the Failed
/// state are errors; anything non-terminal was skipped.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub error_count: usize,
    pub skipped: usize,
    pub pass_rate: f64,
    pub avg_score: f64,
    #[serde(default)]
    pub severity_breakdown: BTreeMap<String, usize>,
    #[serde(default)]
    pub category_breakdown: BTreeMap<String, usize>,
}

impl ReportSummary {
    pub fn compute(results: &[TemplateResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Default::default()
        };
        let mut score_sum = 0u64;
        let mut scored = 0usize;
        for r in results {
            match r.status {
                TemplateStatus::Completed => {
                    if r.detected {
                        summary.failed += 1;
                        *summary
                            .severity_breakdown
                            .entry(r.severity.to_string())
                            .or_insert(0) += 1;
                        let category = if r.category.is_empty() {
                            "uncategorized".to_string()
                        } else {
                            r.category.clone()
                        };
                        *summary.category_breakdown.entry(category).or_insert(0) += 1;
                    } else {
                        summary.passed += 1;
                    }
                    score_sum += r.score as u64;
                    scored += 1;
                }
                TemplateStatus::Failed => summary.error_count += 1,
                _ => summary.skipped += 1,
            }
        }
        let judged = summary.passed + summary.failed;
        if judged > 0 {
            summary.pass_rate = summary.passed as f64 / judged as f64;
        }
        if scored > 0 {
            summary.avg_score = score_sum as f64 / scored as f64;
        }
        summary
    }
}

/// Per-category grouping included in a report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportSuite {
    pub name: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
}

/// An aggregated result set. Immutable after emission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub format: ReportFormat,
    pub results: Vec<TemplateResult>,
    pub suites: Vec<ReportSuite>,
    pub summary: ReportSummary,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Report {
    /// Build a report from a snapshot of results. Results are ordered by
    /// template id ascending; suites group by category.
    pub fn new(title: impl Into<String>, format: ReportFormat, mut results: Vec<TemplateResult>) -> Self {
        results.sort_by(|a, b| a.template_id.cmp(&b.template_id));
        let summary = ReportSummary::compute(&results);
        let suites = Self::build_suites(&results);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            created_at: Utc::now(),
            format,
            results,
            suites,
            summary,
            metadata: BTreeMap::new(),
        }
    }

    fn build_suites(results: &[TemplateResult]) -> Vec<ReportSuite> {
        let mut by_category: BTreeMap<String, ReportSuite> = BTreeMap::new();
        for r in results {
            let name = if r.category.is_empty() {
                "uncategorized".to_string()
            } else {
                r.category.clone()
            };
            let suite = by_category.entry(name.clone()).or_insert_with(|| ReportSuite {
                name,
                total: 0,
                passed: 0,
                failed: 0,
                errors: 0,
            });
            suite.total += 1;
            match r.status {
                TemplateStatus::Completed if r.detected => suite.failed += 1,
                TemplateStatus::Completed => suite.passed += 1,
                TemplateStatus::Failed => suite.errors += 1,
                _ => {}
            }
        }
        by_category.into_values().collect()
    }
}
