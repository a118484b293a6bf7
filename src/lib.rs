//! redprobe — an LLM red-team testing engine
//!
//! Loads declarative attack templates from pluggable repository backends,
//! validates and registers them, executes them concurrently against an LLM
//! provider, and emits reports in multiple formats. The [`Manager`] facade
//! is the single entry point; everything underneath lives in the
//! per-concern crates.

pub mod config;
pub mod manager;

pub use config::RedprobeConfig;
pub use manager::{Manager, ManagerBuilder};

pub use redprobe_core::{
    Error, Report, ReportFormat, ReportSummary, Result, Severity, Template, TemplateResult,
    TemplateSource, TemplateStatus,
};
pub use redprobe_exec::{ExecuteOptions, HookChain, Provider, StubProvider};
