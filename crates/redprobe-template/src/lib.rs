//! Template pipeline: parsing and validation, the bounded cache, the
//! authoritative registry, and the loader that moves repository files
//! through all of them.

pub mod cache;
pub mod loader;
pub mod parser;
pub mod registry;

pub use cache::{CacheStats, TemplateCache};
pub use loader::{LoaderOptions, TemplateLoader};
pub use parser::{
    check_include_cycles, includes_of, parse_template, resolve_variables, validate,
};
pub use registry::TemplateRegistry;
