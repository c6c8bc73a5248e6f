//! macropanel runner: pipeline orchestration on top of `macropanel-core`.
//!
//! - `PipelineConfig` loading from TOML with environment overrides
//! - Adapter registry built from the config and credentials
//! - `refresh`, `refresh --source` and `rebuild-indicators` plans
//! - Run summary as a table or JSON

pub mod config;
pub mod pipeline;
pub mod registry;
pub mod summary;

pub use config::{ConfigError, Credentials, PipelineConfig};
pub use pipeline::{Pipeline, RunError};
pub use registry::AdapterRegistry;
pub use summary::{CuratedSummary, PanelShape, RunSummary, SourceOutcome, SourceSummary};
