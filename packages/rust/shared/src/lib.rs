//! Shared types, error model, and configuration for Tiki.
//!
//! This crate is the foundation depended on by all other Tiki crates.
//! It provides:
//! - [`TikiError`], the unified error type
//! - Domain types ([`Job`], [`JobStatus`], [`ExtractionResult`],
//!   [`EnrichmentResult`], [`DatasetRecord`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EnrichmentConfig, ExtractionConfig, ServerConfig, StorageConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Result, TikiError};
pub use types::{
    DatasetRecord, EnrichmentResult, ExtractionResult, Job, JobId, JobStatus, merge_edits,
};
