//! Core pipeline orchestration and domain logic for Tiki.
//!
//! This crate ties together extraction, enrichment and the DCAT-AP record
//! builder into the end-to-end job run ([`pipeline::Pipeline::run`]).

pub mod dcat;
pub mod pipeline;

pub use dcat::{DCAT_CONTEXT, DcatBuild, REQUIRED_FIELDS};
pub use pipeline::{Enricher, Extractor, Pipeline, ProgressReporter, SilentProgress};
