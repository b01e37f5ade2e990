//! Shared application state handed to every request handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tiki_core::Pipeline;
use tiki_shared::{AppConfig, Result};
use tiki_storage::Storage;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    /// Root directory for uploaded files.
    pub media_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, media_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline,
            media_dir: Arc::new(media_dir.into()),
        }
    }

    /// Open the job store and wire the production pipeline.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let storage = Arc::new(Storage::open(Path::new(&config.storage.database_path)).await?);
        let pipeline = Pipeline::from_config(config, storage)?;
        info!(
            database = %config.storage.database_path,
            media_dir = %config.storage.media_dir,
            enrichment = pipeline.enrichment_enabled(),
            "application state ready"
        );
        Ok(Self::new(pipeline, &config.storage.media_dir))
    }

    pub fn storage(&self) -> &Storage {
        self.pipeline.storage()
    }
}
