//! Three-stage enrichment pipeline: extract → (enrich) → build.
//!
//! [`Pipeline::run`] drives one job through the state machine encoded in
//! [`JobStatus::can_transition_to`]. Each stage's output is persisted before
//! the next stage starts. Any failure marks the job `failed` with the error's
//! display string and the original error is returned to the caller.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use tiki_enrichment::{DocumentFacts, EnrichmentClient};
use tiki_extraction::TikaClient;
use tiki_shared::{
    AppConfig, DatasetRecord, EnrichmentResult, ExtractionResult, Job, JobStatus, Result,
    TikiError,
};
use tiki_storage::Storage;

use crate::dcat;

// ---------------------------------------------------------------------------
// Stage seams
// ---------------------------------------------------------------------------

/// Stage 1: turn a stored file into text and metadata.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ExtractionResult>;
}

/// Stage 2: suggest themes, a description and keywords.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, extraction: &ExtractionResult) -> Result<EnrichmentResult>;
}

#[async_trait]
impl Extractor for TikaClient {
    async fn extract(&self, path: &Path) -> Result<ExtractionResult> {
        TikaClient::extract(self, path).await
    }
}

#[async_trait]
impl Enricher for EnrichmentClient {
    async fn enrich(&self, extraction: &ExtractionResult) -> Result<EnrichmentResult> {
        let facts = DocumentFacts {
            title: &extraction.title,
            author: &extraction.author,
            mime_type: &extraction.mime_type,
            language: &extraction.language,
        };
        EnrichmentClient::enrich(self, &extraction.full_text, &facts).await
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called after the job entered `status`.
    fn stage(&self, job: &Job, status: JobStatus);
    /// Called when the job completed.
    fn done(&self, job: &Job, record: &DatasetRecord);
    /// Called after the job was marked failed.
    fn failed(&self, job: &Job, error: &TikiError);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _job: &Job, _status: JobStatus) {}
    fn done(&self, _job: &Job, _record: &DatasetRecord) {}
    fn failed(&self, _job: &Job, _error: &TikiError) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Orchestrates the stages for one job at a time.
#[derive(Clone)]
pub struct Pipeline {
    storage: Arc<Storage>,
    extractor: Arc<dyn Extractor>,
    enricher: Option<Arc<dyn Enricher>>,
}

impl Pipeline {
    /// A pipeline without enrichment.
    pub fn new(storage: Arc<Storage>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            storage,
            extractor,
            enricher: None,
        }
    }

    /// Enable stage 2 with the given enricher.
    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Wire the production clients. Enrichment is enabled only when the
    /// configured API key variable is set.
    pub fn from_config(config: &AppConfig, storage: Arc<Storage>) -> Result<Self> {
        let extractor = TikaClient::new(&config.extraction)?;
        let pipeline = Self::new(storage, Arc::new(extractor));

        Ok(match EnrichmentClient::from_config(&config.enrichment)? {
            Some(client) => pipeline.with_enricher(Arc::new(client)),
            None => pipeline,
        })
    }

    pub fn enrichment_enabled(&self) -> bool {
        self.enricher.is_some()
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Run all stages for `job`, which must be `pending`.
    #[instrument(skip_all, fields(job_id = %job.id, file = %job.original_filename))]
    pub async fn run(&self, job: &Job, progress: &dyn ProgressReporter) -> Result<DatasetRecord> {
        info!(enrichment = self.enrichment_enabled(), "starting pipeline");

        match self.run_stages(job, progress).await {
            Ok(record) => {
                info!(empty_fields = record.empty_fields.len(), "pipeline completed");
                progress.done(job, &record);
                Ok(record)
            }
            Err(e) => {
                if e.is_stage_failure() {
                    warn!(error = %e, "remote stage failed");
                } else {
                    error!(error = %e, "pipeline failed");
                }
                if let Err(mark_err) = self.storage.mark_failed(&job.id, &e.to_string()).await {
                    error!(error = %mark_err, "could not mark job as failed");
                }
                progress.failed(job, &e);
                Err(e)
            }
        }
    }

    async fn run_stages(&self, job: &Job, progress: &dyn ProgressReporter) -> Result<DatasetRecord> {
        // --- Stage 1: Extraction ---
        self.enter(job, JobStatus::Extracting, progress).await?;
        let extraction = self.extractor.extract(Path::new(&job.file_path)).await?;
        self.storage.insert_extraction(&job.id, &extraction).await?;

        // --- Stage 2: Enrichment (optional) ---
        let enrichment = match &self.enricher {
            Some(enricher) => {
                self.enter(job, JobStatus::Enriching, progress).await?;
                let result = enricher.enrich(&extraction).await?;
                self.storage.insert_enrichment(&job.id, &result).await?;
                Some(result)
            }
            None => {
                info!("skipping enrichment (no API key configured)");
                None
            }
        };

        // --- Stage 3: DCAT-AP record ---
        let built = dcat::build(
            &extraction,
            enrichment.as_ref(),
            &job.original_filename,
            job.file_size,
        );
        let record = DatasetRecord::new(built.jsonld, built.empty_fields);
        self.storage.insert_dataset_record(&job.id, &record).await?;

        self.enter(job, JobStatus::Completed, progress).await?;
        Ok(record)
    }

    async fn enter(&self, job: &Job, status: JobStatus, progress: &dyn ProgressReporter) -> Result<()> {
        self.storage.transition(&job.id, status).await?;
        progress.stage(job, status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FakeExtractor {
        result: Option<ExtractionResult>,
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        async fn extract(&self, _path: &Path) -> Result<ExtractionResult> {
            self.result
                .clone()
                .ok_or_else(|| TikiError::Extraction("Tika is down".into()))
        }
    }

    struct FakeEnricher {
        fail: bool,
    }

    #[async_trait]
    impl Enricher for FakeEnricher {
        async fn enrich(&self, extraction: &ExtractionResult) -> Result<EnrichmentResult> {
            if self.fail {
                return Err(TikiError::Enrichment("API Error".into()));
            }
            Ok(EnrichmentResult {
                suggested_themes: vec![
                    "http://publications.europa.eu/resource/authority/data-theme/GOVE".into(),
                ],
                generated_description: format!("About {}.", extraction.title),
                suggested_keywords: vec!["test".into()],
                prompt_used: "prompt".into(),
                raw_response: serde_json::json!({"content": "{}"}),
                model_used: "fake".into(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        stages: Mutex<Vec<JobStatus>>,
        failures: Mutex<Vec<String>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn stage(&self, _job: &Job, status: JobStatus) {
            self.stages.lock().unwrap().push(status);
        }
        fn done(&self, _job: &Job, _record: &DatasetRecord) {}
        fn failed(&self, _job: &Job, error: &TikiError) {
            self.failures.lock().unwrap().push(error.to_string());
        }
    }

    fn extraction() -> ExtractionResult {
        ExtractionResult {
            mime_type: "text/plain".into(),
            language: "en".into(),
            author: "Jane Doe".into(),
            title: "Test Document".into(),
            created_date: None,
            modified_date: None,
            full_text: "Body".into(),
            raw_metadata: Map::new(),
        }
    }

    async fn setup() -> (Arc<Storage>, Job) {
        let tmp = std::env::temp_dir().join(format!("tiki_pipeline_{}.db", Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&tmp).await.expect("open test db"));
        let job = Job::new("/tmp/uploads/test.txt", "test.txt", 4);
        storage.create_job(&job).await.expect("create job");
        (storage, job)
    }

    fn extractor(result: Option<ExtractionResult>) -> Arc<dyn Extractor> {
        Arc::new(FakeExtractor { result })
    }

    #[tokio::test]
    async fn run_without_enrichment() {
        let (storage, job) = setup().await;
        let pipeline = Pipeline::new(storage.clone(), extractor(Some(extraction())));
        let progress = RecordingProgress::default();

        let record = pipeline.run(&job, &progress).await.unwrap();

        assert_eq!(record.jsonld["@graph"][0]["dct:title"], "Test Document");
        assert_eq!(record.jsonld["@graph"][0]["dct:description"], "");
        assert_eq!(record.empty_fields.len(), 3);

        let stored = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(storage.get_extraction(&job.id).await.unwrap().is_some());
        assert!(storage.get_enrichment(&job.id).await.unwrap().is_none());
        assert_eq!(
            storage.get_dataset_record(&job.id).await.unwrap().unwrap(),
            record
        );
        assert_eq!(
            *progress.stages.lock().unwrap(),
            vec![JobStatus::Extracting, JobStatus::Completed]
        );
    }

    #[tokio::test]
    async fn run_with_enrichment() {
        let (storage, job) = setup().await;
        let pipeline = Pipeline::new(storage.clone(), extractor(Some(extraction())))
            .with_enricher(Arc::new(FakeEnricher { fail: false }));
        let progress = RecordingProgress::default();

        let record = pipeline.run(&job, &progress).await.unwrap();

        let ds = &record.jsonld["@graph"][0];
        assert_eq!(ds["dct:description"], "About Test Document.");
        assert_eq!(ds["dcat:keyword"][0], "test");
        assert!(storage.get_enrichment(&job.id).await.unwrap().is_some());
        assert_eq!(
            *progress.stages.lock().unwrap(),
            vec![
                JobStatus::Extracting,
                JobStatus::Enriching,
                JobStatus::Completed
            ]
        );
    }

    #[tokio::test]
    async fn extraction_failure_marks_job_failed() {
        let (storage, job) = setup().await;
        let pipeline = Pipeline::new(storage.clone(), extractor(None));
        let progress = RecordingProgress::default();

        let err = pipeline.run(&job, &progress).await.unwrap_err();
        assert!(matches!(err, TikiError::Extraction(_)));

        let stored = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some(err.to_string().as_str()));
        assert!(storage.get_extraction(&job.id).await.unwrap().is_none());
        assert!(storage.get_dataset_record(&job.id).await.unwrap().is_none());
        assert_eq!(progress.failures.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn enrichment_failure_keeps_stage_one_output() {
        let (storage, job) = setup().await;
        let pipeline = Pipeline::new(storage.clone(), extractor(Some(extraction())))
            .with_enricher(Arc::new(FakeEnricher { fail: true }));

        let err = pipeline.run(&job, &SilentProgress).await.unwrap_err();
        assert!(err.to_string().contains("API Error"));

        let stored = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.error_message.unwrap().contains("API Error"));
        assert!(storage.get_extraction(&job.id).await.unwrap().is_some());
        assert!(storage.get_enrichment(&job.id).await.unwrap().is_none());
        assert!(storage.get_dataset_record(&job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rerunning_a_completed_job_is_rejected() {
        let (storage, job) = setup().await;
        let pipeline = Pipeline::new(storage.clone(), extractor(Some(extraction())));
        pipeline.run(&job, &SilentProgress).await.unwrap();

        let err = pipeline.run(&job, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, TikiError::InvalidTransition { .. }));

        // Terminal state and stored record are untouched.
        let stored = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.error_message.is_none());
    }
}
