//! Turso Embedded / libSQL storage layer for jobs and their stage outputs.
//!
//! The [`Storage`] struct wraps a libSQL database holding four record kinds:
//! uploads (jobs), extraction results, enrichment results and dataset records.
//!
//! **Write rules:**
//! - Status changes are compare-and-swap updates keyed by job id; the set of
//!   allowed predecessor states comes from [`JobStatus::can_transition_to`].
//! - Field edits on a dataset record run inside an `IMMEDIATE` transaction
//!   under the store's write lock, so concurrent edits never lose writes.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, TransactionBehavior, params};
use serde_json::{Map, Value};
use tiki_shared::{
    DatasetRecord, EnrichmentResult, ExtractionResult, Job, JobId, JobStatus, Result, TikiError,
};
use tokio::sync::Mutex;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    /// Serializes writers sharing `conn`.
    write_lock: Mutex<()>,
}

fn storage_err(e: libsql::Error) -> TikiError {
    TikiError::Storage(e.to_string())
}

fn json_err(e: serde_json::Error) -> TikiError {
    TikiError::Storage(format!("invalid JSON column: {e}"))
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TikiError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        TikiError::Storage(format!("migration v{} failed: {e}", migration.version))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Job operations
    // -----------------------------------------------------------------------

    /// Insert a new job record.
    pub async fn create_job(&self, job: &Job) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.conn
            .execute(
                "INSERT INTO uploads (id, file_path, original_filename, file_size, status, error_message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    job.id.to_string(),
                    job.file_path.as_str(),
                    job.original_filename.as_str(),
                    job.file_size as i64,
                    job.status.as_str(),
                    job.error_message.as_deref(),
                    job.created_at.to_rfc3339(),
                    job.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Get a job by ID.
    pub async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, file_path, original_filename, file_size, status, error_message, created_at, updated_at
                 FROM uploads WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// List jobs, newest first.
    pub async fn list_jobs(&self, limit: u32) -> Result<Vec<Job>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, file_path, original_filename, file_size, status, error_message, created_at, updated_at
                 FROM uploads ORDER BY created_at DESC, id DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_job(&row)?);
        }
        Ok(results)
    }

    /// Move a job to `next`, touching only `status` and `updated_at`.
    ///
    /// The update only applies while the stored status is a legal
    /// predecessor of `next`; otherwise [`TikiError::InvalidTransition`] is
    /// returned and nothing changes.
    pub async fn transition(&self, id: &JobId, next: JobStatus) -> Result<()> {
        if next == JobStatus::Failed {
            return Err(TikiError::validation(
                "use mark_failed to record a failure with its message",
            ));
        }
        let sql = format!(
            "UPDATE uploads SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status IN ({})",
            status_list(&JobStatus::predecessors(next))
        );

        let _guard = self.write_lock.lock().await;
        let changed = self
            .conn
            .execute(
                &sql,
                params![next.as_str(), Utc::now().to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(self.rejected_transition(id, next).await);
        }
        tracing::debug!(job_id = %id, status = %next, "job status updated");
        Ok(())
    }

    /// Move a job to `failed`, touching `status`, `error_message` and
    /// `updated_at`.
    pub async fn mark_failed(&self, id: &JobId, message: &str) -> Result<()> {
        let sql = format!(
            "UPDATE uploads SET status = ?1, error_message = ?2, updated_at = ?3
             WHERE id = ?4 AND status IN ({})",
            status_list(&JobStatus::predecessors(JobStatus::Failed))
        );

        let _guard = self.write_lock.lock().await;
        let changed = self
            .conn
            .execute(
                &sql,
                params![
                    JobStatus::Failed.as_str(),
                    message,
                    Utc::now().to_rfc3339(),
                    id.to_string()
                ],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(self.rejected_transition(id, JobStatus::Failed).await);
        }
        Ok(())
    }

    /// Explain why a conditional status update matched no row.
    async fn rejected_transition(&self, id: &JobId, next: JobStatus) -> TikiError {
        match self.get_job(id).await {
            Ok(Some(job)) => TikiError::InvalidTransition {
                job_id: id.to_string(),
                from: job.status.to_string(),
                to: next.to_string(),
            },
            Ok(None) => TikiError::NotFound(format!("job {id}")),
            Err(e) => e,
        }
    }

    // -----------------------------------------------------------------------
    // Stage outputs
    // -----------------------------------------------------------------------

    /// Persist the stage 1 output for a job.
    pub async fn insert_extraction(&self, id: &JobId, result: &ExtractionResult) -> Result<()> {
        let raw_metadata = serde_json::to_string(&result.raw_metadata).map_err(json_err)?;

        let _guard = self.write_lock.lock().await;
        self.conn
            .execute(
                "INSERT INTO extraction_results (upload_id, mime_type, language, author, title, created_date, modified_date, full_text, raw_metadata_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.to_string(),
                    result.mime_type.as_str(),
                    result.language.as_str(),
                    result.author.as_str(),
                    result.title.as_str(),
                    result.created_date.map(|d| d.to_rfc3339()),
                    result.modified_date.map(|d| d.to_rfc3339()),
                    result.full_text.as_str(),
                    raw_metadata,
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Get the stage 1 output for a job.
    pub async fn get_extraction(&self, id: &JobId) -> Result<Option<ExtractionResult>> {
        let mut rows = self
            .conn
            .query(
                "SELECT mime_type, language, author, title, created_date, modified_date, full_text, raw_metadata_json
                 FROM extraction_results WHERE upload_id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        let row = match rows.next().await.map_err(storage_err)? {
            Some(row) => row,
            None => return Ok(None),
        };

        let raw: String = row.get(7).map_err(storage_err)?;
        Ok(Some(ExtractionResult {
            mime_type: row.get(0).map_err(storage_err)?,
            language: row.get(1).map_err(storage_err)?,
            author: row.get(2).map_err(storage_err)?,
            title: row.get(3).map_err(storage_err)?,
            created_date: optional_timestamp(row.get::<String>(4).ok())?,
            modified_date: optional_timestamp(row.get::<String>(5).ok())?,
            full_text: row.get(6).map_err(storage_err)?,
            raw_metadata: serde_json::from_str(&raw).map_err(json_err)?,
        }))
    }

    /// Persist the stage 2 output for a job.
    pub async fn insert_enrichment(&self, id: &JobId, result: &EnrichmentResult) -> Result<()> {
        let themes = serde_json::to_string(&result.suggested_themes).map_err(json_err)?;
        let keywords = serde_json::to_string(&result.suggested_keywords).map_err(json_err)?;
        let raw_response = serde_json::to_string(&result.raw_response).map_err(json_err)?;

        let _guard = self.write_lock.lock().await;
        self.conn
            .execute(
                "INSERT INTO enrichment_results (upload_id, suggested_themes_json, generated_description, suggested_keywords_json, prompt_used, raw_response_json, model_used)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.to_string(),
                    themes,
                    result.generated_description.as_str(),
                    keywords,
                    result.prompt_used.as_str(),
                    raw_response,
                    result.model_used.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Get the stage 2 output for a job.
    pub async fn get_enrichment(&self, id: &JobId) -> Result<Option<EnrichmentResult>> {
        let mut rows = self
            .conn
            .query(
                "SELECT suggested_themes_json, generated_description, suggested_keywords_json, prompt_used, raw_response_json, model_used
                 FROM enrichment_results WHERE upload_id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        let row = match rows.next().await.map_err(storage_err)? {
            Some(row) => row,
            None => return Ok(None),
        };

        let themes: String = row.get(0).map_err(storage_err)?;
        let keywords: String = row.get(2).map_err(storage_err)?;
        let raw_response: String = row.get(4).map_err(storage_err)?;
        Ok(Some(EnrichmentResult {
            suggested_themes: serde_json::from_str(&themes).map_err(json_err)?,
            generated_description: row.get(1).map_err(storage_err)?,
            suggested_keywords: serde_json::from_str(&keywords).map_err(json_err)?,
            prompt_used: row.get(3).map_err(storage_err)?,
            raw_response: serde_json::from_str(&raw_response).map_err(json_err)?,
            model_used: row.get(5).map_err(storage_err)?,
        }))
    }

    /// Persist the stage 3 output for a job.
    pub async fn insert_dataset_record(&self, id: &JobId, record: &DatasetRecord) -> Result<()> {
        let jsonld = serde_json::to_string(&record.jsonld).map_err(json_err)?;
        let empty_fields = serde_json::to_string(&record.empty_fields).map_err(json_err)?;
        let user_edits = serde_json::to_string(&record.user_edits).map_err(json_err)?;

        let _guard = self.write_lock.lock().await;
        self.conn
            .execute(
                "INSERT INTO dataset_records (upload_id, jsonld_json, empty_fields_json, user_edits_json, is_finalized)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    jsonld,
                    empty_fields,
                    user_edits,
                    record.is_finalized as i64,
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Get the stage 3 output for a job.
    pub async fn get_dataset_record(&self, id: &JobId) -> Result<Option<DatasetRecord>> {
        read_dataset_record(&self.conn, id).await
    }

    /// Record a human edit on a dataset record.
    ///
    /// Reads `user_edits` and `empty_fields`, applies the edit and writes both
    /// columns back inside one `IMMEDIATE` transaction. Returns the updated
    /// record.
    pub async fn apply_field_edit(
        &self,
        id: &JobId,
        field: &str,
        value: Value,
    ) -> Result<DatasetRecord> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(storage_err)?;

        match edit_in_transaction(&tx, id, field, value).await {
            Ok(record) => {
                tx.commit().await.map_err(storage_err)?;
                tracing::debug!(job_id = %id, field, "field edit applied");
                Ok(record)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(job_id = %id, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Set the finalized flag on a dataset record.
    pub async fn set_finalized(&self, id: &JobId, finalized: bool) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let changed = self
            .conn
            .execute(
                "UPDATE dataset_records SET is_finalized = ?1 WHERE upload_id = ?2",
                params![finalized as i64, id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(TikiError::NotFound(format!("dataset record for job {id}")));
        }
        Ok(())
    }
}

/// Read-modify-write body of [`Storage::apply_field_edit`].
async fn edit_in_transaction(
    conn: &Connection,
    id: &JobId,
    field: &str,
    value: Value,
) -> Result<DatasetRecord> {
    let mut record = read_dataset_record(conn, id)
        .await?
        .ok_or_else(|| TikiError::NotFound(format!("dataset record for job {id}")))?;

    record.apply_edit(field, value);

    let user_edits = serde_json::to_string(&record.user_edits).map_err(json_err)?;
    let empty_fields = serde_json::to_string(&record.empty_fields).map_err(json_err)?;
    conn.execute(
        "UPDATE dataset_records SET user_edits_json = ?1, empty_fields_json = ?2 WHERE upload_id = ?3",
        params![user_edits, empty_fields, id.to_string()],
    )
    .await
    .map_err(storage_err)?;

    Ok(record)
}

async fn read_dataset_record(conn: &Connection, id: &JobId) -> Result<Option<DatasetRecord>> {
    let mut rows = conn
        .query(
            "SELECT jsonld_json, empty_fields_json, user_edits_json, is_finalized
             FROM dataset_records WHERE upload_id = ?1",
            params![id.to_string()],
        )
        .await
        .map_err(storage_err)?;

    let row = match rows.next().await.map_err(storage_err)? {
        Some(row) => row,
        None => return Ok(None),
    };

    let jsonld: String = row.get(0).map_err(storage_err)?;
    let empty_fields: String = row.get(1).map_err(storage_err)?;
    let user_edits: String = row.get(2).map_err(storage_err)?;
    let is_finalized: i64 = row.get(3).map_err(storage_err)?;

    Ok(Some(DatasetRecord {
        jsonld: serde_json::from_str(&jsonld).map_err(json_err)?,
        empty_fields: serde_json::from_str(&empty_fields).map_err(json_err)?,
        user_edits: serde_json::from_str::<Map<String, Value>>(&user_edits).map_err(json_err)?,
        is_finalized: is_finalized != 0,
    }))
}

/// Render statuses as a SQL `IN` list. Values are fixed identifiers.
fn status_list(statuses: &[JobStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TikiError::Storage(format!("invalid date: {e}")))
}

fn optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

/// Convert a database row to a [`Job`].
fn row_to_job(row: &libsql::Row) -> Result<Job> {
    let id: String = row.get(0).map_err(storage_err)?;
    let status: String = row.get(4).map_err(storage_err)?;
    let created_at: String = row.get(6).map_err(storage_err)?;
    let updated_at: String = row.get(7).map_err(storage_err)?;

    Ok(Job {
        id: id
            .parse()
            .map_err(|e| TikiError::Storage(format!("invalid job id '{id}': {e}")))?,
        file_path: row.get(1).map_err(storage_err)?,
        original_filename: row.get(2).map_err(storage_err)?,
        file_size: row.get::<i64>(3).map_err(storage_err)? as u64,
        status: status.parse().map_err(TikiError::Storage)?,
        error_message: row.get::<String>(5).ok(),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
