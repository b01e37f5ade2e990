//! Request handlers for the JSON API.

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use tiki_core::SilentProgress;
use tiki_shared::{Job, JobId, JobStatus};
use tracing::{error, info};

use crate::errors::AppError;
use crate::state::AppState;
use crate::upload::{save_upload, upload_basename};

type ApiResult = Result<Response, AppError>;

/// Unparsable ids are reported the same way as unknown ones.
fn parse_job_id(raw: &str) -> Result<JobId, AppError> {
    raw.parse().map_err(|_| AppError::NotFound)
}

async fn load_job(state: &AppState, raw_id: &str) -> Result<Job, AppError> {
    let id = parse_job_id(raw_id)?;
    state.storage().get_job(&id).await?.ok_or(AppError::NotFound)
}

/// `GET /health/`
pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// `POST /api/enrich/`: store the uploaded file and run the pipeline.
pub async fn enrich(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    let no_file = || AppError::bad_request("No file provided");
    let mut multipart = multipart.map_err(|_| no_file())?;

    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart.next_field().await.map_err(|_| no_file())? {
        if field.name() != Some("file") {
            continue;
        }
        let Some(filename) = field
            .file_name()
            .and_then(upload_basename)
            .map(str::to_string)
        else {
            continue;
        };
        let bytes = field.bytes().await.map_err(|_| no_file())?;
        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) = upload.ok_or_else(no_file)?;

    let path = save_upload(&state.media_dir, &filename, &bytes).await?;
    let job = Job::new(path.to_string_lossy(), filename, bytes.len() as u64);
    state.storage().create_job(&job).await?;
    info!(job_id = %job.id, file = %job.original_filename, size = job.file_size, "upload received");

    match state.pipeline.run(&job, &SilentProgress).await {
        Ok(record) => Ok(Json(json!({
            "id": job.id.to_string(),
            "status": JobStatus::Completed,
            "jsonld": record.jsonld,
            "empty_fields": record.empty_fields,
        }))
        .into_response()),
        Err(err) => {
            error!(job_id = %job.id, error = %err, "enrichment failed");
            let stored_message = state
                .storage()
                .get_job(&job.id)
                .await
                .ok()
                .flatten()
                .and_then(|j| j.error_message);
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "id": job.id.to_string(),
                    "status": JobStatus::Failed,
                    "error": stored_message.unwrap_or_else(|| err.to_string()),
                })),
            )
                .into_response())
        }
    }
}

/// `GET /api/result/{id}/`
pub async fn result(State(state): State<AppState>, Path(raw_id): Path<String>) -> ApiResult {
    let job = load_job(&state, &raw_id).await?;

    let mut response = Map::new();
    response.insert("id".into(), json!(job.id.to_string()));
    response.insert("status".into(), json!(job.status));
    response.insert("original_filename".into(), json!(job.original_filename));

    match job.status {
        JobStatus::Failed => {
            response.insert("error".into(), json!(job.error_message));
        }
        JobStatus::Completed => match state.storage().get_dataset_record(&job.id).await? {
            Some(record) => {
                response.insert("jsonld".into(), record.merged_jsonld());
                response.insert("empty_fields".into(), json!(record.empty_fields));
                response.insert("is_finalized".into(), json!(record.is_finalized));
            }
            None => {
                response.insert("error".into(), json!("DCAT output not found"));
            }
        },
        _ => {}
    }

    Ok(Json(Value::Object(response)).into_response())
}

/// `POST /api/result/{id}/edit/` with body `{"field": ..., "value": ...}`.
pub async fn edit_field(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let job = load_job(&state, &raw_id).await?;
    if state.storage().get_dataset_record(&job.id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let body: Value =
        serde_json::from_slice(&body).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    let field = body
        .get("field")
        .and_then(Value::as_str)
        .filter(|f| !f.is_empty());
    let value = body.get("value").filter(|v| !v.is_null());
    let (Some(field), Some(value)) = (field, value) else {
        return Err(AppError::bad_request("field and value are required"));
    };

    let record = state
        .storage()
        .apply_field_edit(&job.id, field, value.clone())
        .await?;
    info!(job_id = %job.id, field, "field edited");

    Ok(Json(json!({
        "id": job.id.to_string(),
        "jsonld": record.merged_jsonld(),
        "empty_fields": record.empty_fields,
    }))
    .into_response())
}

/// `POST /api/result/{id}/finalize/`
pub async fn finalize(State(state): State<AppState>, Path(raw_id): Path<String>) -> ApiResult {
    let job = load_job(&state, &raw_id).await?;
    state.storage().set_finalized(&job.id, true).await?;
    info!(job_id = %job.id, "record finalized");

    Ok(Json(json!({
        "id": job.id.to_string(),
        "is_finalized": true,
    }))
    .into_response())
}
