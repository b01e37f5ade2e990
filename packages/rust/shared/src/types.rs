//! Core domain types: the job record and its three stage outputs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for job identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Pipeline state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Extracting,
    Enriching,
    Completed,
    Failed,
}

impl JobStatus {
    /// Value stored in the database and returned over the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Extracting => "extracting",
            Self::Enriching => "enriching",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `completed` and `failed` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Transition table of the pipeline state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Extracting) => true,
            (Extracting, Enriching) => true,
            (Extracting, Completed) | (Enriching, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// States from which `next` may be entered.
    pub fn predecessors(next: JobStatus) -> Vec<JobStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    pub const ALL: [JobStatus; 5] = [
        Self::Pending,
        Self::Extracting,
        Self::Enriching,
        Self::Completed,
        Self::Failed,
    ];
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// An uploaded document and the state of its pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Where the uploaded bytes are stored on disk.
    pub file_path: String,
    pub original_filename: String,
    pub file_size: u64,
    pub status: JobStatus,
    /// Set only when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        file_path: impl Into<String>,
        original_filename: impl Into<String>,
        file_size: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            file_path: file_path.into(),
            original_filename: original_filename.into(),
            file_size,
            status: JobStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.original_filename, self.status)
    }
}

// ---------------------------------------------------------------------------
// Stage outputs
// ---------------------------------------------------------------------------

/// Stage 1 output: normalised metadata and text from the extraction service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub mime_type: String,
    pub language: String,
    pub author: String,
    pub title: String,
    pub created_date: Option<DateTime<Utc>>,
    pub modified_date: Option<DateTime<Utc>>,
    pub full_text: String,
    /// Service metadata exactly as received, kept for audit.
    pub raw_metadata: Map<String, Value>,
}

/// Stage 2 output: suggestions from the language-model service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub suggested_themes: Vec<String>,
    pub generated_description: String,
    pub suggested_keywords: Vec<String>,
    pub prompt_used: String,
    pub raw_response: Value,
    pub model_used: String,
}

/// Stage 3 output: the DCAT-AP JSON-LD record plus human edits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// Generated document; never modified after creation.
    pub jsonld: Value,
    /// Required fields still lacking a value.
    pub empty_fields: Vec<String>,
    /// Field path → human-supplied value, overlaid on read.
    pub user_edits: Map<String, Value>,
    pub is_finalized: bool,
}

impl DatasetRecord {
    pub fn new(jsonld: Value, empty_fields: Vec<String>) -> Self {
        Self {
            jsonld,
            empty_fields,
            user_edits: Map::new(),
            is_finalized: false,
        }
    }

    /// Record a human edit. The field leaves `empty_fields` if it was there;
    /// the generated document is untouched.
    pub fn apply_edit(&mut self, field: &str, value: Value) {
        self.user_edits.insert(field.to_string(), value);
        self.empty_fields.retain(|f| f != field);
    }

    /// The stored document with user edits applied.
    pub fn merged_jsonld(&self) -> Value {
        merge_edits(&self.jsonld, &self.user_edits)
    }
}

/// Overlay `edits` on the dataset node of `document`.
///
/// The dataset node is `@graph[0]` when the document has a graph, otherwise
/// the document root. Edits replace first-level keys only.
pub fn merge_edits(document: &Value, edits: &Map<String, Value>) -> Value {
    let mut merged = document.clone();

    let target = if merged.get("@graph").is_some() {
        merged.get_mut("@graph").and_then(|graph| graph.get_mut(0))
    } else {
        Some(&mut merged)
    };

    if let Some(Value::Object(dataset)) = target {
        for (field, value) in edits {
            dataset.insert(field.clone(), value.clone());
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_id_roundtrip() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().expect("parse JobId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn new_job_is_pending() {
        let job = Job::new("/tmp/test.txt", "test.txt", 12);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.file_size, 12);
        assert!(job.error_message.is_none());
        assert_eq!(job.to_string(), "test.txt (pending)");
    }

    #[test]
    fn status_string_roundtrip() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn transition_table() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Extracting));
        assert!(Extracting.can_transition_to(Enriching));
        assert!(Extracting.can_transition_to(Completed));
        assert!(Enriching.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Enriching.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Enriching.can_transition_to(Extracting));
        assert!(!Failed.can_transition_to(Extracting));
        assert!(!Failed.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Failed));
    }

    #[test]
    fn predecessors_of_failed_are_non_terminal() {
        let preds = JobStatus::predecessors(JobStatus::Failed);
        assert_eq!(
            preds,
            vec![JobStatus::Pending, JobStatus::Extracting, JobStatus::Enriching]
        );
    }

    #[test]
    fn merged_jsonld_applies_edits() {
        let mut record = DatasetRecord::new(
            json!({"@graph": [{"@type": "dcat:Dataset", "dct:title": "Test", "dct:license": ""}]}),
            vec!["dct:license".into()],
        );
        record.apply_edit(
            "dct:license",
            json!("https://creativecommons.org/licenses/by/4.0/"),
        );

        let merged = record.merged_jsonld();
        assert_eq!(
            merged["@graph"][0]["dct:license"],
            "https://creativecommons.org/licenses/by/4.0/"
        );
        assert!(record.empty_fields.is_empty());
        // Stored document keeps the generated value.
        assert_eq!(record.jsonld["@graph"][0]["dct:license"], "");
    }

    #[test]
    fn merged_jsonld_without_edits() {
        let record = DatasetRecord::new(json!({"@graph": [{"dct:title": "Test"}]}), vec![]);
        assert_eq!(record.merged_jsonld()["@graph"][0]["dct:title"], "Test");
    }

    #[test]
    fn merge_without_graph_targets_root() {
        let mut edits = Map::new();
        edits.insert("dct:publisher".into(), json!("ACME"));
        let merged = merge_edits(&json!({"dct:title": "Flat"}), &edits);
        assert_eq!(merged["dct:publisher"], "ACME");
    }

    #[test]
    fn merge_with_empty_graph_is_unchanged() {
        let mut edits = Map::new();
        edits.insert("dct:publisher".into(), json!("ACME"));
        let doc = json!({"@graph": []});
        assert_eq!(merge_edits(&doc, &edits), doc);
    }

    #[test]
    fn repeated_edit_is_idempotent() {
        let base = DatasetRecord::new(
            json!({"@graph": [{"dct:license": ""}]}),
            vec!["dct:license".into(), "dct:publisher".into()],
        );

        let mut once = base.clone();
        once.apply_edit("dct:license", json!("CC-BY"));

        let mut twice = base.clone();
        twice.apply_edit("dct:license", json!("CC-BY"));
        twice.apply_edit("dct:license", json!("CC-BY"));

        assert_eq!(once.merged_jsonld(), twice.merged_jsonld());
        assert_eq!(once.empty_fields, twice.empty_fields);
        assert_eq!(twice.empty_fields, vec!["dct:publisher".to_string()]);
    }

    #[test]
    fn edit_outside_required_set_leaves_empty_fields() {
        let mut record = DatasetRecord::new(
            json!({"@graph": [{}]}),
            vec!["dct:license".into()],
        );
        record.apply_edit("dct:title", json!("Renamed"));
        assert_eq!(record.empty_fields, vec!["dct:license".to_string()]);
    }
}
