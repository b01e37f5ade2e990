//! SQL migration definitions for the Tiki database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: uploads and the three stage output tables",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per uploaded document
CREATE TABLE IF NOT EXISTS uploads (
    id                TEXT PRIMARY KEY,
    file_path         TEXT NOT NULL,
    original_filename TEXT NOT NULL,
    file_size         INTEGER NOT NULL,
    status            TEXT NOT NULL DEFAULT 'pending',
    error_message     TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_uploads_created_at ON uploads(created_at);

-- Stage 1: extraction service output
CREATE TABLE IF NOT EXISTS extraction_results (
    upload_id         TEXT PRIMARY KEY REFERENCES uploads(id) ON DELETE CASCADE,
    mime_type         TEXT NOT NULL DEFAULT '',
    language          TEXT NOT NULL DEFAULT '',
    author            TEXT NOT NULL DEFAULT '',
    title             TEXT NOT NULL DEFAULT '',
    created_date      TEXT,
    modified_date     TEXT,
    full_text         TEXT NOT NULL DEFAULT '',
    raw_metadata_json TEXT NOT NULL DEFAULT '{}'
);

-- Stage 2: enrichment service output
CREATE TABLE IF NOT EXISTS enrichment_results (
    upload_id               TEXT PRIMARY KEY REFERENCES uploads(id) ON DELETE CASCADE,
    suggested_themes_json   TEXT NOT NULL DEFAULT '[]',
    generated_description   TEXT NOT NULL DEFAULT '',
    suggested_keywords_json TEXT NOT NULL DEFAULT '[]',
    prompt_used             TEXT NOT NULL DEFAULT '',
    raw_response_json       TEXT NOT NULL DEFAULT '{}',
    model_used              TEXT NOT NULL DEFAULT ''
);

-- Stage 3: DCAT-AP record and human edits
CREATE TABLE IF NOT EXISTS dataset_records (
    upload_id         TEXT PRIMARY KEY REFERENCES uploads(id) ON DELETE CASCADE,
    jsonld_json       TEXT NOT NULL DEFAULT '{}',
    empty_fields_json TEXT NOT NULL DEFAULT '[]',
    user_edits_json   TEXT NOT NULL DEFAULT '{}',
    is_finalized      INTEGER NOT NULL DEFAULT 0
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
