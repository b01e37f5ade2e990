//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};
use tiki_core::{Pipeline, ProgressReporter};
use tiki_server::upload::save_upload;
use tiki_shared::{
    AppConfig, DatasetRecord, Job, JobId, JobStatus, TikiError, init_config, load_config,
    load_config_from,
};
use tiki_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Tiki: turn documents into DCAT-AP dataset records.
#[derive(Parser)]
#[command(
    name = "tiki",
    version,
    about = "Extract, enrich and publish document metadata as DCAT-AP JSON-LD.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.tiki/tiki.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Address to bind (overrides `[server] bind`).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the pipeline on a local file and print the record.
    Enrich {
        /// Document to process.
        file: PathBuf,
    },

    /// Show a job and its record.
    Show {
        /// Job ID.
        id: String,
    },

    /// Set a field on a job's record.
    Edit {
        /// Job ID.
        id: String,

        /// Field name on the dataset node (e.g. dct:license).
        #[arg(long)]
        field: String,

        /// New value. Parsed as JSON, falling back to a plain string.
        #[arg(long)]
        value: String,
    },

    /// Mark a job's record as finalized.
    Finalize {
        /// Job ID.
        id: String,
    },

    /// List jobs, newest first.
    List {
        /// Maximum number of jobs to show.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "tiki=info,tower_http=info",
        1 => "tiki=debug,tower_http=debug",
        _ => "tiki=trace,tower_http=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so command output on stdout stays machine-readable.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Serve { bind } => cmd_serve(config_path, bind).await,
        Command::Enrich { file } => cmd_enrich(config_path, &file).await,
        Command::Show { id } => cmd_show(config_path, &id).await,
        Command::Edit { id, field, value } => cmd_edit(config_path, &id, &field, &value).await,
        Command::Finalize { id } => cmd_finalize(config_path, &id).await,
        Command::List { limit } => cmd_list(config_path, limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

/// Load the config from `--config` or the default location, with env
/// overrides applied.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => {
            let mut config = load_config_from(path)?;
            config.apply_env_overrides();
            config.validate()?;
            config
        }
        None => load_config()?,
    };
    Ok(config)
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    Ok(Storage::open(Path::new(&config.storage.database_path)).await?)
}

fn parse_job_id(raw: &str) -> Result<JobId> {
    raw.parse()
        .map_err(|e| eyre!("invalid job id '{raw}': {e}"))
}

/// Interpret `--value` as JSON when it parses, otherwise as a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(config_path: Option<&Path>, bind: Option<String>) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    println!("Serving Tiki API on http://{}", config.server.bind);
    tiki_server::serve(&config).await?;
    Ok(())
}

async fn cmd_enrich(config_path: Option<&Path>, file: &Path) -> Result<()> {
    let config = resolve_config(config_path)?;

    let bytes = tokio::fs::read(file)
        .await
        .map_err(|e| TikiError::io(file, e))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| eyre!("'{}' has no file name", file.display()))?;

    let storage = Arc::new(open_storage(&config).await?);
    let pipeline = Pipeline::from_config(&config, storage.clone())?;

    let stored = save_upload(Path::new(&config.storage.media_dir), &filename, &bytes).await?;
    let job = Job::new(stored.to_string_lossy(), filename, bytes.len() as u64);
    storage.create_job(&job).await?;

    info!(
        job_id = %job.id,
        file = %file.display(),
        enrichment = pipeline.enrichment_enabled(),
        "enriching document"
    );

    let reporter = CliProgress::new();
    let record = pipeline.run(&job, &reporter).await?;

    print_json(&json!({
        "id": job.id.to_string(),
        "status": JobStatus::Completed,
        "jsonld": record.jsonld,
        "empty_fields": record.empty_fields,
    }))
}

async fn cmd_show(config_path: Option<&Path>, raw_id: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;
    let id = parse_job_id(raw_id)?;

    let job = storage
        .get_job(&id)
        .await?
        .ok_or_else(|| eyre!("job {id} not found"))?;

    let mut out = json!({
        "id": job.id.to_string(),
        "status": job.status,
        "original_filename": job.original_filename,
        "file_size": job.file_size,
        "created_at": job.created_at,
        "updated_at": job.updated_at,
    });

    if let Some(message) = &job.error_message {
        out["error"] = json!(message);
    }
    if let Some(record) = storage.get_dataset_record(&id).await? {
        out["jsonld"] = record.merged_jsonld();
        out["empty_fields"] = json!(record.empty_fields);
        out["is_finalized"] = json!(record.is_finalized);
    }

    print_json(&out)
}

async fn cmd_edit(config_path: Option<&Path>, raw_id: &str, field: &str, value: &str) -> Result<()> {
    if field.is_empty() {
        return Err(eyre!("--field must not be empty"));
    }
    let value = parse_value(value);
    if value.is_null() {
        return Err(eyre!("--value must not be null"));
    }

    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;
    let id = parse_job_id(raw_id)?;

    let record: DatasetRecord = storage.apply_field_edit(&id, field, value).await?;
    info!(job_id = %id, field, "field edited");

    print_json(&json!({
        "id": id.to_string(),
        "jsonld": record.merged_jsonld(),
        "empty_fields": record.empty_fields,
    }))
}

async fn cmd_finalize(config_path: Option<&Path>, raw_id: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;
    let id = parse_job_id(raw_id)?;

    storage.set_finalized(&id, true).await?;
    println!("Record for job {id} finalized.");
    Ok(())
}

async fn cmd_list(config_path: Option<&Path>, limit: u32) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    let jobs = storage.list_jobs(limit).await?;
    if jobs.is_empty() {
        println!("No jobs yet.");
        return Ok(());
    }

    for job in jobs {
        println!(
            "{}  {:<10}  {}  {}",
            job.id,
            job.status.as_str(),
            job.created_at.format("%Y-%m-%d %H:%M"),
            job.original_filename
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        spinner.set_message("Starting");
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, job: &Job, status: JobStatus) {
        let message = match status {
            JobStatus::Extracting => format!("Extracting text from {}", job.original_filename),
            JobStatus::Enriching => "Asking the model for themes and keywords".to_string(),
            JobStatus::Completed => "Building DCAT-AP record".to_string(),
            other => other.to_string(),
        };
        self.spinner.set_message(message);
    }

    fn done(&self, _job: &Job, _record: &DatasetRecord) {
        self.spinner.finish_and_clear();
    }

    fn failed(&self, job: &Job, error: &TikiError) {
        self.spinner
            .abandon_with_message(format!("{} failed: {error}", job.original_filename));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_parsing_prefers_json() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value(r#"{"@id": "x"}"#), json!({"@id": "x"}));
        assert_eq!(parse_value("\"quoted\""), json!("quoted"));
        assert_eq!(
            parse_value("https://creativecommons.org/licenses/by/4.0/"),
            json!("https://creativecommons.org/licenses/by/4.0/")
        );
    }

    #[test]
    fn edit_arguments_parse() {
        let cli = Cli::try_parse_from([
            "tiki",
            "edit",
            "0190f2c4-0000-7000-8000-000000000000",
            "--field",
            "dct:license",
            "--value",
            "CC-BY-4.0",
        ])
        .unwrap();
        match cli.command {
            Command::Edit { field, value, .. } => {
                assert_eq!(field, "dct:license");
                assert_eq!(value, "CC-BY-4.0");
            }
            _ => panic!("expected edit"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["tiki", "list", "-vv", "--config", "/tmp/tiki.toml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/tiki.toml")));
    }

    #[test]
    fn invalid_job_id_is_reported() {
        assert!(parse_job_id("nope").is_err());
    }
}
