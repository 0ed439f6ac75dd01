// takrar CLI - beneficiary dedup over CSV exports, headless.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use takrar_engine::engine::{load_csv_records, run};
use takrar_engine::messages::{EngineInput, EngineMessage};
use takrar_engine::model::{CacheDocument, CacheFile, DedupeSummary};
use takrar_engine::{DedupeConfig, EngineError};

mod exit_codes;
use exit_codes::*;

#[derive(Parser)]
#[command(name = "takrar")]
#[command(about = "Deduplicate beneficiary records (CSV in, clusters + findings out)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: blocking, scoring, clustering, audit
    #[command(after_help = "\
Examples:
  takrar run beneficiaries.csv
  takrar run beneficiaries.csv --config takrar.toml --json
  takrar run beneficiaries.csv --output result.json")]
    Run {
        /// CSV input file (header row required)
        input: PathBuf,

        /// Engine configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the result JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write the result JSON to a file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Score every unordered pair without clustering
    #[command(after_help = "\
Examples:
  takrar pairwise sample.csv --output pairs.json")]
    Pairwise {
        /// CSV input file (header row required)
        input: PathBuf,

        /// Engine configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the pairs JSON to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Re-run the audit rules over a cached result document
    #[command(after_help = "\
Examples:
  takrar audit cache.json
  takrar audit cache.json --cache-id import-2024-11")]
    Audit {
        /// Cache file written by the host (JSON, keyed by cache id)
        cache: PathBuf,

        /// Entry to audit; may be omitted when the file holds exactly one
        #[arg(long)]
        cache_id: Option<String>,

        /// Write the findings JSON to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration file without running
    Validate {
        /// Engine configuration (TOML)
        config: PathBuf,
    },
}

#[derive(Debug)]
struct CliError {
    code: u8,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = &err.hint {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(err.code)
        }
    }
}

fn dispatch(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Run {
            input,
            config,
            json,
            output,
        } => cmd_run(&input, config.as_deref(), json, output.as_deref()),
        Commands::Pairwise {
            input,
            config,
            output,
        } => cmd_pairwise(&input, config.as_deref(), output.as_deref()),
        Commands::Audit {
            cache,
            cache_id,
            output,
        } => cmd_audit(&cache, cache_id.as_deref(), output.as_deref()),
        Commands::Validate { config } => cmd_validate(&config),
    }
}

fn engine_exit_code(err: &EngineError) -> u8 {
    match err {
        EngineError::ConfigParse(_) | EngineError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        EngineError::CsvParse(_) | EngineError::CacheParse(_) => EXIT_INPUT_PARSE,
        EngineError::Cancelled => EXIT_CANCELLED,
        EngineError::Internal(_) => EXIT_RUNTIME,
    }
}

fn engine_err(err: EngineError) -> CliError {
    CliError::new(engine_exit_code(&err), err.to_string())
}

fn read_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|e| {
        CliError::new(EXIT_RUNTIME, format!("cannot read {}: {e}", path.display()))
    })
}

fn load_config(path: Option<&Path>) -> Result<Option<DedupeConfig>, CliError> {
    match path {
        None => Ok(None),
        Some(path) => {
            let text = read_file(path)?;
            let config = DedupeConfig::from_toml(&text).map_err(engine_err)?;
            Ok(Some(config))
        }
    }
}

fn build_input(
    csv_path: &Path,
    config_path: Option<&Path>,
    pairwise_only: bool,
) -> Result<EngineInput, CliError> {
    let csv_data = read_file(csv_path)?;
    let records = load_csv_records(&csv_data).map_err(engine_err)?;
    Ok(EngineInput {
        records,
        mapping: None,
        options: load_config(config_path)?,
        pairwise_only,
    })
}

fn write_json(json: &str, to_stdout: bool, output: Option<&Path>) -> Result<(), CliError> {
    if let Some(path) = output {
        std::fs::write(path, json).map_err(|e| {
            CliError::new(EXIT_RUNTIME, format!("cannot write {}: {e}", path.display()))
        })?;
        eprintln!("wrote {}", path.display());
    }
    if to_stdout {
        println!("{json}");
    }
    Ok(())
}

fn cmd_run(
    input: &Path,
    config: Option<&Path>,
    json: bool,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let engine_input = build_input(input, config, false)?;

    let cancel = AtomicBool::new(false);
    let mut sink = |message: EngineMessage| {
        if let EngineMessage::Progress(p) = &message {
            tracing::debug!(status = %p.status, progress = p.progress, "engine progress");
        }
    };
    let result = run(&engine_input, &mut sink, &cancel).map_err(engine_err)?;

    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| CliError::new(EXIT_RUNTIME, format!("JSON serialization error: {e}")))?;
    write_json(&json_str, json, output)?;

    eprintln!("{}", human_summary(&result.summary));
    Ok(())
}

fn cmd_pairwise(
    input: &Path,
    config: Option<&Path>,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let engine_input = build_input(input, config, true)?;

    let cancel = AtomicBool::new(false);
    let mut pairs_json: Option<serde_json::Value> = None;
    let mut sink = |message: EngineMessage| {
        if let EngineMessage::PairwiseResult(pairwise) = &message {
            pairs_json = serde_json::to_value(pairwise).ok();
        }
    };
    run(&engine_input, &mut sink, &cancel).map_err(engine_err)?;

    let pairs = pairs_json
        .ok_or_else(|| CliError::new(EXIT_RUNTIME, "engine emitted no pairwise result"))?;
    let json_str = serde_json::to_string_pretty(&pairs)
        .map_err(|e| CliError::new(EXIT_RUNTIME, format!("JSON serialization error: {e}")))?;
    write_json(&json_str, output.is_none(), output)?;
    Ok(())
}

fn cmd_audit(
    cache: &Path,
    cache_id: Option<&str>,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let text = read_file(cache)?;
    let file: CacheFile = serde_json::from_str(&text)
        .map_err(|e| CliError::new(EXIT_INPUT_PARSE, format!("malformed cache file: {e}")))?;
    let (id, document) = select_cache_entry(&file, cache_id)?;

    let findings = takrar_engine::audit::run_audit(&document.rows, &document.clusters);
    eprintln!(
        "audit of '{id}': {} clusters, {} findings",
        document.clusters.len(),
        findings.len()
    );

    let json_str = serde_json::to_string_pretty(&serde_json::json!({ "findings": findings }))
        .map_err(|e| CliError::new(EXIT_RUNTIME, format!("JSON serialization error: {e}")))?;
    write_json(&json_str, output.is_none(), output)?;
    Ok(())
}

fn select_cache_entry<'a>(
    file: &'a CacheFile,
    cache_id: Option<&str>,
) -> Result<(&'a str, &'a CacheDocument), CliError> {
    match cache_id {
        Some(id) => file
            .get_key_value(id)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| {
                CliError::new(EXIT_INPUT_PARSE, format!("cache id '{id}' not found"))
            }),
        None if file.len() == 1 => {
            let (k, v) = file.iter().next().unwrap();
            Ok((k.as_str(), v))
        }
        None => {
            let mut err = CliError::new(
                EXIT_INPUT_PARSE,
                format!("cache file holds {} entries", file.len()),
            );
            err.hint = Some("pass --cache-id to pick one".into());
            Err(err)
        }
    }
}

fn cmd_validate(config: &Path) -> Result<(), CliError> {
    let text = read_file(config)?;
    let parsed = DedupeConfig::from_toml(&text).map_err(engine_err)?;
    eprintln!(
        "config OK: minPair={} minInternal={} blockChunkSize={} polygamyRules={}",
        parsed.thresholds.min_pair,
        parsed.thresholds.min_internal,
        parsed.thresholds.block_chunk_size,
        parsed.rules.enable_polygamy_rules,
    );
    Ok(())
}

fn human_summary(summary: &DedupeSummary) -> String {
    format!(
        "dedup: {} rows — {} clusters covering {} records, {} singletons; \
         {} findings (high {}, medium {}); {} edges used of {} scored",
        summary.total_rows,
        summary.clusters,
        summary.clustered_rows,
        summary.singletons,
        summary.findings_high + summary.findings_medium + summary.findings_low,
        summary.findings_high,
        summary.findings_medium,
        summary.edges_used,
        summary.edges_scored,
    )
}
