//! Global LAD - command-line front-end
//!
//! The entry point for `lad`, handling:
//! - Offline replay of JSONL record streams into a store
//! - Configuration inspection and validation
//! - Memory-threshold status for the current process

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use lad_common::{Error, Representation, StructuredError};
use lad_config::{LadConfig, ResolvedPath, ValidationError};
use lad_core::exit_codes::ExitCode;
use lad_core::logging::{generate_run_id, init_logging, LogConfig, LogFormat, LogLevel};
use lad_core::replay::replay_file;
use lad_store::prelude::*;
use lad_store::{
    render_query, ContainerTree, MemoryProbe, MemoryThresholdChecker, ProcMemoryProbe,
    QueryOptions, Reaper, RecordBudgetProbe, ScopePath, SearchPredicate,
};
use serde_json::json;
use tracing::{debug, info};

/// Global LAD - in-memory latest-available-data store tools
#[derive(Parser)]
#[command(name = "lad")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Configuration file (JSON or TOML)
    #[arg(long, global = true, env = "LAD_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a JSONL record stream, run one reaper pass, print the result
    Replay(ReplayArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Report memory occupancy against the reaper threshold
    Memory(MemoryArgs),
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct ReplayArgs {
    /// JSONL file, one record per line
    file: PathBuf,

    /// Restrict output to this scope (host/session/kind/identifier prefix)
    #[arg(long, default_value = "/")]
    scope: String,

    /// Most recent records per leaf in the output
    #[arg(long, default_value_t = 1)]
    limit: usize,

    /// Payload representation (json, numeric, text, raw)
    #[arg(long, default_value = "json")]
    repr: String,

    /// Evaluate pressure against a record budget instead of process memory
    #[arg(long)]
    record_budget: Option<u64>,

    /// Override the configured memory threshold (percent)
    #[arg(long)]
    threshold: Option<f64>,

    /// Skip the reaper pass
    #[arg(long)]
    no_reap: bool,

    /// Print counts and summary only, no records
    #[arg(long)]
    summary_only: bool,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration and where it came from
    Show,
    /// Validate a configuration file (defaults to the resolved one)
    Validate { path: Option<PathBuf> },
}

#[derive(Args, Debug)]
struct MemoryArgs {
    /// Override the configured memory threshold (percent)
    #[arg(long)]
    threshold: Option<f64>,
}

fn main() {
    let cli = Cli::parse();

    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let run_id = generate_run_id();
    debug!(run_id = %run_id, "lad started");

    let exit_code = match &cli.command {
        Commands::Replay(args) => run_replay(&cli.global, args, &run_id),
        Commands::Config(args) => match &args.command {
            ConfigCommands::Show => run_config_show(&cli.global, &run_id),
            ConfigCommands::Validate { path } => {
                run_config_validate(&cli.global, path.as_deref(), &run_id)
            }
        },
        Commands::Memory(args) => run_memory(&cli.global, args, &run_id),
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Output helpers
// ============================================================================

fn print_json(value: &serde_json::Value) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::Clean
        }
        Err(e) => output_error(&Error::from(e), None),
    }
}

/// Write a structured error to stderr and pick the exit code.
fn output_error(error: &Error, run_id: Option<&str>) -> ExitCode {
    let mut structured = StructuredError::from(error);
    if let Some(run_id) = run_id {
        structured = structured.with_context("run_id", run_id);
    }
    eprintln!("{}", structured.to_json());
    ExitCode::for_error(error)
}

fn output_config_error(error: &ValidationError, run_id: &str) -> ExitCode {
    let response = json!({
        "run_id": run_id,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "status": "error",
        "error": {
            "code": error.code(),
            "message": error.to_string(),
        }
    });
    eprintln!("{}", response);
    ExitCode::UsageError
}

fn load_config(global: &GlobalOpts, run_id: &str) -> Result<(LadConfig, ResolvedPath), ExitCode> {
    if let Some(path) = &global.config {
        if !path.exists() {
            let err = ValidationError::IoError(format!("{} does not exist", path.display()));
            return Err(output_config_error(&err, run_id));
        }
    }
    LadConfig::load(global.config.as_deref()).map_err(|e| output_config_error(&e, run_id))
}

fn source_json(resolved: &ResolvedPath) -> serde_json::Value {
    json!({
        "path": resolved.path.as_ref().map(|p| p.display().to_string()),
        "source": resolved.source.to_string(),
        "using_defaults": resolved.path.is_none(),
    })
}

fn parse_representation(value: &str) -> Option<Representation> {
    serde_json::from_value(json!(value.to_lowercase())).ok()
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_replay(global: &GlobalOpts, args: &ReplayArgs, run_id: &str) -> ExitCode {
    let (config, resolved) = match load_config(global, run_id) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let scope = match ScopePath::parse(&args.scope) {
        Ok(scope) => scope,
        Err(e) => return output_error(&e, Some(run_id)),
    };
    let Some(repr) = parse_representation(&args.repr) else {
        let err = Error::Config(format!("unknown representation: {}", args.repr));
        return output_error(&err, Some(run_id));
    };

    let tree = Arc::new(ContainerTree::new(config.store.clone()));
    let ingest = match replay_file(&args.file, &tree) {
        Ok(summary) => summary,
        Err(e) => return output_error(&e, Some(run_id)),
    };

    let threshold = args
        .threshold
        .unwrap_or(config.reaper.memory_threshold_percent);
    let probe: Arc<dyn MemoryProbe> = match args.record_budget {
        Some(budget) => Arc::new(RecordBudgetProbe::new(Arc::clone(&tree), budget)),
        None => Arc::new(ProcMemoryProbe::default()),
    };
    let checker = MemoryThresholdChecker::new(probe, threshold);

    let reap = if config.reaper.enabled && !args.no_reap {
        let reaper = Reaper::new(Arc::clone(&tree), checker, config.reaper.clone());
        Some(reaper.run_pass())
    } else {
        None
    };

    let predicate = SearchPredicate::scope(&scope);
    let summary = tree.summarize(&predicate);
    let records = if args.summary_only {
        None
    } else {
        let result = tree.query(&predicate, &QueryOptions::limit(args.limit));
        match render_query(&result, repr, config.store.primary_time) {
            Ok(rendered) => Some(rendered),
            Err(e) => return output_error(&e, Some(run_id)),
        }
    };

    info!(
        run_id = %run_id,
        stored = tree.record_count(),
        scope = %scope,
        "replay complete"
    );

    let capacity_error = reap.as_ref().and_then(|r| r.capacity_error());
    let response = json!({
        "run_id": run_id,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "config": source_json(&resolved),
        "ingest": ingest,
        "reap": reap,
        "stats": tree.stats(),
        "scope": scope.to_string(),
        "summary": summary,
        "result": records,
    });
    let code = print_json(&response);
    match capacity_error {
        Some(err) if code.is_success() => output_error(&err, Some(run_id)),
        _ => code,
    }
}

fn run_config_show(global: &GlobalOpts, run_id: &str) -> ExitCode {
    let (config, resolved) = match load_config(global, run_id) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    print_json(&json!({
        "run_id": run_id,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "source": source_json(&resolved),
        "config": config,
    }))
}

fn run_config_validate(global: &GlobalOpts, path: Option<&Path>, run_id: &str) -> ExitCode {
    let (config, resolved) = match path {
        Some(path) => {
            let config = match LadConfig::from_file(path) {
                Ok(config) => config,
                Err(e) => return output_config_error(&e, run_id),
            };
            if let Err(e) = lad_config::validate_config(&config) {
                return output_config_error(&e, run_id);
            }
            let resolved = ResolvedPath {
                path: Some(path.to_path_buf()),
                source: lad_config::ConfigSource::CliArgument,
            };
            (config, resolved)
        }
        None => match load_config(global, run_id) {
            Ok(loaded) => loaded,
            Err(code) => return code,
        },
    };
    print_json(&json!({
        "run_id": run_id,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "status": "valid",
        "source": source_json(&resolved),
        "schema_version": config.schema_version,
    }))
}

fn run_memory(global: &GlobalOpts, args: &MemoryArgs, run_id: &str) -> ExitCode {
    let (config, _) = match load_config(global, run_id) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let threshold = args
        .threshold
        .unwrap_or(config.reaper.memory_threshold_percent);
    let checker = MemoryThresholdChecker::for_process(threshold);
    print_json(&json!({
        "run_id": run_id,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "memory": checker.status(),
    }))
}
