//! Top-level CLI definition and dispatch.

use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::json;
use thiserror::Error;

use invariant_sentinel::cardgame::{CardGameDriver, card_game_invariants};
use invariant_sentinel::cli::{
    OutputMode, format_duration, paint_severity, parse_faults, resolve_output_mode, truncate,
    write_json_line,
};
use invariant_sentinel::core::config::Config;
use invariant_sentinel::core::errors::SentinelError;
use invariant_sentinel::harness::Harness;
use invariant_sentinel::logger::jsonl::JsonlConfig;
use invariant_sentinel::logger::{ActivityLoggerConfig, spawn_logger};
use invariant_sentinel::session::{RunnerOptions, SessionControl, SessionOptions, run_session};
use invariant_sentinel::store::{HarnessStore, StatsEngine, ViolationRecord};

/// Invariant Sentinel: invariant-based regression harness for turn-based simulations.
#[derive(Debug, Parser)]
#[command(
    name = "sentinel",
    author,
    version,
    about = "Invariant Sentinel - regression harness for turn-based simulations",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Fuzz the reference card game through a monitored session.
    Fuzz(FuzzArgs),
    /// List or export recorded violations.
    Violations(ViolationsArgs),
    /// Show aggregate statistics from the store.
    Stats(StatsArgs),
    /// View configuration state.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct FuzzArgs {
    /// RNG seed; random when omitted. The seed is printed so a session can be replayed.
    #[arg(long, value_name = "N")]
    seed: Option<u64>,
    /// Runs to complete before stopping (overrides `session.target_runs`).
    #[arg(long, value_name = "N", conflicts_with = "forever")]
    runs: Option<u64>,
    /// Run until interrupted.
    #[arg(long)]
    forever: bool,
    /// Record violations without pausing.
    #[arg(long)]
    unattended: bool,
    /// Comma-separated rule faults to inject, or `all`.
    #[arg(long, value_delimiter = ',', value_name = "FAULTS")]
    faults: Vec<String>,
    /// Chance each enabled fault fires when it has the opportunity.
    #[arg(long, value_name = "RATE")]
    fault_rate: Option<f64>,
    /// Action bound per run before it counts as a timeout.
    #[arg(long, value_name = "N")]
    max_steps: Option<u64>,
    /// Delay between runs in milliseconds.
    #[arg(long, value_name = "MILLISECONDS")]
    settle_ms: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct ViolationsArgs {
    /// Maximum rows to print.
    #[arg(long, default_value_t = 20, value_name = "N")]
    top: usize,
    /// Write every record as pretty JSON to this file instead of printing.
    #[arg(long, value_name = "PATH")]
    export: Option<PathBuf>,
    /// Print the latest sample report for this fingerprint.
    #[arg(long, value_name = "FINGERPRINT", conflicts_with = "export")]
    show: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct StatsArgs {
    /// Recent runs to list.
    #[arg(long, default_value_t = 10, value_name = "N")]
    recent: usize,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print the config file path.
    Path,
    /// Print the effective configuration.
    Show,
    /// Validate the configuration and print its hash.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// The session ran but found violations.
    #[error("{0}")]
    Violations(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
            Self::Violations(_) => 4,
        }
    }
}

impl From<SentinelError> for CliError {
    fn from(err: SentinelError) -> Self {
        match err {
            SentinelError::InvalidConfig { .. }
            | SentinelError::MissingConfig { .. }
            | SentinelError::ConfigParse { .. } => Self::User(err.to_string()),
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Fuzz(args) => run_fuzz(cli, args),
        Command::Violations(args) => run_violations(cli, args),
        Command::Stats(args) => run_stats(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("SENTINEL_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

// ---------------------------------------------------------------------------
// fuzz
// ---------------------------------------------------------------------------

fn run_fuzz(cli: &Cli, args: &FuzzArgs) -> Result<(), CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if args.unattended {
        config.monitor.unattended = true;
    }
    let faults = parse_faults(&args.faults, args.fault_rate).map_err(CliError::User)?;
    let seed = args.seed.unwrap_or_else(rand::random::<u64>);
    let mode = output_mode(cli);

    let target_runs = if args.forever {
        None
    } else {
        args.runs.or(config.session.target_runs).or(Some(10))
    };
    let options = RunnerOptions {
        session: SessionOptions {
            target_runs,
            settle_delay: args
                .settle_ms
                .map_or_else(|| config.session.settle_delay(), Duration::from_millis),
        },
        max_steps_per_run: args.max_steps.unwrap_or(config.session.max_steps_per_run),
    };

    let (logger, logger_join) = spawn_logger(ActivityLoggerConfig::new(JsonlConfig::at(
        config.paths.jsonl_log.clone(),
    )))?;
    let unattended = config.monitor.unattended;
    let mut harness = Harness::builder(card_game_invariants()?)
        .config(config)
        .logger(logger.clone())
        .build()?;

    let control = SessionControl::new();
    control.register_signals();
    if !unattended && io::stdin().is_terminal() {
        spawn_stdin_resumer(control.clone());
    }

    if mode == OutputMode::Human {
        println!(
            "{} seed={seed} runs={} faults={} mode={}",
            "fuzz".bold(),
            target_runs.map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
            if args.faults.is_empty() {
                "none".to_string()
            } else {
                args.faults.join(",")
            },
            if unattended { "unattended" } else { "attended" },
        );
        if !unattended {
            println!("  Press Enter (or send SIGUSR1) to resume after a violation pause.");
        }
    }

    let mut driver = CardGameDriver::new(seed, faults);
    let outcome = run_session(&mut driver, &mut harness, &control, options);
    let records = harness.violations().all();
    drop(harness);
    logger.shutdown();
    let _ = logger_join.join();

    let summary = outcome?;
    let records = records?;

    match mode {
        OutputMode::Human => {
            println!();
            println!("{}", summary.render());
            println!("  Seed: {seed}");
            if summary.store_failures > 0 {
                println!(
                    "  {} {} store failures; results may be incomplete",
                    "WARNING".red().bold(),
                    summary.store_failures
                );
            }
            print_violation_table(&records, 10);
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "fuzz",
                "seed": seed,
                "summary": serde_json::to_value(&summary)?,
                "rejected_actions": driver.rejected_actions(),
                "violation_records": records.len(),
            });
            write_json_line(&payload)?;
        }
    }

    if summary.total_violations > 0 {
        return Err(CliError::Violations(format!(
            "{} violations ({} distinct) recorded",
            summary.total_violations,
            records.len()
        )));
    }
    Ok(())
}

/// Attended mode: every line on stdin requests a resume.
fn spawn_stdin_resumer(control: SessionControl) {
    let spawned = thread::Builder::new()
        .name("sen-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                if line.is_err() || control.should_stop() {
                    break;
                }
                control.request_resume();
            }
        });
    if let Err(e) = spawned {
        eprintln!("[SEN-SESSION] stdin resume listener unavailable: {e}");
    }
}

// ---------------------------------------------------------------------------
// violations
// ---------------------------------------------------------------------------

fn open_store(config: &Config) -> Result<Option<HarnessStore>, CliError> {
    if !config.paths.sqlite_db.exists() {
        return Ok(None);
    }
    Ok(Some(HarnessStore::open_with_limit(
        &config.paths.sqlite_db,
        config.store.max_runs,
    )?))
}

fn report_missing_store(cli: &Cli, command: &str, config: &Config) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            println!("No store found at {}.", config.paths.sqlite_db.display());
            println!("  Run `sentinel fuzz` to start collecting results.");
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": command,
                "error": "no_database",
                "db_path": config.paths.sqlite_db.to_string_lossy(),
            }))?;
        }
    }
    Ok(())
}

fn run_violations(cli: &Cli, args: &ViolationsArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let Some(store) = open_store(&config)? else {
        return report_missing_store(cli, "violations", &config);
    };
    let records = store.get_all_violations()?;

    if let Some(path) = &args.export {
        let body = serde_json::to_string_pretty(&records)?;
        std::fs::write(path, body)?;
        match output_mode(cli) {
            OutputMode::Human => {
                println!("Exported {} records to {}", records.len(), path.display());
            }
            OutputMode::Json => write_json_line(&json!({
                "command": "violations export",
                "path": path.to_string_lossy(),
                "records": records.len(),
            }))?,
        }
        return Ok(());
    }

    if let Some(fingerprint) = &args.show {
        let record = store
            .get_violation(fingerprint)?
            .ok_or_else(|| CliError::User(format!("no violation with fingerprint {fingerprint}")))?;
        match output_mode(cli) {
            OutputMode::Human => {
                println!(
                    "{} [{}] seen {}x, first {} last {}",
                    record.fingerprint.bold(),
                    paint_severity(record.severity),
                    record.occurrence_count,
                    record.first_seen.format("%Y-%m-%d %H:%M:%S"),
                    record.last_seen.format("%Y-%m-%d %H:%M:%S"),
                );
                match record.samples.back() {
                    Some(sample) => println!("{}", sample.render()),
                    None => println!("  (no samples retained)"),
                }
            }
            OutputMode::Json => write_json_line(&json!({
                "command": "violations show",
                "record": serde_json::to_value(&record)?,
            }))?,
        }
        return Ok(());
    }

    match output_mode(cli) {
        OutputMode::Human => print_violation_table(&records, args.top),
        OutputMode::Json => {
            let rows: Vec<_> = records
                .iter()
                .take(args.top)
                .map(|r| {
                    json!({
                        "fingerprint": r.fingerprint,
                        "kind": r.kind,
                        "category": r.category.as_str(),
                        "severity": r.severity.as_str(),
                        "occurrence_count": r.occurrence_count,
                        "last_seen": r.last_seen.to_rfc3339(),
                        "synced": r.synced_to_remote,
                        "remote_id": r.remote_id,
                    })
                })
                .collect();
            write_json_line(&json!({
                "command": "violations",
                "total": records.len(),
                "violations": rows,
            }))?;
        }
    }
    Ok(())
}

fn print_violation_table(records: &[ViolationRecord], top: usize) {
    if records.is_empty() {
        println!("  {}", "No violations recorded.".green());
        return;
    }
    println!();
    println!(
        "  {:<32} {:<9} {:>6}  {}",
        "FINGERPRINT", "SEVERITY", "COUNT", "MESSAGE"
    );
    for record in records.iter().take(top) {
        let synced = if record.synced_to_remote { "*" } else { " " };
        println!(
            "  {:<32} {:<9} {:>6}{synced} {}",
            truncate(&record.fingerprint, 32),
            paint_severity(record.severity),
            record.occurrence_count,
            truncate(&record.message, 60),
        );
    }
    if records.len() > top {
        println!("  ... {} more", records.len() - top);
    }
}

// ---------------------------------------------------------------------------
// stats
// ---------------------------------------------------------------------------

fn run_stats(cli: &Cli, args: &StatsArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let Some(store) = open_store(&config)? else {
        return report_missing_store(cli, "stats", &config);
    };
    let engine = StatsEngine::new(&store);

    if output_mode(cli) == OutputMode::Json {
        let payload = json!({
            "command": "stats",
            "stats": engine.export_json()?,
        });
        write_json_line(&payload)?;
        return Ok(());
    }

    let full = engine.full()?;
    println!("{}", "Runs".bold());
    println!(
        "  total {}  avg steps {:.1}  max steps {}  avg duration {}",
        full.runs.total_runs,
        full.runs.avg_steps,
        full.runs.max_steps,
        format_duration(Duration::from_secs_f64(full.runs.avg_duration_ms.max(0.0) / 1000.0)),
    );
    for (outcome, count) in &full.runs.outcomes {
        println!("  {outcome:<8} {count}");
    }

    println!();
    println!("{}", "Violations".bold());
    println!(
        "  {} records, {} occurrences, {} unsynced",
        full.violations.records, full.violations.occurrences, full.violations.unsynced
    );
    for (severity, (records, occurrences)) in &full.violations.by_severity {
        println!("  {severity:<9} {records} records / {occurrences} occurrences");
    }

    if !full.leaderboard.is_empty() {
        println!();
        println!("{}", "Leaderboard".bold());
        for s in &full.leaderboard {
            println!(
                "  {:<12} {:>5.1}% win  {} runs  {}W {}L {}D  {} kills",
                s.subject_id,
                s.win_rate * 100.0,
                s.runs,
                s.wins,
                s.losses,
                s.draws,
                s.kills
            );
        }
    }

    let recent = store.get_runs(args.recent)?;
    if !recent.is_empty() {
        println!();
        println!("{}", "Recent runs".bold());
        for run in &recent {
            println!(
                "  {} #{:<4} {:<8} {:>5} steps  {:>3} violations  winner {}",
                run.started_at.format("%Y-%m-%d %H:%M:%S"),
                run.run_index,
                run.outcome.as_str(),
                run.steps,
                run.violation_count,
                run.winner.as_deref().unwrap_or("-"),
            );
        }
    }

    if let Some(last) = full.metadata.get("last_session_id") {
        println!();
        println!("  Last session: {last}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();
            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => write_json_line(&json!({
                    "command": "config path",
                    "path": path.to_string_lossy(),
                    "exists": exists,
                }))?,
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;
            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => write_json_line(&json!({
                    "command": "config show",
                    "config": serde_json::to_value(&config)?,
                }))?,
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;
                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => write_json_line(&json!({
                        "command": "config validate",
                        "valid": true,
                        "path": config.paths.config_file.to_string_lossy(),
                        "hash": hash,
                    }))?,
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => eprintln!("Configuration is INVALID: {e}"),
                    OutputMode::Json => write_json_line(&json!({
                        "command": "config validate",
                        "valid": false,
                        "code": e.code(),
                        "error": e.to_string(),
                    }))?,
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}
