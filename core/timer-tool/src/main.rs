//! timer-tool: maintenance and diagnostics for Client Timer data.
//!
//! Operates on the same data root as the app. Do not run it while the app is
//! open; the state file has a single writer. Every subcommand except `prune`
//! opens the engine, so a pending migration or daily rollover happens here too.
//!
//! ## Subcommands
//!
//! - `inspect`: paths, load outcome, timers, snapshot retention preview
//! - `snapshot`: take a high-priority snapshot now
//! - `prune`: apply tiered retention to the snapshot directory
//! - `run`: drive the engine tick loop for a while, then shut down

use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand};
use timer_core::{
    init_logging, plan_retention, CoreConfig, SnapshotPriority, SnapshotStore, StorageConfig,
    TimerEngine,
};

#[derive(Parser)]
#[command(name = "timer-tool")]
#[command(about = "Client Timer state maintenance")]
#[command(version)]
struct Cli {
    /// Data root (defaults to the platform data directory)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show paths, the loaded state, and what retention would keep
    Inspect {
        /// Print the loaded document as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Take a high-priority snapshot of the current state
    Snapshot {
        #[arg(long, default_value = "manual")]
        reason: String,
    },

    /// Delete snapshots outside the retention tiers
    Prune,

    /// Run the tick loop once per second
    Run {
        /// Number of ticks before shutting down
        #[arg(long, default_value_t = 60)]
        ticks: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let storage = match cli.root {
        Some(root) => StorageConfig::with_root(root),
        None => match StorageConfig::from_platform() {
            Ok(storage) => storage,
            Err(e) => fail(&e.to_string()),
        },
    };

    let _logging_guard = match init_logging(&storage.logs_dir()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: file logging disabled: {}", e);
            None
        }
    };

    let config = match CoreConfig::load(storage.clone()) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring core config; using defaults");
            eprintln!("warning: {}; using defaults", e);
            CoreConfig::new(storage)
        }
    };

    let result = match cli.command {
        Commands::Inspect { json } => inspect(config, json),
        Commands::Snapshot { reason } => snapshot(config, &reason),
        Commands::Prune => prune(config),
        Commands::Run { ticks } => run(config, ticks),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "timer-tool failed");
        fail(&e);
    }
}

fn fail(message: &str) -> ! {
    eprintln!("error: {}", message);
    process::exit(1);
}

fn inspect(config: CoreConfig, json: bool) -> Result<(), String> {
    let storage = config.storage.clone();
    let snapshots = SnapshotStore::new(storage.snapshots_dir(), config.retention_tiers.clone());
    let mut engine = TimerEngine::open(config);

    if json {
        let document = engine.document();
        let rendered = serde_json::to_string_pretty(&document).map_err(|e| e.to_string())?;
        println!("{}", rendered);
        return Ok(());
    }

    println!("root:               {}", storage.root().display());
    println!("state file:         {}", storage.state_file().display());
    println!("snapshots:          {}", storage.snapshots_dir().display());
    println!("completed sessions: {}", storage.completed_sessions_dir().display());
    println!("legacy root:        {}", storage.legacy_root().display());
    println!();
    println!("load source:        {:?}", engine.load_source());
    if !engine.defaulted().is_empty() {
        println!("defaulted fields:   {}", engine.defaulted().join(", "));
    }
    println!("session start:      {}", engine.session_start().to_rfc3339());
    if engine.settings().daily_reset_enabled() {
        println!(
            "daily reset:        {}",
            engine.settings().daily_reset_time().format("%H:%M")
        );
    }
    println!(
        "snapshot interval:  {} min",
        engine.settings().snapshot_min_minutes()
    );

    println!();
    println!("timers:");
    for timer in engine.timers() {
        let name = engine
            .layout()
            .row(timer.id())
            .map(|row| row.name.as_str())
            .unwrap_or("?");
        println!(
            "  {:>4}  {:<24} {:>10}{}",
            timer.id(),
            name,
            format_elapsed(timer.current_elapsed()),
            if timer.is_running() { "  (running)" } else { "" }
        );
    }

    let entries = snapshots.list();
    let keep = plan_retention(&entries, Local::now().naive_local(), snapshots.tiers());
    println!();
    println!(
        "snapshots: {} ({} kept by retention, {} would be pruned)",
        entries.len(),
        keep.len(),
        entries.len().saturating_sub(keep.len())
    );
    for entry in &entries {
        let marker = if keep.contains(&entry.file_name) { "keep " } else { "prune" };
        println!("  {}  {}", marker, entry.file_name);
    }

    println!();
    println!("completed sessions: {}", engine.finalizer().list().len());
    Ok(())
}

fn snapshot(config: CoreConfig, reason: &str) -> Result<(), String> {
    let mut engine = TimerEngine::open(config);
    let path = engine
        .request_snapshot(reason, SnapshotPriority::High)?
        .ok_or_else(|| "snapshot was deferred".to_string())?;
    println!("{}", path.display());
    Ok(())
}

fn prune(config: CoreConfig) -> Result<(), String> {
    let snapshots = SnapshotStore::new(config.storage.snapshots_dir(), config.retention_tiers);
    let stats = snapshots.prune();
    println!("kept {}, deleted {}", stats.kept, stats.deleted);
    for error in &stats.errors {
        eprintln!("warning: {}", error);
    }
    Ok(())
}

fn run(config: CoreConfig, ticks: u64) -> Result<(), String> {
    let mut engine = TimerEngine::open(config);
    report_errors(&engine.startup_report().errors);

    for _ in 0..ticks {
        thread::sleep(Duration::from_secs(1));
        let report = engine.tick();
        if let Some(path) = &report.completed_session {
            println!("completed session: {}", path.display());
        }
        if let Some(path) = &report.snapshot {
            println!("snapshot: {}", path.display());
        }
        report_errors(&report.errors);
    }

    let path = engine.shutdown()?;
    println!("snapshot: {}", path.display());
    Ok(())
}

fn report_errors(errors: &[String]) {
    for error in errors {
        eprintln!("warning: {}", error);
    }
}

fn format_elapsed(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
