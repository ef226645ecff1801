use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use dirmirror::daemon::is_daemon_running;
use dirmirror::logging::init_logging;
use dirmirror::{Config, Daemon, EntryOutcome, HealthCheck, SyncEngine, TracingSink};

#[derive(Parser)]
#[command(name = "dirmirror")]
#[command(about = "One-way directory mirroring daemon")]
#[command(version)]
struct Cli {
    /// Directory tree to mirror from
    source_folder: Option<PathBuf>,

    /// Directory tree to mirror into
    replica_folder: Option<PathBuf>,

    /// Pause between passes: seconds, or a duration like 30s, 5m, 1h
    interval_seconds: Option<String>,

    /// Log file receiving one line per event
    log_file: Option<PathBuf>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Run health checks and exit
    #[arg(long)]
    check: bool,

    /// Maximum parallel file copies
    #[arg(long)]
    max_parallel: Option<usize>,

    /// PID file location
    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// Detach and keep running in the background
    #[arg(long)]
    detach: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;

    if cli.check {
        return cmd_check(&config);
    }

    config.validate().context("Invalid configuration")?;

    if !cli.once && is_daemon_running(&config)? {
        bail!(
            "Another dirmirror instance is already running (PID file: {})",
            config.daemon.pid_file
        );
    }

    if cli.detach {
        #[cfg(unix)]
        dirmirror::daemon::detach()?;

        #[cfg(not(unix))]
        bail!("Background mode is not supported on this platform");
    }

    init_logging(
        &config,
        cli.verbose,
        config.logging.console && !cli.detach,
    )?;
    info!("Starting dirmirror v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    if cli.once {
        runtime.block_on(cmd_once(&config))
    } else {
        runtime.block_on(cmd_run(config))
    }
}

/// Load configuration, then apply command line overrides
///
/// Only values read from the config file go through `~`/`$VAR` expansion;
/// command line paths are taken literally.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;

    if let Some(source) = &cli.source_folder {
        config.source_folder = utf8_path(source, "SOURCE_FOLDER")?;
    }
    if let Some(replica) = &cli.replica_folder {
        config.replica_folder = utf8_path(replica, "REPLICA_FOLDER")?;
    }
    if let Some(interval) = &cli.interval_seconds {
        config.sync.interval = interval.clone();
    }
    if let Some(log_file) = &cli.log_file {
        config.daemon.log_file = utf8_path(log_file, "LOG_FILE")?;
    }
    if let Some(max_parallel) = cli.max_parallel {
        config.sync.max_parallel = max_parallel;
    }
    if let Some(pid_file) = &cli.pid_file {
        config.daemon.pid_file = utf8_path(pid_file, "--pid-file")?;
    }

    Ok(config)
}

fn utf8_path(path: &Path, name: &str) -> Result<String> {
    path.to_str()
        .map(str::to_owned)
        .with_context(|| format!("{} is not valid UTF-8: {}", name, path.display()))
}

/// Run the mirror until SIGINT/SIGTERM
async fn cmd_run(config: Config) -> Result<()> {
    let mut daemon = Daemon::new(config, Arc::new(TracingSink))?;
    daemon.run().await?;

    let status = daemon.status();
    info!(
        "Stopped after {} passes ({} clean, {} with failures, {} failed) in {:.1}m",
        status.total_passes,
        status.clean_passes,
        status.passes_with_failures,
        status.failed_passes,
        status.uptime.as_secs_f64() / 60.0
    );

    Ok(())
}

/// Run exactly one pass
async fn cmd_once(config: &Config) -> Result<()> {
    let engine = SyncEngine::new(config, Arc::new(TracingSink))?;
    let summary = engine.run_pass().await?;

    info!(
        "Pass finished in {:.2}s: {} folders created, {} files copied, {} replaced, {} folders and {} files removed",
        summary.duration.as_secs_f64(),
        summary.created_directories,
        summary.copied_files,
        summary.replaced_entries,
        summary.removed_directories,
        summary.removed_files
    );

    if !summary.is_clean() {
        for failure in summary.failures() {
            if let EntryOutcome::Failed {
                path,
                operation,
                error,
            } = failure
            {
                eprintln!("Failed to {} {}: {}", operation, path.display(), error);
            }
        }
        bail!("{} operations failed", summary.failed_operations);
    }

    Ok(())
}

/// Run health checks and print the report
fn cmd_check(config: &Config) -> Result<()> {
    let health = HealthCheck::run(config);
    print_health_report(&health);

    if !health.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    println!("dirmirror preflight checks");
    println!();

    for (name, result) in health.all_checks() {
        let status = if !result.passed {
            "FAIL"
        } else if result.is_warning {
            "WARN"
        } else {
            "OK"
        };
        println!("{}:", name);
        println!("  [{}] {}", status, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("       {}", line);
            }
        }
        println!();
    }

    let warnings = health.warnings().len();
    let errors = health.errors().len();
    if health.all_passed() {
        if warnings == 0 {
            println!("All checks passed");
        } else {
            println!("All checks passed ({} warnings)", warnings);
        }
    } else {
        println!("{} checks failed, {} warnings", errors, warnings);
    }
}
