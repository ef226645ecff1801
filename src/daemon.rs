//! Daemon Infrastructure - Runs mirror passes on an interval until shutdown
//!
//! This module provides the pass scheduler: PID file management, signal
//! handling, and the loop that runs a pass, then waits out the interval.
//! Shutdown is only honored between passes, so a pass in flight always
//! finishes and the replica is never left half-pruned.

use crate::events::EventSink;
use crate::sync::{PassSummary, SyncEngine};
use crate::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Daemon state and control
pub struct Daemon {
    config: Arc<Config>,
    sync_engine: SyncEngine,
    interval: Duration,
    shutdown_sender: broadcast::Sender<()>,
    shutdown_receiver: broadcast::Receiver<()>,
    is_running: Arc<AtomicBool>,
    pid_file_path: Option<PathBuf>,
    started_at: Instant,
    stats: PassStats,
}

/// Handle for stopping a running daemon from another task
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: broadcast::Sender<()>,
    is_running: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Ask the daemon to stop after the current pass
    pub fn shutdown(&self) {
        self.is_running.store(false, Ordering::SeqCst);
        let _ = self.sender.send(());
    }
}

#[derive(Debug, Clone, Default)]
struct PassStats {
    last_pass: Option<Instant>,
    total_passes: u64,
    clean_passes: u64,
    passes_with_failures: u64,
    failed_passes: u64,
}

/// Daemon statistics and status
#[derive(Debug, Clone)]
pub struct DaemonStatus {
    pub is_running: bool,
    pub uptime: Duration,
    pub interval: Duration,
    pub last_pass: Option<Instant>,
    pub total_passes: u64,
    pub clean_passes: u64,
    pub passes_with_failures: u64,
    pub failed_passes: u64,
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new(config: Config, sink: Arc<dyn EventSink>) -> Result<Self> {
        config.validate().context("Invalid daemon configuration")?;

        let interval = config.interval()?;
        let sync_engine =
            SyncEngine::new(&config, sink).context("Failed to create sync engine for daemon")?;

        let (shutdown_sender, shutdown_receiver) = broadcast::channel(1);
        let pid_file_path = config.pid_file_path();

        Ok(Self {
            config: Arc::new(config),
            sync_engine,
            interval,
            shutdown_sender,
            shutdown_receiver,
            is_running: Arc::new(AtomicBool::new(false)),
            pid_file_path,
            started_at: Instant::now(),
            stats: PassStats::default(),
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: self.shutdown_sender.clone(),
            is_running: self.is_running.clone(),
        }
    }

    /// Run the daemon in the foreground until SIGINT/SIGTERM or a shutdown request
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Starting dirmirror daemon: {} -> {}",
            self.config.source_folder, self.config.replica_folder
        );

        self.write_pid_file().context("Failed to write PID file")?;

        self.is_running.store(true, Ordering::SeqCst);
        self.started_at = Instant::now();

        // Spawn shutdown signal handler
        let handle = self.shutdown_handle();
        let signal_task = tokio::spawn(async move {
            Self::wait_for_shutdown_signal().await;
            info!("Shutdown signal received, stopping after the current pass...");
            handle.shutdown();
        });

        let result = self.daemon_loop().await;

        signal_task.abort();
        self.cleanup().context("Failed to cleanup daemon")?;

        result
    }

    /// Get current daemon status
    pub fn status(&self) -> DaemonStatus {
        DaemonStatus {
            is_running: self.is_running.load(Ordering::SeqCst),
            uptime: self.started_at.elapsed(),
            interval: self.interval,
            last_pass: self.stats.last_pass,
            total_passes: self.stats.total_passes,
            clean_passes: self.stats.clean_passes,
            passes_with_failures: self.stats.passes_with_failures,
            failed_passes: self.stats.failed_passes,
        }
    }

    /// Main daemon loop - pass, then sleep, until told to stop
    async fn daemon_loop(&mut self) -> Result<()> {
        let interval = self.interval;
        info!("Daemon loop started with interval: {:?}", interval);

        loop {
            if !self.is_running.load(Ordering::SeqCst) {
                break;
            }

            self.run_scheduled_pass().await;

            tokio::select! {
                biased;

                _ = self.shutdown_receiver.recv() => {
                    info!("Shutdown signal received in daemon loop");
                    break;
                }

                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Daemon loop exiting");
        Ok(())
    }

    async fn run_scheduled_pass(&mut self) {
        debug!("Starting scheduled pass");
        let pass_start = Instant::now();

        self.stats.total_passes += 1;
        self.stats.last_pass = Some(pass_start);

        match self.sync_engine.run_pass().await {
            Ok(summary) => {
                if summary.is_clean() {
                    self.stats.clean_passes += 1;
                } else {
                    self.stats.passes_with_failures += 1;
                }
                self.log_pass_success(&summary);
            }
            Err(e) => {
                self.stats.failed_passes += 1;
                self.log_pass_failure(&e);
            }
        }
    }

    /// Wait for shutdown signals (SIGTERM, SIGINT)
    async fn wait_for_shutdown_signal() {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => debug!("Ctrl+C received"),
                        _ = sigterm.recv() => debug!("SIGTERM received"),
                    }
                    return;
                }
                Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
            }
        }

        if let Err(e) = tokio::signal::ctrl_c().await {
            // Without a signal listener only an explicit shutdown request stops us
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        debug!("Ctrl+C received");
    }

    /// Write PID file for daemon process management
    fn write_pid_file(&self) -> Result<()> {
        if let Some(pid_file) = &self.pid_file_path {
            let pid = std::process::id();

            // Create parent directories if they don't exist
            if let Some(parent) = pid_file.parent() {
                fs::create_dir_all(parent).context("Failed to create PID file directory")?;
            }

            fs::write(pid_file, pid.to_string()).context("Failed to write PID file")?;

            info!("PID file written: {} (PID: {})", pid_file.display(), pid);
        }

        Ok(())
    }

    /// Remove PID file and perform cleanup
    fn cleanup(&self) -> Result<()> {
        if let Some(pid_file) = &self.pid_file_path {
            if pid_file.exists() {
                fs::remove_file(pid_file).context("Failed to remove PID file")?;
                info!("PID file removed: {}", pid_file.display());
            }
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Daemon cleanup completed");
        Ok(())
    }

    fn log_pass_success(&self, summary: &PassSummary) {
        if summary.is_clean() {
            debug!(
                "Pass finished in {:.2}s: {} folders created, {} files copied, {} entries removed",
                summary.duration.as_secs_f64(),
                summary.created_directories,
                summary.copied_files,
                summary.removed_directories + summary.removed_files
            );
        } else {
            warn!(
                "Pass finished in {:.2}s with {} failed operations",
                summary.duration.as_secs_f64(),
                summary.failed_operations
            );
        }
    }

    fn log_pass_failure(&self, error: &anyhow::Error) {
        error!("Synchronization pass failed: {:#}", error);
    }
}

/// Detach from the terminal and continue in the background
///
/// Must run before the async runtime is built; forking a live runtime leaves
/// its worker threads behind in the parent.
#[cfg(unix)]
pub fn detach() -> Result<()> {
    use daemonize::Daemonize;

    let working_directory =
        std::env::current_dir().context("Failed to read current directory")?;

    Daemonize::new()
        .working_directory(working_directory)
        .start()
        .context("Failed to daemonize process")?;

    Ok(())
}

/// Check if a daemon is currently running by checking the PID file
pub fn is_daemon_running(config: &Config) -> Result<bool> {
    if let Some(pid_file) = config.pid_file_path() {
        if pid_file.exists() {
            let pid_str = fs::read_to_string(&pid_file).context("Failed to read PID file")?;

            let pid: u32 = pid_str.trim().parse().context("Invalid PID in PID file")?;

            // Check if process is actually running
            #[cfg(unix)]
            {
                use nix::errno::Errno;
                use nix::sys::signal;
                use nix::unistd::Pid;

                let pid = Pid::from_raw(pid as i32);
                match signal::kill(pid, None) {
                    Ok(_) => return Ok(true), // Process exists
                    Err(Errno::ESRCH) => {
                        // Process doesn't exist, remove stale PID file
                        let _ = fs::remove_file(&pid_file);
                        return Ok(false);
                    }
                    Err(_) => return Ok(true), // Assume running if we can't check
                }
            }

            #[cfg(not(unix))]
            {
                let _ = pid;
                return Ok(true);
            }
        }
    }

    Ok(false)
}
