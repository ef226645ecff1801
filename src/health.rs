//! System health checks for dirmirror
//!
//! This module provides preflight checks to verify the mirror can run before
//! the daemon starts: roots usable, log file writable, no second instance.

use crate::daemon::is_daemon_running;
use crate::Config;
use std::fs;
use std::path::Path;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Configuration consistency (roots set, disjoint, interval valid)
    pub config: CheckResult,
    /// Source root status
    pub source: CheckResult,
    /// Replica root status
    pub replica: CheckResult,
    /// Log file status
    pub log_file: CheckResult,
    /// Another daemon on the same PID file
    pub instance: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub fn run(config: &Config) -> Self {
        Self {
            config: Self::check_config(config),
            source: Self::check_source(config),
            replica: Self::check_replica(config),
            log_file: Self::check_log_file(config),
            instance: Self::check_instance(config),
        }
    }

    /// Check if all required checks passed (warnings still pass)
    pub fn all_passed(&self) -> bool {
        self.all_checks().iter().all(|(_, result)| result.passed)
    }

    /// Get list of failed checks
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, result)| result)
            .filter(|r| !r.passed)
            .collect()
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, result)| result)
            .filter(|r| r.is_warning)
            .collect()
    }

    /// All checks with display names, in report order
    pub fn all_checks(&self) -> Vec<(&'static str, &CheckResult)> {
        vec![
            ("Configuration", &self.config),
            ("Source", &self.source),
            ("Replica", &self.replica),
            ("Log file", &self.log_file),
            ("Instance", &self.instance),
        ]
    }

    fn check_config(config: &Config) -> CheckResult {
        match config.validate() {
            Ok(()) => CheckResult::ok(format!(
                "Mirroring every {}",
                config.sync.interval
            )),
            Err(e) => CheckResult::error_with_details("Configuration is invalid", format!("{:#}", e)),
        }
    }

    fn check_source(config: &Config) -> CheckResult {
        let Ok(source) = config.source_root() else {
            return CheckResult::error("No source folder configured");
        };
        Self::check_root(&source, "Source")
    }

    fn check_replica(config: &Config) -> CheckResult {
        let Ok(replica) = config.replica_root() else {
            return CheckResult::error("No replica folder configured");
        };
        let result = Self::check_root(&replica, "Replica");
        if !result.passed || result.is_warning {
            return result;
        }

        match fs::metadata(&replica) {
            Ok(metadata) if metadata.permissions().readonly() => CheckResult::error_with_details(
                "Replica folder is read-only",
                replica.display().to_string(),
            ),
            _ => result,
        }
    }

    fn check_root(path: &Path, label: &str) -> CheckResult {
        match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => match fs::read_dir(path) {
                Ok(_) => CheckResult::ok(format!("{} folder is readable: {}", label, path.display())),
                Err(e) => CheckResult::error_with_details(
                    format!("{} folder is not readable", label),
                    format!("{}: {}", path.display(), e),
                ),
            },
            Ok(_) => CheckResult::error_with_details(
                format!("{} path is not a folder", label),
                path.display().to_string(),
            ),
            Err(_) => CheckResult::warning_with_details(
                format!("{} folder does not exist yet", label),
                format!("{} will be created on the first pass", path.display()),
            ),
        }
    }

    fn check_log_file(config: &Config) -> CheckResult {
        if config.daemon.log_file.is_empty() {
            return CheckResult::warning_with_details(
                "No log file configured",
                "Events will only be written to the console",
            );
        }

        let path = Path::new(&config.daemon.log_file);
        if path.is_dir() {
            return CheckResult::error_with_details("Log file path is a folder", path.display().to_string());
        }

        // Walk up to the nearest existing ancestor; create_dir_all will do the rest
        let mut ancestor = path.parent();
        while let Some(dir) = ancestor {
            if dir.as_os_str().is_empty() || dir.exists() {
                break;
            }
            ancestor = dir.parent();
        }

        match ancestor.filter(|dir| !dir.as_os_str().is_empty()) {
            Some(dir) if !dir.is_dir() => CheckResult::error_with_details(
                "Log file parent is not a folder",
                dir.display().to_string(),
            ),
            Some(dir)
                if fs::metadata(dir)
                    .map(|m| m.permissions().readonly())
                    .unwrap_or(false) =>
            {
                CheckResult::error_with_details(
                    "Log folder is read-only",
                    dir.display().to_string(),
                )
            }
            _ => CheckResult::ok(format!("Logging to {}", path.display())),
        }
    }

    fn check_instance(config: &Config) -> CheckResult {
        match is_daemon_running(config) {
            Ok(false) => CheckResult::ok("No other instance running"),
            Ok(true) => CheckResult::error_with_details(
                "Another dirmirror instance is running",
                format!("PID file: {}", config.daemon.pid_file),
            ),
            Err(e) => CheckResult::error_with_details("Cannot read PID file", format!("{:#}", e)),
        }
    }
}
