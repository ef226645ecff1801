//! dirmirror - One-way Directory Mirroring Daemon
//!
//! dirmirror keeps a replica directory tree identical to a source tree. Every
//! pass copies every source file over its replica counterpart, creates missing
//! folders, and deletes replica entries the source no longer has. Passes
//! repeat on a fixed interval until the process is told to stop.
//!
//! ## Modules
//!
//! - [`mirror`]: path mapping, reconcile and prune passes
//! - [`sync`]: one complete pass, with parallel file copies
//! - [`daemon`]: interval scheduling, PID file, shutdown
//! - [`events`]: the event sink the mirror reports to
//! - [`config`]: configuration management and parsing
//! - [`logging`]: log file and console setup
//! - [`health`]: preflight checks

pub mod config;
pub mod daemon;
pub mod events;
pub mod health;
pub mod logging;
pub mod mirror;
pub mod sync;

pub use config::Config;
pub use daemon::{Daemon, DaemonStatus, ShutdownHandle};
pub use events::{EventSink, Level, MemorySink, TracingSink};
pub use health::HealthCheck;
pub use mirror::{EntryOutcome, Operation, PathMapping, TreeMirror};
pub use sync::{PassSummary, SyncEngine};
