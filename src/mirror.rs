//! Tree Mirror - The reconcile and prune passes
//!
//! A pass makes the replica tree an exact copy of the source tree:
//!
//! - **Reconcile** walks the source top-down, creates every missing replica
//!   folder and overwrites every replica file with the source contents and
//!   metadata, whether it changed or not.
//! - **Prune** walks the replica top-down and deletes every entry that has no
//!   source counterpart. Orphaned folders go in one recursive removal.
//!
//! Nothing is cached between passes. The filesystem is the only state, and
//! the two trees are tied together purely by relative path ([`PathMapping`]).
//!
//! Failures on individual entries never abort a pass: they are reported to
//! the [`EventSink`] at ERROR level, recorded as [`EntryOutcome::Failed`], and
//! the walk moves on.

use crate::events::{EventSink, Level};
use anyhow::{bail, Context, Result};
use filetime::FileTime;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Maps paths between the source and replica roots by relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    source_root: PathBuf,
    replica_root: PathBuf,
}

impl PathMapping {
    pub fn new(source_root: impl Into<PathBuf>, replica_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            replica_root: replica_root.into(),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn replica_root(&self) -> &Path {
        &self.replica_root
    }

    /// Replica counterpart of a path under the source root
    pub fn to_replica(&self, source_path: &Path) -> Option<PathBuf> {
        rebase(source_path, &self.source_root, &self.replica_root)
    }

    /// Source counterpart of a path under the replica root
    pub fn to_source(&self, replica_path: &Path) -> Option<PathBuf> {
        rebase(replica_path, &self.replica_root, &self.source_root)
    }
}

fn rebase(path: &Path, from: &Path, to: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(from).ok()?;
    if relative.as_os_str().is_empty() {
        Some(to.to_path_buf())
    } else {
        Some(to.join(relative))
    }
}

/// Filesystem operation attempted on a single entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateDirectory,
    CopyFile,
    RemoveDirectory,
    RemoveFile,
    ReadSource,
    ReadReplica,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Operation::CreateDirectory => "create folder",
            Operation::CopyFile => "copy file",
            Operation::RemoveDirectory => "remove folder",
            Operation::RemoveFile => "remove file",
            Operation::ReadSource => "read source entry",
            Operation::ReadReplica => "read replica entry",
        };
        f.write_str(verb)
    }
}

/// What happened to one entry during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Replica folder was created
    CreatedDirectory { path: PathBuf },
    /// Source file was copied over the replica file
    Copied { source: PathBuf, destination: PathBuf },
    /// Replica entry of the wrong type was removed to make room
    Replaced { path: PathBuf },
    /// Orphaned replica folder was removed with everything under it
    RemovedDirectory { path: PathBuf },
    /// Orphaned replica file was removed
    RemovedFile { path: PathBuf },
    /// Operation failed and the entry was skipped
    Failed {
        path: PathBuf,
        operation: Operation,
        error: String,
    },
}

/// A file copy found by the structural phase of reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyJob {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// One-way mirror between a source tree and a replica tree
#[derive(Debug, Clone)]
pub struct TreeMirror {
    mapping: PathMapping,
}

impl TreeMirror {
    pub fn new(source_root: impl Into<PathBuf>, replica_root: impl Into<PathBuf>) -> Self {
        Self {
            mapping: PathMapping::new(source_root, replica_root),
        }
    }

    pub fn mapping(&self) -> &PathMapping {
        &self.mapping
    }

    /// Create either root if it is missing
    ///
    /// A root that exists but is not a directory is an error for the whole
    /// pass; nothing sensible can be mirrored from or into it.
    pub fn ensure_roots(&self, sink: &dyn EventSink) -> Result<()> {
        ensure_root(self.mapping.source_root(), "source", sink)?;
        ensure_root(self.mapping.replica_root(), "replica", sink)?;
        Ok(())
    }

    /// Full forward pass: folders first, then every file copy in walk order
    pub fn reconcile(&self, sink: &dyn EventSink) -> Vec<EntryOutcome> {
        let (mut outcomes, jobs) = self.reconcile_structure(sink);
        for job in &jobs {
            outcomes.extend(Self::copy_file(job, sink));
        }
        outcomes
    }

    /// Structural phase of reconcile
    ///
    /// Walks the source, creates every replica folder as it is reached and
    /// collects the file copies without running them. Once this returns, every
    /// folder a [`CopyJob`] needs exists, so the jobs may run in any order.
    pub fn reconcile_structure(&self, sink: &dyn EventSink) -> (Vec<EntryOutcome>, Vec<CopyJob>) {
        let mut outcomes = Vec::new();
        let mut jobs = Vec::new();

        let mut walker = WalkDir::new(self.mapping.source_root())
            .min_depth(1)
            .follow_links(false)
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .unwrap_or(self.mapping.source_root())
                        .to_path_buf();
                    outcomes.push(failure(&path, Operation::ReadSource, &err, sink));
                    continue;
                }
            };

            let Some(destination) = self.mapping.to_replica(entry.path()) else {
                continue;
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                if !ensure_directory(&destination, sink, &mut outcomes) {
                    // Nothing below this folder can be placed in the replica
                    walker.skip_current_dir();
                }
            } else if file_type.is_file() {
                jobs.push(CopyJob {
                    source: entry.into_path(),
                    destination,
                });
            } else {
                sink.emit(
                    Level::Debug,
                    &format!(
                        "Skipped {}: not a regular file or folder",
                        entry.path().display()
                    ),
                );
            }
        }

        (outcomes, jobs)
    }

    /// Copy one file with its permissions and timestamps, overwriting the replica
    pub fn copy_file(job: &CopyJob, sink: &dyn EventSink) -> Vec<EntryOutcome> {
        let mut outcomes = Vec::new();

        // A folder or link sitting where the file belongs has to go first
        if let Ok(existing) = fs::symlink_metadata(&job.destination) {
            if existing.is_dir() {
                if let Err(err) = fs::remove_dir_all(&job.destination) {
                    outcomes.push(failure(&job.destination, Operation::RemoveDirectory, &err, sink));
                    return outcomes;
                }
                sink.emit(
                    Level::Warning,
                    &format!("Replaced folder with file: {}", job.destination.display()),
                );
                outcomes.push(EntryOutcome::Replaced {
                    path: job.destination.clone(),
                });
            } else if existing.file_type().is_symlink() {
                if let Err(err) = fs::remove_file(&job.destination) {
                    outcomes.push(failure(&job.destination, Operation::RemoveFile, &err, sink));
                    return outcomes;
                }
                sink.emit(
                    Level::Warning,
                    &format!("Replaced link with file: {}", job.destination.display()),
                );
                outcomes.push(EntryOutcome::Replaced {
                    path: job.destination.clone(),
                });
            }
        }

        match copy_with_metadata(&job.source, &job.destination) {
            Ok(()) => {
                sink.emit(
                    Level::Info,
                    &format!(
                        "Copied: {} to {}",
                        job.source.display(),
                        job.destination.display()
                    ),
                );
                outcomes.push(EntryOutcome::Copied {
                    source: job.source.clone(),
                    destination: job.destination.clone(),
                });
            }
            Err(err) => outcomes.push(failure(&job.source, Operation::CopyFile, &err, sink)),
        }

        outcomes
    }

    /// Reverse pass: delete every replica entry without a source counterpart
    pub fn prune(&self, sink: &dyn EventSink) -> Vec<EntryOutcome> {
        let mut outcomes = Vec::new();

        let mut walker = WalkDir::new(self.mapping.replica_root())
            .min_depth(1)
            .follow_links(false)
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .unwrap_or(self.mapping.replica_root())
                        .to_path_buf();
                    outcomes.push(failure(&path, Operation::ReadReplica, &err, sink));
                    continue;
                }
            };

            let Some(counterpart) = self.mapping.to_source(entry.path()) else {
                continue;
            };
            let is_dir = entry.file_type().is_dir();

            match has_counterpart(&counterpart) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    // Unknown is not absent: keep the replica entry
                    outcomes.push(failure(&counterpart, Operation::ReadSource, &err, sink));
                    if is_dir {
                        walker.skip_current_dir();
                    }
                    continue;
                }
            }

            let path = entry.path();
            if is_dir {
                // Decided before descending; the subtree goes in one removal
                walker.skip_current_dir();
                match fs::remove_dir_all(path) {
                    Ok(()) => {
                        sink.emit(
                            Level::Warning,
                            &format!("Removed folder: {}", path.display()),
                        );
                        outcomes.push(EntryOutcome::RemovedDirectory {
                            path: path.to_path_buf(),
                        });
                    }
                    Err(err) => {
                        outcomes.push(failure(path, Operation::RemoveDirectory, &err, sink))
                    }
                }
            } else {
                match fs::remove_file(path) {
                    Ok(()) => {
                        sink.emit(Level::Warning, &format!("Removed file: {}", path.display()));
                        outcomes.push(EntryOutcome::RemovedFile {
                            path: path.to_path_buf(),
                        });
                    }
                    Err(err) => outcomes.push(failure(path, Operation::RemoveFile, &err, sink)),
                }
            }
        }

        outcomes
    }
}

fn ensure_root(path: &Path, label: &str, sink: &dyn EventSink) -> Result<()> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => bail!(
            "{} folder {} exists but is not a directory",
            label,
            path.display()
        ),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create {} folder: {}", label, path.display()))?;
            sink.emit(
                Level::Info,
                &format!("Created {} folder: {}", label, path.display()),
            );
            Ok(())
        }
        Err(err) => Err(err)
            .with_context(|| format!("Failed to inspect {} folder: {}", label, path.display())),
    }
}

/// Make sure `destination` is a folder. Returns false if it could not be.
fn ensure_directory(
    destination: &Path,
    sink: &dyn EventSink,
    outcomes: &mut Vec<EntryOutcome>,
) -> bool {
    match fs::symlink_metadata(destination) {
        Ok(metadata) if metadata.is_dir() => return true,
        Ok(_) => {
            if let Err(err) = fs::remove_file(destination) {
                outcomes.push(failure(destination, Operation::RemoveFile, &err, sink));
                return false;
            }
            sink.emit(
                Level::Warning,
                &format!("Replaced file with folder: {}", destination.display()),
            );
            outcomes.push(EntryOutcome::Replaced {
                path: destination.to_path_buf(),
            });
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            outcomes.push(failure(destination, Operation::CreateDirectory, &err, sink));
            return false;
        }
    }

    match fs::create_dir_all(destination) {
        Ok(()) => {
            sink.emit(
                Level::Info,
                &format!("Created folder: {}", destination.display()),
            );
            outcomes.push(EntryOutcome::CreatedDirectory {
                path: destination.to_path_buf(),
            });
            true
        }
        Err(err) => {
            outcomes.push(failure(destination, Operation::CreateDirectory, &err, sink));
            false
        }
    }
}

fn copy_with_metadata(source: &Path, destination: &Path) -> io::Result<()> {
    let metadata = fs::metadata(source)?;

    if let Err(err) = fs::copy(source, destination) {
        // A read-only replica file cannot be opened for writing; start fresh
        let destination_readonly = fs::symlink_metadata(destination)
            .map(|existing| existing.permissions().readonly())
            .unwrap_or(false);
        if err.kind() != io::ErrorKind::PermissionDenied || !destination_readonly {
            return Err(err);
        }
        fs::remove_file(destination)?;
        fs::copy(source, destination)?;
    }

    let atime = FileTime::from_last_access_time(&metadata);
    let mtime = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_times(destination, atime, mtime)?;

    // fs::copy carries permission bits on Unix; elsewhere only the read-only flag
    #[cfg(not(unix))]
    fs::set_permissions(destination, metadata.permissions())?;

    Ok(())
}

/// Whether reconcile would mirror `path`: only regular files and folders count
fn has_counterpart(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(metadata) => Ok(metadata.is_file() || metadata.is_dir()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

fn failure(
    path: &Path,
    operation: Operation,
    error: &dyn fmt::Display,
    sink: &dyn EventSink,
) -> EntryOutcome {
    sink.emit(
        Level::Error,
        &format!("Failed to {} {}: {}", operation, path.display(), error),
    );
    EntryOutcome::Failed {
        path: path.to_path_buf(),
        operation,
        error: error.to_string(),
    }
}
