//! Common test utilities and helpers for dirmirror tests

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

use dirmirror::{MemorySink, TreeMirror};

/// Snapshot entry: `None` for a folder, file contents otherwise
pub type Snapshot = BTreeMap<PathBuf, Option<Vec<u8>>>;

/// A source tree and a replica tree under one temporary directory
pub struct TestTrees {
    pub temp_dir: TempDir,
    pub source: PathBuf,
    pub replica: PathBuf,
    pub sink: Arc<MemorySink>,
}

impl TestTrees {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = temp_dir.path().join("source");
        let replica = temp_dir.path().join("replica");

        Self {
            temp_dir,
            source,
            replica,
            sink: Arc::new(MemorySink::new()),
        }
    }

    pub fn mirror(&self) -> TreeMirror {
        TreeMirror::new(&self.source, &self.replica)
    }

    /// Run ensure_roots, reconcile and prune on the current thread
    pub fn pass(&self) {
        let mirror = self.mirror();
        mirror
            .ensure_roots(self.sink.as_ref())
            .expect("Failed to prepare roots");
        mirror.reconcile(self.sink.as_ref());
        mirror.prune(self.sink.as_ref());
    }

    pub fn write_source(&self, relative: &str, contents: &str) -> PathBuf {
        write_file(&self.source.join(relative), contents)
    }

    pub fn write_replica(&self, relative: &str, contents: &str) -> PathBuf {
        write_file(&self.replica.join(relative), contents)
    }

    pub fn mkdir_source(&self, relative: &str) -> PathBuf {
        let path = self.source.join(relative);
        fs::create_dir_all(&path).expect("Failed to create source folder");
        path
    }

    pub fn assert_mirrored(&self) {
        assert_eq!(snapshot(&self.source), snapshot(&self.replica));
    }
}

pub fn write_file(path: &Path, contents: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent folder");
    }
    fs::write(path, contents).expect("Failed to write file");
    path.to_path_buf()
}

/// Relative path -> contents for every entry under `root`
pub fn snapshot(root: &Path) -> Snapshot {
    let mut entries = BTreeMap::new();
    if !root.exists() {
        return entries;
    }

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.expect("Failed to walk tree");
        let relative = entry
            .path()
            .strip_prefix(root)
            .expect("Entry outside root")
            .to_path_buf();
        let contents = if entry.file_type().is_dir() {
            None
        } else {
            Some(fs::read(entry.path()).expect("Failed to read file"))
        };
        entries.insert(relative, contents);
    }

    entries
}
