use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use std::process::Command;

// Integration tests for the dirmirror binary
// These tests run the actual binary and verify its behavior

fn dirmirror(temp_dir: &TempDir) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_dirmirror"));
    // Keep any user configuration out of the way
    command
        .env("XDG_CONFIG_HOME", temp_dir.path().join("config"))
        .env_remove("RUST_LOG");
    command
}

#[test]
fn test_cli_help() {
    let temp_dir = TempDir::new().unwrap();
    let output = dirmirror(&temp_dir)
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    for expected in ["SOURCE_FOLDER", "REPLICA_FOLDER", "INTERVAL_SECONDS", "LOG_FILE", "--once", "--check"] {
        assert!(stdout.contains(expected), "help is missing {}", expected);
    }
}

#[test]
fn test_cli_version() {
    let temp_dir = TempDir::new().unwrap();
    let output = dirmirror(&temp_dir)
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("dirmirror"));
}

#[test]
fn test_single_pass_mirrors_and_logs() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.child("source");
    let replica = temp_dir.child("replica");
    let log_file = temp_dir.child("logs/sync.log");
    source.child("a.txt").write_str("hi").unwrap();
    source.child("sub/b.txt").write_str("yo").unwrap();
    replica.child("orphan.txt").write_str("bye").unwrap();

    let output = dirmirror(&temp_dir)
        .arg(source.path())
        .arg(replica.path())
        .arg("60")
        .arg(log_file.path())
        .arg("--once")
        .output()
        .expect("Failed to execute command");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    replica.child("a.txt").assert("hi");
    replica.child("sub/b.txt").assert("yo");
    replica.child("orphan.txt").assert(predicate::path::missing());

    log_file.assert(predicate::str::contains(" [INFO]: Created folder: "));
    log_file.assert(predicate::str::contains(" [INFO]: Copied: "));
    log_file.assert(predicate::str::contains(" [WARNING]: Removed file: "));
    log_file.assert(predicate::str::contains(" [INFO]: Synchronization complete."));
}

#[test]
fn test_missing_source_is_created() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.child("not-yet");
    let replica = temp_dir.child("replica");
    let log_file = temp_dir.child("sync.log");

    let output = dirmirror(&temp_dir)
        .arg(source.path())
        .arg(replica.path())
        .arg("5")
        .arg(log_file.path())
        .arg("--once")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    source.assert(predicate::path::is_dir());
    replica.assert(predicate::path::is_dir());
    log_file.assert(predicate::str::contains("[INFO]: Created source folder: "));
}

#[test]
fn test_nested_replica_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.child("source");
    let replica = source.child("replica");

    let output = dirmirror(&temp_dir)
        .arg(source.path())
        .arg(replica.path())
        .arg("5")
        .arg(temp_dir.child("sync.log").path())
        .arg("--once")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("inside"));
    replica.assert(predicate::path::missing());
}

#[test]
fn test_invalid_interval_is_rejected() {
    let temp_dir = TempDir::new().unwrap();

    let output = dirmirror(&temp_dir)
        .arg(temp_dir.child("source").path())
        .arg(temp_dir.child("replica").path())
        .arg("sometimes")
        .arg(temp_dir.child("sync.log").path())
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
}

#[test]
fn test_check_reports_roots() {
    let temp_dir = TempDir::new().unwrap();
    temp_dir.child("source").create_dir_all().unwrap();

    let output = dirmirror(&temp_dir)
        .arg(temp_dir.child("source").path())
        .arg(temp_dir.child("replica").path())
        .arg("30s")
        .arg(temp_dir.child("sync.log").path())
        .arg("--pid-file")
        .arg(temp_dir.child("dirmirror.pid").path())
        .arg("--check")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Source folder is readable"));
    assert!(stdout.contains("Replica folder does not exist yet"));
    assert!(stdout.contains("All checks passed"));
}

#[test]
fn test_config_file_supplies_roots() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.child("source");
    let replica = temp_dir.child("replica");
    source.child("from-config.txt").write_str("cfg").unwrap();
    let config = temp_dir.child("dirmirror.yml");
    config
        .write_str(&format!(
            "source_folder: {:?}\nreplica_folder: {:?}\nsync:\n  interval: \"10s\"\n  max_parallel: 2\ndaemon:\n  log_file: {:?}\n",
            source.path(),
            replica.path(),
            temp_dir.child("sync.log").path()
        ))
        .unwrap();

    let output = dirmirror(&temp_dir)
        .arg("--config")
        .arg(config.path())
        .arg("--once")
        .output()
        .expect("Failed to execute command");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    replica.child("from-config.txt").assert("cfg");
}

#[cfg(unix)]
#[test]
fn test_non_utf8_source_is_rejected() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join(OsStr::from_bytes(b"src\xff"));
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("keep.txt"), "source").unwrap();
    let replica = temp_dir.child("replica");
    replica.child("keep.txt").write_str("replica").unwrap();

    let output = dirmirror(&temp_dir)
        .arg(&source)
        .arg(replica.path())
        .arg("5")
        .arg(temp_dir.child("sync.log").path())
        .arg("--once")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not valid UTF-8"));
    replica.child("keep.txt").assert("replica");
    temp_dir
        .child("src\u{fffd}")
        .assert(predicate::path::missing());
}

#[test]
fn test_command_line_paths_are_not_expanded() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.child("a$b");
    let replica = temp_dir.child("replica");
    source.child("dollar.txt").write_str("$").unwrap();

    let output = dirmirror(&temp_dir)
        .arg(source.path())
        .arg(replica.path())
        .arg("5")
        .arg(temp_dir.child("sync.log").path())
        .arg("--once")
        .output()
        .expect("Failed to execute command");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    replica.child("dollar.txt").assert("$");
}
