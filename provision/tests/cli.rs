//! Binary-level tests: spawn `provision` and check exit codes and the log.

use std::fs;
use std::process::Command;

use provision::exit_codes;

#[test]
fn help_lists_subcommands() {
    let output = Command::new(env!("CARGO_BIN_EXE_provision"))
        .arg("--help")
        .output()
        .expect("provision --help");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for sub in ["run", "check", "tinker", "psi4"] {
        assert!(stdout.contains(sub), "missing {sub} in:\n{stdout}");
    }
}

#[test]
fn check_with_empty_path_fails_and_logs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let software = temp.path().join("software");

    let output = Command::new(env!("CARGO_BIN_EXE_provision"))
        .current_dir(temp.path())
        .env("PATH", "")
        .env("HOME", temp.path())
        .env_remove("RUST_LOG")
        .arg("check")
        .arg("--software-dir")
        .arg(&software)
        .output()
        .expect("provision check");

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let log = fs::read_to_string(software.join("build_log.txt")).expect("log file");
    assert!(log.contains("[MISSING] gcc"), "{log}");
    assert!(log.contains("ERROR: missing required tools"), "{log}");
    assert!(!log.contains('\x1b'));
}

#[test]
fn invalid_config_fails_before_logging() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = temp.path().join("provision.toml");
    fs::write(&config, "jobs = 0\n").expect("write config");
    let software = temp.path().join("software");

    let output = Command::new(env!("CARGO_BIN_EXE_provision"))
        .arg("--config")
        .arg(&config)
        .arg("--software-dir")
        .arg(&software)
        .arg("check")
        .output()
        .expect("provision check");

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR:"), "{stderr}");
    assert!(!software.exists());
}
