#[path = "../common/mod.rs"]
mod common;

use common::{assert_success, dacprep};

#[test]
fn cli_lists_models() {
    let output = dacprep(&["models"]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("44khz/8kbps"));
    assert!(stdout.contains("16khz/6kbps"));
}

#[test]
fn cli_help_lists_subcommands() {
    let output = dacprep(&["--help"]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["encode", "rename", "flatten", "reorganize", "split", "extract"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn cli_accepts_underscore_flags() {
    let output = dacprep(&["encode", "--help"]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--input-dir"));
    assert!(stdout.contains("--win-duration"));

    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("missing");
    let out = dir.path().join("out");
    let output = dacprep(&[
        "encode",
        "--input_dir",
        missing.to_str().unwrap(),
        "--output_dir",
        out.to_str().unwrap(),
        "--class_name",
        "Zelda",
    ]);
    assert_success(&output);
    assert!(out.is_dir());
    assert!(String::from_utf8_lossy(&output.stderr).contains("does not exist"));
}

#[test]
fn cli_unknown_model_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = dacprep(&[
        "encode",
        "--input-dir",
        dir.path().to_str().unwrap(),
        "--output-dir",
        dir.path().to_str().unwrap(),
        "--class-name",
        "Zelda",
        "--model-type",
        "96khz",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown model"));
}

#[test]
fn cli_download_rejects_bare_model_name() {
    let output = dacprep(&["download", "44khz"]);
    assert_eq!(output.status.code(), Some(1));
}
