// tests/cli_test.rs
//
// Exit codes and output formats of the stegcheckr binary.

mod test_utils;

use test_utils::*;

/// Restrict image analysis to the structural methods
const STRUCTURAL_ONLY: [&str; 6] = ["--disable", "lsb", "--disable", "chi2", "--disable", "rs"];

fn clean_png() -> Vec<u8> {
    encode_gray_png(128, 128, natural_plane(128, 128, 12))
}

fn stego_png() -> Vec<u8> {
    let mut bytes = clean_png();
    bytes.extend(tiny_zip("payload.bin", &[0x5A; 300]));
    bytes
}

#[test]
fn test_clean_file_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "clean.png", &clean_png());

    let output = run_stegcheckr(&path)
        .args(STRUCTURAL_ONLY)
        .output()
        .expect("failed to run binary");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(0), "{}", stdout);
    assert!(stdout.contains("CLEAN"), "{}", stdout);
}

#[test]
fn test_detected_file_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "holiday.png", &stego_png());

    let output = run_stegcheckr(&path).output().expect("failed to run binary");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(1), "{}", stdout);
    assert!(stdout.contains("DETECTED"), "{}", stdout);
    assert!(stdout.contains("zip"), "{}", stdout);
}

#[test]
fn test_missing_file_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_stegcheckr(dir.path().join("nowhere.png"))
        .output()
        .expect("failed to run binary");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_unrecognized_file_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "notes.txt", b"shopping list: eggs, milk");
    let output = run_stegcheckr(&path).output().expect("failed to run binary");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_bad_arguments_are_rejected() {
    let output = run_stegcheckr("a.png")
        .args(["--threshold", "rs=7"])
        .output()
        .expect("failed to run binary");
    assert_eq!(output.status.code(), Some(2));
    assert!(!output.stderr.is_empty());
}

#[test]
fn test_json_output() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a_clean.png", &clean_png());
    write_file(dir.path(), "b_stego.png", &stego_png());
    write_file(dir.path(), "readme.txt", b"not media");

    let output = run_stegcheckr(dir.path())
        .args(["--json", "--seed", "5"])
        .args(STRUCTURAL_ONLY)
        .output()
        .expect("failed to run binary");
    assert_eq!(output.status.code(), Some(1));

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(value["tool"], "stegcheckr");
    let reports = value["reports"].as_array().expect("reports array");
    assert_eq!(reports.len(), 2);
    assert!(reports[0]["file"].as_str().unwrap().ends_with("a_clean.png"));
    assert_eq!(reports[0]["verdict"], "clean");
    assert_eq!(reports[1]["verdict"], "detected");
    assert_eq!(reports[1]["embedded_files"][0]["format"], "zip");
    assert_eq!(reports[1]["seed"], 5);
    assert!(value["errors"].as_array().unwrap().is_empty());
}

#[test]
fn test_disable_and_recursive_flags() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("album");
    std::fs::create_dir(&nested).unwrap();
    write_file(&nested, "cover.png", &stego_png());

    let shallow = run_stegcheckr(dir.path()).output().expect("failed to run binary");
    assert_eq!(shallow.status.code(), Some(2), "no media at depth one");

    let output = run_stegcheckr(dir.path())
        .args(["-r", "--disable", "carving", "--json"])
        .output()
        .expect("failed to run binary");
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    let report = &value["reports"][0];
    assert!(report["embedded_files"].as_array().unwrap().is_empty());
    assert!(!report["methods_run"]
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m == "carving"));
}
