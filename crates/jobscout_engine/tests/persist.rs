use std::fs;

use chrono::{TimeZone, Utc};
use jobscout_engine::{ensure_output_dir, results_filename, AtomicFileWriter, RunResults, SessionReport};
use tempfile::TempDir;

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("out");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing_file() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("results.json", "[]").unwrap();
    assert_eq!(first.file_name().unwrap(), "results.json");
    assert_eq!(fs::read_to_string(&first).unwrap(), "[]");

    let second = writer.write("results.json", "[1]").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "[1]");
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    let result = writer.write("results.json", "data");
    assert!(result.is_err());
    assert!(!file_path.with_file_name("results.json").exists());
}

#[test]
fn run_results_are_written_as_pretty_json() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().join("results"));
    let results = RunResults::new(vec![SessionReport::failed(
        "Acme",
        "https://careers.acme.example/jobs",
        "navigation: timeout",
    )]);
    let at = Utc.with_ymd_and_hms(2025, 7, 22, 9, 30, 5).unwrap();
    let name = results_filename("companies", "companies.json", at);

    let path = writer.write_json(&name, &results).unwrap();
    let text = fs::read_to_string(path).unwrap();
    assert!(text.ends_with('\n'));
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["summary"]["failed_sites"], 1);
    assert_eq!(value["sites"][0]["status"], "failed");
    assert_eq!(value["sites"][0]["errors"][0], "navigation: timeout");
}
