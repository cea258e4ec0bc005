use datafile_gen::{generate_profiles, GenerateError, ProfileGenerator};
use fs_extra::dir::{copy, CopyOptions};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/data-files")
}

/// Copies the fixture data folder into a fresh temp dir.
fn data_dir() -> TempDir {
    let dir = tempdir().unwrap();
    let mut options = CopyOptions::new();
    options.content_only = true;
    copy(fixtures(), dir.path(), &options).unwrap();
    dir
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_generate_basic_profile() {
    let dir = data_dir();

    let reports = generate_profiles(dir.path(), "basic", false).unwrap();

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.profile_name.as_deref(), Some("basic"));

    let out = dir.path().join("output/basic");
    assert_eq!(
        report.files_written,
        vec![out.join("BASIC-001.xml"), out.join("BASIC-002.xml")]
    );
    let first = fs::read_to_string(out.join("BASIC-001.xml")).unwrap();
    assert!(first.contains("<UNIQUE_ID>001</UNIQUE_ID>"));
    assert!(first.contains("<VALUE1>alpha</VALUE1>"));
    let second = fs::read_to_string(out.join("BASIC-002.xml")).unwrap();
    assert!(second.contains("<UNIQUE_ID>002</UNIQUE_ID>"));
    assert!(second.contains("<VALUE2>two</VALUE2>"));
    // endRow 3 stops before the third data row
    assert!(!out.join("BASIC-003.xml").exists());

    let sim = dir.path().join("output/00Simulator/00-sim-basic.xml");
    assert_eq!(report.simulator_files, vec![sim.clone()]);
    assert_eq!(
        fs::read_to_string(sim).unwrap(),
        "<stub file=\"BASIC-001.xml\" id=\"001\"/>\n<stub file=\"BASIC-002.xml\" id=\"002\"/>\n"
    );
}

#[test]
fn test_generate_clears_stale_output() {
    let dir = data_dir();
    let out = dir.path().join("output/basic");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("BASIC-999.xml"), "stale").unwrap();
    fs::write(out.join("keep.txt"), "other").unwrap();

    generate_profiles(dir.path(), "basic", false).unwrap();

    assert!(!out.join("BASIC-999.xml").exists());
    assert!(out.join("keep.txt").exists());
    assert!(out.join("BASIC-001.xml").exists());
}

#[test]
fn test_generate_json_sections() {
    let dir = data_dir();

    let reports = generate_profiles(dir.path(), "accounts", false).unwrap();

    assert_eq!(reports[0].files_written.len(), 3);
    assert!(reports[0].simulator_files.is_empty());
    let out = dir.path().join("output/accounts");

    assert_eq!(
        read_json(&out.join("CUST-001.json")),
        json!({
            "id": "001",
            "name": "alpha",
            "addresses": [
                {"n": 1, "type": "HOME", "street": "1 Main St"},
                {"n": 2, "type": "WORK", "street": "2 High St"}
            ],
            "accounts": [
                {"account": "A1", "type": "SAVINGS"},
                {"account": "A2", "type": "CARD"}
            ]
        })
    );
    assert_eq!(
        read_json(&out.join("CUST-002.json")),
        json!({
            "id": "002",
            "name": "beta",
            "addresses": [{"n": 1, "type": "HOME", "street": "3 Side Rd"}],
            "accounts": [{"account": "A3", "type": "LOAN"}]
        })
    );
    assert_eq!(
        read_json(&out.join("CUST-003.json")),
        json!({
            "id": "003",
            "name": "gamma",
            "addresses": [],
            "accounts": [{"account": "A1", "type": "SAVINGS"}]
        })
    );
}

#[test]
fn test_generate_several_profiles() {
    let dir = data_dir();

    let reports = generate_profiles(dir.path(), "basic, accounts", false).unwrap();

    let names: Vec<_> = reports
        .iter()
        .map(|r| r.profile_name.as_deref().unwrap_or_default())
        .collect();
    assert_eq!(names, vec!["basic", "accounts"]);
}

#[test]
fn test_dry_run_writes_nothing() {
    let dir = data_dir();

    let reports = generate_profiles(dir.path(), "basic", true).unwrap();

    assert_eq!(reports[0].files_written.len(), 2);
    assert_eq!(reports[0].simulator_files.len(), 1);
    assert!(!dir.path().join("output").exists());
}

#[test]
fn test_profile_generator_load() {
    let dir = data_dir();

    let generator =
        ProfileGenerator::load(dir.path(), &dir.path().join("config/basic.json")).unwrap();

    assert_eq!(generator.profile().sheet_name, "Sheet 1");
    assert_eq!(generator.profile().output.file_extension, ".xml");
}

#[test]
fn test_missing_template_fails() {
    let dir = data_dir();
    fs::remove_file(dir.path().join("data/template/basic.xml")).unwrap();

    let err = generate_profiles(dir.path(), "basic", false).unwrap_err();

    assert!(matches!(err, GenerateError::File(_)));
    assert!(err.to_string().contains("basic.xml"));
}
