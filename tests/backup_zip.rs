#![allow(dead_code)]

#[path = "../src/backup.rs"]
mod backup;
#[path = "../src/config.rs"]
mod config;

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[test]
fn zip_export_and_import_roundtrip_with_config_and_logs() {
    let workspace = temp_dir("checkind-backup-src");
    let workspace2 = temp_dir("checkind-backup-dst");
    let out_dir = temp_dir("checkind-backup-out");

    let db_bytes = b"sqlite-test-payload";
    std::fs::write(workspace.join("checkind.sqlite3"), db_bytes).expect("write source db");
    let config = "[[events]]\nname = \"GALA\"\naccess_code = \"1\"\n";
    std::fs::write(workspace.join("checkind.toml"), config).expect("write config");
    std::fs::create_dir_all(workspace.join("logs")).expect("create log dir");
    let log = "Name,Matric,ID,CheckedInAt\nAlice,A1,101,\n";
    std::fs::write(workspace.join("logs/gala_data.csv"), log).expect("write log");

    let bundle_path = out_dir.join("workspace-backup.zip");
    let logs = vec!["logs/gala_data.csv".to_string(), "missing_data.csv".to_string()];
    let export =
        backup::export_workspace_bundle(&workspace, &bundle_path, &logs).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 4);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    let manifest: serde_json::Value = serde_json::from_str(&manifest).expect("manifest json");
    assert_eq!(
        manifest.get("format").and_then(|v| v.as_str()),
        Some(backup::BUNDLE_FORMAT_V1)
    );
    assert_eq!(manifest.get("hasConfig").and_then(|v| v.as_bool()), Some(true));
    archive
        .by_name("db/checkind.sqlite3")
        .expect("database entry in bundle");
    archive
        .by_name("logs/logs/gala_data.csv")
        .expect("log entry in bundle");

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);
    assert_eq!(import.restored_logs.len(), 1);

    let restored = std::fs::read(workspace2.join("checkind.sqlite3")).expect("read restored db");
    assert_eq!(restored, db_bytes);
    assert_eq!(
        std::fs::read_to_string(workspace2.join("checkind.toml")).expect("restored config"),
        config
    );
    assert_eq!(
        std::fs::read_to_string(workspace2.join("logs/gala_data.csv")).expect("restored log"),
        log
    );
    assert!(!workspace2.join("checkind.sqlite3.importing").exists());

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn raw_sqlite_file_imports_as_database() {
    let workspace = temp_dir("checkind-backup-raw");
    let raw = workspace.join("old.sqlite3");
    std::fs::write(&raw, b"SQLite format 3\0rest").expect("write raw db");

    let target = workspace.join("restored");
    let import = backup::import_workspace_bundle(&raw, &target).expect("import raw");
    assert_eq!(import.bundle_format_detected, backup::RAW_SQLITE_FORMAT);
    assert!(import.restored_logs.is_empty());
    assert_eq!(
        std::fs::read(target.join("checkind.sqlite3")).expect("read db"),
        b"SQLite format 3\0rest"
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn export_without_database_fails_and_foreign_zip_is_rejected() {
    let workspace = temp_dir("checkind-backup-empty");
    let out = workspace.join("out.zip");
    assert!(backup::export_workspace_bundle(&workspace, &out, &[]).is_err());

    let foreign = workspace.join("foreign.zip");
    {
        let f = File::create(&foreign).expect("create zip");
        let mut zip = zip::ZipWriter::new(f);
        zip.start_file("manifest.json", zip::write::FileOptions::default())
            .expect("start entry");
        std::io::Write::write_all(&mut zip, br#"{"format":"something-else"}"#)
            .expect("write manifest");
        zip.finish().expect("finish zip");
    }
    let err = backup::import_workspace_bundle(&foreign, &workspace.join("dst"))
        .expect_err("foreign bundle must fail");
    assert!(format!("{err:#}").contains("unsupported bundle format"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn logs_outside_the_workspace_are_refused_instead_of_misplaced() {
    let workspace = temp_dir("checkind-backup-outside");
    let outside = temp_dir("checkind-backup-elsewhere");
    std::fs::write(workspace.join("checkind.sqlite3"), b"db").expect("write db");
    let absolute = outside.join("night.csv");
    std::fs::write(&absolute, "Name,Matric,ID\n").expect("write outside log");
    std::fs::write(workspace.join("inside_data.csv"), "Name,Matric,ID\n").expect("write log");

    let out = workspace.join("bundle.zip");
    for bad in [absolute.to_string_lossy().to_string(), "../night.csv".to_string()] {
        let logs = vec!["inside_data.csv".to_string(), bad.clone()];
        let err = backup::export_workspace_bundle(&workspace, &out, &logs)
            .expect_err("log outside the workspace must be refused");
        assert!(format!("{err:#}").contains("outside the workspace"), "{bad}");
    }
    assert!(!out.exists());

    let logs = vec![" ./inside_data.csv ".to_string()];
    backup::export_workspace_bundle(&workspace, &out, &logs).expect("export inside log");
    let restored_ws = workspace.join("restored");
    let import = backup::import_workspace_bundle(&out, &restored_ws).expect("import");
    assert_eq!(import.restored_logs, vec!["inside_data.csv".to_string()]);
    assert!(restored_ws.join("inside_data.csv").is_file());

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(outside);
}
