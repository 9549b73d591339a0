use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn fixture_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

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

fn seed_workspace(dst: &Path) {
    for name in ["ENTRY.csv", "users.csv", "checkind.toml"] {
        std::fs::copy(fixture_path(&format!("fixtures/event/{}", name)), dst.join(name))
            .expect("copy fixture");
    }
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_checkind");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn checkind");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn event_id_named(events: &serde_json::Value, name: &str) -> String {
    events
        .get("events")
        .and_then(|v| v.as_array())
        .and_then(|arr| {
            arr.iter()
                .find(|e| e.get("name").and_then(|n| n.as_str()) == Some(name))
        })
        .and_then(|e| e.get("id"))
        .and_then(|v| v.as_str())
        .expect("event in list")
        .to_string()
}

#[test]
fn config_seeds_events_and_operator_login_routes_to_csv_log() {
    let workspace = temp_dir("checkind-config-events");
    seed_workspace(&workspace);

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected.get("eventsImported").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        selected
            .get("configWarnings")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    let events = request_ok(&mut stdin, &mut reader, "2", "events.list", json!({}));
    assert_eq!(
        events.get("events").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );
    let sports_id = event_id_named(&events, "SPORTS DAY");

    let wrong = request(
        &mut stdin,
        &mut reader,
        "3",
        "session.open",
        json!({ "username": "irfan", "password": "S3CRET" }),
    );
    assert_eq!(error_code(&wrong), "auth_failed");

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "session.open",
        json!({ "username": " IRFAN ", "password": "s3cret" }),
    );
    assert_eq!(
        opened
            .get("event")
            .and_then(|e| e.get("name"))
            .and_then(|v| v.as_str()),
        Some("ROCK INDIE")
    );
    assert_eq!(opened.get("operator").and_then(|v| v.as_str()), Some("irfan"));
    assert_eq!(opened.get("store").and_then(|v| v.as_str()), Some("csv"));

    let loaded = request_ok(&mut stdin, &mut reader, "5", "roster.loadDefault", json!({}));
    assert_eq!(loaded.get("imported").and_then(|v| v.as_u64()), Some(4));
    assert!(loaded
        .get("sourcePath")
        .and_then(|v| v.as_str())
        .is_some_and(|p| p.ends_with("ENTRY.csv")));

    let r = request_ok(&mut stdin, &mut reader, "6", "checkin", json!({ "query": "b2" }));
    assert_eq!(r.get("status").and_then(|v| v.as_str()), Some("admitted"));
    let r = request_ok(&mut stdin, &mut reader, "7", "checkin", json!({ "query": "104" }));
    assert_eq!(r.get("status").and_then(|v| v.as_str()), Some("admitted"));

    let log = std::fs::read_to_string(workspace.join("rockindie_data.csv")).expect("read log");
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "Name,Matric,ID,CheckedInAt");
    assert!(lines[1].starts_with("Bob Lee,B2,102,"));
    assert!(lines[2].starts_with("Dan Ng,D4,104,"));

    let del = request_ok(&mut stdin, &mut reader, "8", "attendance.delete", json!({ "key": "102" }));
    assert_eq!(del.get("removed").and_then(|v| v.as_u64()), Some(1));
    let log = std::fs::read_to_string(workspace.join("rockindie_data.csv")).expect("read log");
    assert_eq!(log.lines().count(), 2);

    let no_event = request(
        &mut stdin,
        &mut reader,
        "9",
        "session.open",
        json!({ "username": "gate2", "password": "2222" }),
    );
    assert_eq!(error_code(&no_event), "bad_params");
    let gate = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "session.open",
        json!({ "username": "gate2", "password": "2222", "eventId": sports_id }),
    );
    assert_eq!(gate.get("store").and_then(|v| v.as_str()), Some("sqlite"));
    assert_eq!(gate.get("rosterCount").and_then(|v| v.as_u64()), Some(0));

    let by_code = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "session.open",
        json!({ "eventId": sports_id, "accessCode": "6666" }),
    );
    assert!(by_code.get("operator").is_some_and(|v| v.is_null()));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn csv_log_with_repeated_ids_is_deduplicated_on_open() {
    let workspace = temp_dir("checkind-config-dupes");
    seed_workspace(&workspace);
    std::fs::write(
        workspace.join("rockindie_data.csv"),
        "Name,Matric,ID\nAlice Tan,A1,101\nBob Lee,B2,102\nAlice Tan,A1,101\n",
    )
    .expect("write log");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let events = request_ok(&mut stdin, &mut reader, "2", "events.list", json!({}));
    let rock_id = event_id_named(&events, "ROCK INDIE");
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "session.open",
        json!({ "eventId": rock_id, "accessCode": "1234" }),
    );
    assert_eq!(opened.get("attendanceCount").and_then(|v| v.as_u64()), Some(2));

    let list = request_ok(&mut stdin, &mut reader, "4", "attendance.list", json!({}));
    let first = list
        .get("entries")
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .cloned()
        .unwrap_or_default();
    assert_eq!(first.get("name").and_then(|v| v.as_str()), Some("Alice Tan"));
    assert!(first.get("checkedInAt").is_some_and(|v| v.is_null()));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn invalid_config_is_reported_but_workspace_still_opens() {
    let workspace = temp_dir("checkind-config-invalid");
    std::fs::write(
        workspace.join("checkind.toml"),
        "[[events]]\nname = \"NO CODE\"\naccess_code = \"  \"\n",
    )
    .expect("write config");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected.get("eventsImported").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(
        selected
            .get("configWarnings")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );
    let events = request_ok(&mut stdin, &mut reader, "2", "events.list", json!({}));
    assert_eq!(
        events.get("events").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    let login = request(
        &mut stdin,
        &mut reader,
        "3",
        "session.open",
        json!({ "username": "irfan", "password": "s3cret" }),
    );
    assert_eq!(error_code(&login), "auth_failed");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn restored_bundle_config_reloads_operator_logins() {
    let source = temp_dir("checkind-config-bundle-src");
    seed_workspace(&source);
    let target = temp_dir("checkind-config-bundle-dst");
    std::fs::copy(fixture_path("fixtures/event/users.csv"), target.join("users.csv"))
        .expect("copy users sheet");
    let bundle = source.join("backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": source.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "backup.exportBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": target.to_string_lossy() }),
    );
    let before = request(
        &mut stdin,
        &mut reader,
        "4",
        "session.open",
        json!({ "username": "irfan", "password": "s3cret" }),
    );
    assert_eq!(error_code(&before), "auth_failed");

    let restored = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "backup.importBundle",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(restored.get("eventsImported").and_then(|v| v.as_u64()), Some(2));
    assert!(target.join("checkind.toml").is_file());

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "session.open",
        json!({ "username": "irfan", "password": "s3cret" }),
    );
    assert_eq!(
        after
            .get("event")
            .and_then(|e| e.get("name"))
            .and_then(|v| v.as_str()),
        Some("ROCK INDIE")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(source);
    let _ = std::fs::remove_dir_all(target);
}
