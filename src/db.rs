use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DB_FILE: &str = "checkind.sqlite3";

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join(DB_FILE)
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(db_path(workspace))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            access_hash TEXT NOT NULL,
            roster_path TEXT,
            attendance_csv TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS roster_records(
            event_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            name TEXT NOT NULL,
            matric TEXT NOT NULL,
            id TEXT NOT NULL,
            PRIMARY KEY(event_id, sort_order),
            FOREIGN KEY(event_id) REFERENCES events(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            event_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            id_key TEXT NOT NULL,
            name TEXT NOT NULL,
            matric TEXT NOT NULL,
            id TEXT NOT NULL,
            checked_in_at TEXT,
            PRIMARY KEY(event_id, seq),
            UNIQUE(event_id, id_key),
            FOREIGN KEY(event_id) REFERENCES events(id)
        )",
        [],
    )?;

    Ok(conn)
}

#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: String,
    pub name: String,
    pub access_hash: String,
    pub roster_path: Option<String>,
    pub attendance_csv: Option<String>,
}

impl EventRow {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "rosterPath": self.roster_path,
            "attendanceCsv": self.attendance_csv,
        })
    }
}

const EVENT_COLUMNS: &str = "id, name, access_hash, roster_path, attendance_csv";

fn event_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: r.get(0)?,
        name: r.get(1)?,
        access_hash: r.get(2)?,
        roster_path: r.get(3)?,
        attendance_csv: r.get(4)?,
    })
}

pub fn list_events(conn: &Connection) -> rusqlite::Result<Vec<EventRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM events ORDER BY name",
        EVENT_COLUMNS
    ))?;
    let rows = stmt
        .query_map([], event_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

pub fn find_event(conn: &Connection, event_id: &str) -> rusqlite::Result<Option<EventRow>> {
    conn.query_row(
        &format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS),
        [event_id],
        event_from_row,
    )
    .optional()
}

/// Event names are compared case-insensitively.
pub fn find_event_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<EventRow>> {
    let wanted = name.trim().to_lowercase();
    Ok(list_events(conn)?
        .into_iter()
        .find(|e| e.name.to_lowercase() == wanted))
}

pub fn create_event(
    conn: &Connection,
    name: &str,
    access_hash: &str,
    roster_path: Option<&str>,
    attendance_csv: Option<&str>,
) -> rusqlite::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO events(id, name, access_hash, roster_path, attendance_csv, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            name,
            access_hash,
            roster_path,
            attendance_csv,
            chrono::Local::now().to_rfc3339(),
        ),
    )?;
    Ok(id)
}

/// Inserts or refreshes the event with this name. Returns its id.
pub fn upsert_event(
    conn: &Connection,
    name: &str,
    access_hash: &str,
    roster_path: Option<&str>,
    attendance_csv: Option<&str>,
) -> rusqlite::Result<String> {
    match find_event_by_name(conn, name)? {
        Some(existing) => {
            conn.execute(
                "UPDATE events SET access_hash = ?, roster_path = ?, attendance_csv = ? WHERE id = ?",
                (access_hash, roster_path, attendance_csv, &existing.id),
            )?;
            Ok(existing.id)
        }
        None => create_event(conn, name, access_hash, roster_path, attendance_csv),
    }
}

/// Deletes an event with its roster and stored attendance. False if unknown.
pub fn delete_event(conn: &Connection, event_id: &str) -> rusqlite::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM attendance WHERE event_id = ?", [event_id])?;
    tx.execute("DELETE FROM roster_records WHERE event_id = ?", [event_id])?;
    let n = tx.execute("DELETE FROM events WHERE id = ?", [event_id])?;
    tx.commit()?;
    Ok(n > 0)
}

pub fn roster_count(conn: &Connection, event_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM roster_records WHERE event_id = ?",
        [event_id],
        |r| r.get(0),
    )
}
