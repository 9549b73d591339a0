use crate::matcher::{normalize_query, AttendanceEntry, RosterRecord};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const CSV_HEADER: [&str; 4] = ["Name", "Matric", "ID", "CheckedInAt"];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("attendance table failed: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("attendance log {path} failed: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("attendance log {path} failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendResult {
    Stored,
    /// Another writer already holds this `ID`.
    Duplicate,
}

/// Where the running attendance list is persisted.
pub trait AttendanceStore {
    fn kind(&self) -> &'static str;
    fn load(&mut self) -> Result<Vec<AttendanceEntry>, StoreError>;
    fn append(&mut self, entry: &AttendanceEntry) -> Result<AppendResult, StoreError>;
    /// Removes rows whose `ID` or `Matric` equals `key`; returns how many.
    fn delete_by_key(&mut self, key: &str) -> Result<usize, StoreError>;
    fn clear_all(&mut self) -> Result<(), StoreError>;
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(t, TIMESTAMP_FORMAT).ok()
}

pub struct SqliteAttendanceStore {
    conn: Connection,
    event_id: String,
}

impl SqliteAttendanceStore {
    /// Opens a dedicated connection; the schema must already exist.
    pub fn open(db_path: &Path, event_id: impl Into<String>) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn,
            event_id: event_id.into(),
        })
    }

    fn rows(&self) -> Result<Vec<(i64, AttendanceEntry)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, name, matric, id, checked_in_at
             FROM attendance
             WHERE event_id = ?
             ORDER BY seq",
        )?;
        let rows = stmt
            .query_map([&self.event_id], |r| {
                let at: Option<String> = r.get(4)?;
                Ok((
                    r.get::<_, i64>(0)?,
                    AttendanceEntry::new(
                        RosterRecord::new(
                            r.get::<_, String>(1)?,
                            r.get::<_, String>(2)?,
                            r.get::<_, String>(3)?,
                        ),
                        at.as_deref().and_then(parse_timestamp),
                    ),
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(rows)
    }
}

impl AttendanceStore for SqliteAttendanceStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn load(&mut self) -> Result<Vec<AttendanceEntry>, StoreError> {
        Ok(self.rows()?.into_iter().map(|(_, e)| e).collect())
    }

    fn append(&mut self, entry: &AttendanceEntry) -> Result<AppendResult, StoreError> {
        // UNIQUE(event_id, id_key) turns a concurrent double admit into a no-op.
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO attendance(event_id, seq, id_key, name, matric, id, checked_in_at)
             SELECT ?1, COALESCE(MAX(seq), 0) + 1, ?2, ?3, ?4, ?5, ?6
             FROM attendance WHERE event_id = ?1",
            (
                &self.event_id,
                entry.record.id_key(),
                &entry.record.name,
                &entry.record.matric,
                &entry.record.id,
                entry.checked_in_at.as_ref().map(format_timestamp),
            ),
        )?;
        Ok(if changed == 0 {
            AppendResult::Duplicate
        } else {
            AppendResult::Stored
        })
    }

    fn delete_by_key(&mut self, key: &str) -> Result<usize, StoreError> {
        let k = normalize_query(key);
        if k.is_empty() {
            return Ok(0);
        }
        let doomed: Vec<i64> = self
            .rows()?
            .into_iter()
            .filter(|(_, e)| e.record.matches_key(&k))
            .map(|(seq, _)| seq)
            .collect();
        let tx = self.conn.unchecked_transaction()?;
        for seq in &doomed {
            tx.execute(
                "DELETE FROM attendance WHERE event_id = ? AND seq = ?",
                (&self.event_id, seq),
            )?;
        }
        tx.commit()?;
        Ok(doomed.len())
    }

    fn clear_all(&mut self) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM attendance WHERE event_id = ?", [&self.event_id])?;
        Ok(())
    }
}

/// A plain `Name,Matric,ID,CheckedInAt` log, appended one row per admit.
pub struct CsvAttendanceStore {
    path: PathBuf,
}

impl CsvAttendanceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.to_string_lossy().to_string(),
            source,
        }
    }

    fn csv_err(&self, source: csv::Error) -> StoreError {
        StoreError::Csv {
            path: self.path.to_string_lossy().to_string(),
            source,
        }
    }

    fn has_content(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    fn row_of(entry: &AttendanceEntry) -> [String; 4] {
        [
            entry.record.name.clone(),
            entry.record.matric.clone(),
            entry.record.id.clone(),
            entry
                .checked_in_at
                .as_ref()
                .map(format_timestamp)
                .unwrap_or_default(),
        ]
    }

    fn existing_header(&self) -> Result<csv::StringRecord, StoreError> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| self.csv_err(e))?;
        Ok(rdr.headers().map_err(|e| self.csv_err(e))?.clone())
    }

    /// Lays `entry` out in the column order of an existing log. Unknown
    /// columns are left blank. `None` when the log has no `ID` column.
    fn row_in_order(header: &csv::StringRecord, entry: &AttendanceEntry) -> Option<Vec<String>> {
        if !header.iter().any(|h| h.eq_ignore_ascii_case("ID")) {
            return None;
        }
        let fields = Self::row_of(entry);
        Some(
            header
                .iter()
                .map(|h| {
                    CSV_HEADER
                        .iter()
                        .position(|col| h.eq_ignore_ascii_case(col))
                        .map(|i| fields[i].clone())
                        .unwrap_or_default()
                })
                .collect(),
        )
    }

    /// Writes the whole log through a temp file so a failed write keeps the old one.
    fn rewrite(&self, entries: &[AttendanceEntry]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let tmp = self.path.with_extension("csv.writing");
        {
            let mut w = csv::Writer::from_path(&tmp).map_err(|e| self.csv_err(e))?;
            w.write_record(CSV_HEADER).map_err(|e| self.csv_err(e))?;
            for entry in entries {
                w.write_record(Self::row_of(entry))
                    .map_err(|e| self.csv_err(e))?;
            }
            w.flush().map_err(|e| self.io_err(e))?;
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }
}

impl AttendanceStore for CsvAttendanceStore {
    fn kind(&self) -> &'static str {
        "csv"
    }

    fn load(&mut self) -> Result<Vec<AttendanceEntry>, StoreError> {
        if !self.has_content() {
            return Ok(Vec::new());
        }
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| self.csv_err(e))?;
        let headers = rdr.headers().map_err(|e| self.csv_err(e))?.clone();
        // Columns missing from an older log read as empty strings.
        let pos: Vec<Option<usize>> = CSV_HEADER
            .iter()
            .map(|col| headers.iter().position(|h| h.eq_ignore_ascii_case(col)))
            .collect();

        let mut out = Vec::new();
        for row in rdr.records() {
            let row = row.map_err(|e| self.csv_err(e))?;
            let cell = |i: usize| {
                pos[i]
                    .and_then(|p| row.get(p))
                    .unwrap_or("")
                    .to_string()
            };
            let record = RosterRecord::new(cell(0), cell(1), cell(2));
            if record.id.is_empty() && record.matric.is_empty() && record.name.is_empty() {
                continue;
            }
            out.push(AttendanceEntry::new(record, parse_timestamp(&cell(3))));
        }
        Ok(out)
    }

    fn append(&mut self, entry: &AttendanceEntry) -> Result<AppendResult, StoreError> {
        let key = entry.record.id_key();
        let existing = self.load()?;
        if existing.iter().any(|e| e.record.id_key() == key) {
            return Ok(AppendResult::Duplicate);
        }
        if !self.has_content() {
            self.rewrite(std::slice::from_ref(entry))?;
            return Ok(AppendResult::Stored);
        }

        let header = self.existing_header()?;
        let Some(row) = Self::row_in_order(&header, entry) else {
            // Without an ID column the log can't be deduplicated; normalize it.
            let mut rows = existing;
            rows.push(entry.clone());
            self.rewrite(&rows)?;
            return Ok(AppendResult::Stored);
        };

        let needs_newline = std::fs::read(&self.path)
            .map_err(|e| self.io_err(e))?
            .last()
            .is_some_and(|b| *b != b'\n');
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        if needs_newline {
            file.write_all(b"\n").map_err(|e| self.io_err(e))?;
        }
        let mut w = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        w.write_record(row).map_err(|e| self.csv_err(e))?;
        w.flush().map_err(|e| self.io_err(e))?;
        Ok(AppendResult::Stored)
    }

    fn delete_by_key(&mut self, key: &str) -> Result<usize, StoreError> {
        let k = normalize_query(key);
        if k.is_empty() {
            return Ok(0);
        }
        let rows = self.load()?;
        let before = rows.len();
        let kept: Vec<AttendanceEntry> = rows
            .into_iter()
            .filter(|e| !e.record.matches_key(&k))
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.rewrite(&kept)?;
        }
        Ok(removed)
    }

    fn clear_all(&mut self) -> Result<(), StoreError> {
        self.rewrite(&[])
    }
}
