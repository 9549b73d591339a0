use crate::matcher::{normalize_query, RosterRecord};
use calamine::{open_workbook_auto, Data, Reader};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub const FALLBACK_ROSTER_FILE: &str = "ENTRY.csv";
const REQUIRED_COLUMNS: [&str; 3] = ["Name", "Matric", "ID"];

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("failed to parse roster csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to read spreadsheet: {0}")]
    Spreadsheet(String),
    #[error("unsupported roster file type: {0}")]
    UnsupportedFormat(String),
    #[error("the file must contain columns: Name, Matric, and ID (missing {})", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("no roster file found (looked for {})", .0.join(", "))]
    NoDefaultFile(Vec<String>),
    #[error("roster table query failed: {0}")]
    Db(#[from] rusqlite::Error),
}

/// Anything that can hand over the list of eligible ticket holders.
pub trait RosterSource {
    fn load_roster(&self) -> Result<Vec<RosterRecord>, RosterError>;
}

/// A CSV or spreadsheet file chosen by the operator.
pub struct FileRoster {
    path: PathBuf,
}

impl FileRoster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RosterSource for FileRoster {
    fn load_roster(&self) -> Result<Vec<RosterRecord>, RosterError> {
        read_roster_file(&self.path)
    }
}

/// The event's configured roster file, falling back to `ENTRY.csv`.
pub struct DefaultRoster {
    workspace: PathBuf,
    preferred: Option<String>,
}

impl DefaultRoster {
    pub fn new(workspace: impl Into<PathBuf>, preferred: Option<String>) -> Self {
        Self {
            workspace: workspace.into(),
            preferred,
        }
    }

    pub fn resolve(&self) -> Result<PathBuf, RosterError> {
        let mut looked = Vec::new();
        let candidates = self
            .preferred
            .iter()
            .map(|p| self.workspace.join(p))
            .chain(std::iter::once(self.workspace.join(FALLBACK_ROSTER_FILE)));
        for candidate in candidates {
            if candidate.is_file() {
                return Ok(candidate);
            }
            looked.push(candidate.to_string_lossy().to_string());
        }
        Err(RosterError::NoDefaultFile(looked))
    }
}

impl RosterSource for DefaultRoster {
    fn load_roster(&self) -> Result<Vec<RosterRecord>, RosterError> {
        read_roster_file(&self.resolve()?)
    }
}

/// Roster rows stored in the workspace database for one event.
pub struct StoredRoster<'a> {
    conn: &'a Connection,
    event_id: String,
}

impl<'a> StoredRoster<'a> {
    pub fn new(conn: &'a Connection, event_id: impl Into<String>) -> Self {
        Self {
            conn,
            event_id: event_id.into(),
        }
    }
}

impl RosterSource for StoredRoster<'_> {
    fn load_roster(&self) -> Result<Vec<RosterRecord>, RosterError> {
        Ok(stored_rows(self.conn, &self.event_id)?
            .into_iter()
            .map(|(_, r)| r)
            .collect())
    }
}

pub fn read_roster_file(path: &Path) -> Result<Vec<RosterRecord>, RosterError> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "csv" | "txt" => read_csv_roster(path),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_spreadsheet_roster(path),
        other => Err(RosterError::UnsupportedFormat(if other.is_empty() {
            path.to_string_lossy().to_string()
        } else {
            other.to_string()
        })),
    }
}

struct ColumnMap {
    name: usize,
    matric: usize,
    id: usize,
}

impl ColumnMap {
    fn from_headers(headers: &[String]) -> Result<Self, RosterError> {
        let find = |col: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(col))
        };
        let found: Vec<Option<usize>> = REQUIRED_COLUMNS.iter().map(|c| find(*c)).collect();
        match (found[0], found[1], found[2]) {
            (Some(name), Some(matric), Some(id)) => Ok(Self { name, matric, id }),
            _ => Err(RosterError::MissingColumns(
                REQUIRED_COLUMNS
                    .iter()
                    .zip(found)
                    .filter(|(_, idx)| idx.is_none())
                    .map(|(c, _)| c.to_string())
                    .collect(),
            )),
        }
    }

    fn record(&self, cells: &[String]) -> Option<RosterRecord> {
        let cell = |i: usize| cells.get(i).map(|s| s.trim().to_string()).unwrap_or_default();
        let record = RosterRecord::new(cell(self.name), cell(self.matric), cell(self.id));
        if record.name.is_empty() && record.matric.is_empty() && record.id.is_empty() {
            return None;
        }
        Some(record)
    }
}

fn read_csv_roster(path: &Path) -> Result<Vec<RosterRecord>, RosterError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(|s| s.to_string()).collect();
    let columns = ColumnMap::from_headers(&headers)?;
    let mut out = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let cells: Vec<String> = row.iter().map(|s| s.to_string()).collect();
        out.extend(columns.record(&cells));
    }
    Ok(out)
}

fn read_spreadsheet_roster(path: &Path) -> Result<Vec<RosterRecord>, RosterError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| RosterError::Spreadsheet(e.to_string()))?;
    let Some(first) = workbook.sheet_names().first().cloned() else {
        return Err(RosterError::Spreadsheet("workbook contains no sheets".to_string()));
    };
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| RosterError::Spreadsheet(format!("sheet '{}': {}", first, e)))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Err(RosterError::MissingColumns(
            REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
        ));
    };
    let headers: Vec<String> = header_row.iter().map(cell_text).collect();
    let columns = ColumnMap::from_headers(&headers)?;
    Ok(rows
        .filter_map(|row| {
            let cells: Vec<String> = row.iter().map(cell_text).collect();
            columns.record(&cells)
        })
        .collect())
}

/// Spreadsheet ids are often typed as numbers; `101.0` must read back as `101`.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

fn stored_rows(conn: &Connection, event_id: &str) -> Result<Vec<(i64, RosterRecord)>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT sort_order, name, matric, id
         FROM roster_records
         WHERE event_id = ?
         ORDER BY sort_order",
    )?;
    stmt.query_map([event_id], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            RosterRecord::new(
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ),
        ))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
}

/// Replaces the stored roster for an event. Returns the number of rows kept.
pub fn replace_stored(
    conn: &Connection,
    event_id: &str,
    records: &[RosterRecord],
) -> Result<usize, RosterError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM roster_records WHERE event_id = ?", [event_id])?;
    {
        let mut insert = tx.prepare(
            "INSERT INTO roster_records(event_id, sort_order, name, matric, id)
             VALUES(?, ?, ?, ?, ?)",
        )?;
        for (i, r) in records.iter().enumerate() {
            insert.execute((event_id, i as i64, &r.name, &r.matric, &r.id))?;
        }
    }
    tx.commit()?;
    Ok(records.len())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterUpdate {
    NotFound,
    Unchanged(RosterRecord),
    Updated(RosterRecord),
}

/// Edits Name/Matric of the first stored row matching `key` by ID or Matric.
pub fn update_stored(
    conn: &Connection,
    event_id: &str,
    key: &str,
    name: Option<&str>,
    matric: Option<&str>,
) -> Result<RosterUpdate, RosterError> {
    let k = normalize_query(key);
    if k.is_empty() {
        return Ok(RosterUpdate::NotFound);
    }
    let rows = stored_rows(conn, event_id)?;
    let Some((sort_order, current)) = rows.into_iter().find(|(_, r)| r.matches_key(&k)) else {
        return Ok(RosterUpdate::NotFound);
    };

    let mut next = current.clone();
    if let Some(n) = name.map(str::trim).filter(|n| !n.is_empty()) {
        next.name = n.to_string();
    }
    if let Some(m) = matric.map(str::trim).filter(|m| !m.is_empty()) {
        next.matric = m.to_string();
    }
    if next == current {
        return Ok(RosterUpdate::Unchanged(current));
    }

    conn.execute(
        "UPDATE roster_records SET name = ?, matric = ? WHERE event_id = ? AND sort_order = ?",
        (&next.name, &next.matric, event_id, sort_order),
    )?;
    Ok(RosterUpdate::Updated(next))
}

/// Deletes every stored row matching `key` by ID or Matric.
pub fn delete_stored(conn: &Connection, event_id: &str, key: &str) -> Result<usize, RosterError> {
    let k = normalize_query(key);
    if k.is_empty() {
        return Ok(0);
    }
    let doomed: Vec<i64> = stored_rows(conn, event_id)?
        .into_iter()
        .filter(|(_, r)| r.matches_key(&k))
        .map(|(order, _)| order)
        .collect();
    let tx = conn.unchecked_transaction()?;
    for order in &doomed {
        tx.execute(
            "DELETE FROM roster_records WHERE event_id = ? AND sort_order = ?",
            (event_id, order),
        )?;
    }
    tx.commit()?;
    Ok(doomed.len())
}
