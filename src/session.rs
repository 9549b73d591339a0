use crate::db::EventRow;
use crate::matcher::{
    self, AttendanceEntry, AttendanceSet, CheckInOutcome, Resolution, RosterRecord,
};
use crate::roster::RosterError;
use crate::scan::{QrDecoder, ScanState};
use crate::store::{
    AppendResult, AttendanceStore, CsvAttendanceStore, SqliteAttendanceStore, StoreError,
};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Roster(#[from] RosterError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    NoCode,
    Repeat(String),
    Checked {
        payload: String,
        outcome: CheckInOutcome,
    },
}

/// Picks the event's attendance backend: its CSV log when configured, the
/// workspace database otherwise.
pub fn open_store(workspace: &Path, event: &EventRow) -> Result<Box<dyn AttendanceStore>, StoreError> {
    match event.attendance_csv.as_deref() {
        Some(csv) if !csv.trim().is_empty() => {
            Ok(Box::new(CsvAttendanceStore::new(workspace.join(csv.trim()))))
        }
        _ => Ok(Box::new(SqliteAttendanceStore::open(
            &crate::db::db_path(workspace),
            event.id.clone(),
        )?)),
    }
}

/// Everything one logged-in check-in desk works against.
pub struct Session {
    pub event: EventRow,
    pub operator: Option<String>,
    pub scan: ScanState,
    roster: Vec<RosterRecord>,
    attendance: AttendanceSet,
    store: Box<dyn AttendanceStore>,
}

impl Session {
    pub fn open(
        event: EventRow,
        operator: Option<String>,
        roster: Vec<RosterRecord>,
        mut store: Box<dyn AttendanceStore>,
    ) -> Result<Self, SessionError> {
        let rows = store.load()?;
        let (attendance, dropped) = AttendanceSet::restore(rows);
        if dropped > 0 {
            tracing::warn!(
                event = %event.name,
                dropped,
                "ignored repeated IDs in persisted attendance"
            );
        }
        tracing::info!(
            event = %event.name,
            store = store.kind(),
            roster = roster.len(),
            attendance = attendance.len(),
            "session opened"
        );
        Ok(Self {
            event,
            operator,
            scan: ScanState::default(),
            roster,
            attendance,
            store,
        })
    }

    pub fn roster(&self) -> &[RosterRecord] {
        &self.roster
    }

    pub fn replace_roster(&mut self, roster: Vec<RosterRecord>) {
        self.roster = roster;
    }

    pub fn attendance(&self) -> &AttendanceSet {
        &self.attendance
    }

    pub fn store_kind(&self) -> &'static str {
        self.store.kind()
    }

    /// Re-reads the attendance list from the store.
    pub fn reload(&mut self) -> Result<(), SessionError> {
        let (attendance, _) = AttendanceSet::restore(self.store.load()?);
        self.attendance = attendance;
        Ok(())
    }

    /// Matches `query` and admits the record. The store is written before
    /// the in-memory set, so a failed write leaves the session unchanged.
    pub fn check_in(&mut self, query: &str) -> Result<CheckInOutcome, SessionError> {
        let outcome = match matcher::resolve(&self.roster, &self.attendance, query) {
            Resolution::EmptyQuery => CheckInOutcome::EmptyQuery,
            Resolution::NotFound => CheckInOutcome::NotFound,
            Resolution::AlreadyPresent(record) => CheckInOutcome::AlreadyPresent(record),
            Resolution::Admissible(record) => {
                let entry =
                    AttendanceEntry::new(record.clone(), Some(chrono::Local::now().naive_local()));
                match self.store.append(&entry)? {
                    AppendResult::Stored => {
                        matcher::admit(&mut self.attendance, entry);
                        CheckInOutcome::Admitted(record)
                    }
                    AppendResult::Duplicate => {
                        tracing::warn!(
                            event = %self.event.name,
                            id = %record.id,
                            "store already held this ID; reloading attendance"
                        );
                        self.reload()?;
                        CheckInOutcome::AlreadyPresent(record)
                    }
                }
            }
        };
        tracing::debug!(
            event = %self.event.name,
            status = outcome.status(),
            total = self.attendance.len(),
            "check-in"
        );
        Ok(outcome)
    }

    pub fn remove(&mut self, key: &str) -> Result<usize, SessionError> {
        let stored = self.store.delete_by_key(key)?;
        let local = matcher::remove_by_key(&mut self.attendance, key);
        Ok(stored.max(local))
    }

    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.store.clear_all()?;
        matcher::clear(&mut self.attendance);
        tracing::info!(event = %self.event.name, "attendance cleared");
        Ok(())
    }

    pub fn submit_scan(
        &mut self,
        decoder: &dyn QrDecoder,
        frame: &[u8],
    ) -> Result<ScanOutcome, SessionError> {
        let Some(payload) = decoder.decode(frame) else {
            return Ok(ScanOutcome::NoCode);
        };
        if !self.scan.accept(&payload) {
            return Ok(ScanOutcome::Repeat(payload));
        }
        let outcome = self.check_in(&payload)?;
        Ok(ScanOutcome::Checked { payload, outcome })
    }
}
