use chrono::NaiveDateTime;
use serde::Serialize;

/// One eligible ticket holder as loaded from the roster table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterRecord {
    pub name: String,
    pub matric: String,
    pub id: String,
}

impl RosterRecord {
    pub fn new(name: impl Into<String>, matric: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matric: matric.into(),
            id: id.into(),
        }
    }

    /// Lowercased `ID`; the attendance set is keyed on this.
    pub fn id_key(&self) -> String {
        self.id.to_lowercase()
    }

    /// `key` must already be normalized.
    pub fn matches_key(&self, key: &str) -> bool {
        self.id.to_lowercase() == key || self.matric.to_lowercase() == key
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceEntry {
    pub record: RosterRecord,
    pub checked_in_at: Option<NaiveDateTime>,
}

impl AttendanceEntry {
    pub fn new(record: RosterRecord, checked_in_at: Option<NaiveDateTime>) -> Self {
        Self {
            record,
            checked_in_at,
        }
    }
}

/// Check-in ordered attendance list. No two entries share a lowercase `ID`.
#[derive(Debug, Clone, Default)]
pub struct AttendanceSet {
    entries: Vec<AttendanceEntry>,
}

impl AttendanceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a set from persisted rows. Later rows repeating an earlier
    /// `ID` are dropped; the number dropped is returned alongside the set.
    pub fn restore(rows: impl IntoIterator<Item = AttendanceEntry>) -> (Self, usize) {
        let mut set = Self::new();
        let mut dropped = 0;
        for entry in rows {
            if set.contains_id(&entry.record.id_key()) {
                dropped += 1;
                continue;
            }
            set.entries.push(entry);
        }
        (set, dropped)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[AttendanceEntry] {
        &self.entries
    }

    pub fn contains_id(&self, id_key: &str) -> bool {
        self.entries.iter().any(|e| e.record.id_key() == id_key)
    }
}

pub fn normalize_query(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// First roster row whose `ID` or `Matric` equals the normalized query.
pub fn match_record<'a>(roster: &'a [RosterRecord], query: &str) -> Option<&'a RosterRecord> {
    let q = normalize_query(query);
    if q.is_empty() {
        return None;
    }
    roster.iter().find(|r| r.matches_key(&q))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    AlreadyPresent,
}

pub fn admit(set: &mut AttendanceSet, entry: AttendanceEntry) -> Admission {
    if set.contains_id(&entry.record.id_key()) {
        return Admission::AlreadyPresent;
    }
    set.entries.push(entry);
    Admission::Admitted
}

/// What a check-in would do, before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    EmptyQuery,
    NotFound,
    AlreadyPresent(RosterRecord),
    Admissible(RosterRecord),
}

pub fn resolve(roster: &[RosterRecord], set: &AttendanceSet, query: &str) -> Resolution {
    if normalize_query(query).is_empty() {
        return Resolution::EmptyQuery;
    }
    match match_record(roster, query) {
        None => Resolution::NotFound,
        Some(record) if set.contains_id(&record.id_key()) => {
            Resolution::AlreadyPresent(record.clone())
        }
        Some(record) => Resolution::Admissible(record.clone()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInOutcome {
    Admitted(RosterRecord),
    AlreadyPresent(RosterRecord),
    NotFound,
    EmptyQuery,
}

impl CheckInOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            CheckInOutcome::Admitted(_) => "admitted",
            CheckInOutcome::AlreadyPresent(_) => "alreadyPresent",
            CheckInOutcome::NotFound => "notFound",
            CheckInOutcome::EmptyQuery => "emptyQuery",
        }
    }

    pub fn record(&self) -> Option<&RosterRecord> {
        match self {
            CheckInOutcome::Admitted(r) | CheckInOutcome::AlreadyPresent(r) => Some(r),
            CheckInOutcome::NotFound | CheckInOutcome::EmptyQuery => None,
        }
    }
}

/// Match then admit, entirely in memory. Only tests use this; `Session`
/// persists between `resolve` and `admit`.
#[cfg(test)]
pub fn check_in(
    roster: &[RosterRecord],
    set: &mut AttendanceSet,
    query: &str,
    at: Option<NaiveDateTime>,
) -> CheckInOutcome {
    match resolve(roster, set, query) {
        Resolution::EmptyQuery => CheckInOutcome::EmptyQuery,
        Resolution::NotFound => CheckInOutcome::NotFound,
        Resolution::AlreadyPresent(record) => CheckInOutcome::AlreadyPresent(record),
        Resolution::Admissible(record) => {
            match admit(set, AttendanceEntry::new(record.clone(), at)) {
                Admission::Admitted => CheckInOutcome::Admitted(record),
                Admission::AlreadyPresent => CheckInOutcome::AlreadyPresent(record),
            }
        }
    }
}

/// Drops every entry whose `ID` or `Matric` equals `key`. Returns the count.
pub fn remove_by_key(set: &mut AttendanceSet, key: &str) -> usize {
    let k = normalize_query(key);
    if k.is_empty() {
        return 0;
    }
    let before = set.entries.len();
    set.entries.retain(|e| !e.record.matches_key(&k));
    before - set.entries.len()
}

pub fn clear(set: &mut AttendanceSet) {
    set.entries.clear();
}
