#![allow(dead_code)]

#[path = "../src/export.rs"]
mod export;
#[path = "../src/matcher.rs"]
mod matcher;
#[path = "../src/store.rs"]
mod store;

use calamine::{Data, Reader, Xlsx};
use chrono::NaiveDate;
use matcher::{AttendanceEntry, AttendanceSet, RosterRecord};
use std::io::Cursor;

fn sample_set() -> AttendanceSet {
    let at = NaiveDate::from_ymd_opt(2026, 10, 16)
        .and_then(|d| d.and_hms_opt(20, 5, 9))
        .expect("valid timestamp");
    let (set, dropped) = AttendanceSet::restore(vec![
        AttendanceEntry::new(RosterRecord::new("Alice Tan", "A1", "101"), Some(at)),
        AttendanceEntry::new(RosterRecord::new("Bob, Jr", "B2", "0102"), None),
    ]);
    assert_eq!(dropped, 0);
    set
}

#[test]
fn spreadsheet_export_has_header_and_rows_in_check_in_order() {
    let bytes = export::to_spreadsheet_bytes(&sample_set()).expect("render xlsx");
    let mut workbook = Xlsx::new(Cursor::new(bytes)).expect("open rendered xlsx");
    assert_eq!(workbook.sheet_names(), vec!["Attendance".to_string()]);

    let range = workbook.worksheet_range("Attendance").expect("sheet range");
    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|r| {
            r.iter()
                .map(|c| match c {
                    Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], vec!["Name", "Matric", "ID", "Checked In"]);
    assert_eq!(rows[1], vec!["Alice Tan", "A1", "101", "2026-10-16 20:05:09"]);
    assert_eq!(rows[2][0], "Bob, Jr");
    // IDs stay text so leading zeros survive.
    assert_eq!(rows[2][2], "0102");
}

#[test]
fn spreadsheet_export_of_empty_set_is_header_only() {
    let bytes = export::to_spreadsheet_bytes(&AttendanceSet::new()).expect("render xlsx");
    let mut workbook = Xlsx::new(Cursor::new(bytes)).expect("open rendered xlsx");
    let range = workbook.worksheet_range("Attendance").expect("sheet range");
    assert_eq!(range.rows().count(), 1);
}

#[test]
fn csv_export_quotes_commas() {
    let bytes = export::to_csv_bytes(&sample_set()).expect("render csv");
    let text = String::from_utf8(bytes).expect("utf8");
    assert_eq!(
        text,
        "Name,Matric,ID,Checked In\nAlice Tan,A1,101,2026-10-16 20:05:09\n\"Bob, Jr\",B2,0102,\n"
    );
}
