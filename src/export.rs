use crate::matcher::AttendanceSet;
use crate::store::format_timestamp;
use anyhow::Context;
use rust_xlsxwriter::{Format, Workbook};

const EXPORT_COLUMNS: [&str; 4] = ["Name", "Matric", "ID", "Checked In"];

/// Renders the attendance list as an xlsx workbook with a single sheet.
pub fn to_spreadsheet_bytes(set: &AttendanceSet) -> anyhow::Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet
        .set_name("Attendance")
        .context("failed to name attendance sheet")?;

    for (col, title) in EXPORT_COLUMNS.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, *title, &header)
            .context("failed to write header row")?;
    }
    for (i, entry) in set.entries().iter().enumerate() {
        let row = (i + 1) as u32;
        let at = entry
            .checked_in_at
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_default();
        let cells = [
            entry.record.name.as_str(),
            entry.record.matric.as_str(),
            entry.record.id.as_str(),
            at.as_str(),
        ];
        for (col, value) in cells.iter().enumerate() {
            sheet
                .write_string(row, col as u16, *value)
                .with_context(|| format!("failed to write attendance row {}", row))?;
        }
    }
    sheet
        .set_column_width(0, 32)
        .context("failed to size name column")?;
    sheet
        .set_column_width(3, 20)
        .context("failed to size timestamp column")?;

    workbook
        .save_to_buffer()
        .context("failed to serialize attendance workbook")
}

pub fn to_csv_bytes(set: &AttendanceSet) -> anyhow::Result<Vec<u8>> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(EXPORT_COLUMNS)
        .context("failed to write csv header")?;
    for entry in set.entries() {
        w.write_record([
            entry.record.name.clone(),
            entry.record.matric.clone(),
            entry.record.id.clone(),
            entry
                .checked_in_at
                .as_ref()
                .map(format_timestamp)
                .unwrap_or_default(),
        ])
        .context("failed to write csv row")?;
    }
    w.into_inner()
        .map_err(|e| anyhow::anyhow!("failed to finish csv export: {}", e.error()))
}
