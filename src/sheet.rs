// src/sheet.rs
//! Flattening of the monthly "day-block" timesheet export.
//!
//! Layout: row 1 is free text, row 2 carries a date at the start of each
//! day block, row 3 the sub-headers, data from row 4. Columns 0-6 are fixed
//! (Sl. No., Employee Name, Location, then attendance tallies); every later
//! column belongs to the most recent date seen in row 2. Employee and
//! location are only written on the first line of each person's block.

use tracing::debug;

use crate::loader::{
    normalize_header, RawRecord, RawTable, COL_ACTIVITY, COL_ATTENDANCE, COL_DATE,
    COL_DESCRIPTION, COL_EMPLOYEE, COL_LOCATION, COL_PRIORITY, COL_WORK_MINUTES,
};
use crate::timesheet::is_blank;

const DATE_ROW: usize = 1;
const HEADER_ROW: usize = 2;
const DATA_START_ROW: usize = 3;
const FIRST_BLOCK_COLUMN: usize = 7;
const EMPLOYEE_COLUMN: usize = 1;
const LOCATION_COLUMN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockField {
    Attendance,
    Activity,
    Priority,
    WorkMinutes,
    Description,
}

fn block_field(header: &str) -> Option<BlockField> {
    let header = normalize_header(header);
    if header.contains("attendance") {
        Some(BlockField::Attendance)
    } else if header.contains("activity category") {
        Some(BlockField::Activity)
    } else if header.contains("task priority") {
        Some(BlockField::Priority)
    } else if header.contains("work time") || header.contains("mins") {
        Some(BlockField::WorkMinutes)
    } else if header.contains("description") {
        Some(BlockField::Description)
    } else {
        // Start/End times are not used downstream.
        None
    }
}

fn cell(record: &RawRecord, index: usize) -> &str {
    record.fields.get(index).map(String::as_str).unwrap_or("")
}

pub fn looks_like_day_blocks(records: &[RawRecord]) -> bool {
    let Some(header_row) = records.get(HEADER_ROW) else {
        return false;
    };
    header_row
        .fields
        .iter()
        .skip(FIRST_BLOCK_COLUMN)
        .any(|h| block_field(h) == Some(BlockField::Activity))
}

struct DayBlock {
    date: String,
    columns: Vec<(usize, BlockField)>,
}

fn day_blocks(records: &[RawRecord]) -> Vec<DayBlock> {
    let (Some(dates), Some(headers)) = (records.get(DATE_ROW), records.get(HEADER_ROW)) else {
        return Vec::new();
    };

    let mut blocks: Vec<DayBlock> = Vec::new();
    let width = dates.fields.len().max(headers.fields.len());
    for col in FIRST_BLOCK_COLUMN..width {
        let date_cell = cell(dates, col).trim();
        if !is_blank(date_cell) {
            blocks.push(DayBlock {
                date: date_cell.to_string(),
                columns: Vec::new(),
            });
        }
        if let (Some(block), Some(field)) = (blocks.last_mut(), block_field(cell(headers, col))) {
            block.columns.push((col, field));
        }
    }
    blocks
}

/// Produces a long-format table with the standard column names.
pub fn flatten_day_blocks(records: &[RawRecord]) -> RawTable {
    let headers = [
        COL_DATE,
        COL_EMPLOYEE,
        COL_ACTIVITY,
        COL_WORK_MINUTES,
        COL_LOCATION,
        COL_ATTENDANCE,
        COL_PRIORITY,
        COL_DESCRIPTION,
    ]
    .iter()
    .map(|h| h.to_string())
    .collect();

    let blocks = day_blocks(records);
    debug!("Found {} day blocks in sheet", blocks.len());

    let mut out = Vec::new();
    let mut employee: Option<String> = None;
    let mut location: Option<String> = None;

    for record in records.iter().skip(DATA_START_ROW) {
        let name_cell = cell(record, EMPLOYEE_COLUMN).trim();
        if !is_blank(name_cell) {
            employee = Some(name_cell.to_string());
            // A new person starts a new location run too.
            location = None;
        }
        let location_cell = cell(record, LOCATION_COLUMN).trim();
        if !is_blank(location_cell) {
            location = Some(location_cell.to_string());
        }
        let Some(employee_name) = employee.as_deref() else {
            continue;
        };

        for block in &blocks {
            let value = |wanted: BlockField| {
                block
                    .columns
                    .iter()
                    .find(|(_, field)| *field == wanted)
                    .map(|(col, _)| cell(record, *col).trim().to_string())
                    .unwrap_or_default()
            };
            let activity = value(BlockField::Activity);
            let description = value(BlockField::Description);
            if is_blank(&activity) && is_blank(&description) {
                continue;
            }
            let flat = RawRecord::new(
                record.line,
                vec![
                    block.date.clone(),
                    employee_name.to_string(),
                    activity,
                    value(BlockField::WorkMinutes),
                    location.clone().unwrap_or_default(),
                    value(BlockField::Attendance),
                    value(BlockField::Priority),
                    description,
                ],
            );
            out.push(flat.with_encoding_issue(record.encoding_issue.clone()));
        }
    }

    RawTable::new(headers, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{load_and_clean, read_all_records, LoadOptions};
    use crate::timesheet::AttendanceCode;
    use rust_decimal_macros::dec;

    const SHEET: &str = "\
Timesheet NOV'25,,,,,,,,,,,,,,,
,,,,,,,\"Sat, Nov 01, 25\",,,,\"Mon, Nov 03, 25\",,,,
Sl. No.,Employee Name,Location,P,L,A,WO/H,Attendance,Activity Category,Work Time (Mins),Description,Attendance,Activity Category,Work Time (Mins),Description
1,Asha,Pune,1,0,0,1,P,Training,120,Batch A,P,Travel,60,Bus to site
,,,,,,,,Content Development,45,,,,,
2,Ravi,,0,1,0,0,L,,,,A,Training,480,
";

    #[test]
    fn detects_layout() {
        let records = read_all_records(SHEET.as_bytes()).unwrap();
        assert!(looks_like_day_blocks(&records));
        let long = read_all_records(
            "Date,Employee Name,Activity Category,Work Time (Mins),Location,Attendance\n".as_bytes(),
        )
        .unwrap();
        assert!(!looks_like_day_blocks(&long));
    }

    #[test]
    fn flattens_blocks_and_forward_fills_people() {
        let records = read_all_records(SHEET.as_bytes()).unwrap();
        let table = flatten_day_blocks(&records);

        let summary: Vec<(String, String, String)> = table
            .records
            .iter()
            .map(|r| (r.fields[0].clone(), r.fields[1].clone(), r.fields[2].clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Sat, Nov 01, 25".into(), "Asha".into(), "Training".into()),
                ("Mon, Nov 03, 25".into(), "Asha".into(), "Travel".into()),
                ("Sat, Nov 01, 25".into(), "Asha".into(), "Content Development".into()),
                ("Mon, Nov 03, 25".into(), "Ravi".into(), "Training".into()),
            ]
        );
        // Continuation line inherits Asha's location; Ravi has none.
        assert_eq!(table.records[2].fields[4], "Pune");
        assert_eq!(table.records[3].fields[4], "");
    }

    #[test]
    fn flattened_sheet_loads_like_long_format() {
        let records = read_all_records(SHEET.as_bytes()).unwrap();
        let table = flatten_day_blocks(&records);
        let outcome = load_and_clean(&table, &LoadOptions::default()).unwrap();

        assert!(outcome.rejects.is_empty());
        assert_eq!(outcome.rows.len(), 4);
        assert_eq!(outcome.rows[0].work_minutes, dec!(120));
        assert_eq!(outcome.rows[0].description.as_deref(), Some("Batch A"));
        assert_eq!(outcome.rows[3].attendance, Some(AttendanceCode::Absent));
        assert_eq!(outcome.rows[3].location, "Unspecified");
        // Continuation line without an attendance cell
        assert_eq!(outcome.rows[2].attendance, None);
    }
}
