// src/loader.rs
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{InsightsError, Result, RowIssue};
use crate::sheet;
use crate::timesheet::{
    is_blank, parse_date, parse_minutes, AttendanceCode, DateOrder, TaskPriority, TimesheetRow,
    UNSPECIFIED_LOCATION,
};

// --- Column Names ---

pub const COL_DATE: &str = "Date";
pub const COL_EMPLOYEE: &str = "Employee Name";
pub const COL_ACTIVITY: &str = "Activity Category";
pub const COL_WORK_MINUTES: &str = "Work Time (Mins)";
pub const COL_LOCATION: &str = "Location";
pub const COL_ATTENDANCE: &str = "Attendance";
pub const COL_PRIORITY: &str = "Task Priority";
pub const COL_DESCRIPTION: &str = "Description";

pub const REQUIRED_COLUMNS: [&str; 6] = [
    COL_DATE,
    COL_EMPLOYEE,
    COL_ACTIVITY,
    COL_WORK_MINUTES,
    COL_LOCATION,
    COL_ATTENDANCE,
];

/// Lowercase with runs of whitespace collapsed, so "Employee  name " matches.
pub fn normalize_header(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// --- Raw Input ---

#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub line: u64,
    pub fields: Vec<String>,
    /// Set when a cell could not be decoded; such a record is rejected.
    pub encoding_issue: Option<RowIssue>,
}

impl RawRecord {
    pub fn new(line: u64, fields: Vec<String>) -> Self {
        Self {
            line,
            fields,
            encoding_issue: None,
        }
    }

    pub fn with_encoding_issue(mut self, issue: Option<RowIssue>) -> Self {
        self.encoding_issue = issue;
        self
    }

    fn get(&self, index: usize) -> &str {
        self.fields.get(index).map(String::as_str).unwrap_or("")
    }
}

/// Untyped table as read from a file, before any validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub records: Vec<RawRecord>,
}

pub(crate) fn read_all_records<R: Read>(reader: R) -> Result<Vec<RawRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    // Byte records, so one badly encoded cell costs its row and not the file.
    let mut records = Vec::new();
    for result in csv_reader.byte_records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let mut issue = None;
        let fields: Vec<String> = record
            .iter()
            .enumerate()
            .map(|(index, bytes)| match std::str::from_utf8(bytes) {
                Ok(text) => text.to_string(),
                Err(_) => {
                    issue.get_or_insert(RowIssue::InvalidEncoding { column: index + 1 });
                    String::from_utf8_lossy(bytes).into_owned()
                }
            })
            .collect();
        if issue.is_some() {
            debug!("Line {} contains a cell that is not valid UTF-8", line);
        }
        records.push(RawRecord::new(line, fields).with_encoding_issue(issue));
    }
    Ok(records)
}

impl RawTable {
    pub fn new(headers: Vec<String>, records: Vec<RawRecord>) -> Self {
        Self { headers, records }
    }

    /// Reads a long-format CSV: one header row, one entry per line.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut records = read_all_records(reader)?.into_iter();
        let headers = records.next().map(|r| r.fields).unwrap_or_default();
        Ok(Self::new(headers, records.collect()))
    }

    /// Reads the monthly "day-block" sheet and flattens it to long format.
    pub fn from_day_block_sheet<R: Read>(reader: R) -> Result<Self> {
        let records = read_all_records(reader)?;
        Ok(sheet::flatten_day_blocks(&records))
    }

    /// Picks the layout from the content: a first row carrying every required
    /// column is long format, anything else is tried as a day-block sheet.
    pub fn from_reader_auto<R: Read>(reader: R) -> Result<Self> {
        let records = read_all_records(reader)?;
        let first_row_is_header = records
            .first()
            .map(|r| missing_columns(&r.fields).is_empty())
            .unwrap_or(false);

        if first_row_is_header || !sheet::looks_like_day_blocks(&records) {
            debug!("Reading input as long-format table");
            let mut iter = records.into_iter();
            let headers = iter.next().map(|r| r.fields).unwrap_or_default();
            Ok(Self::new(headers, iter.collect()))
        } else {
            info!("Input looks like a day-block sheet; flattening per-date columns");
            Ok(sheet::flatten_day_blocks(&records))
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader_auto(file)
    }
}

fn missing_columns(headers: &[String]) -> Vec<String> {
    let present: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    REQUIRED_COLUMNS
        .iter()
        .filter(|required| !present.contains(&normalize_header(required)))
        .map(|required| required.to_string())
        .collect()
}

// --- Validated Output ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadOptions {
    pub date_order: DateOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRow {
    pub line: u64,
    pub employee_name: Option<String>,
    pub issue: RowIssue,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadOutcome {
    pub rows: Vec<TimesheetRow>,
    pub rejects: Vec<RejectedRow>,
}

struct ColumnIndex {
    date: usize,
    employee: usize,
    activity: usize,
    minutes: usize,
    location: usize,
    attendance: usize,
    priority: Option<usize>,
    description: Option<usize>,
}

impl ColumnIndex {
    fn resolve(headers: &[String]) -> Result<Self> {
        let missing = missing_columns(headers);
        if !missing.is_empty() {
            warn!("Schema validation failed, missing columns: {:?}", missing);
            return Err(InsightsError::Schema { missing });
        }

        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let find = |name: &str| {
            let wanted = normalize_header(name);
            normalized.iter().position(|h| *h == wanted)
        };
        // Presence was checked above.
        let required = |name: &str| find(name).unwrap_or_default();

        Ok(Self {
            date: required(COL_DATE),
            employee: required(COL_EMPLOYEE),
            activity: required(COL_ACTIVITY),
            minutes: required(COL_WORK_MINUTES),
            location: required(COL_LOCATION),
            attendance: required(COL_ATTENDANCE),
            priority: find(COL_PRIORITY),
            description: find(COL_DESCRIPTION),
        })
    }
}

fn clean_record(
    record: &RawRecord,
    columns: &ColumnIndex,
    options: &LoadOptions,
) -> std::result::Result<TimesheetRow, RowIssue> {
    if let Some(issue) = &record.encoding_issue {
        return Err(issue.clone());
    }
    let employee_name = record.get(columns.employee).trim();
    if is_blank(employee_name) {
        return Err(RowIssue::MissingEmployee);
    }
    let activity_category = record.get(columns.activity).trim();
    if is_blank(activity_category) {
        return Err(RowIssue::MissingActivity);
    }

    let date = parse_date(record.get(columns.date), options.date_order)?;
    let work_minutes = parse_minutes(record.get(columns.minutes))?;
    let attendance = AttendanceCode::parse_cell(record.get(columns.attendance))?;

    let location = record.get(columns.location).trim();
    let location = if is_blank(location) {
        UNSPECIFIED_LOCATION
    } else {
        location
    };

    let task_priority = columns
        .priority
        .and_then(|i| TaskPriority::parse_cell(record.get(i)));
    let description = columns
        .description
        .map(|i| record.get(i).trim())
        .filter(|text| !is_blank(text))
        .map(str::to_string);

    Ok(TimesheetRow {
        line: record.line,
        date,
        employee_name: employee_name.to_string(),
        activity_category: activity_category.to_string(),
        work_minutes,
        location: location.to_string(),
        attendance,
        task_priority,
        description,
    })
}

fn is_empty_record(record: &RawRecord) -> bool {
    record.fields.iter().all(|field| field.trim().is_empty())
}

/// Validates the schema once, then every row. Rows that fail are returned as
/// rejects (and excluded from the clean rows); a schema failure is fatal.
pub fn load_and_clean(table: &RawTable, options: &LoadOptions) -> Result<LoadOutcome> {
    let columns = ColumnIndex::resolve(&table.headers)?;

    let mut outcome = LoadOutcome::default();
    for record in &table.records {
        if is_empty_record(record) {
            continue;
        }
        match clean_record(record, &columns, options) {
            Ok(row) => outcome.rows.push(row),
            Err(issue) => {
                warn!("Rejected line {}: {}", record.line, issue);
                let employee_name = Some(record.get(columns.employee).trim())
                    .filter(|name| !is_blank(name))
                    .map(str::to_string);
                outcome.rejects.push(RejectedRow {
                    line: record.line,
                    employee_name,
                    issue,
                });
            }
        }
    }

    info!(
        "Loaded {} timesheet rows ({} rejected)",
        outcome.rows.len(),
        outcome.rejects.len()
    );
    Ok(outcome)
}

pub fn load_path(path: &Path, options: &LoadOptions) -> Result<LoadOutcome> {
    info!("Reading timesheet from {}", path.display());
    let table = RawTable::from_path(path)?;
    load_and_clean(&table, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    const HEADER: &str =
        "Date,Employee Name,Activity Category,Work Time (Mins),Location,Attendance\n";

    fn load(body: &str) -> Result<LoadOutcome> {
        let csv = format!("{}{}", HEADER, body);
        let table = RawTable::from_reader(csv.as_bytes())?;
        load_and_clean(&table, &LoadOptions::default())
    }

    #[test]
    fn valid_rows_are_typed_and_keep_source_order() {
        let outcome = load(
            "2025-11-03,Asha,Training,120,Pune,P\n\
             2025-11-04,Asha,Travel,\"1,020\",Pune,P\n",
        )
        .unwrap();

        assert!(outcome.rejects.is_empty());
        assert_eq!(outcome.rows.len(), 2);
        let first = &outcome.rows[0];
        assert_eq!(first.line, 2);
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2025, 11, 3).unwrap());
        assert_eq!(first.employee_name, "Asha");
        assert_eq!(first.work_minutes, dec!(120));
        assert_eq!(first.hours(), dec!(2));
        assert_eq!(first.attendance, Some(AttendanceCode::Present));
        assert_eq!(outcome.rows[1].work_minutes, dec!(1020));
    }

    #[test]
    fn missing_columns_fail_fast_with_all_names() {
        let csv = "Date,Employee,Activity Category,Minutes,Location,Attendance\n\
                   2025-11-03,Asha,Training,120,Pune,P\n";
        let table = RawTable::from_reader(csv.as_bytes()).unwrap();
        match load_and_clean(&table, &LoadOptions::default()) {
            Err(InsightsError::Schema { missing }) => {
                assert_eq!(missing, vec![COL_EMPLOYEE.to_string(), COL_WORK_MINUTES.to_string()]);
            }
            other => panic!("Expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn header_matching_ignores_case_and_spacing() {
        let csv = " date ,EMPLOYEE  NAME,activity category,Work Time (mins),location,attendance\n\
                   2025-11-03,Asha,Training,120,Pune,P\n";
        let table = RawTable::from_reader(csv.as_bytes()).unwrap();
        let outcome = load_and_clean(&table, &LoadOptions::default()).unwrap();
        assert_eq!(outcome.rows.len(), 1);
    }

    #[test]
    fn invalid_rows_are_rejected_not_fixed() {
        let outcome = load(
            "2025-11-03,Asha,Training,-30,Pune,P\n\
             not-a-date,Asha,Training,30,Pune,P\n\
             03/04/2025,Ravi,Training,30,Pune,P\n\
             2025-11-03,,Training,30,Pune,P\n\
             2025-11-03,Ravi,Training,abc,Pune,P\n\
             2025-11-03,Ravi,Training,30,Pune,X\n\
             2025-11-03,Ravi,,30,Pune,P\n\
             2025-11-03,Ravi,Training,30,Pune,P\n",
        )
        .unwrap();

        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].line, 9);
        let issues: Vec<&str> = outcome.rejects.iter().map(|r| r.issue.code()).collect();
        assert_eq!(
            issues,
            vec![
                "NEGATIVE_MINUTES",
                "UNPARSEABLE_DATE",
                "AMBIGUOUS_DATE",
                "MISSING_EMPLOYEE",
                "INVALID_MINUTES",
                "UNKNOWN_ATTENDANCE",
                "MISSING_ACTIVITY",
            ]
        );
        assert_eq!(outcome.rejects[0].line, 2);
        assert_eq!(outcome.rejects[0].employee_name.as_deref(), Some("Asha"));
        assert_eq!(outcome.rejects[3].employee_name, None);
    }

    #[test]
    fn day_first_option_resolves_numeric_dates() {
        let csv = format!("{}03/04/2025,Ravi,Training,30,Pune,P\n", HEADER);
        let table = RawTable::from_reader(csv.as_bytes()).unwrap();
        let outcome = load_and_clean(
            &table,
            &LoadOptions {
                date_order: DateOrder::DayFirst,
            },
        )
        .unwrap();
        assert_eq!(
            outcome.rows[0].date,
            NaiveDate::from_ymd_opt(2025, 4, 3).unwrap()
        );
    }

    #[test]
    fn blank_location_and_attendance_are_kept() {
        let outcome = load("2025-11-03,Asha,Training,,,\n,,,,,\n").unwrap();
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].location, UNSPECIFIED_LOCATION);
        assert_eq!(outcome.rows[0].attendance, None);
        assert_eq!(outcome.rows[0].work_minutes, dec!(0));
    }

    #[test]
    fn optional_columns_are_picked_up() {
        let csv = "Date,Employee Name,Activity Category,Work Time (Mins),Location,Attendance,Task Priority,Description\n\
                   2025-11-03,Asha,Training,60,Pune,P,High,Batch 4 onboarding\n";
        let table = RawTable::from_reader(csv.as_bytes()).unwrap();
        let outcome = load_and_clean(&table, &LoadOptions::default()).unwrap();
        assert_eq!(outcome.rows[0].task_priority, Some(TaskPriority::High));
        assert_eq!(
            outcome.rows[0].description.as_deref(),
            Some("Batch 4 onboarding")
        );
    }

    #[test]
    fn badly_encoded_row_is_rejected_and_the_rest_kept() {
        let mut bytes = HEADER.as_bytes().to_vec();
        bytes.extend_from_slice(b"2025-11-03,Asha,Training,120,Pune,P\n");
        bytes.extend_from_slice(b"2025-11-03,Ravi,Training,60,Caf\xe9,P\n");
        bytes.extend_from_slice(b"2025-11-04,Ravi,Travel,30,Pune,P\n");

        let table = RawTable::from_reader(bytes.as_slice()).unwrap();
        let outcome = load_and_clean(&table, &LoadOptions::default()).unwrap();

        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.rows[1].line, 4);
        assert_eq!(outcome.rejects.len(), 1);
        assert_eq!(outcome.rejects[0].line, 3);
        assert_eq!(outcome.rejects[0].employee_name.as_deref(), Some("Ravi"));
        assert_eq!(
            outcome.rejects[0].issue,
            RowIssue::InvalidEncoding { column: 5 }
        );
    }

    #[test]
    fn minutes_above_one_day_are_rejected() {
        let outcome = load(
            "2025-11-03,Asha,Training,79228162514264337593543950335,Pune,P\n\
             2025-11-04,Asha,Training,79228162514264337593543950335,Pune,P\n",
        )
        .unwrap();
        assert!(outcome.rows.is_empty());
        assert!(outcome
            .rejects
            .iter()
            .all(|r| r.issue.code() == "EXCESSIVE_MINUTES"));
    }

    #[test]
    fn auto_detection_reads_long_format() {
        let csv = format!("{}2025-11-03,Asha,Training,60,Pune,P\n", HEADER);
        let table = RawTable::from_reader_auto(csv.as_bytes()).unwrap();
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.headers[0], "Date");
    }
}
