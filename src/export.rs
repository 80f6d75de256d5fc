// src/export.rs
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::config::CategoryRules;
use crate::error::Result;
use crate::timesheet::TimesheetRow;

#[derive(Debug, Serialize)]
struct CleanRecord<'a> {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Employee Name")]
    employee_name: &'a str,
    #[serde(rename = "Activity Category")]
    activity_category: &'a str,
    #[serde(rename = "Work Time (Mins)")]
    work_minutes: Decimal,
    #[serde(rename = "Location")]
    location: &'a str,
    #[serde(rename = "Attendance")]
    attendance: &'a str,
    #[serde(rename = "Task Priority")]
    task_priority: String,
    #[serde(rename = "Description")]
    description: &'a str,
    #[serde(rename = "Is Billable")]
    is_billable: bool,
    #[serde(rename = "Week")]
    week: String,
}

/// Writes the cleaned rows as long-format CSV with the derived billable flag
/// and ISO week. The output loads back through `load_and_clean`.
pub fn write_clean_csv<W: Write>(
    rows: &[TimesheetRow],
    rules: &CategoryRules,
    writer: W,
) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(CleanRecord {
            date: row.date,
            employee_name: &row.employee_name,
            activity_category: &row.activity_category,
            work_minutes: row.work_minutes,
            location: &row.location,
            attendance: row.attendance.map(|a| a.code()).unwrap_or(""),
            task_priority: row.task_priority.map(|p| p.to_string()).unwrap_or_default(),
            description: row.description.as_deref().unwrap_or(""),
            is_billable: rules.classify(&row.activity_category).billable,
            week: row.week().to_string(),
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_clean_csv_path(
    rows: &[TimesheetRow],
    rules: &CategoryRules,
    path: &Path,
) -> Result<()> {
    let file = File::create(path)?;
    write_clean_csv(rows, rules, file)?;
    info!("Wrote {} cleaned rows to {}", rows.len(), path.display());
    Ok(())
}
