// src/test_support.rs
//! Row builders shared by the unit tests.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::timesheet::{AttendanceCode, TaskPriority, TimesheetRow};

pub fn d(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap_or_else(|_| panic!("Invalid date string format: {}", date_str))
}

/// Builds a row at location "Pune" with no priority or description.
pub fn row(
    line: u64,
    employee: &str,
    date: &str,
    activity: &str,
    minutes: i64,
    attendance: Option<AttendanceCode>,
) -> TimesheetRow {
    TimesheetRow {
        line,
        date: d(date),
        employee_name: employee.to_string(),
        activity_category: activity.to_string(),
        work_minutes: Decimal::from(minutes),
        location: "Pune".to_string(),
        attendance,
        task_priority: None,
        description: None,
    }
}

impl TimesheetRow {
    pub fn at(mut self, location: &str) -> Self {
        self.location = location.to_string();
        self
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.task_priority = Some(priority);
        self
    }

    pub fn described(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }
}
