// src/timesheet.rs
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::RowIssue;

pub const MINUTES_PER_HOUR: Decimal = dec!(60);

/// Upper bound for a single entry. Keeps every downstream sum far from
/// `Decimal::MAX`.
pub const MAX_ROW_MINUTES: u32 = 24 * 60;

/// Location used when the sheet leaves the cell empty.
pub const UNSPECIFIED_LOCATION: &str = "Unspecified";

// --- Core Data Structures ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttendanceCode {
    #[serde(rename = "P")]
    Present,
    #[serde(rename = "L")]
    Leave,
    #[serde(rename = "WO")]
    WeeklyOff,
    #[serde(rename = "H")]
    Holiday,
    #[serde(rename = "A")]
    Absent,
}

impl AttendanceCode {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceCode::Present => "P",
            AttendanceCode::Leave => "L",
            AttendanceCode::WeeklyOff => "WO",
            AttendanceCode::Holiday => "H",
            AttendanceCode::Absent => "A",
        }
    }

    /// Codes that mean the person was not working that day.
    pub fn expects_no_work(&self) -> bool {
        matches!(self, AttendanceCode::Absent | AttendanceCode::Leave)
    }

    /// Codes under which a short working day is expected.
    pub fn is_non_working_day(&self) -> bool {
        !matches!(self, AttendanceCode::Present)
    }

    /// Parses a sheet cell. `Ok(None)` means the cell was empty.
    pub fn parse_cell(raw: &str) -> Result<Option<Self>, RowIssue> {
        let cleaned = raw.trim();
        if is_blank(cleaned) {
            return Ok(None);
        }
        let code = match cleaned.to_ascii_uppercase().as_str() {
            "P" | "PRESENT" => AttendanceCode::Present,
            "L" | "LEAVE" => AttendanceCode::Leave,
            "WO" | "WEEKLY OFF" | "WEEK OFF" => AttendanceCode::WeeklyOff,
            "H" | "HOLIDAY" => AttendanceCode::Holiday,
            "A" | "ABSENT" => AttendanceCode::Absent,
            _ => {
                return Err(RowIssue::UnknownAttendance {
                    raw: cleaned.to_string(),
                })
            }
        };
        Ok(Some(code))
    }
}

impl fmt::Display for AttendanceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl TaskPriority {
    pub fn parse_cell(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Some(TaskPriority::High),
            "medium" => Some(TaskPriority::Medium),
            "low" => Some(TaskPriority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskPriority::High => "High",
            TaskPriority::Medium => "Medium",
            TaskPriority::Low => "Low",
        };
        f.write_str(label)
    }
}

/// ISO week identifier, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeekKey {
    pub year: i32,
    pub week: u32,
}

impl WeekKey {
    pub fn of(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

/// One validated timesheet entry. Never mutated after loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimesheetRow {
    /// Source line in the input file.
    pub line: u64,
    pub date: NaiveDate,
    pub employee_name: String,
    pub activity_category: String,
    pub work_minutes: Decimal,
    pub location: String,
    pub attendance: Option<AttendanceCode>,
    pub task_priority: Option<TaskPriority>,
    pub description: Option<String>,
}

impl TimesheetRow {
    pub fn hours(&self) -> Decimal {
        self.work_minutes / MINUTES_PER_HOUR
    }

    pub fn week(&self) -> WeekKey {
        WeekKey::of(self.date)
    }
}

/// Activities are the same when they match ignoring case.
pub fn activity_key(activity: &str) -> String {
    activity.trim().to_lowercase()
}

/// Display label per activity: every spelling maps to the first one seen
/// in row order.
#[derive(Debug, Clone, Default)]
pub struct ActivityLabels(HashMap<String, String>);

impl ActivityLabels {
    pub fn from_rows(rows: &[TimesheetRow]) -> Self {
        let mut labels = HashMap::new();
        for row in rows {
            labels
                .entry(activity_key(&row.activity_category))
                .or_insert_with(|| row.activity_category.clone());
        }
        Self(labels)
    }

    pub fn label<'a>(&'a self, activity: &'a str) -> &'a str {
        self.0
            .get(&activity_key(activity))
            .map(String::as_str)
            .unwrap_or(activity)
    }
}

pub fn minutes_to_hours(minutes: Decimal) -> Decimal {
    minutes / MINUTES_PER_HOUR
}

/// Adds to a running total, saturating at `Decimal::MAX`.
pub fn add_saturating(total: &mut Decimal, amount: Decimal) {
    *total = total.saturating_add(amount);
}

/// `part / whole * 100`, or zero when `whole` is zero. Saturates at
/// `Decimal::MAX` instead of panicking on overflow.
pub fn percent(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(dec!(100)))
        .unwrap_or(Decimal::MAX)
}

// --- Cell Parsing ---

/// How purely numeric dates such as `03/04/2025` are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateOrder {
    /// Only accept numeric dates whose order is evident from the values.
    #[default]
    Strict,
    DayFirst,
    MonthFirst,
}

impl FromStr for DateOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(DateOrder::Strict),
            "day-first" | "dmy" => Ok(DateOrder::DayFirst),
            "month-first" | "mdy" => Ok(DateOrder::MonthFirst),
            other => Err(format!("unknown date order '{}'", other)),
        }
    }
}

static ORDINAL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)(st|nd|rd|th)\b").expect("ordinal regex is valid"));

static NUMERIC_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4})$").expect("numeric date regex is valid")
});

// Formats with a spelled-out month; none of them can be misread.
const TEXTUAL_DATE_FORMATS: [&str; 6] = [
    "%a, %b %d, %y",
    "%d-%b-%y",
    "%a, %b %d, %Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%b %d, %Y",
];

pub fn parse_date(raw: &str, order: DateOrder) -> Result<NaiveDate, RowIssue> {
    let trimmed = raw.trim();
    let unparseable = || RowIssue::UnparseableDate {
        raw: trimmed.to_string(),
    };
    if is_blank(trimmed) {
        return Err(unparseable());
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }

    if let Some(caps) = NUMERIC_DATE.captures(trimmed) {
        let first: u32 = caps[1].parse().map_err(|_| unparseable())?;
        let second: u32 = caps[2].parse().map_err(|_| unparseable())?;
        let year: i32 = caps[3].parse().map_err(|_| unparseable())?;
        let (day, month) = match order {
            DateOrder::DayFirst => (first, second),
            DateOrder::MonthFirst => (second, first),
            DateOrder::Strict => {
                if first > 12 {
                    (first, second)
                } else if second > 12 {
                    (second, first)
                } else if first == second {
                    (first, second)
                } else {
                    return Err(RowIssue::AmbiguousDate {
                        raw: trimmed.to_string(),
                    });
                }
            }
        };
        return NaiveDate::from_ymd_opt(year, month, day).ok_or_else(unparseable);
    }

    let cleaned = ORDINAL_SUFFIX.replace_all(trimmed, "$1");
    // chrono reads "25" happily as the year 25 under %Y, so pick the year
    // width from the text itself.
    let trailing_digits = cleaned
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .count();
    let wants_full_year = trailing_digits == 4;
    TEXTUAL_DATE_FORMATS
        .iter()
        .filter(|fmt| fmt.ends_with("%Y") == wants_full_year)
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
        .ok_or_else(unparseable)
}

/// Parses a "Work Time (Mins)" cell. Empty cells count as zero minutes.
pub fn parse_minutes(raw: &str) -> Result<Decimal, RowIssue> {
    let trimmed = raw.trim();
    if is_blank(trimmed) {
        return Ok(Decimal::ZERO);
    }
    let without_separators = trimmed.replace(',', "");
    let minutes = Decimal::from_str(&without_separators).map_err(|_| RowIssue::InvalidMinutes {
        raw: trimmed.to_string(),
    })?;
    if minutes < Decimal::ZERO {
        return Err(RowIssue::NegativeMinutes {
            minutes: minutes.to_string(),
        });
    }
    if minutes > Decimal::from(MAX_ROW_MINUTES) {
        return Err(RowIssue::ExcessiveMinutes {
            minutes: minutes.to_string(),
            max: MAX_ROW_MINUTES,
        });
    }
    Ok(minutes)
}

/// Spreadsheet exports write missing values as empty strings or "nan".
pub fn is_blank(cell: &str) -> bool {
    let trimmed = cell.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan")
}
