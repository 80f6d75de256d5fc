// src/error.rs
use serde::Serialize;
use thiserror::Error;

/// Fatal errors. Any of these aborts the current pass and is shown to the user.
#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("Missing required column(s): {}", missing.join(", "))]
    Schema { missing: Vec<String> },
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("CSV read/write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Arithmetic overflow while {0}")]
    Overflow(String),
}

pub type Result<T> = std::result::Result<T, InsightsError>;

// Per-row problems. A row carrying one of these is excluded from metrics and
// reported as an anomaly, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowIssue {
    #[error("Employee name is empty")]
    MissingEmployee,
    #[error("Activity category is empty")]
    MissingActivity,
    #[error("Date '{raw}' could not be parsed")]
    UnparseableDate { raw: String },
    #[error("Date '{raw}' is ambiguous (day/month order cannot be determined)")]
    AmbiguousDate { raw: String },
    #[error("Work time '{raw}' is not a number")]
    InvalidMinutes { raw: String },
    #[error("Work time {minutes} is negative")]
    NegativeMinutes { minutes: String },
    #[error("Work time {minutes} exceeds the {max} minutes in a day")]
    ExcessiveMinutes { minutes: String, max: u32 },
    #[error("Cell in column {column} is not valid UTF-8")]
    InvalidEncoding { column: usize },
    #[error("Attendance code '{raw}' is not one of P, L, WO, H, A")]
    UnknownAttendance { raw: String },
}

impl RowIssue {
    /// Short stable identifier, used in tables and exports.
    pub fn code(&self) -> &'static str {
        match self {
            RowIssue::MissingEmployee => "MISSING_EMPLOYEE",
            RowIssue::MissingActivity => "MISSING_ACTIVITY",
            RowIssue::UnparseableDate { .. } => "UNPARSEABLE_DATE",
            RowIssue::AmbiguousDate { .. } => "AMBIGUOUS_DATE",
            RowIssue::InvalidMinutes { .. } => "INVALID_MINUTES",
            RowIssue::NegativeMinutes { .. } => "NEGATIVE_MINUTES",
            RowIssue::ExcessiveMinutes { .. } => "EXCESSIVE_MINUTES",
            RowIssue::InvalidEncoding { .. } => "INVALID_ENCODING",
            RowIssue::UnknownAttendance { .. } => "UNKNOWN_ATTENDANCE",
        }
    }
}
