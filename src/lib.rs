// src/lib.rs
//! Timesheet metrics: loading and cleaning, per-trainer metrics, anomaly
//! flags, grouping and report sections for a presentation layer.

pub mod aggregate;
pub mod anomaly;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod loader;
pub mod metrics;
pub mod report;
pub mod sheet;
pub mod timesheet;
pub mod trends;

#[cfg(test)]
mod test_support;

pub use aggregate::{group_by, group_by_pair, Aggregation, GroupKey, GroupedResult};
pub use anomaly::{detect_anomalies, Anomaly, AnomalyKind, AnomalyRule, RowReference};
pub use config::{AnomalyThresholds, CategoryRules, MetricsConfig, Settings};
pub use error::{InsightsError, Result, RowIssue};
pub use filter::DatasetFilter;
pub use loader::{load_and_clean, LoadOptions, LoadOutcome, RawTable, RejectedRow};
pub use metrics::{compute_metrics, MetricsReport, MetricsSummary, TrainerMetrics};
pub use report::{assemble_report, ReportAssembler, ReportSection, SectionSelection};
pub use timesheet::{AttendanceCode, DateOrder, TimesheetRow};
