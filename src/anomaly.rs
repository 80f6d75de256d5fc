// src/anomaly.rs
use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info};

use crate::config::AnomalyThresholds;
use crate::loader::RejectedRow;
use crate::metrics::MetricsReport;
use crate::timesheet::{activity_key, add_saturating, AttendanceCode, TimesheetRow};

// --- Constants ---
pub mod rule_id {
    pub const ZERO_DURATION: &str = "ZERO_DURATION";
    pub const DUPLICATE: &str = "DUPLICATE";
    pub const ATTENDANCE_MISMATCH: &str = "ATTENDANCE_MISMATCH";
    pub const MISSING_ATTENDANCE: &str = "MISSING_ATTENDANCE";
    pub const DAILY_CEILING: &str = "DAILY_CEILING";
    pub const LOW_PRODUCTIVITY_DAY: &str = "LOW_PRODUCTIVITY_DAY";
    pub const WEEKEND_WORK: &str = "WEEKEND_WORK";
}

// --- Rules ---

/// Row-level checks. Each rule is independent; the order of `ALL` is the
/// tie-break order for anomalies anchored on the same line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyRule {
    ZeroDuration,
    Duplicate,
    AttendanceMismatch,
    MissingAttendance,
    DailyCeiling,
    LowProductivityDay,
    WeekendWork,
}

impl AnomalyRule {
    pub const ALL: [AnomalyRule; 7] = [
        AnomalyRule::ZeroDuration,
        AnomalyRule::Duplicate,
        AnomalyRule::AttendanceMismatch,
        AnomalyRule::MissingAttendance,
        AnomalyRule::DailyCeiling,
        AnomalyRule::LowProductivityDay,
        AnomalyRule::WeekendWork,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            AnomalyRule::ZeroDuration => rule_id::ZERO_DURATION,
            AnomalyRule::Duplicate => rule_id::DUPLICATE,
            AnomalyRule::AttendanceMismatch => rule_id::ATTENDANCE_MISMATCH,
            AnomalyRule::MissingAttendance => rule_id::MISSING_ATTENDANCE,
            AnomalyRule::DailyCeiling => rule_id::DAILY_CEILING,
            AnomalyRule::LowProductivityDay => rule_id::LOW_PRODUCTIVITY_DAY,
            AnomalyRule::WeekendWork => rule_id::WEEKEND_WORK,
        }
    }

    fn rank(&self) -> usize {
        AnomalyRule::ALL
            .iter()
            .position(|rule| rule == self)
            .unwrap_or(AnomalyRule::ALL.len())
    }
}

// --- Anomaly Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnomalyKind {
    ZeroDuration,
    DuplicateEntry,
    AttendanceMismatch,
    MissingAttendance,
    DailyCeilingExceeded,
    LowProductivityDay,
    WeekendWork,
    /// A row the loader could not accept.
    InvalidRow,
    UtilizationAboveCapacity,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnomalyKind::ZeroDuration => "Zero duration",
            AnomalyKind::DuplicateEntry => "Duplicate entry",
            AnomalyKind::AttendanceMismatch => "Attendance mismatch",
            AnomalyKind::MissingAttendance => "Missing attendance",
            AnomalyKind::DailyCeilingExceeded => "Daily ceiling exceeded",
            AnomalyKind::LowProductivityDay => "Low productivity day",
            AnomalyKind::WeekendWork => "Weekend work",
            AnomalyKind::InvalidRow => "Invalid row",
            AnomalyKind::UtilizationAboveCapacity => "Utilization above capacity",
        };
        f.write_str(label)
    }
}

/// What an anomaly points at: a source line, a whole employee-day, or a trainer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowReference {
    Line(u64),
    EmployeeDay { employee: String, date: NaiveDate },
    Employee { employee: String },
}

impl fmt::Display for RowReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowReference::Line(line) => write!(f, "line {}", line),
            RowReference::EmployeeDay { employee, date } => write!(f, "{} on {}", employee, date),
            RowReference::Employee { employee } => f.write_str(employee),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub row_reference: RowReference,
    pub kind: AnomalyKind,
    pub employee_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub description: String,
}

impl Anomaly {
    fn for_row(row: &TimesheetRow, kind: AnomalyKind, description: String) -> Self {
        Self {
            row_reference: RowReference::Line(row.line),
            kind,
            employee_name: Some(row.employee_name.clone()),
            date: Some(row.date),
            description,
        }
    }
}

// An anomaly plus the source line used to order it.
struct Finding {
    anchor: u64,
    anomaly: Anomaly,
}

impl Finding {
    fn on_row(row: &TimesheetRow, kind: AnomalyKind, description: String) -> Self {
        Self {
            anchor: row.line,
            anomaly: Anomaly::for_row(row, kind, description),
        }
    }
}

// --- Per-Row Rules ---

fn check_zero_duration(rows: &[TimesheetRow]) -> Vec<Finding> {
    rows.iter()
        .filter(|row| row.work_minutes.is_zero())
        .map(|row| {
            Finding::on_row(
                row,
                AnomalyKind::ZeroDuration,
                format!("No work minutes logged for '{}'", row.activity_category),
            )
        })
        .collect()
}

fn check_duplicates(rows: &[TimesheetRow]) -> Vec<Finding> {
    let mut first_seen: HashMap<(&str, NaiveDate, String), u64> = HashMap::new();
    let mut findings = Vec::new();

    for row in rows {
        let key = (
            row.employee_name.as_str(),
            row.date,
            activity_key(&row.activity_category),
        );
        match first_seen.get(&key) {
            Some(first_line) => findings.push(Finding::on_row(
                row,
                AnomalyKind::DuplicateEntry,
                format!(
                    "Duplicate of line {} (same employee, date and activity '{}')",
                    first_line, row.activity_category
                ),
            )),
            None => {
                first_seen.insert(key, row.line);
            }
        }
    }
    findings
}

fn check_weekend_work(rows: &[TimesheetRow]) -> Vec<Finding> {
    rows.iter()
        .filter(|row| matches!(row.date.weekday(), Weekday::Sat | Weekday::Sun))
        .filter(|row| !row.work_minutes.is_zero())
        .map(|row| {
            Finding::on_row(
                row,
                AnomalyKind::WeekendWork,
                format!(
                    "{} minutes of '{}' logged on a {}",
                    row.work_minutes,
                    row.activity_category,
                    row.date.format("%A")
                ),
            )
        })
        .collect()
}

// --- Per-Day Rules ---

struct DayTotal {
    first_line: u64,
    minutes: Decimal,
    /// First non-empty code among the day's rows. Sheets write the code once
    /// per person and date, leaving continuation rows blank.
    attendance: Option<AttendanceCode>,
}

type DayMap = BTreeMap<(String, NaiveDate), DayTotal>;

fn day_totals(rows: &[TimesheetRow]) -> DayMap {
    let mut days: DayMap = BTreeMap::new();
    for row in rows {
        let day = days
            .entry((row.employee_name.clone(), row.date))
            .or_insert(DayTotal {
                first_line: row.line,
                minutes: Decimal::ZERO,
                attendance: None,
            });
        add_saturating(&mut day.minutes, row.work_minutes);
        if day.attendance.is_none() {
            day.attendance = row.attendance;
        }
    }
    days
}

fn day_finding(
    employee: &str,
    date: NaiveDate,
    day: &DayTotal,
    kind: AnomalyKind,
    description: String,
) -> Finding {
    Finding {
        anchor: day.first_line,
        anomaly: Anomaly {
            row_reference: RowReference::EmployeeDay {
                employee: employee.to_string(),
                date,
            },
            kind,
            employee_name: Some(employee.to_string()),
            date: Some(date),
            description,
        },
    }
}

/// Work logged on a day whose resolved code is absent or leave. Each such
/// row is flagged, including continuation rows without their own code.
fn check_attendance_mismatch(rows: &[TimesheetRow], days: &DayMap) -> Vec<Finding> {
    rows.iter()
        .filter(|row| !row.work_minutes.is_zero())
        .filter_map(|row| {
            let code = days
                .get(&(row.employee_name.clone(), row.date))
                .and_then(|day| day.attendance)?;
            if !code.expects_no_work() {
                return None;
            }
            let status = match code {
                AttendanceCode::Leave => "On leave",
                _ => "Absent",
            };
            Some(Finding::on_row(
                row,
                AnomalyKind::AttendanceMismatch,
                format!("{} with nonzero minutes ({})", status, row.work_minutes),
            ))
        })
        .collect()
}

fn check_missing_attendance(days: &DayMap) -> Vec<Finding> {
    days.iter()
        .filter(|(_, day)| day.attendance.is_none())
        .map(|((employee, date), day)| {
            day_finding(
                employee,
                *date,
                day,
                AnomalyKind::MissingAttendance,
                "No attendance code recorded for the day".to_string(),
            )
        })
        .collect()
}

fn check_daily_ceiling(days: &DayMap, ceiling_minutes: Decimal) -> Vec<Finding> {
    days.iter()
        .filter(|(_, day)| day.minutes > ceiling_minutes)
        .map(|((employee, date), day)| {
            day_finding(
                employee,
                *date,
                day,
                AnomalyKind::DailyCeilingExceeded,
                format!(
                    "{} minutes logged in one day, above the {} minute ceiling",
                    day.minutes, ceiling_minutes
                ),
            )
        })
        .collect()
}

fn check_low_productivity(days: &DayMap, low_day_minutes: Decimal) -> Vec<Finding> {
    days.iter()
        // Leave, weekly off, holiday and absent days are expected to be short.
        .filter(|(_, day)| !day.attendance.map_or(false, |code| code.is_non_working_day()))
        .filter(|(_, day)| day.minutes < low_day_minutes)
        .map(|((employee, date), day)| {
            day_finding(
                employee,
                *date,
                day,
                AnomalyKind::LowProductivityDay,
                format!(
                    "Only {} minutes logged on a working day (threshold {})",
                    day.minutes, low_day_minutes
                ),
            )
        })
        .collect()
}

// --- Detection ---

/// Runs the rules listed in `thresholds.rules`.
pub fn detect_anomalies(rows: &[TimesheetRow], thresholds: &AnomalyThresholds) -> Vec<Anomaly> {
    detect_with_rules(rows, &thresholds.rules, thresholds)
}

/// Runs an explicit set of rules. Results are ordered by source line, then
/// by rule; the order of `rules` itself does not matter.
pub fn detect_with_rules(
    rows: &[TimesheetRow],
    rules: &[AnomalyRule],
    thresholds: &AnomalyThresholds,
) -> Vec<Anomaly> {
    let mut selected: Vec<AnomalyRule> = rules.to_vec();
    selected.sort_by_key(AnomalyRule::rank);
    selected.dedup();

    let days = day_totals(rows);

    let mut findings: Vec<(usize, Finding)> = Vec::new();
    for rule in &selected {
        let found = match rule {
            AnomalyRule::ZeroDuration => check_zero_duration(rows),
            AnomalyRule::Duplicate => check_duplicates(rows),
            AnomalyRule::AttendanceMismatch => check_attendance_mismatch(rows, &days),
            AnomalyRule::MissingAttendance => check_missing_attendance(&days),
            AnomalyRule::DailyCeiling => {
                check_daily_ceiling(&days, thresholds.daily_ceiling_minutes)
            }
            AnomalyRule::LowProductivityDay => {
                check_low_productivity(&days, thresholds.low_day_minutes)
            }
            AnomalyRule::WeekendWork => check_weekend_work(rows),
        };
        debug!("Rule {} matched {} time(s)", rule.id(), found.len());
        findings.extend(found.into_iter().map(|f| (rule.rank(), f)));
    }

    // Stable sort keeps per-rule order (row order, or employee-day order) for ties.
    findings.sort_by_key(|(rank, finding)| (finding.anchor, *rank));

    info!(
        "Anomaly detection found {} anomalies in {} rows",
        findings.len(),
        rows.len()
    );
    findings.into_iter().map(|(_, f)| f.anomaly).collect()
}

/// Surfaces loader rejects as anomalies so they show up next to rule findings.
pub fn reject_anomalies(rejects: &[RejectedRow]) -> Vec<Anomaly> {
    rejects
        .iter()
        .map(|reject| Anomaly {
            row_reference: RowReference::Line(reject.line),
            kind: AnomalyKind::InvalidRow,
            employee_name: reject.employee_name.clone(),
            date: None,
            description: reject.issue.to_string(),
        })
        .collect()
}

/// Trainers whose utilization exceeds the configured ceiling. The metric
/// itself is never clamped.
pub fn metric_anomalies(report: &MetricsReport, thresholds: &AnomalyThresholds) -> Vec<Anomaly> {
    report
        .per_trainer
        .iter()
        .filter(|t| t.utilization_pct > thresholds.utilization_ceiling_pct)
        .map(|t| Anomaly {
            row_reference: RowReference::Employee {
                employee: t.employee_name.clone(),
            },
            kind: AnomalyKind::UtilizationAboveCapacity,
            employee_name: Some(t.employee_name.clone()),
            date: None,
            description: format!(
                "Utilization {}% exceeds the {}% ceiling",
                t.utilization_pct.round_dp(1),
                thresholds.utilization_ceiling_pct
            ),
        })
        .collect()
}

pub fn count_by_kind(anomalies: &[Anomaly]) -> BTreeMap<AnomalyKind, usize> {
    let mut counts = BTreeMap::new();
    for anomaly in anomalies {
        *counts.entry(anomaly.kind).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RowIssue;
    use crate::test_support::{d, row};
    use crate::timesheet::AttendanceCode::{Absent, Holiday, Leave, Present, WeeklyOff};
    use rust_decimal_macros::dec;

    fn kinds(anomalies: &[Anomaly]) -> Vec<AnomalyKind> {
        anomalies.iter().map(|a| a.kind).collect()
    }

    fn only(rule: AnomalyRule, rows: &[TimesheetRow]) -> Vec<Anomaly> {
        detect_with_rules(rows, &[rule], &AnomalyThresholds::default())
    }

    #[test]
    fn zero_minutes_are_flagged() {
        let rows = vec![
            row(2, "Asha", "2025-11-03", "Training", 0, Some(Present)),
            row(3, "Asha", "2025-11-03", "Travel", 30, Some(Present)),
        ];
        let found = only(AnomalyRule::ZeroDuration, &rows);
        assert_eq!(kinds(&found), vec![AnomalyKind::ZeroDuration]);
        assert_eq!(found[0].row_reference, RowReference::Line(2));
    }

    #[test]
    fn duplicate_pair_is_flagged_once_on_the_repeat() {
        let rows = vec![
            row(2, "Asha", "2025-11-03", "Training", 60, Some(Present)),
            row(3, "Asha", "2025-11-03", "training", 45, Some(Present)),
            row(4, "Asha", "2025-11-04", "Training", 60, Some(Present)),
            row(5, "Ravi", "2025-11-03", "Training", 60, Some(Present)),
        ];
        let found = only(AnomalyRule::Duplicate, &rows);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].row_reference, RowReference::Line(3));
        assert!(found[0].description.contains("line 2"));
    }

    #[test]
    fn triplicate_gives_two_findings() {
        let rows = vec![
            row(2, "Asha", "2025-11-03", "Training", 60, Some(Present)),
            row(3, "Asha", "2025-11-03", "Training", 60, Some(Present)),
            row(4, "Asha", "2025-11-03", "Training", 60, Some(Present)),
        ];
        assert_eq!(only(AnomalyRule::Duplicate, &rows).len(), 2);
    }

    #[test]
    fn absent_or_leave_with_minutes_is_a_mismatch() {
        let rows = vec![
            row(2, "Ravi", "2025-11-03", "Training", 480, Some(Absent)),
            row(3, "Ravi", "2025-11-04", "Training", 0, Some(Absent)),
            row(4, "Ravi", "2025-11-05", "Training", 30, Some(Leave)),
            row(5, "Ravi", "2025-11-06", "Training", 30, Some(Holiday)),
        ];
        let found = only(AnomalyRule::AttendanceMismatch, &rows);
        assert_eq!(found.len(), 2);
        assert!(found[0].description.starts_with("Absent with nonzero minutes"));
        assert_eq!(found[1].row_reference, RowReference::Line(4));
    }

    #[test]
    fn empty_attendance_is_flagged() {
        let rows = vec![row(2, "Asha", "2025-11-03", "Training", 60, None)];
        assert_eq!(
            kinds(&only(AnomalyRule::MissingAttendance, &rows)),
            vec![AnomalyKind::MissingAttendance]
        );
    }

    #[test]
    fn continuation_rows_take_the_code_of_their_day() {
        let rows = vec![
            row(4, "Asha", "2025-11-03", "Training", 240, Some(Absent)),
            row(5, "Asha", "2025-11-03", "Content Development", 240, None),
            row(6, "Asha", "2025-11-04", "Training", 300, Some(Present)),
            row(7, "Asha", "2025-11-04", "Travel", 60, None),
        ];
        assert!(only(AnomalyRule::MissingAttendance, &rows).is_empty());

        let mismatches = only(AnomalyRule::AttendanceMismatch, &rows);
        let lines: Vec<&RowReference> = mismatches.iter().map(|a| &a.row_reference).collect();
        assert_eq!(lines, vec![&RowReference::Line(4), &RowReference::Line(5)]);
    }

    #[test]
    fn missing_attendance_is_reported_once_per_day() {
        let rows = vec![
            row(2, "Ravi", "2025-11-03", "Training", 60, None),
            row(3, "Ravi", "2025-11-03", "Travel", 60, None),
        ];
        let found = only(AnomalyRule::MissingAttendance, &rows);
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].row_reference,
            RowReference::EmployeeDay {
                employee: "Ravi".to_string(),
                date: d("2025-11-03"),
            }
        );
    }

    #[test]
    fn weekend_rows_with_minutes_are_flagged() {
        let rows = vec![
            row(2, "Asha", "2025-11-01", "Training", 90, Some(Present)),
            row(3, "Asha", "2025-11-02", "Training", 0, Some(WeeklyOff)),
            row(4, "Asha", "2025-11-03", "Training", 480, Some(Present)),
        ];
        let found = only(AnomalyRule::WeekendWork, &rows);
        assert_eq!(kinds(&found), vec![AnomalyKind::WeekendWork]);
        assert_eq!(found[0].row_reference, RowReference::Line(2));
        assert_eq!(found[0].description, "90 minutes of 'Training' logged on a Saturday");
    }

    #[test]
    fn daily_ceiling_uses_the_employee_day_total() {
        let rows = vec![
            row(2, "Asha", "2025-11-03", "Training", 400, Some(Present)),
            row(3, "Asha", "2025-11-03", "Content", 400, Some(Present)),
            row(4, "Ravi", "2025-11-03", "Training", 600, Some(Present)),
        ];
        let found = only(AnomalyRule::DailyCeiling, &rows);
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].row_reference,
            RowReference::EmployeeDay {
                employee: "Asha".to_string(),
                date: d("2025-11-03"),
            }
        );
    }

    #[test]
    fn threshold_changes_the_ceiling() {
        let rows = vec![row(2, "Ravi", "2025-11-03", "Training", 500, Some(Present))];
        let thresholds = AnomalyThresholds {
            daily_ceiling_minutes: dec!(480),
            ..AnomalyThresholds::default()
        };
        let found = detect_with_rules(&rows, &[AnomalyRule::DailyCeiling], &thresholds);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn short_days_are_only_flagged_when_working() {
        let rows = vec![
            row(2, "Asha", "2025-11-03", "Training", 60, Some(Present)),
            row(3, "Asha", "2025-11-04", "Training", 0, Some(Leave)),
            row(4, "Asha", "2025-11-05", "Training", 240, Some(Present)),
        ];
        let found = only(AnomalyRule::LowProductivityDay, &rows);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].date, Some(d("2025-11-03")));
    }

    #[test]
    fn one_row_can_trigger_several_rules_in_line_then_rule_order() {
        let rows = vec![
            row(2, "Asha", "2025-11-03", "Training", 240, Some(Present)),
            row(3, "Ravi", "2025-11-03", "Training", 0, None),
        ];
        let found = detect_anomalies(&rows, &AnomalyThresholds::default());
        assert_eq!(
            kinds(&found),
            vec![
                AnomalyKind::ZeroDuration,
                AnomalyKind::MissingAttendance,
                AnomalyKind::LowProductivityDay,
            ]
        );
        assert!(found.iter().all(|a| a.employee_name.as_deref() == Some("Ravi")));
    }

    #[test]
    fn rule_list_order_does_not_change_output() {
        let rows = vec![
            row(2, "Ravi", "2025-11-03", "Training", 0, None),
            row(3, "Ravi", "2025-11-03", "Training", 0, None),
        ];
        let thresholds = AnomalyThresholds::default();
        let forward = detect_with_rules(&rows, &AnomalyRule::ALL, &thresholds);
        let mut reversed_rules = AnomalyRule::ALL.to_vec();
        reversed_rules.reverse();
        let reversed = detect_with_rules(&rows, &reversed_rules, &thresholds);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn rejects_become_invalid_row_anomalies() {
        let rejects = vec![RejectedRow {
            line: 7,
            employee_name: Some("Asha".to_string()),
            issue: RowIssue::NegativeMinutes {
                minutes: "-30".to_string(),
            },
        }];
        let found = reject_anomalies(&rejects);
        assert_eq!(found[0].kind, AnomalyKind::InvalidRow);
        assert_eq!(found[0].row_reference, RowReference::Line(7));
        assert_eq!(found[0].description, "Work time -30 is negative");
    }

    #[test]
    fn counts_are_grouped_by_kind() {
        let rows = vec![
            row(2, "Ravi", "2025-11-03", "Training", 0, None),
            row(3, "Ravi", "2025-11-04", "Training", 0, None),
        ];
        let counts = count_by_kind(&only(AnomalyRule::ZeroDuration, &rows));
        assert_eq!(counts.get(&AnomalyKind::ZeroDuration), Some(&2));
    }
}
