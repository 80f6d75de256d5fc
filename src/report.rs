// src/report.rs
//! Packages already computed results as an ordered list of typed sections.
//! Nothing in here derives a metric; values are only formatted.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::{debug, info};

use crate::aggregate::{activity_breakdown, ActivityShare};
use crate::anomaly::Anomaly;
use crate::config::BroadCategory;
use crate::metrics::MetricsReport;
use crate::timesheet::TimesheetRow;
use crate::trends::WeeklyTrend;

pub const DEFAULT_REPORT_TITLE: &str = "Timesheet Analytics Report";
pub const DEFAULT_MAX_RAW_ROWS: usize = 100;
const MAX_CELL_CHARS: usize = 50;

// --- Section Types ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Footnote such as a truncation notice.
    pub note: Option<String>,
}

impl Table {
    fn new(title: &str, headers: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
            note: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportSection {
    Title {
        text: String,
        subtitle: Option<String>,
    },
    Table(Table),
    /// Stand-in for a chart the renderer draws from the named data.
    ChartPlaceholder { title: String, description: String },
    PageBreak,
}

/// Which parts of the report to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSelection {
    pub title: String,
    pub cover: bool,
    pub summary: bool,
    pub trainer_table: bool,
    pub activity_table: bool,
    pub weekly_table: bool,
    pub anomaly_table: bool,
    pub raw_data: bool,
    pub charts: bool,
    pub max_raw_rows: usize,
}

impl Default for SectionSelection {
    fn default() -> Self {
        Self {
            title: DEFAULT_REPORT_TITLE.to_string(),
            cover: true,
            summary: true,
            trainer_table: true,
            activity_table: true,
            weekly_table: true,
            anomaly_table: true,
            raw_data: false,
            charts: true,
            max_raw_rows: DEFAULT_MAX_RAW_ROWS,
        }
    }
}

// --- Formatting Helpers ---

fn one_place(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

/// One decimal place, rounded half away from zero.
pub fn format_hours(value: Decimal) -> String {
    format!("{:.1}", one_place(value))
}

pub fn format_pct(value: Decimal) -> String {
    format!("{:.1}%", one_place(value))
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_CELL_CHARS {
        text.to_string()
    } else {
        text.chars().take(MAX_CELL_CHARS).collect()
    }
}

// --- Assembly ---

pub struct ReportAssembler<'a> {
    rows: &'a [TimesheetRow],
    metrics: &'a MetricsReport,
    anomalies: &'a [Anomaly],
    selection: &'a SectionSelection,
    activities: Option<&'a [ActivityShare]>,
    weekly: Option<&'a [WeeklyTrend]>,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(
        rows: &'a [TimesheetRow],
        metrics: &'a MetricsReport,
        anomalies: &'a [Anomaly],
        selection: &'a SectionSelection,
    ) -> Self {
        Self {
            rows,
            metrics,
            anomalies,
            selection,
            activities: None,
            weekly: None,
        }
    }

    pub fn with_activities(mut self, activities: &'a [ActivityShare]) -> Self {
        self.activities = Some(activities);
        self
    }

    pub fn with_weekly(mut self, weekly: &'a [WeeklyTrend]) -> Self {
        self.weekly = Some(weekly);
        self
    }

    pub fn build(&self) -> Vec<ReportSection> {
        let selection = self.selection;
        let mut sections = Vec::new();

        if selection.cover {
            sections.push(self.cover());
            sections.push(ReportSection::PageBreak);
        }
        if selection.summary {
            sections.push(ReportSection::Table(self.summary_table()));
        }
        if selection.charts {
            sections.push(ReportSection::PageBreak);
            sections.extend(self.chart_placeholders());
        }
        if selection.trainer_table {
            sections.push(ReportSection::Table(self.trainer_table()));
        }
        // A selected table without data still appears, with a note saying why.
        if selection.activity_table {
            let table = match self.activities {
                Some(activities) => activity_table(activities),
                None => not_supplied(activity_table(&[]), "activity breakdown"),
            };
            sections.push(ReportSection::Table(table));
        }
        if selection.weekly_table {
            let table = match self.weekly {
                Some(weekly) => weekly_table(weekly),
                None => not_supplied(weekly_table(&[]), "weekly summary"),
            };
            sections.push(ReportSection::Table(table));
        }
        if selection.anomaly_table {
            sections.push(ReportSection::Table(self.anomaly_table()));
        }
        if selection.raw_data {
            sections.push(ReportSection::PageBreak);
            sections.push(ReportSection::Table(self.raw_data_table()));
        }

        info!("Assembled report with {} sections", sections.len());
        sections
    }

    fn cover(&self) -> ReportSection {
        // Built from the data period, not the wall clock, so output is repeatable.
        let subtitle = self
            .metrics
            .summary
            .date_range
            .map(|(from, to)| format!("Reporting period: {} to {}", from, to));
        ReportSection::Title {
            text: self.selection.title.clone(),
            subtitle,
        }
    }

    fn summary_table(&self) -> Table {
        let summary = &self.metrics.summary;
        let period = summary
            .date_range
            .map(|(from, to)| format!("{} to {}", from, to))
            .unwrap_or_else(|| "n/a".to_string());

        let mut table = Table::new("Executive Summary", &["Metric", "Value"]);
        let entries: Vec<(&str, String)> = vec![
            ("Reporting Period", period),
            ("Trainers", summary.trainer_count.to_string()),
            ("Timesheet Entries", summary.row_count.to_string()),
            ("Total Hours Logged", format_hours(summary.total_hours)),
            ("Training Hours", format_hours(summary.training_hours)),
            ("Billable Hours", format_hours(summary.billable_hours)),
            ("Travel Hours", format_hours(summary.travel_hours)),
            ("Focus Hours", format_hours(summary.focus_hours)),
            ("Capacity per Trainer (h)", format_hours(summary.capacity_hours_per_trainer)),
            ("Team Capacity (h)", format_hours(summary.team_capacity_hours)),
            ("Average Utilization", format_pct(summary.average_utilization_pct)),
            ("Training Share of Hours", format_pct(summary.training_share_pct)),
            ("Average Attendance", format_pct(summary.average_attendance_rate_pct)),
            ("Travel Efficiency", format_pct(summary.team_travel_efficiency_pct)),
            ("Locations", summary.locations.join(", ")),
            ("Anomalies Flagged", self.anomalies.len().to_string()),
        ];
        table.rows = entries
            .into_iter()
            .map(|(label, value)| vec![label.to_string(), value])
            .collect();
        table
    }

    fn chart_placeholders(&self) -> Vec<ReportSection> {
        let charts = [
            (
                "Utilization Score by Trainer",
                "Billable hours as a share of capacity for each trainer.",
            ),
            (
                "Time Investment by Activity",
                "Hours per activity category across the team.",
            ),
            (
                "Weekly Work Trends",
                "Hours per ISO week split into Training, Travel, Content Creation and Other/Admin.",
            ),
            (
                "Billable vs Non-Billable Hours",
                "Billable and non-billable hours per trainer.",
            ),
        ];
        charts
            .iter()
            .map(|(title, description)| ReportSection::ChartPlaceholder {
                title: title.to_string(),
                description: description.to_string(),
            })
            .collect()
    }

    fn trainer_table(&self) -> Table {
        let mut table = Table::new(
            "Trainer Utilization",
            &[
                "Trainer",
                "Total Hours",
                "Billable Hours",
                "Training Hours",
                "Travel Hours",
                "Utilization",
                "Attendance",
                "Leave Rate",
                "Travel Efficiency",
                "Sessions",
            ],
        );
        table.rows = self
            .metrics
            .leaderboard()
            .into_iter()
            .map(|t| {
                vec![
                    t.employee_name.clone(),
                    format_hours(t.total_hours),
                    format_hours(t.billable_hours),
                    format_hours(t.training_hours),
                    format_hours(t.travel_hours),
                    format_pct(t.utilization_pct),
                    format_pct(t.attendance_rate_pct),
                    format_pct(t.leave_rate_pct),
                    format_pct(t.travel_efficiency_pct),
                    t.training_sessions.to_string(),
                ]
            })
            .collect();
        table
    }

    fn anomaly_table(&self) -> Table {
        let mut table = Table::new(
            "Anomalies",
            &["Reference", "Kind", "Trainer", "Date", "Description"],
        );
        table.rows = self
            .anomalies
            .iter()
            .map(|a| {
                vec![
                    a.row_reference.to_string(),
                    a.kind.to_string(),
                    a.employee_name.clone().unwrap_or_default(),
                    a.date.map(|d| d.to_string()).unwrap_or_default(),
                    clip(&a.description),
                ]
            })
            .collect();
        if self.anomalies.is_empty() {
            table.note = Some("No anomalies detected".to_string());
        }
        table
    }

    fn raw_data_table(&self) -> Table {
        let mut table = Table::new(
            "Raw Timesheet Data",
            &[
                "Date",
                "Employee Name",
                "Activity Category",
                "Work Time (Mins)",
                "Location",
                "Attendance",
            ],
        );
        let limit = self.selection.max_raw_rows;
        table.rows = self
            .rows
            .iter()
            .take(limit)
            .map(|r| {
                vec![
                    r.date.to_string(),
                    clip(&r.employee_name),
                    clip(&r.activity_category),
                    r.work_minutes.to_string(),
                    clip(&r.location),
                    r.attendance.map(|a| a.code().to_string()).unwrap_or_default(),
                ]
            })
            .collect();
        if self.rows.len() > limit {
            table.note = Some(format!("Showing {} of {} rows", limit, self.rows.len()));
        }
        table
    }
}

fn not_supplied(mut table: Table, input: &str) -> Table {
    debug!("{} selected but no {} was supplied", table.title, input);
    table.note = Some(format!("Not available: no {} was supplied", input));
    table
}

fn activity_table(activities: &[ActivityShare]) -> Table {
    let mut table = Table::new(
        "Time Investment by Activity",
        &["Activity", "Hours", "Share", "Entries"],
    );
    table.rows = activities
        .iter()
        .map(|a| {
            vec![
                clip(&a.activity),
                format_hours(a.hours),
                format_pct(a.share_pct),
                a.row_count.to_string(),
            ]
        })
        .collect();
    table
}

fn weekly_table(weekly: &[WeeklyTrend]) -> Table {
    let mut headers: Vec<String> = vec!["Week".to_string()];
    headers.extend(BroadCategory::ALL.iter().map(|c| c.to_string()));
    headers.push("Total".to_string());

    let rows = weekly
        .iter()
        .map(|w| {
            let mut cells = vec![w.week.to_string()];
            cells.extend(BroadCategory::ALL.iter().map(|c| {
                format_hours(w.hours_by_category.get(c).copied().unwrap_or(Decimal::ZERO))
            }));
            cells.push(format_hours(w.total_hours));
            cells
        })
        .collect();

    Table {
        title: "Weekly Work Trends".to_string(),
        headers,
        rows,
        note: None,
    }
}

/// Sections for a filtered dataset. The activity table comes from
/// `aggregate::activity_breakdown` over `rows`; the weekly table depends on
/// category rules, so here it carries a note and callers wanting it use
/// `ReportAssembler::with_weekly`.
pub fn assemble_report(
    rows: &[TimesheetRow],
    metrics: &MetricsReport,
    anomalies: &[Anomaly],
    selection: &SectionSelection,
) -> Vec<ReportSection> {
    let activities = activity_breakdown(rows);
    ReportAssembler::new(rows, metrics, anomalies, selection)
        .with_activities(&activities)
        .build()
}

// --- Text Rendering ---

fn render_table(out: &mut String, table: &Table) {
    let columns = table.headers.len();
    let mut widths: Vec<usize> = table.headers.iter().map(|h| h.chars().count()).collect();
    for row in &table.rows {
        for (i, cell) in row.iter().enumerate().take(columns) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let _ = writeln!(out, "{}", table.title);
    let _ = writeln!(out, "{}", line(&table.headers));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("-+-"));
    for row in &table.rows {
        let _ = writeln!(out, "{}", line(row));
    }
    if let Some(note) = &table.note {
        let _ = writeln!(out, "({})", note);
    }
}

/// Plain-text rendering used by the command line.
pub fn render_text(sections: &[ReportSection]) -> String {
    let mut out = String::new();
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match section {
            ReportSection::Title { text, subtitle } => {
                let _ = writeln!(out, "{}", text);
                let _ = writeln!(out, "{}", "=".repeat(text.chars().count()));
                if let Some(subtitle) = subtitle {
                    let _ = writeln!(out, "{}", subtitle);
                }
            }
            ReportSection::Table(table) => render_table(&mut out, table),
            ReportSection::ChartPlaceholder { title, description } => {
                let _ = writeln!(out, "[Chart: {}]", title);
                let _ = writeln!(out, "{}", description);
            }
            ReportSection::PageBreak => {
                let _ = writeln!(out, "{}", "-".repeat(40));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{detect_anomalies, Anomaly};
    use crate::config::{AnomalyThresholds, CategoryRules, MetricsConfig};
    use crate::metrics::compute_metrics;
    use crate::test_support::row;
    use crate::timesheet::AttendanceCode::{Absent, Present};
    use crate::trends::weekly_summary;
    use rust_decimal_macros::dec;

    fn fixture() -> (Vec<TimesheetRow>, MetricsReport, Vec<Anomaly>) {
        let rows = vec![
            row(2, "Asha", "2025-11-03", "Training", 120, Some(Present)),
            row(3, "Asha", "2025-11-04", "Travel", 60, Some(Present)),
            row(4, "Ravi", "2025-11-03", "Training", 480, Some(Absent)),
        ];
        let config = MetricsConfig::new(2, dec!(8)).unwrap();
        let metrics = compute_metrics(&rows, &config).unwrap();
        let anomalies = detect_anomalies(&rows, &AnomalyThresholds::default());
        (rows, metrics, anomalies)
    }

    fn tables(sections: &[ReportSection]) -> Vec<&Table> {
        sections
            .iter()
            .filter_map(|s| match s {
                ReportSection::Table(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn default_selection_orders_sections() {
        let (rows, metrics, anomalies) = fixture();
        let sections = assemble_report(&rows, &metrics, &anomalies, &SectionSelection::default());

        assert_eq!(
            sections[0],
            ReportSection::Title {
                text: DEFAULT_REPORT_TITLE.to_string(),
                subtitle: Some("Reporting period: 2025-11-03 to 2025-11-04".to_string()),
            }
        );
        assert_eq!(sections[1], ReportSection::PageBreak);
        let titles: Vec<&str> = tables(&sections).iter().map(|t| t.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Executive Summary",
                "Trainer Utilization",
                "Time Investment by Activity",
                "Weekly Work Trends",
                "Anomalies",
            ]
        );
        let charts = sections
            .iter()
            .filter(|s| matches!(s, ReportSection::ChartPlaceholder { .. }))
            .count();
        assert_eq!(charts, 4);
    }

    #[test]
    fn tables_only_format_computed_values() {
        let (rows, metrics, anomalies) = fixture();
        let selection = SectionSelection {
            cover: false,
            charts: false,
            ..SectionSelection::default()
        };
        let sections = assemble_report(&rows, &metrics, &anomalies, &selection);
        let all = tables(&sections);

        let summary = all[0];
        assert_eq!(summary.rows[1], vec!["Trainers".to_string(), "2".to_string()]);
        assert_eq!(summary.rows[3], vec!["Total Hours Logged".to_string(), "11.0".to_string()]);

        let trainers = all[1];
        // Ravi's 8 billable hours put him first.
        assert_eq!(trainers.rows[0][0], "Ravi");
        assert_eq!(trainers.rows[0][5], "50.0%");
        assert_eq!(trainers.rows[1][1], "3.0");
        assert_eq!(trainers.rows[1][5], "12.5%");
    }

    #[test]
    fn assembler_adds_supplied_breakdowns() {
        let (rows, metrics, anomalies) = fixture();
        let activities = activity_breakdown(&rows);
        let weekly = weekly_summary(&rows, &CategoryRules::default());
        let selection = SectionSelection::default();
        let sections = ReportAssembler::new(&rows, &metrics, &anomalies, &selection)
            .with_activities(&activities)
            .with_weekly(&weekly)
            .build();

        let all = tables(&sections);
        let weekly_table = all
            .iter()
            .find(|t| t.title == "Weekly Work Trends")
            .unwrap();
        assert_eq!(
            weekly_table.headers,
            vec!["Week", "Training", "Travel", "Content Creation", "Other/Admin", "Total"]
        );
        assert_eq!(weekly_table.rows[0][0], "2025-W45");
        assert!(all.iter().any(|t| t.title == "Time Investment by Activity"));
    }

    #[test]
    fn selected_tables_without_data_carry_a_note() {
        let (rows, metrics, anomalies) = fixture();
        let selection = SectionSelection::default();
        let sections = ReportAssembler::new(&rows, &metrics, &anomalies, &selection).build();
        let all = tables(&sections);

        let activity = all
            .iter()
            .find(|t| t.title == "Time Investment by Activity")
            .unwrap();
        assert!(activity.rows.is_empty());
        assert_eq!(
            activity.note.as_deref(),
            Some("Not available: no activity breakdown was supplied")
        );

        let weekly = all.iter().find(|t| t.title == "Weekly Work Trends").unwrap();
        assert!(weekly.rows.is_empty());
        assert_eq!(
            weekly.note.as_deref(),
            Some("Not available: no weekly summary was supplied")
        );
    }

    #[test]
    fn assemble_report_fills_the_activity_table_from_rows() {
        let (rows, metrics, anomalies) = fixture();
        let sections = assemble_report(&rows, &metrics, &anomalies, &SectionSelection::default());
        let activity = tables(&sections)
            .into_iter()
            .find(|t| t.title == "Time Investment by Activity")
            .unwrap();
        assert_eq!(activity.note, None);
        // Training: 2 h + 8 h, Travel: 1 h
        assert_eq!(activity.rows[0][0], "Training");
        assert_eq!(activity.rows[0][1], "10.0");
        assert_eq!(activity.rows[1][0], "Travel");
    }

    #[test]
    fn raw_data_is_truncated_with_note() {
        let (rows, metrics, anomalies) = fixture();
        let selection = SectionSelection {
            raw_data: true,
            max_raw_rows: 2,
            ..SectionSelection::default()
        };
        let sections = assemble_report(&rows, &metrics, &anomalies, &selection);
        let raw = tables(&sections)
            .into_iter()
            .find(|t| t.title == "Raw Timesheet Data")
            .unwrap();
        assert_eq!(raw.rows.len(), 2);
        assert_eq!(raw.note.as_deref(), Some("Showing 2 of 3 rows"));
    }

    #[test]
    fn empty_dataset_still_produces_a_report() {
        let metrics = MetricsReport::default();
        let sections = assemble_report(&[], &metrics, &[], &SectionSelection::default());
        let all = tables(&sections);
        assert_eq!(all[0].rows[0][1], "n/a");
        assert_eq!(all[4].note.as_deref(), Some("No anomalies detected"));
    }

    #[test]
    fn text_rendering_aligns_columns() {
        let sections = vec![
            ReportSection::Title {
                text: "Report".to_string(),
                subtitle: None,
            },
            ReportSection::Table(Table {
                title: "T".to_string(),
                headers: vec!["Name".to_string(), "Hours".to_string()],
                rows: vec![vec!["Asha".to_string(), "3.0".to_string()]],
                note: Some("Showing 1 of 5 rows".to_string()),
            }),
        ];
        let text = render_text(&sections);
        assert_eq!(
            text,
            "Report\n======\n\nT\nName | Hours\n-----+------\nAsha | 3.0\n(Showing 1 of 5 rows)\n"
        );
    }

    #[test]
    fn numbers_are_shown_with_one_decimal() {
        assert_eq!(format_hours(dec!(2.25)), "2.3");
        assert_eq!(format_hours(dec!(3)), "3.0");
        assert_eq!(format_pct(dec!(66.6666)), "66.7%");
    }

    #[test]
    fn sections_serialize_with_type_tag() {
        let json = serde_json::to_value(ReportSection::PageBreak).unwrap();
        assert_eq!(json, serde_json::json!({"type": "page_break"}));
    }
}
