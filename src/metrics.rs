// src/metrics.rs
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::MetricsConfig;
use crate::error::{InsightsError, Result};
use crate::filter::{date_span, location_names, trainer_names};
use crate::timesheet::{minutes_to_hours, percent, ActivityLabels, AttendanceCode, TimesheetRow};

// --- Result Types ---

/// Per-trainer rollup. Every percentage is in the 0..=100 range except
/// `utilization_pct`, which is reported unclamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerMetrics {
    pub employee_name: String,
    pub total_hours: Decimal,
    pub training_hours: Decimal,
    pub billable_hours: Decimal,
    pub non_billable_hours: Decimal,
    pub travel_hours: Decimal,
    pub onsite_delivery_hours: Decimal,
    pub focus_hours: Decimal,
    pub utilization_pct: Decimal,
    pub attendance_rate_pct: Decimal,
    pub leave_rate_pct: Decimal,
    pub travel_efficiency_pct: Decimal,
    pub present_days: u32,
    pub leave_days: u32,
    pub scheduled_days: u32,
    pub active_days: u32,
    pub avg_daily_hours: Decimal,
    pub training_sessions: u32,
    pub online_training_hours: Decimal,
    pub offline_training_hours: Decimal,
    pub row_count: usize,
    /// Hours per activity category. Spellings differing only in case share
    /// the first one seen.
    pub activity_hours: BTreeMap<String, Decimal>,
}

impl TrainerMetrics {
    /// Entry for a rostered trainer with no rows in the window.
    pub fn zeroed(employee_name: &str) -> Self {
        Self {
            employee_name: employee_name.to_string(),
            total_hours: Decimal::ZERO,
            training_hours: Decimal::ZERO,
            billable_hours: Decimal::ZERO,
            non_billable_hours: Decimal::ZERO,
            travel_hours: Decimal::ZERO,
            onsite_delivery_hours: Decimal::ZERO,
            focus_hours: Decimal::ZERO,
            utilization_pct: Decimal::ZERO,
            attendance_rate_pct: Decimal::ZERO,
            leave_rate_pct: Decimal::ZERO,
            travel_efficiency_pct: Decimal::ZERO,
            present_days: 0,
            leave_days: 0,
            scheduled_days: 0,
            active_days: 0,
            avg_daily_hours: Decimal::ZERO,
            training_sessions: 0,
            online_training_hours: Decimal::ZERO,
            offline_training_hours: Decimal::ZERO,
            row_count: 0,
            activity_hours: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub trainer_count: usize,
    pub row_count: usize,
    pub total_hours: Decimal,
    pub training_hours: Decimal,
    pub billable_hours: Decimal,
    pub travel_hours: Decimal,
    pub focus_hours: Decimal,
    pub capacity_hours_per_trainer: Decimal,
    pub team_capacity_hours: Decimal,
    /// Mean of the per-trainer utilization values.
    pub average_utilization_pct: Decimal,
    /// Training hours as a share of all logged hours.
    pub training_share_pct: Decimal,
    pub average_attendance_rate_pct: Decimal,
    pub team_travel_efficiency_pct: Decimal,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub locations: Vec<String>,
    pub trainers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Sorted alphabetically by trainer name.
    pub per_trainer: Vec<TrainerMetrics>,
    pub summary: MetricsSummary,
}

impl MetricsReport {
    pub fn is_empty(&self) -> bool {
        self.per_trainer.is_empty()
    }

    pub fn trainer(&self, name: &str) -> Option<&TrainerMetrics> {
        self.per_trainer.iter().find(|t| t.employee_name == name)
    }

    /// Trainers with rows in the window, highest utilization first, ties by name.
    pub fn leaderboard(&self) -> Vec<&TrainerMetrics> {
        let mut board: Vec<&TrainerMetrics> = self.per_trainer.iter().collect();
        board.sort_by(|a, b| {
            b.utilization_pct
                .cmp(&a.utilization_pct)
                .then_with(|| a.employee_name.cmp(&b.employee_name))
        });
        board
    }

    /// Metrics for every name in `roster` (sorted, deduplicated). Trainers
    /// without rows get a zeroed entry.
    pub fn trainer_list(&self, roster: &[String]) -> Vec<TrainerMetrics> {
        let mut names: Vec<&String> = roster.iter().collect();
        names.sort();
        names.dedup();
        names
            .into_iter()
            .map(|name| {
                self.trainer(name)
                    .cloned()
                    .unwrap_or_else(|| TrainerMetrics::zeroed(name))
            })
            .collect()
    }
}

// --- Accumulation ---

fn overflow(what: &str) -> InsightsError {
    InsightsError::Overflow(what.to_string())
}

fn accumulate(total: &mut Decimal, amount: Decimal) -> Result<()> {
    *total = total
        .checked_add(amount)
        .ok_or_else(|| overflow("summing work minutes"))?;
    Ok(())
}

fn checked_sum<I: IntoIterator<Item = Decimal>>(values: I, what: &str) -> Result<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |sum, v| sum.checked_add(v))
        .ok_or_else(|| overflow(what))
}

#[derive(Default)]
struct DayTally {
    attendance: Option<AttendanceCode>,
    minutes: Decimal,
}

#[derive(Default)]
struct TrainerTally {
    total: Decimal,
    training: Decimal,
    billable: Decimal,
    travel: Decimal,
    onsite_delivery: Decimal,
    focus: Decimal,
    online_training: Decimal,
    offline_training: Decimal,
    training_sessions: u32,
    row_count: usize,
    activities: BTreeMap<String, Decimal>,
    days: BTreeMap<NaiveDate, DayTally>,
}

impl TrainerTally {
    fn add(
        &mut self,
        row: &TimesheetRow,
        config: &MetricsConfig,
        labels: &ActivityLabels,
    ) -> Result<()> {
        let class = config.categories.classify(&row.activity_category);
        let minutes = row.work_minutes;

        self.row_count += 1;
        accumulate(&mut self.total, minutes)?;
        accumulate(
            self.activities
                .entry(labels.label(&row.activity_category).to_string())
                .or_insert(Decimal::ZERO),
            minutes,
        )?;

        if class.billable {
            accumulate(&mut self.billable, minutes)?;
        }
        if class.training {
            accumulate(&mut self.training, minutes)?;
            self.training_sessions += 1;
            if class.online {
                accumulate(&mut self.online_training, minutes)?;
            } else if class.offline {
                accumulate(&mut self.offline_training, minutes)?;
            }
        }
        if class.travel {
            accumulate(&mut self.travel, minutes)?;
        }
        if class.is_onsite_delivery() {
            accumulate(&mut self.onsite_delivery, minutes)?;
        }
        if class.is_focus() {
            accumulate(&mut self.focus, minutes)?;
        }

        let day = self.days.entry(row.date).or_default();
        accumulate(&mut day.minutes, minutes)?;
        // First non-empty code in row order decides the day.
        if day.attendance.is_none() {
            day.attendance = row.attendance;
        }
        Ok(())
    }

    fn finish(self, name: &str, capacity_hours: Decimal) -> Result<TrainerMetrics> {
        let count_days = |code: AttendanceCode| {
            self.days
                .values()
                .filter(|day| day.attendance == Some(code))
                .count() as u32
        };
        let present_days = count_days(AttendanceCode::Present);
        let leave_days = count_days(AttendanceCode::Leave);
        let scheduled_days = self.days.len() as u32;
        let active_days = self
            .days
            .values()
            .filter(|day| day.minutes > Decimal::ZERO)
            .count() as u32;

        let total_hours = minutes_to_hours(self.total);
        let billable_hours = minutes_to_hours(self.billable);
        let avg_daily_hours = if active_days == 0 {
            Decimal::ZERO
        } else {
            total_hours / Decimal::from(active_days)
        };
        let travel_base = self
            .onsite_delivery
            .checked_add(self.travel)
            .ok_or_else(|| overflow("summing onsite and travel minutes"))?;

        Ok(TrainerMetrics {
            employee_name: name.to_string(),
            total_hours,
            training_hours: minutes_to_hours(self.training),
            billable_hours,
            non_billable_hours: minutes_to_hours(self.total - self.billable),
            travel_hours: minutes_to_hours(self.travel),
            onsite_delivery_hours: minutes_to_hours(self.onsite_delivery),
            focus_hours: minutes_to_hours(self.focus),
            utilization_pct: percent(billable_hours, capacity_hours),
            attendance_rate_pct: percent(
                Decimal::from(present_days),
                Decimal::from(scheduled_days),
            ),
            leave_rate_pct: percent(Decimal::from(leave_days), Decimal::from(scheduled_days)),
            travel_efficiency_pct: percent(self.onsite_delivery, travel_base),
            present_days,
            leave_days,
            scheduled_days,
            active_days,
            avg_daily_hours,
            training_sessions: self.training_sessions,
            online_training_hours: minutes_to_hours(self.online_training),
            offline_training_hours: minutes_to_hours(self.offline_training),
            row_count: self.row_count,
            activity_hours: self
                .activities
                .into_iter()
                .map(|(activity, minutes)| (activity, minutes_to_hours(minutes)))
                .collect(),
        })
    }
}

fn mean<I: Iterator<Item = Decimal>>(values: I, what: &str) -> Result<Decimal> {
    let values: Vec<Decimal> = values.collect();
    if values.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let count = Decimal::from(values.len());
    Ok(checked_sum(values, what)? / count)
}

// --- Metric Computation ---

/// Full recomputation over `rows`. Fails on invalid configuration or if a
/// sum leaves the `Decimal` range; an empty dataset gives an empty report.
pub fn compute_metrics(rows: &[TimesheetRow], config: &MetricsConfig) -> Result<MetricsReport> {
    config.validate()?;
    let capacity_hours = config.capacity_hours();

    let labels = ActivityLabels::from_rows(rows);
    let mut tallies: BTreeMap<String, TrainerTally> = BTreeMap::new();
    for row in rows {
        tallies
            .entry(row.employee_name.clone())
            .or_default()
            .add(row, config, &labels)?;
    }

    let team_onsite = checked_sum(
        tallies.values().map(|t| t.onsite_delivery),
        "summing team onsite minutes",
    )?;
    let team_travel = checked_sum(
        tallies.values().map(|t| t.travel),
        "summing team travel minutes",
    )?;

    let per_trainer = tallies
        .into_iter()
        .map(|(name, tally)| tally.finish(&name, capacity_hours))
        .collect::<Result<Vec<TrainerMetrics>>>()?;

    for trainer in &per_trainer {
        debug!(
            "{}: {} h total, {} h billable, utilization {}%",
            trainer.employee_name,
            trainer.total_hours.round_dp(2),
            trainer.billable_hours.round_dp(2),
            trainer.utilization_pct.round_dp(1)
        );
    }

    let total_minutes = checked_sum(rows.iter().map(|r| r.work_minutes), "summing all minutes")?;
    let total_hours = minutes_to_hours(total_minutes);
    let training_hours = checked_sum(
        per_trainer.iter().map(|t| t.training_hours),
        "summing training hours",
    )?;
    let team_capacity_hours = capacity_hours
        .checked_mul(Decimal::from(per_trainer.len()))
        .ok_or_else(|| overflow("computing team capacity"))?;
    let team_travel_base = team_onsite
        .checked_add(team_travel)
        .ok_or_else(|| overflow("summing team onsite and travel minutes"))?;

    let summary = MetricsSummary {
        trainer_count: per_trainer.len(),
        row_count: rows.len(),
        total_hours,
        training_hours,
        billable_hours: checked_sum(
            per_trainer.iter().map(|t| t.billable_hours),
            "summing billable hours",
        )?,
        travel_hours: checked_sum(
            per_trainer.iter().map(|t| t.travel_hours),
            "summing travel hours",
        )?,
        focus_hours: checked_sum(
            per_trainer.iter().map(|t| t.focus_hours),
            "summing focus hours",
        )?,
        capacity_hours_per_trainer: capacity_hours,
        team_capacity_hours,
        average_utilization_pct: mean(
            per_trainer.iter().map(|t| t.utilization_pct),
            "averaging utilization",
        )?,
        training_share_pct: percent(training_hours, total_hours),
        average_attendance_rate_pct: mean(
            per_trainer.iter().map(|t| t.attendance_rate_pct),
            "averaging attendance",
        )?,
        team_travel_efficiency_pct: percent(team_onsite, team_travel_base),
        date_range: date_span(rows),
        locations: location_names(rows),
        trainers: trainer_names(rows),
    };

    info!(
        "Computed metrics for {} trainers from {} rows ({} h logged)",
        summary.trainer_count,
        summary.row_count,
        summary.total_hours.round_dp(2)
    );

    Ok(MetricsReport {
        per_trainer,
        summary,
    })
}
