// src/trends.rs
//! Time-series and regional rollups built on the broad activity buckets.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::{BroadCategory, CategoryRules};
use crate::timesheet::{add_saturating, minutes_to_hours, TimesheetRow, WeekKey};

fn empty_buckets() -> BTreeMap<BroadCategory, Decimal> {
    BroadCategory::ALL
        .iter()
        .map(|category| (*category, Decimal::ZERO))
        .collect()
}

fn bucket_hours(
    rows: &[&TimesheetRow],
    rules: &CategoryRules,
) -> (BTreeMap<BroadCategory, Decimal>, Decimal) {
    let mut minutes = empty_buckets();
    let mut total = Decimal::ZERO;
    for row in rows {
        add_saturating(
            minutes
                .entry(rules.broad(&row.activity_category))
                .or_insert(Decimal::ZERO),
            row.work_minutes,
        );
        add_saturating(&mut total, row.work_minutes);
    }
    let hours = minutes
        .into_iter()
        .map(|(category, m)| (category, minutes_to_hours(m)))
        .collect();
    (hours, minutes_to_hours(total))
}

// --- Weekly ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyTrend {
    pub week: WeekKey,
    /// Every bucket is present, zero when nothing was logged.
    pub hours_by_category: BTreeMap<BroadCategory, Decimal>,
    pub total_hours: Decimal,
}

/// Hours per ISO week split by broad category, oldest week first.
pub fn weekly_summary(rows: &[TimesheetRow], rules: &CategoryRules) -> Vec<WeeklyTrend> {
    let mut weeks: BTreeMap<WeekKey, Vec<&TimesheetRow>> = BTreeMap::new();
    for row in rows {
        weeks.entry(row.week()).or_default().push(row);
    }
    debug!("Weekly summary covers {} weeks", weeks.len());

    weeks
        .into_iter()
        .map(|(week, week_rows)| {
            let (hours_by_category, total_hours) = bucket_hours(&week_rows, rules);
            WeeklyTrend {
                week,
                hours_by_category,
                total_hours,
            }
        })
        .collect()
}

// --- Daily ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAverage {
    pub date: NaiveDate,
    pub trainers: usize,
    /// Mean of each trainer's total minutes for the day.
    pub average_minutes: Decimal,
}

/// Team average of per-trainer daily totals, one entry per date.
pub fn daily_team_average(rows: &[TimesheetRow]) -> Vec<DailyAverage> {
    let mut per_day: BTreeMap<NaiveDate, BTreeMap<&str, Decimal>> = BTreeMap::new();
    for row in rows {
        add_saturating(
            per_day
                .entry(row.date)
                .or_default()
                .entry(row.employee_name.as_str())
                .or_insert(Decimal::ZERO),
            row.work_minutes,
        );
    }

    per_day
        .into_iter()
        .map(|(date, trainers)| {
            let total = trainers
                .values()
                .fold(Decimal::ZERO, |sum, m| sum.saturating_add(*m));
            DailyAverage {
                date,
                trainers: trainers.len(),
                average_minutes: total / Decimal::from(trainers.len()),
            }
        })
        .collect()
}

// --- Location ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationPerformance {
    pub location: String,
    pub hours_by_category: BTreeMap<BroadCategory, Decimal>,
    pub total_hours: Decimal,
    pub trainers: usize,
}

pub fn location_performance(
    rows: &[TimesheetRow],
    rules: &CategoryRules,
) -> Vec<LocationPerformance> {
    let mut locations: BTreeMap<&str, Vec<&TimesheetRow>> = BTreeMap::new();
    for row in rows {
        locations.entry(row.location.as_str()).or_default().push(row);
    }

    locations
        .into_iter()
        .map(|(location, location_rows)| {
            let (hours_by_category, total_hours) = bucket_hours(&location_rows, rules);
            let mut trainers: Vec<&str> = location_rows
                .iter()
                .map(|r| r.employee_name.as_str())
                .collect();
            trainers.sort_unstable();
            trainers.dedup();
            LocationPerformance {
                location: location.to_string(),
                hours_by_category,
                total_hours,
                trainers: trainers.len(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{d, row};
    use crate::timesheet::AttendanceCode::Present;
    use rust_decimal_macros::dec;

    fn sample() -> Vec<TimesheetRow> {
        vec![
            row(2, "Asha", "2025-11-03", "Training", 120, Some(Present)),
            row(3, "Asha", "2025-11-03", "Travel for Training", 60, Some(Present)),
            row(4, "Ravi", "2025-11-03", "MIS Reporting", 30, Some(Present)).at("Delhi"),
            row(5, "Ravi", "2025-11-11", "Content Development", 90, Some(Present)).at("Delhi"),
        ]
    }

    #[test]
    fn weekly_buckets_are_exclusive_and_complete() {
        let weeks = weekly_summary(&sample(), &CategoryRules::default());
        assert_eq!(weeks.len(), 2);

        let first = &weeks[0];
        assert_eq!(first.week.to_string(), "2025-W45");
        assert_eq!(first.hours_by_category[&BroadCategory::Training], dec!(2));
        assert_eq!(first.hours_by_category[&BroadCategory::Travel], dec!(1));
        assert_eq!(first.hours_by_category[&BroadCategory::AdminOther], dec!(0.5));
        assert_eq!(first.hours_by_category[&BroadCategory::Content], Decimal::ZERO);
        let bucket_sum: Decimal = first.hours_by_category.values().sum();
        assert_eq!(bucket_sum, first.total_hours);

        assert_eq!(weeks[1].hours_by_category[&BroadCategory::Content], dec!(1.5));
    }

    #[test]
    fn daily_average_is_per_trainer_total() {
        let days = daily_team_average(&sample());
        assert_eq!(days[0].date, d("2025-11-03"));
        assert_eq!(days[0].trainers, 2);
        // Asha 180, Ravi 30
        assert_eq!(days[0].average_minutes, dec!(105));
        assert_eq!(days[1].average_minutes, dec!(90));
    }

    #[test]
    fn locations_are_alphabetical() {
        let locations = location_performance(&sample(), &CategoryRules::default());
        let names: Vec<&str> = locations.iter().map(|l| l.location.as_str()).collect();
        assert_eq!(names, vec!["Delhi", "Pune"]);
        assert_eq!(locations[0].total_hours, dec!(2));
        assert_eq!(locations[0].trainers, 1);
        assert_eq!(locations[1].hours_by_category[&BroadCategory::Travel], dec!(1));
    }

    #[test]
    fn empty_input_gives_no_trends() {
        assert!(weekly_summary(&[], &CategoryRules::default()).is_empty());
        assert!(daily_team_average(&[]).is_empty());
        assert!(location_performance(&[], &CategoryRules::default()).is_empty());
    }
}
