// src/aggregate.rs
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::timesheet::{
    add_saturating, minutes_to_hours, percent, ActivityLabels, TaskPriority, TimesheetRow,
    WeekKey,
};

// --- Keys & Aggregations ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupKey {
    Trainer,
    Activity,
    IsoWeek,
    Location,
    Date,
    Priority,
}

impl FromStr for GroupKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trainer" | "employee" => Ok(GroupKey::Trainer),
            "activity" | "category" => Ok(GroupKey::Activity),
            "week" | "iso-week" => Ok(GroupKey::IsoWeek),
            "location" => Ok(GroupKey::Location),
            "date" | "day" => Ok(GroupKey::Date),
            "priority" => Ok(GroupKey::Priority),
            other => Err(format!("unknown group key '{}'", other)),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GroupKey::Trainer => "Trainer",
            GroupKey::Activity => "Activity",
            GroupKey::IsoWeek => "Week",
            GroupKey::Location => "Location",
            GroupKey::Date => "Date",
            GroupKey::Priority => "Priority",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Aggregation {
    #[default]
    SumHours,
    MeanHours,
    Count,
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" | "sum-hours" => Ok(Aggregation::SumHours),
            "mean" | "mean-hours" | "avg" => Ok(Aggregation::MeanHours),
            "count" => Ok(Aggregation::Count),
            other => Err(format!("unknown aggregation '{}'", other)),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Aggregation::SumHours => "Total Hours",
            Aggregation::MeanHours => "Mean Hours",
            Aggregation::Count => "Entries",
        };
        f.write_str(label)
    }
}

/// A group key value. Ordering is the display order: names alphabetical,
/// weeks and dates chronological, priorities High to Low.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum GroupValue {
    Text(String),
    Week(WeekKey),
    Date(NaiveDate),
    Priority(TaskPriority),
}

impl fmt::Display for GroupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupValue::Text(text) => f.write_str(text),
            GroupValue::Week(week) => write!(f, "{}", week),
            GroupValue::Date(date) => write!(f, "{}", date),
            GroupValue::Priority(priority) => write!(f, "{}", priority),
        }
    }
}

impl Serialize for GroupValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn key_of(row: &TimesheetRow, key: GroupKey, labels: &ActivityLabels) -> Option<GroupValue> {
    match key {
        GroupKey::Trainer => Some(GroupValue::Text(row.employee_name.clone())),
        GroupKey::Activity => Some(GroupValue::Text(
            labels.label(&row.activity_category).to_string(),
        )),
        GroupKey::IsoWeek => Some(GroupValue::Week(row.week())),
        GroupKey::Location => Some(GroupValue::Text(row.location.clone())),
        GroupKey::Date => Some(GroupValue::Date(row.date)),
        GroupKey::Priority => row.task_priority.map(GroupValue::Priority),
    }
}

// --- Grouped Results ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: GroupValue,
    /// The requested aggregate.
    pub value: Decimal,
    pub total_hours: Decimal,
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedResult {
    pub key: GroupKey,
    pub aggregation: Aggregation,
    pub groups: Vec<Group>,
}

impl GroupedResult {
    /// Sum of the group values. For `MeanHours` this is rarely meaningful.
    pub fn total(&self) -> Decimal {
        self.groups
            .iter()
            .fold(Decimal::ZERO, |sum, g| sum.saturating_add(g.value))
    }

    pub fn get(&self, key: &GroupValue) -> Option<&Group> {
        self.groups.iter().find(|g| &g.key == key)
    }

    /// Lookup by the displayed key, e.g. "Asha" or "2025-W45".
    pub fn get_label(&self, label: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.key.to_string() == label)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[derive(Default)]
struct Bucket {
    minutes: Decimal,
    rows: usize,
}

fn finish_groups(buckets: BTreeMap<GroupValue, Bucket>, aggregation: Aggregation) -> Vec<Group> {
    buckets
        .into_iter()
        .map(|(key, bucket)| {
            let total_hours = minutes_to_hours(bucket.minutes);
            let value = match aggregation {
                Aggregation::SumHours => total_hours,
                Aggregation::MeanHours => total_hours / Decimal::from(bucket.rows),
                Aggregation::Count => Decimal::from(bucket.rows),
            };
            Group {
                key,
                value,
                total_hours,
                row_count: bucket.rows,
            }
        })
        .collect()
}

/// Buckets rows by `key` and reduces each bucket with `aggregation`. Rows
/// without a value for the key (e.g. no priority) are left out.
pub fn group_by(rows: &[TimesheetRow], key: GroupKey, aggregation: Aggregation) -> GroupedResult {
    let labels = ActivityLabels::from_rows(rows);
    let mut buckets: BTreeMap<GroupValue, Bucket> = BTreeMap::new();
    for row in rows {
        let Some(value) = key_of(row, key, &labels) else {
            continue;
        };
        let bucket = buckets.entry(value).or_default();
        add_saturating(&mut bucket.minutes, row.work_minutes);
        bucket.rows += 1;
    }
    debug!("Grouped {} rows by {} into {} groups", rows.len(), key, buckets.len());

    GroupedResult {
        key,
        aggregation,
        groups: finish_groups(buckets, aggregation),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossGroup {
    pub key: GroupValue,
    pub groups: Vec<Group>,
}

/// Two-level rollup such as trainer then activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairedResult {
    pub outer: GroupKey,
    pub inner: GroupKey,
    pub aggregation: Aggregation,
    pub groups: Vec<CrossGroup>,
}

impl PairedResult {
    pub fn total(&self) -> Decimal {
        self.groups
            .iter()
            .flat_map(|outer| outer.groups.iter())
            .fold(Decimal::ZERO, |sum, g| sum.saturating_add(g.value))
    }

    pub fn get(&self, outer: &GroupValue, inner: &GroupValue) -> Option<&Group> {
        self.groups
            .iter()
            .find(|g| &g.key == outer)?
            .groups
            .iter()
            .find(|g| &g.key == inner)
    }
}

pub fn group_by_pair(
    rows: &[TimesheetRow],
    outer: GroupKey,
    inner: GroupKey,
    aggregation: Aggregation,
) -> PairedResult {
    let labels = ActivityLabels::from_rows(rows);
    let mut buckets: BTreeMap<GroupValue, BTreeMap<GroupValue, Bucket>> = BTreeMap::new();
    for row in rows {
        let (Some(outer_value), Some(inner_value)) =
            (key_of(row, outer, &labels), key_of(row, inner, &labels))
        else {
            continue;
        };
        let bucket = buckets
            .entry(outer_value)
            .or_default()
            .entry(inner_value)
            .or_default();
        add_saturating(&mut bucket.minutes, row.work_minutes);
        bucket.rows += 1;
    }

    PairedResult {
        outer,
        inner,
        aggregation,
        groups: buckets
            .into_iter()
            .map(|(key, inner_buckets)| CrossGroup {
                key,
                groups: finish_groups(inner_buckets, aggregation),
            })
            .collect(),
    }
}

// --- Activity Breakdown ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityShare {
    pub activity: String,
    pub hours: Decimal,
    pub share_pct: Decimal,
    pub row_count: usize,
}

/// Hours per activity with their share of all hours, largest first.
pub fn activity_breakdown(rows: &[TimesheetRow]) -> Vec<ActivityShare> {
    let grouped = group_by(rows, GroupKey::Activity, Aggregation::SumHours);
    let total = grouped.total();

    let mut shares: Vec<ActivityShare> = grouped
        .groups
        .into_iter()
        .map(|g| ActivityShare {
            activity: g.key.to_string(),
            hours: g.total_hours,
            share_pct: percent(g.total_hours, total),
            row_count: g.row_count,
        })
        .collect();
    shares.sort_by(|a, b| b.hours.cmp(&a.hours).then_with(|| a.activity.cmp(&b.activity)));
    shares
}
