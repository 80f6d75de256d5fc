// src/filter.rs
use chrono::NaiveDate;
use std::collections::BTreeSet;
use tracing::debug;

use crate::timesheet::TimesheetRow;

/// Selection applied to the loaded dataset before every computation pass.
/// Empty sets mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub locations: BTreeSet<String>,
    pub employees: BTreeSet<String>,
}

impl DatasetFilter {
    pub fn between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn locations<I: IntoIterator<Item = String>>(mut self, locations: I) -> Self {
        self.locations = locations.into_iter().collect();
        self
    }

    pub fn employees<I: IntoIterator<Item = String>>(mut self, employees: I) -> Self {
        self.employees = employees.into_iter().collect();
        self
    }

    pub fn matches(&self, row: &TimesheetRow) -> bool {
        self.from.map_or(true, |from| row.date >= from)
            && self.to.map_or(true, |to| row.date <= to)
            && (self.locations.is_empty() || self.locations.contains(&row.location))
            && (self.employees.is_empty() || self.employees.contains(&row.employee_name))
    }

    /// Returns the matching rows in their original order.
    pub fn apply(&self, rows: &[TimesheetRow]) -> Vec<TimesheetRow> {
        let filtered: Vec<TimesheetRow> = rows.iter().filter(|r| self.matches(r)).cloned().collect();
        debug!("Filter kept {} of {} rows", filtered.len(), rows.len());
        filtered
    }
}

/// Distinct trainer names in alphabetical order.
pub fn trainer_names(rows: &[TimesheetRow]) -> Vec<String> {
    rows.iter()
        .map(|r| r.employee_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct locations in alphabetical order.
pub fn location_names(rows: &[TimesheetRow]) -> Vec<String> {
    rows.iter()
        .map(|r| r.location.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// First and last date present in the rows.
pub fn date_span(rows: &[TimesheetRow]) -> Option<(NaiveDate, NaiveDate)> {
    let first = rows.iter().map(|r| r.date).min()?;
    let last = rows.iter().map(|r| r.date).max()?;
    Some((first, last))
}
