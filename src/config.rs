// src/config.rs
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::anomaly::AnomalyRule;
use crate::error::{InsightsError, Result};
use crate::timesheet::DateOrder;

// --- Activity Classification ---

/// Keyword lists used to classify free-text activity categories.
/// Matching is a case-insensitive substring test, so "Onsite Training Session"
/// is both training and offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRules {
    pub billable: Vec<String>,
    pub training: Vec<String>,
    pub travel: Vec<String>,
    pub admin: Vec<String>,
    pub content: Vec<String>,
    pub online: Vec<String>,
    pub offline: Vec<String>,
}

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self {
            billable: keywords(&["Training", "Assessment", "Content", "Development"]),
            training: keywords(&["Training", "Session", "Class", "Delivery", "Facilitation"]),
            travel: keywords(&["Travel"]),
            admin: keywords(&["Admin", "MIS", "Other", "Meeting"]),
            content: keywords(&["Content"]),
            online: keywords(&["Online"]),
            offline: keywords(&["Offline", "Onsite"]),
        }
    }
}

/// Coarse bucket used by location and weekly rollups. Every category lands in
/// exactly one bucket, checked in declaration order of `CategoryRules::broad`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BroadCategory {
    Training,
    Travel,
    Content,
    AdminOther,
}

impl BroadCategory {
    pub const ALL: [BroadCategory; 4] = [
        BroadCategory::Training,
        BroadCategory::Travel,
        BroadCategory::Content,
        BroadCategory::AdminOther,
    ];
}

impl fmt::Display for BroadCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BroadCategory::Training => "Training",
            BroadCategory::Travel => "Travel",
            BroadCategory::Content => "Content Creation",
            BroadCategory::AdminOther => "Other/Admin",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivityClass {
    pub billable: bool,
    pub training: bool,
    pub travel: bool,
    pub admin: bool,
    pub online: bool,
    pub offline: bool,
}

impl ActivityClass {
    /// Training delivered in person.
    pub fn is_onsite_delivery(&self) -> bool {
        self.training && !self.online
    }

    pub fn is_focus(&self) -> bool {
        !self.admin && !self.travel
    }
}

fn matches_any(words: &[String], category_lower: &str) -> bool {
    words
        .iter()
        .any(|w| !w.is_empty() && category_lower.contains(&w.to_lowercase()))
}

impl CategoryRules {
    pub fn classify(&self, category: &str) -> ActivityClass {
        let lower = category.to_lowercase();
        ActivityClass {
            billable: matches_any(&self.billable, &lower),
            training: matches_any(&self.training, &lower),
            travel: matches_any(&self.travel, &lower),
            admin: matches_any(&self.admin, &lower),
            online: matches_any(&self.online, &lower),
            offline: matches_any(&self.offline, &lower),
        }
    }

    pub fn broad(&self, category: &str) -> BroadCategory {
        let lower = category.to_lowercase();
        if matches_any(&self.travel, &lower) {
            BroadCategory::Travel
        } else if matches_any(&self.training, &lower) {
            BroadCategory::Training
        } else if matches_any(&self.content, &lower) {
            BroadCategory::Content
        } else {
            BroadCategory::AdminOther
        }
    }
}

// --- Metric Configuration ---

/// Accepted range for `daily_working_hours`, inclusive.
pub const MIN_DAILY_HOURS: Decimal = dec!(0.25);
pub const MAX_DAILY_HOURS: Decimal = dec!(24);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub working_days_per_period: u32,
    pub daily_working_hours: Decimal,
    #[serde(default)]
    pub categories: CategoryRules,
}

impl MetricsConfig {
    pub fn new(working_days_per_period: u32, daily_working_hours: Decimal) -> Result<Self> {
        let config = Self {
            working_days_per_period,
            daily_working_hours,
            categories: CategoryRules::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_categories(mut self, categories: CategoryRules) -> Self {
        self.categories = categories;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.working_days_per_period == 0 {
            warn!("Rejected configuration: working days per period is 0");
            return Err(InsightsError::Configuration(
                "working days per period must be greater than 0".to_string(),
            ));
        }
        if self.daily_working_hours < MIN_DAILY_HOURS
            || self.daily_working_hours > MAX_DAILY_HOURS
        {
            warn!(
                "Rejected configuration: daily working hours is {}",
                self.daily_working_hours
            );
            return Err(InsightsError::Configuration(format!(
                "daily working hours must be between {} and {} (got {})",
                MIN_DAILY_HOURS, MAX_DAILY_HOURS, self.daily_working_hours
            )));
        }
        Ok(())
    }

    /// Expected available hours for one trainer in the period.
    pub fn capacity_hours(&self) -> Decimal {
        Decimal::from(self.working_days_per_period) * self.daily_working_hours
    }
}

// --- Anomaly Thresholds ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyThresholds {
    pub rules: Vec<AnomalyRule>,
    pub daily_ceiling_minutes: Decimal,
    pub low_day_minutes: Decimal,
    pub utilization_ceiling_pct: Decimal,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            rules: AnomalyRule::ALL.to_vec(),
            daily_ceiling_minutes: dec!(600),
            low_day_minutes: dec!(180),
            utilization_ceiling_pct: dec!(100),
        }
    }
}

// --- Environment Settings ---

fn default_working_days() -> u32 {
    22
}
fn default_daily_hours() -> Decimal {
    dec!(8)
}
fn default_daily_ceiling() -> Decimal {
    dec!(600)
}
fn default_low_day() -> Decimal {
    dec!(180)
}
fn default_utilization_ceiling() -> Decimal {
    dec!(100)
}
fn default_log_filter() -> String {
    "info".to_string()
}

/// Settings read from `TIMESHEET_*` environment variables (and `.env`).
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_working_days")]
    pub working_days_per_period: u32,
    #[serde(default = "default_daily_hours")]
    pub daily_working_hours: Decimal,

    #[serde(default = "default_daily_ceiling")]
    pub daily_ceiling_minutes: Decimal,
    #[serde(default = "default_low_day")]
    pub low_day_minutes: Decimal,
    #[serde(default = "default_utilization_ceiling")]
    pub utilization_ceiling_pct: Decimal,

    #[serde(default)]
    pub date_order: DateOrder,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    // Comma separated keyword overrides, e.g. TIMESHEET_BILLABLE_KEYWORDS=Training,Audit
    pub billable_keywords: Option<Vec<String>>,
    pub training_keywords: Option<Vec<String>>,
    pub travel_keywords: Option<Vec<String>>,
    pub admin_keywords: Option<Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            working_days_per_period: default_working_days(),
            daily_working_hours: default_daily_hours(),
            daily_ceiling_minutes: default_daily_ceiling(),
            low_day_minutes: default_low_day(),
            utilization_ceiling_pct: default_utilization_ceiling(),
            date_order: DateOrder::default(),
            log_filter: default_log_filter(),
            billable_keywords: None,
            training_keywords: None,
            travel_keywords: None,
            admin_keywords: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> std::result::Result<Self, envy::Error> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        Self::from_vars(std::env::vars())
    }

    /// Reads `TIMESHEET_*` pairs from `vars`; other names are ignored.
    pub fn from_vars<I>(vars: I) -> std::result::Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed("TIMESHEET_").from_iter::<_, Settings>(vars)
    }

    pub fn category_rules(&self) -> CategoryRules {
        let mut rules = CategoryRules::default();
        if let Some(words) = &self.billable_keywords {
            rules.billable = words.clone();
        }
        if let Some(words) = &self.training_keywords {
            rules.training = words.clone();
        }
        if let Some(words) = &self.travel_keywords {
            rules.travel = words.clone();
        }
        if let Some(words) = &self.admin_keywords {
            rules.admin = words.clone();
        }
        debug!("Using category rules: {:?}", rules);
        rules
    }

    pub fn metrics_config(&self) -> Result<MetricsConfig> {
        let config = MetricsConfig::new(self.working_days_per_period, self.daily_working_hours)?;
        Ok(config.with_categories(self.category_rules()))
    }

    pub fn thresholds(&self) -> AnomalyThresholds {
        AnomalyThresholds {
            daily_ceiling_minutes: self.daily_ceiling_minutes,
            low_day_minutes: self.low_day_minutes,
            utilization_ceiling_pct: self.utilization_ceiling_pct,
            ..AnomalyThresholds::default()
        }
    }
}
