// src/main.rs
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use timesheet_insights::aggregate::{activity_breakdown, group_by, group_by_pair, Aggregation, GroupKey};
use timesheet_insights::anomaly::{count_by_kind, metric_anomalies, reject_anomalies};
use timesheet_insights::export::write_clean_csv_path;
use timesheet_insights::filter::trainer_names;
use timesheet_insights::loader::load_path;
use timesheet_insights::report::{format_hours, format_pct, render_text, Table};
use timesheet_insights::trends::{
    daily_team_average, location_performance, weekly_summary, DailyAverage, LocationPerformance,
    WeeklyTrend,
};
use timesheet_insights::{
    compute_metrics, detect_anomalies, Anomaly, AnomalyThresholds, DatasetFilter, DateOrder,
    LoadOptions, MetricsConfig, MetricsReport, RejectedRow, ReportAssembler, ReportSection,
    SectionSelection, Settings, TimesheetRow,
};

// --- Command Line ---

#[derive(Parser)]
#[command(name = "timesheet-insights")]
#[command(version)]
#[command(about = "Utilization, attendance and travel metrics from timesheet exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Team summary for the selected window
    Summary(InputArgs),
    /// Per-trainer metrics, highest utilization first
    Trainers {
        #[command(flatten)]
        input: InputArgs,
        /// List every trainer in the file, including those with no rows in the window
        #[arg(long)]
        roster: bool,
    },
    /// Rule-based anomaly flags, rejected rows and utilization above capacity
    Anomalies {
        #[command(flatten)]
        input: InputArgs,
        /// Leave loader rejects out of the list
        #[arg(long)]
        no_rejects: bool,
    },
    /// Group hours by one or two keys
    Group {
        #[command(flatten)]
        input: InputArgs,
        /// trainer, activity, week, location, date or priority
        #[arg(long)]
        by: GroupKey,
        /// Optional second-level key
        #[arg(long)]
        then: Option<GroupKey>,
        /// sum, mean or count
        #[arg(long, default_value = "sum")]
        agg: Aggregation,
    },
    /// Weekly category trends, daily team average and location performance
    Trends(InputArgs),
    /// Assemble report sections
    Report {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        no_cover: bool,
        #[arg(long)]
        no_charts: bool,
        /// Append the (truncated) raw data table
        #[arg(long)]
        raw_data: bool,
        #[arg(long, default_value_t = 100)]
        max_raw_rows: usize,
    },
    /// Write the cleaned rows back to CSV
    Export {
        #[command(flatten)]
        input: InputArgs,
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
struct InputArgs {
    /// Timesheet CSV (long format or monthly day-block sheet)
    #[arg(short, long)]
    input: PathBuf,
    /// First date to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last date to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
    /// Restrict to a location (repeatable)
    #[arg(long = "location")]
    locations: Vec<String>,
    /// Restrict to a trainer (repeatable)
    #[arg(long = "trainer")]
    trainers: Vec<String>,
    /// strict, day-first or month-first
    #[arg(long)]
    date_order: Option<DateOrder>,
    #[arg(long)]
    working_days: Option<u32>,
    #[arg(long)]
    daily_hours: Option<Decimal>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

// --- Session ---

/// Everything one command needs: the filtered rows plus resolved configuration.
struct Session {
    rows: Vec<TimesheetRow>,
    rejects: Vec<RejectedRow>,
    roster: Vec<String>,
    config: MetricsConfig,
    thresholds: AnomalyThresholds,
    format: OutputFormat,
}

fn load_session(args: &InputArgs, mut settings: Settings) -> Result<Session> {
    if let Some(days) = args.working_days {
        settings.working_days_per_period = days;
    }
    if let Some(hours) = args.daily_hours {
        settings.daily_working_hours = hours;
    }
    if let Some(order) = args.date_order {
        settings.date_order = order;
    }

    // Configuration errors stop the run before any file is read.
    let config = settings
        .metrics_config()
        .context("Invalid metrics configuration")?;
    let thresholds = settings.thresholds();

    let options = LoadOptions {
        date_order: settings.date_order,
    };
    let outcome = load_path(&args.input, &options)
        .with_context(|| format!("Failed to load timesheet {}", args.input.display()))?;
    if !outcome.rejects.is_empty() {
        warn!(
            "{} row(s) were rejected and excluded from metrics",
            outcome.rejects.len()
        );
    }

    let roster = trainer_names(&outcome.rows);
    let filter = DatasetFilter::default()
        .between(args.from, args.to)
        .locations(args.locations.iter().cloned())
        .employees(args.trainers.iter().cloned());
    let rows = filter.apply(&outcome.rows);
    if rows.is_empty() {
        warn!("No rows match the selected filters");
    }

    Ok(Session {
        rows,
        rejects: outcome.rejects,
        roster,
        config,
        thresholds,
        format: args.format,
    })
}

impl Session {
    fn metrics(&self) -> Result<MetricsReport> {
        compute_metrics(&self.rows, &self.config).context("Metric computation failed")
    }

    fn anomalies(&self, metrics: &MetricsReport, include_rejects: bool) -> Vec<Anomaly> {
        let mut anomalies = detect_anomalies(&self.rows, &self.thresholds);
        if include_rejects {
            anomalies.extend(reject_anomalies(&self.rejects));
        }
        anomalies.extend(metric_anomalies(metrics, &self.thresholds));
        anomalies
    }

    fn text_sections(
        &self,
        metrics: &MetricsReport,
        anomalies: &[Anomaly],
        selection: SectionSelection,
    ) -> String {
        let sections = ReportAssembler::new(&self.rows, metrics, anomalies, &selection).build();
        render_text(&sections)
    }
}

fn sections_only() -> SectionSelection {
    SectionSelection {
        cover: false,
        summary: false,
        trainer_table: false,
        activity_table: false,
        weekly_table: false,
        anomaly_table: false,
        raw_data: false,
        charts: false,
        ..SectionSelection::default()
    }
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
            println!("{}", json);
        }
        OutputFormat::Text => print!("{}", text()),
    }
    Ok(())
}

// --- Commands ---

fn run_summary(session: &Session) -> Result<()> {
    let metrics = session.metrics()?;
    let anomalies = session.anomalies(&metrics, true);
    emit(session.format, &metrics.summary, || {
        session.text_sections(
            &metrics,
            &anomalies,
            SectionSelection {
                summary: true,
                ..sections_only()
            },
        )
    })
}

fn run_trainers(session: &Session, roster: bool) -> Result<()> {
    let metrics = session.metrics()?;
    let trainers = if roster {
        metrics.trainer_list(&session.roster)
    } else {
        metrics.leaderboard().into_iter().cloned().collect()
    };

    emit(session.format, &trainers, || {
        let mut table = Table {
            title: "Trainer Metrics".to_string(),
            headers: [
                "Trainer",
                "Total Hours",
                "Billable Hours",
                "Focus Hours",
                "Utilization",
                "Attendance",
                "Travel Efficiency",
                "Avg Daily Hours",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
            rows: Vec::new(),
            note: None,
        };
        table.rows = trainers
            .iter()
            .map(|t| {
                vec![
                    t.employee_name.clone(),
                    format_hours(t.total_hours),
                    format_hours(t.billable_hours),
                    format_hours(t.focus_hours),
                    format_pct(t.utilization_pct),
                    format_pct(t.attendance_rate_pct),
                    format_pct(t.travel_efficiency_pct),
                    format!("{:.2}", t.avg_daily_hours),
                ]
            })
            .collect();
        render_text(&[ReportSection::Table(table)])
    })
}

fn run_anomalies(session: &Session, include_rejects: bool) -> Result<()> {
    let metrics = session.metrics()?;
    let anomalies = session.anomalies(&metrics, include_rejects);
    info!("{} anomalies flagged", anomalies.len());

    emit(session.format, &anomalies, || {
        let selection = SectionSelection {
            anomaly_table: true,
            ..sections_only()
        };
        let mut text = render_text(
            &ReportAssembler::new(&session.rows, &metrics, &anomalies, &selection).build(),
        );
        for (kind, count) in count_by_kind(&anomalies) {
            text.push_str(&format!("{}: {}\n", kind, count));
        }
        text
    })
}

fn grouped_table(title: String, headers: Vec<String>, rows: Vec<Vec<String>>) -> ReportSection {
    ReportSection::Table(Table {
        title,
        headers,
        rows,
        note: None,
    })
}

fn run_group(
    session: &Session,
    by: GroupKey,
    then: Option<GroupKey>,
    agg: Aggregation,
) -> Result<()> {
    match then {
        None => {
            let result = group_by(&session.rows, by, agg);
            emit(session.format, &result, || {
                let rows = result
                    .groups
                    .iter()
                    .map(|g| vec![g.key.to_string(), format!("{:.2}", g.value), g.row_count.to_string()])
                    .collect();
                render_text(&[grouped_table(
                    format!("{} by {}", agg, by),
                    vec![by.to_string(), agg.to_string(), "Entries".to_string()],
                    rows,
                )])
            })
        }
        Some(inner) => {
            let result = group_by_pair(&session.rows, by, inner, agg);
            emit(session.format, &result, || {
                let rows = result
                    .groups
                    .iter()
                    .flat_map(|outer| {
                        outer.groups.iter().map(move |g| {
                            vec![
                                outer.key.to_string(),
                                g.key.to_string(),
                                format!("{:.2}", g.value),
                                g.row_count.to_string(),
                            ]
                        })
                    })
                    .collect();
                render_text(&[grouped_table(
                    format!("{} by {} and {}", agg, by, inner),
                    vec![
                        by.to_string(),
                        inner.to_string(),
                        agg.to_string(),
                        "Entries".to_string(),
                    ],
                    rows,
                )])
            })
        }
    }
}

#[derive(Serialize)]
struct TrendsOutput {
    weekly: Vec<WeeklyTrend>,
    daily: Vec<DailyAverage>,
    locations: Vec<LocationPerformance>,
}

fn run_trends(session: &Session) -> Result<()> {
    let rules = &session.config.categories;
    let trends = TrendsOutput {
        weekly: weekly_summary(&session.rows, rules),
        daily: daily_team_average(&session.rows),
        locations: location_performance(&session.rows, rules),
    };

    emit(session.format, &trends, || {
        let metrics = MetricsReport::default();
        let selection = SectionSelection {
            weekly_table: true,
            ..sections_only()
        };
        let mut sections = ReportAssembler::new(&session.rows, &metrics, &[], &selection)
            .with_weekly(&trends.weekly)
            .build();
        sections.push(grouped_table(
            "Team Average Daily Minutes".to_string(),
            vec!["Date".to_string(), "Trainers".to_string(), "Average Minutes".to_string()],
            trends
                .daily
                .iter()
                .map(|d| {
                    vec![
                        d.date.to_string(),
                        d.trainers.to_string(),
                        format!("{:.1}", d.average_minutes),
                    ]
                })
                .collect(),
        ));
        sections.push(grouped_table(
            "Regional Performance".to_string(),
            vec!["Location".to_string(), "Trainers".to_string(), "Total Hours".to_string()],
            trends
                .locations
                .iter()
                .map(|l| {
                    vec![
                        l.location.clone(),
                        l.trainers.to_string(),
                        format_hours(l.total_hours),
                    ]
                })
                .collect(),
        ));
        render_text(&sections)
    })
}

fn run_report(session: &Session, selection: SectionSelection) -> Result<()> {
    let metrics = session.metrics()?;
    let anomalies = session.anomalies(&metrics, true);
    let activities = activity_breakdown(&session.rows);
    let weekly = weekly_summary(&session.rows, &session.config.categories);

    let sections = ReportAssembler::new(&session.rows, &metrics, &anomalies, &selection)
        .with_activities(&activities)
        .with_weekly(&weekly)
        .build();
    emit(session.format, &sections, || render_text(&sections))
}

fn run_export(session: &Session, output: &Path) -> Result<()> {
    write_clean_csv_path(&session.rows, &session.config.categories, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} rows to {}", session.rows.len(), output.display());
    Ok(())
}

// --- Entry Point ---

fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // stdout carries command output, logs go to stderr.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting tracing subscriber failed")?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env().context("Failed to read TIMESHEET_* settings")?;
    init_tracing(&settings.log_filter)?;
    info!("Tracing subscriber initialized.");

    match cli.command {
        Commands::Summary(input) => run_summary(&load_session(&input, settings)?),
        Commands::Trainers { input, roster } => {
            run_trainers(&load_session(&input, settings)?, roster)
        }
        Commands::Anomalies { input, no_rejects } => {
            run_anomalies(&load_session(&input, settings)?, !no_rejects)
        }
        Commands::Group {
            input,
            by,
            then,
            agg,
        } => run_group(&load_session(&input, settings)?, by, then, agg),
        Commands::Trends(input) => run_trends(&load_session(&input, settings)?),
        Commands::Report {
            input,
            title,
            no_cover,
            no_charts,
            raw_data,
            max_raw_rows,
        } => {
            let defaults = SectionSelection::default();
            let selection = SectionSelection {
                title: title.unwrap_or(defaults.title.clone()),
                cover: !no_cover,
                charts: !no_charts,
                raw_data,
                max_raw_rows,
                ..defaults
            };
            run_report(&load_session(&input, settings)?, selection)
        }
        Commands::Export { input, output } => run_export(&load_session(&input, settings)?, &output),
    }
}
