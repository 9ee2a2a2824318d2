use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Datelike;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use cohort_revenue::aggregate;
use cohort_revenue::calendar::{Quarter, YearMonth};
use cohort_revenue::config::{EngineConfig, ModelKind, Pricing, TerminalBasis};
use cohort_revenue::db;
use cohort_revenue::engine::RevenueEngine;
use cohort_revenue::filter::{ProgramQuery, Snapshot};
use cohort_revenue::ingest;
use cohort_revenue::kpi::{self, Granularity, RuleSet};
use cohort_revenue::models::{ProgramRecord, ProgramStatus};
use cohort_revenue::overview;
use cohort_revenue::report;
use cohort_revenue::revenue;

#[derive(Parser)]
#[command(name = "cohort-revenue")]
#[command(about = "Expected-versus-actual revenue tracker for training programs", long_about = None)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,
    #[command(flatten)]
    engine: EngineArgs,
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Read programs from a CSV file instead of Postgres
    #[arg(long, global = true, env = "COHORT_PROGRAMS_CSV")]
    programs_csv: Option<PathBuf>,
    /// Override rows applied on top of --programs-csv
    #[arg(long, global = true, env = "COHORT_OVERRIDES_CSV", requires = "programs_csv")]
    overrides_csv: Option<PathBuf>,
}

#[derive(Args)]
struct EngineArgs {
    /// JSON file holding pricing, model and dashboard rules
    #[arg(long, global = true, env = "COHORT_CONFIG")]
    config: Option<PathBuf>,
    /// Revenue per enrolled head per month
    #[arg(long, global = true, env = "COHORT_UNIT_PRICE", conflicts_with = "hourly_rate")]
    unit_price: Option<f64>,
    /// Revenue per enrolled head per instructional hour
    #[arg(long, global = true, env = "COHORT_HOURLY_RATE")]
    hourly_rate: Option<f64>,
    #[arg(long, global = true, value_enum, env = "COHORT_MODEL")]
    model: Option<ModelKind>,
    #[arg(long, global = true, value_enum, env = "COHORT_TERMINAL")]
    terminal: Option<TerminalBasis>,
}

impl EngineArgs {
    fn resolve(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(unit_price) = self.unit_price {
            config.pricing = Pricing::PerHeadMonth { unit_price };
        }
        if let Some(hourly_rate) = self.hourly_rate {
            config.pricing = Pricing::PerHeadHour { hourly_rate };
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(terminal) = self.terminal {
            config.terminal = terminal;
        }
        Ok(config)
    }
}

#[derive(Args, Clone, Default)]
struct FilterArgs {
    #[arg(long)]
    year: Option<i32>,
    #[arg(long)]
    quarter: Option<Quarter>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    status: Option<ProgramStatus>,
    /// Case-insensitive substring of the program name
    #[arg(long)]
    name: Option<String>,
}

impl From<FilterArgs> for ProgramQuery {
    fn from(args: FilterArgs) -> Self {
        ProgramQuery {
            year: args.year,
            quarter: args.quarter,
            category: args.category,
            status: args.status,
            name_like: args.name,
        }
        .normalized()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import programs from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import per-month enrollment and hours overrides from a CSV file
    ImportOverrides {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List the years, quarters and categories available for filtering
    Filters,
    /// Programs of one year in start-date order
    Timeline {
        #[arg(long)]
        year: i32,
    },
    /// Show one program's monthly enrollment and revenue curve
    Curve {
        /// Program id or code
        #[arg(long)]
        program: String,
        #[arg(long)]
        round: Option<u32>,
    },
    /// Expected, actual and gap revenue per program
    Revenue {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Revenue of every program operating in one month
    Month {
        /// Calendar month as YYYY-MM
        #[arg(long)]
        month: YearMonth,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Monthly revenue series, either one year summed or selected programs side by side
    Compare {
        /// Program id or code; repeat to compare several
        #[arg(long = "program")]
        programs: Vec<String>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Recruitment, completion, employment and satisfaction rates
    Kpi {
        #[arg(long, value_enum, default_value_t = Granularity::Quarter)]
        granularity: Granularity,
        #[arg(long, value_enum, default_value_t = RuleSet::Dashboard)]
        rules: RuleSet,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set unless --programs-csv is given")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn load_offline(programs_csv: &Path, overrides_csv: Option<&Path>) -> anyhow::Result<Snapshot> {
    let mut programs = ingest::load_programs(programs_csv)
        .with_context(|| format!("failed to read {}", programs_csv.display()))?;
    if let Some(path) = overrides_csv {
        let rows = ingest::load_overrides(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let applied = ingest::attach_overrides(&mut programs, &rows);
        info!(applied, total = rows.len(), "attached overrides");
    }
    Ok(Snapshot::from_programs(programs))
}

async fn load_snapshot(source: &SourceArgs, query: &ProgramQuery) -> anyhow::Result<Snapshot> {
    match &source.programs_csv {
        Some(path) => load_offline(path, source.overrides_csv.as_deref()),
        None => {
            let pool = connect().await?;
            Ok(db::load_snapshot(&pool, query).await)
        }
    }
}

fn find_program<'a>(
    programs: &'a [ProgramRecord],
    key: &str,
    round: Option<u32>,
) -> Option<&'a ProgramRecord> {
    let key = key.trim();
    if let Ok(id) = Uuid::parse_str(key) {
        return programs.iter().find(|p| p.id == id);
    }
    programs
        .iter()
        .filter(|p| p.code.eq_ignore_ascii_case(key) && round.map_or(true, |r| p.round == r))
        .max_by_key(|p| p.round)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.engine.resolve()?;
    let engine = RevenueEngine::new(&config);

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_programs(&pool, &csv).await?;
            println!("Imported {inserted} programs from {}.", csv.display());
        }
        Commands::ImportOverrides { csv } => {
            let pool = connect().await?;
            let inserted = db::import_overrides(&pool, &csv).await?;
            println!("Imported {inserted} overrides from {}.", csv.display());
        }
        Commands::Filters => {
            let snapshot = load_snapshot(&cli.source, &ProgramQuery::default()).await?;
            let options = snapshot.options;
            let counts: Vec<overview::YearCounts> = options
                .years
                .iter()
                .map(|year| overview::year_counts(&snapshot.programs, *year))
                .collect();
            if cli.json {
                return print_json(&serde_json::json!({ "options": options, "years": counts }));
            }

            let quarters: Vec<&str> = options.quarters.iter().map(|q| q.as_str()).collect();
            println!("Years:");
            for count in &counts {
                println!(
                    "- {}: {} programs, {} students",
                    count.year, count.programs, count.students
                );
            }
            println!("Quarters: {}", quarters.join(", "));
            println!("Categories: {}", options.categories.join(", "));
        }
        Commands::Timeline { year } => {
            let query = ProgramQuery {
                year: Some(year),
                ..Default::default()
            };
            let snapshot = load_snapshot(&cli.source, &query).await?;
            let entries = overview::timeline(&snapshot.programs, year);
            if cli.json {
                return print_json(&entries);
            }

            if entries.is_empty() {
                println!("No programs recorded for {year}.");
                return Ok(());
            }

            println!("{year} timeline:");
            for entry in &entries {
                let date = |d: Option<chrono::NaiveDate>| {
                    d.map(|d| d.to_string()).unwrap_or_else(|| "?".to_string())
                };
                println!(
                    "- {} to {}: {} [{}]",
                    date(entry.start_date),
                    date(entry.end_date),
                    entry.label,
                    entry.status
                );
            }
        }
        Commands::Curve { program, round } => {
            let snapshot = load_snapshot(&cli.source, &ProgramQuery::default()).await?;
            let record = find_program(&snapshot.programs, &program, round)
                .with_context(|| format!("no program matches `{program}`"))?;
            let curve = engine.curve(record);
            if cli.json {
                return print_json(&curve);
            }

            if curve.is_empty() {
                println!(
                    "{} has no valid schedule (start and end dates are required, end on or after start).",
                    record.label()
                );
                return Ok(());
            }

            println!("{} monthly curve ({} model):", record.label(), engine.model().name());
            for point in &curve {
                let marker = if point.overridden { " *" } else { "" };
                println!(
                    "- {}M {}: enrollment {:.1} (modeled {:.1}), revenue {} (modeled {}){}",
                    point.month_index,
                    point.month,
                    point.enrollment,
                    point.modeled_enrollment,
                    point.revenue,
                    point.modeled_revenue,
                    marker
                );
            }
        }
        Commands::Revenue { filter } => {
            let query = ProgramQuery::from(filter);
            let snapshot = load_snapshot(&cli.source, &query).await?;
            let report = revenue::reconcile(&engine, query.apply(&snapshot.programs));
            if cli.json {
                return print_json(&report);
            }

            if report.items.is_empty() {
                println!("No programs match this selection.");
                return Ok(());
            }

            println!("Revenue by program:");
            for item in &report.items {
                println!(
                    "- {} ({}) {} months: expected {}, actual {}, gap {}",
                    item.program,
                    item.round,
                    item.duration_months,
                    item.totals.expected,
                    item.totals.actual,
                    item.totals.gap
                );
            }
            println!(
                "Total: expected {}, actual {}, gap {}, ceiling {}",
                report.totals.expected, report.totals.actual, report.totals.gap, report.totals.max
            );
        }
        Commands::Month { month, filter } => {
            let query = ProgramQuery::from(filter);
            let snapshot = load_snapshot(&cli.source, &query).await?;
            let result = revenue::month_snapshot(&engine, query.apply(&snapshot.programs), month);
            if cli.json {
                return print_json(&result);
            }

            if result.items.is_empty() {
                println!("No programs operating in {month}.");
                return Ok(());
            }

            println!("Programs operating in {month}:");
            for item in &result.items {
                println!(
                    "- {} ({}) month {}: revenue {} (modeled {})",
                    item.program, item.round, item.month_index, item.revenue, item.modeled_revenue
                );
            }
            println!("Total: {}", result.total);
        }
        Commands::Compare { programs, filter } => {
            let query = ProgramQuery::from(filter);
            let snapshot = load_snapshot(&cli.source, &query).await?;
            let filtered: Vec<ProgramRecord> =
                query.apply(&snapshot.programs).into_iter().cloned().collect();

            let mut selection = Vec::new();
            for key in &programs {
                match find_program(&filtered, key, None) {
                    Some(record) => selection.push(record.id),
                    None => warn!(program = %key, "no program matches, leaving it out"),
                }
            }
            if !programs.is_empty() && selection.is_empty() {
                println!("None of the requested programs match this selection.");
                return Ok(());
            }

            let year = query.year.unwrap_or_else(|| chrono::Local::now().year());
            let series = aggregate::aggregate(&engine, &filtered, &selection, year);
            if cli.json {
                return print_json(&series);
            }

            if series.is_empty() {
                println!("No revenue to chart for this selection.");
                return Ok(());
            }

            for line in &series.series {
                println!("{}:", line.label);
                for (month, value) in series.axis.iter().zip(&line.values) {
                    println!("- {month}: {value}");
                }
            }
        }
        Commands::Kpi {
            granularity,
            rules,
            filter,
        } => {
            let query = ProgramQuery::from(filter);
            let snapshot = load_snapshot(&cli.source, &query).await?;
            let selected = query.apply(&snapshot.programs);
            let buckets = kpi::kpis_by(&selected, granularity, rules, &config.dashboard);
            if cli.json {
                return print_json(&buckets);
            }

            if buckets.is_empty() {
                println!("No programs match this selection.");
                return Ok(());
            }

            for bucket in &buckets {
                println!(
                    "- {}: recruitment {:.2}%, completion {:.2}%, employment {:.2}%, satisfaction {:.2}",
                    bucket.key,
                    bucket.kpis.recruitment_rate,
                    bucket.kpis.completion_rate,
                    bucket.kpis.employment_rate,
                    bucket.kpis.satisfaction
                );
            }
        }
        Commands::Report { filter, out } => {
            let query = ProgramQuery::from(filter);
            let snapshot = load_snapshot(&cli.source, &query).await?;
            let selected = query.apply(&snapshot.programs);
            let report = report::build_report(&engine, &config.dashboard, &query, &selected);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
