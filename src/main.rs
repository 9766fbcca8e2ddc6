use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use configuration::Settings;
use core_types::{
    AnalyticsQuery, FilterBuilder, Granularity, MetricCategory, TimePreset, TimeRange,
};
use datasource::{DataSource, MemoryDataSource, PostgresDataSource, connect};
use drilldown::DrillDownResolver;
use engine::QueryEngine;
use registry::{MetricRegistry, standard_catalog};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// The main entry point for the Meridian metric engine.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controls verbosity; default to warnings so table output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let settings = configuration::load_config().context("Failed to load configuration")?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Metrics(args) => handle_metrics(args),
        Commands::Validate => handle_validate(),
        Commands::Query(args) => handle_query(args, &settings).await,
        Commands::Series(args) => handle_series(args, &settings).await,
        Commands::Compare(args) => handle_compare(args, &settings).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A dependency-aware metric calculation engine for practice analytics.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the metric catalog, optionally filtered by category.
    Metrics(MetricsArgs),
    /// Validate the metric catalog and exit non-zero on errors.
    Validate,
    /// Evaluate one or more metrics for an organization.
    Query(QueryArgs),
    /// Evaluate one metric per time bucket across a range.
    Series(SeriesArgs),
    /// Compare one metric against the preceding period of equal length.
    Compare(CompareArgs),
}

/// Which data source backs the evaluation.
#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    /// The seeded in-memory fixture; no database required.
    Memory,
    /// PostgreSQL via DATABASE_URL.
    Postgres,
}

#[derive(Parser)]
struct MetricsArgs {
    /// Restrict the listing to one category (e.g. "finances").
    #[arg(long)]
    category: Option<String>,
}

#[derive(Parser)]
struct ScopeArgs {
    /// The organization whose data is evaluated.
    #[arg(long)]
    org: String,

    /// Where to read rows from.
    #[arg(long, value_enum, default_value = "memory")]
    source: SourceKind,

    /// A time range preset (e.g. "last_30_days"). Mutually exclusive with --from/--to.
    #[arg(long, conflicts_with_all = ["from", "to"])]
    range: Option<String>,

    /// Custom range start (RFC 3339).
    #[arg(long, requires = "to")]
    from: Option<DateTime<Utc>>,

    /// Custom range end (RFC 3339).
    #[arg(long, requires = "from")]
    to: Option<DateTime<Utc>>,

    /// Extra equality filters as field=value pairs.
    #[arg(long = "filter")]
    filters: Vec<String>,

    /// Override the configured query deadline.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Parser)]
struct QueryArgs {
    /// Metric ids to evaluate. Repeatable.
    #[arg(long = "metric", required = true)]
    metrics: Vec<String>,

    #[command(flatten)]
    scope: ScopeArgs,
}

#[derive(Parser)]
struct SeriesArgs {
    /// The metric id to evaluate per bucket.
    #[arg(long)]
    metric: String,

    /// Bucket size; inferred from the range length when omitted.
    #[arg(long)]
    granularity: Option<String>,

    /// Cap on the number of buckets.
    #[arg(long)]
    limit: Option<usize>,

    #[command(flatten)]
    scope: ScopeArgs,
}

#[derive(Parser)]
struct CompareArgs {
    /// The metric id to compare across periods.
    #[arg(long)]
    metric: String,

    #[command(flatten)]
    scope: ScopeArgs,
}

// ==============================================================================
// Catalog Commands
// ==============================================================================

fn handle_metrics(args: MetricsArgs) -> anyhow::Result<()> {
    let registry = MetricRegistry::new(standard_catalog())?;
    let resolver = DrillDownResolver::standard();

    let category = args
        .category
        .as_deref()
        .map(parse_category)
        .transpose()?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Id", "Name", "Category", "Unit", "Table", "Drill-Down"]);

    for metric in registry.all() {
        if let Some(category) = category
            && metric.category != category
        {
            continue;
        }
        let drill = metric
            .drill_down_target
            .as_deref()
            .and_then(|key| resolver.resolve(key, &[]))
            .map(|target| target.url)
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(&metric.id),
            Cell::new(&metric.name),
            Cell::new(format!("{:?}", metric.category)),
            Cell::new(format!("{:?}", metric.unit)),
            Cell::new(&metric.source_table),
            Cell::new(drill),
        ]);
    }

    println!("{table}");
    Ok(())
}

fn handle_validate() -> anyhow::Result<()> {
    let registry = MetricRegistry::new(standard_catalog())?;
    let report = registry.validate();

    if report.valid {
        println!("Catalog OK: {} metrics, no validation errors.", registry.len());
        Ok(())
    } else {
        for error in &report.errors {
            eprintln!("validation error: {error}");
        }
        anyhow::bail!("{} validation error(s)", report.errors.len());
    }
}

// ==============================================================================
// Evaluation Commands
// ==============================================================================

async fn handle_query(args: QueryArgs, settings: &Settings) -> anyhow::Result<()> {
    let engine = build_engine(args.scope.source, settings).await?;
    let query = build_query(args.metrics.clone(), &args.scope)?;
    let deadline = deadline_for(&args.scope, settings);

    let result = engine.query_with_deadline(&query, deadline).await?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Metric", "Value", "Degraded"]);
    for id in &args.metrics {
        let value = result.value(id).context("metric missing from result row")?;
        table.add_row(vec![
            Cell::new(id),
            Cell::new(format!("{:.2}", value.value)),
            Cell::new(if value.degraded { "yes" } else { "" }),
        ]);
    }
    println!("{table}");

    let trail = &result.metadata.audit_trail;
    println!("Tables:  {}", trail.source_tables.join(", "));
    println!("Filters: {}", trail.filters_summary);
    println!("Range:   {}", trail.time_range_summary);
    if !trail.degraded_metrics.is_empty() {
        println!("Degraded: {}", trail.degraded_metrics.join(", "));
    }
    println!("Took {} ms", result.metadata.execution_time_ms);
    Ok(())
}

async fn handle_series(args: SeriesArgs, settings: &Settings) -> anyhow::Result<()> {
    let engine = build_engine(args.scope.source, settings).await?;
    let mut query = build_query(vec![args.metric.clone()], &args.scope)?;
    if let Some(limit) = args.limit {
        query = query.with_limit(limit);
    }
    let granularity = args
        .granularity
        .as_deref()
        .map(parse_granularity)
        .transpose()?;

    let points = engine.time_series(&args.metric, &query, granularity).await?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Bucket Start", "Bucket End", "Value", "Degraded"]);
    for point in &points {
        table.add_row(vec![
            Cell::new(point.bucket_start.format("%Y-%m-%d %H:%M")),
            Cell::new(point.bucket_end.format("%Y-%m-%d %H:%M")),
            Cell::new(format!("{:.2}", point.value.value)),
            Cell::new(if point.value.degraded { "yes" } else { "" }),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn handle_compare(args: CompareArgs, settings: &Settings) -> anyhow::Result<()> {
    let engine = build_engine(args.scope.source, settings).await?;
    let query = build_query(vec![args.metric.clone()], &args.scope)?;

    let comparison = engine.compare_periods(&args.metric, &query).await?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Current", "Previous", "Change", "Change %"]);
    table.add_row(vec![
        Cell::new(format!("{:.2}", comparison.current.value)),
        Cell::new(format!("{:.2}", comparison.previous.value)),
        Cell::new(format!("{:+.2}", comparison.change)),
        Cell::new(format!("{:+.2}%", comparison.change_percent)),
    ]);
    println!("{table}");
    Ok(())
}

// ==============================================================================
// Wiring Helpers
// ==============================================================================

async fn build_engine(source: SourceKind, settings: &Settings) -> anyhow::Result<QueryEngine> {
    let registry = Arc::new(MetricRegistry::new(standard_catalog())?);
    let report = registry.validate();
    if !report.valid {
        anyhow::bail!("catalog failed validation: {:?}", report.errors);
    }

    let source: Arc<dyn DataSource> = match source {
        SourceKind::Memory => Arc::new(MemoryDataSource::seeded()),
        SourceKind::Postgres => {
            let pool = connect().await.context("Failed to connect to PostgreSQL")?;
            Arc::new(PostgresDataSource::new(pool))
        }
    };

    Ok(QueryEngine::new(registry, source, settings.engine.clone()))
}

fn build_query(metrics: Vec<String>, scope: &ScopeArgs) -> anyhow::Result<AnalyticsQuery> {
    let mut query = AnalyticsQuery::new(&scope.org, metrics);

    if let Some(preset) = &scope.range {
        let preset = TimePreset::from_str(preset).map_err(anyhow::Error::msg)?;
        query = query.with_time_range(TimeRange::preset(preset));
    } else if let (Some(from), Some(to)) = (scope.from, scope.to) {
        query = query.with_time_range(TimeRange::custom(from, to));
    }

    if !scope.filters.is_empty() {
        let mut builder = FilterBuilder::new();
        for raw in &scope.filters {
            let (field, value) = raw
                .split_once('=')
                .with_context(|| format!("filter '{raw}' is not field=value"))?;
            builder = builder.eq(field, value);
        }
        query = query.with_filters(builder.build());
    }

    Ok(query)
}

fn deadline_for(scope: &ScopeArgs, settings: &Settings) -> Duration {
    Duration::from_secs(
        scope
            .timeout_secs
            .unwrap_or(settings.engine.query_timeout_secs),
    )
}

fn parse_category(raw: &str) -> anyhow::Result<MetricCategory> {
    match raw.to_lowercase().as_str() {
        "cases" => Ok(MetricCategory::Cases),
        "finances" => Ok(MetricCategory::Finances),
        "activities" => Ok(MetricCategory::Activities),
        "productivity" => Ok(MetricCategory::Productivity),
        "storage" => Ok(MetricCategory::Storage),
        "sales" => Ok(MetricCategory::Sales),
        "expense" => Ok(MetricCategory::Expense),
        other => anyhow::bail!("unknown category '{other}'"),
    }
}

fn parse_granularity(raw: &str) -> anyhow::Result<Granularity> {
    match raw.to_lowercase().as_str() {
        "hour" => Ok(Granularity::Hour),
        "day" => Ok(Granularity::Day),
        "week" => Ok(Granularity::Week),
        "month" => Ok(Granularity::Month),
        "quarter" => Ok(Granularity::Quarter),
        "year" => Ok(Granularity::Year),
        other => anyhow::bail!("unknown granularity '{other}'"),
    }
}
