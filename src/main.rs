//! Linewatch - quality monitoring for beverage production lines
//!
//! # Usage
//!
//! ```bash
//! # Generate 30 days of synthetic line data with a torque drift
//! linewatch simulate --output line.csv --days 30 --drift-parameter torque --drift-per-day 0.05
//!
//! # Control limits and capability for one parameter
//! linewatch --csv line.csv limits --parameter torque --days 30
//! linewatch --csv line.csv capability --parameter brix --lsl 10.3 --usl 10.9
//!
//! # Enable monitoring, then run it every 15 minutes
//! linewatch anomaly-config set --parameter torque --actor qa-lead
//! linewatch --csv line.csv monitor
//!
//! # 14-day forecast with trend interpretation
//! linewatch --csv line.csv forecast --parameter net_content
//! ```
//!
//! # Environment Variables
//!
//! - `LINEWATCH_CONFIG`: path to the TOML config file
//! - `LINEWATCH_CSV`: measurement CSV, same as `--csv`
//! - `LINEWATCH_DB`: anomaly database directory, same as `--db`
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use linewatch::anomaly::{self, AnomalyMonitor, ConfigSettings, TransitionOutcome};
use linewatch::config::{self, LinewatchConfig};
use linewatch::forecast::{self, ForecastEngine};
use linewatch::spc::{compute_capability, ControlChart};
use linewatch::{
    AnomalyStore, CsvSource, Filters, MeasurementSource, RecordTable, SledStore, SpecLimits,
};

mod simulation;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "linewatch")]
#[command(about = "Quality monitoring engines for beverage production lines")]
#[command(version)]
struct CliArgs {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file (overrides LINEWATCH_CONFIG and ./linewatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Measurement CSV (overrides source.csv_path)
    #[arg(long, global = true, env = "LINEWATCH_CSV")]
    csv: Option<PathBuf>,

    /// Anomaly database directory (overrides storage.path)
    #[arg(long, global = true, env = "LINEWATCH_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Measurement window selection shared by the analysis commands.
#[derive(Args, Debug, Clone)]
struct RangeArgs {
    /// Lookback in days, ending at --end
    #[arg(long, default_value_t = 30)]
    days: i64,

    /// Window end (RFC 3339); defaults to now
    #[arg(long)]
    end: Option<DateTime<Utc>>,

    /// Restrict to one product
    #[arg(long)]
    product: Option<String>,
}

impl RangeArgs {
    fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = self.end.unwrap_or_else(Utc::now);
        (end - Duration::days(self.days), end)
    }

    fn filters(&self) -> Filters {
        match &self.product {
            Some(p) => Filters::new().with("product", p),
            None => Filters::new(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Individuals and moving-range control limits for one parameter
    Limits {
        #[arg(long)]
        parameter: String,
        /// Sigma multiple (default from config)
        #[arg(long)]
        n_sigma: Option<f64>,
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Process capability against spec limits
    Capability {
        #[arg(long)]
        parameter: String,
        /// Lower spec limit (default from config)
        #[arg(long)]
        lsl: Option<f64>,
        /// Upper spec limit (default from config)
        #[arg(long)]
        usl: Option<f64>,
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Run one anomaly monitoring pass
    Detect {
        /// Lookback in hours (default from config)
        #[arg(long)]
        window_hours: Option<i64>,
        /// Restrict to one product
        #[arg(long)]
        product: Option<String>,
    },

    /// Run anomaly monitoring on an interval until Ctrl-C
    Monitor {
        /// Seconds between runs (default from config)
        #[arg(long)]
        interval_secs: Option<u64>,
        #[arg(long)]
        window_hours: Option<i64>,
        #[arg(long)]
        product: Option<String>,
    },

    /// Forecast one parameter and interpret the trend
    Forecast {
        #[arg(long)]
        parameter: String,
        /// Days to forecast (default from config)
        #[arg(long)]
        horizon: Option<usize>,
        /// Use the relaxed minimum sample count
        #[arg(long)]
        exploratory: bool,
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Manage per-parameter anomaly configuration
    #[command(subcommand)]
    AnomalyConfig(ConfigCommand),

    /// Inspect and act on anomaly alerts
    #[command(subcommand)]
    Alerts(AlertCommand),

    /// Write a synthetic line log as CSV
    Simulate {
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 30)]
        days: i64,
        /// Minutes between samples
        #[arg(long, default_value_t = 10)]
        interval_mins: i64,
        /// Parameter to drift (torque, brix, net_content)
        #[arg(long)]
        drift_parameter: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        drift_per_day: f64,
        /// Per-sample spike probability
        #[arg(long, default_value_t = 0.002)]
        spike_rate: f64,
        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Create or replace a parameter's configuration
    Set {
        #[arg(long)]
        parameter: String,
        /// Operator making the change
        #[arg(long)]
        actor: String,
        #[arg(long)]
        sensitivity: Option<f64>,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long, default_value = "statistical")]
        method: String,
        /// Store the row disabled
        #[arg(long)]
        disable: bool,
    },
    /// List all configurations
    List,
}

#[derive(Subcommand, Debug)]
enum AlertCommand {
    /// Unresolved alerts, oldest first
    Open {
        #[arg(long)]
        parameter: Option<String>,
    },
    /// Acknowledge a new alert
    Ack {
        #[arg(long)]
        id: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Resolve a new or acknowledged alert
    Resolve {
        #[arg(long)]
        id: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        resolution: String,
    },
    /// Alert counts over the last N days
    Summary {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
}

// ============================================================================
// Setup helpers
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries command output; logs go to stderr.
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<LinewatchConfig> {
    match path {
        Some(p) => LinewatchConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config {}", p.display())),
        None => Ok(LinewatchConfig::load()),
    }
}

fn open_source(args: &CliArgs) -> Result<Arc<dyn MeasurementSource>> {
    let cfg = config::get();
    let Some(path) = args.csv.clone().or_else(|| cfg.source.csv_path.clone()) else {
        bail!("No measurement source: pass --csv or set source.csv_path");
    };
    info!(path = %path.display(), "Measurement source: CSV");
    Ok(Arc::new(
        CsvSource::new(path).with_timestamp_column(&cfg.source.timestamp_column),
    ))
}

fn open_store(args: &CliArgs) -> Result<Arc<SledStore>> {
    let path = args.db.clone().unwrap_or_else(|| config::get().storage.path.clone());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = SledStore::open(&path)
        .with_context(|| format!("Failed to open anomaly store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn query(source: &dyn MeasurementSource, range: &RangeArgs) -> Result<RecordTable> {
    let (start, end) = range.bounds();
    let table = source
        .query_measurements(start, end, &range.filters())
        .context("Failed to query measurements")?;
    info!(records = table.len(), %start, %end, "Measurements loaded");
    Ok(table)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn product_filters(product: Option<&str>) -> Filters {
    product.map_or_else(Filters::new, |p| Filters::new().with("product", p))
}

// ============================================================================
// Commands
// ============================================================================

fn run_limits(args: &CliArgs, parameter: &str, n_sigma: Option<f64>, range: &RangeArgs) -> Result<()> {
    let source = open_source(args)?;
    let table = query(source.as_ref(), range)?;
    let n_sigma = n_sigma.unwrap_or(config::get().control_limits.n_sigma);
    let chart = ControlChart::build(&table.series(parameter).values(), n_sigma);
    if chart.individuals.is_insufficient() {
        warn!(parameter, "Not enough data for control limits");
    } else if !chart.in_control() {
        warn!(
            parameter,
            individual = chart.individual_violations.len(),
            range = chart.range_violations.len(),
            "Process out of control"
        );
    }
    print_json(&chart)
}

fn run_capability(
    args: &CliArgs,
    parameter: &str,
    lsl: Option<f64>,
    usl: Option<f64>,
    range: &RangeArgs,
) -> Result<()> {
    let configured = config::get().spec_limits_for(parameter);
    let limits = SpecLimits::new(lsl.or(configured.lsl), usl.or(configured.usl));
    let source = open_source(args)?;
    let table = query(source.as_ref(), range)?;
    let result = compute_capability(&table.series(parameter).values(), limits);
    match result.rating() {
        Some(rating) => info!(parameter, cpk = ?result.cpk, %rating, "Capability computed"),
        None => warn!(parameter, "Capability indices unavailable"),
    }
    print_json(&serde_json::json!({
        "parameter": parameter,
        "spec_limits": limits,
        "result": result,
        "rating": result.rating().map(|r| r.to_string()),
    }))
}

fn build_monitor(args: &CliArgs, product: Option<&str>) -> Result<AnomalyMonitor> {
    let source = open_source(args)?;
    let store: Arc<dyn AnomalyStore> = open_store(args)?;
    Ok(AnomalyMonitor::new(source, store).with_filters(product_filters(product)))
}

fn run_detect(args: &CliArgs, window_hours: Option<i64>, product: Option<&str>) -> Result<()> {
    let monitor = build_monitor(args, product)?;
    let window = window_hours.unwrap_or(config::get().anomaly.window_hours);
    let report = monitor.detect_anomalies(window)?;
    print_json(&report)
}

async fn run_monitor(
    monitor: AnomalyMonitor,
    window_hours: i64,
    interval: std::time::Duration,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!(
        interval_secs = interval.as_secs(),
        window_hours, "Anomaly monitor starting"
    );
    let mut ticker = tokio::time::interval(interval);
    // Runs never overlap: a slow run delays the next tick.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut runs = 0u64;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!(runs, "Anomaly monitor shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                let m = monitor.clone();
                match tokio::task::spawn_blocking(move || m.detect_anomalies(window_hours)).await {
                    Ok(Ok(report)) => {
                        runs += 1;
                        for alert in &report.alerts {
                            warn!(
                                alert_id = %alert.alert_id,
                                parameter = %alert.parameter_name,
                                observed = alert.observed_value,
                                "New anomaly alert"
                            );
                        }
                        for failed in &report.failed_inserts {
                            error!(parameter = %failed.parameter, error = %failed.error, "Alert not persisted");
                        }
                    }
                    Ok(Err(e)) => error!(error = %e, "Monitoring run failed"),
                    Err(e) => error!(error = %e, "Monitoring task panicked"),
                }
            }
        }
    }
}

fn run_forecast(
    args: &CliArgs,
    parameter: &str,
    horizon: Option<usize>,
    exploratory: bool,
    range: &RangeArgs,
) -> Result<()> {
    let cfg = &config::get().forecast;
    let source = open_source(args)?;
    let table = query(source.as_ref(), range)?;
    let min_samples = cfg.min_samples_for(exploratory);
    let Some(series) = forecast::prepare_time_series(&table, parameter, min_samples) else {
        bail!("Not enough data to forecast '{parameter}' (need {min_samples} samples)");
    };

    let engine = ForecastEngine::new().with_fit_budget(cfg.fit_budget());
    let result = engine.forecast(&series, horizon.unwrap_or(cfg.horizon_days))?;
    let insights =
        forecast::analyze_forecast_trends(&result, config::get().spec_limits_for(parameter));
    if let Some(ref i) = insights {
        info!(
            parameter,
            model = %i.model,
            trend = %i.trend_direction,
            stability = %i.stability,
            out_of_spec = i.out_of_spec,
            "Forecast interpreted"
        );
    }
    print_json(&serde_json::json!({ "forecast": result, "insights": insights }))
}

fn run_config_command(args: &CliArgs, command: &ConfigCommand) -> Result<()> {
    let store = open_store(args)?;
    match command {
        ConfigCommand::Set {
            parameter,
            actor,
            sensitivity,
            threshold,
            method,
            disable,
        } => {
            let defaults = &config::get().anomaly;
            let settings = ConfigSettings {
                parameter_name: parameter.clone(),
                enabled: !disable,
                sensitivity: sensitivity.unwrap_or(defaults.default_sensitivity),
                method: method.clone(),
                alert_threshold: threshold.unwrap_or(defaults.default_threshold),
            };
            let saved = anomaly::save_config(store.as_ref(), &settings, actor, Utc::now())?;
            store.flush()?;
            print_json(&saved)
        }
        ConfigCommand::List => print_json(&store.list_configs()?),
    }
}

fn run_alert_command(args: &CliArgs, command: &AlertCommand) -> Result<()> {
    let store = open_store(args)?;
    let outcome = match command {
        AlertCommand::Open { parameter } => {
            return print_json(&anomaly::open_alerts(store.as_ref(), parameter.as_deref())?);
        }
        AlertCommand::Summary { days } => {
            let now = Utc::now();
            let summary = anomaly::alert_summary(store.as_ref(), now - Duration::days(*days), now)?;
            return print_json(&summary);
        }
        AlertCommand::Ack { id, actor, notes } => {
            anomaly::acknowledge_alert(store.as_ref(), id, actor, notes.as_deref(), Utc::now())?
        }
        AlertCommand::Resolve {
            id,
            actor,
            resolution,
        } => anomaly::resolve_alert(store.as_ref(), id, actor, resolution, Utc::now())?,
    };
    store.flush()?;
    match outcome {
        TransitionOutcome::Applied(alert) => print_json(&alert),
        TransitionOutcome::Rejected { current } => {
            bail!("Transition not allowed: alert is {current}")
        }
        TransitionOutcome::NotFound => bail!("No such alert"),
    }
}

fn run_simulate(
    output: &Path,
    days: i64,
    interval_mins: i64,
    drift_parameter: Option<String>,
    drift_per_day: f64,
    spike_rate: f64,
    seed: Option<u64>,
) -> Result<()> {
    if interval_mins <= 0 || days <= 0 {
        bail!("--days and --interval-mins must be positive");
    }
    if let Some(ref p) = drift_parameter {
        if !simulation::PARAMETERS.contains(&p.as_str()) {
            bail!("Unknown drift parameter '{p}'");
        }
    }
    let Some(samples) = days
        .checked_mul(24 * 60)
        .and_then(|mins| usize::try_from(mins / interval_mins).ok())
    else {
        bail!("--days {days} is too large");
    };
    let start = Duration::try_days(days)
        .and_then(|span| Utc::now().checked_sub_signed(span))
        .with_context(|| format!("--days {days} is too large"))?;
    let interval = Duration::try_minutes(interval_mins)
        .with_context(|| format!("--interval-mins {interval_mins} is too large"))?;
    let spec = simulation::SimulationSpec {
        start,
        samples,
        interval,
        drift_parameter,
        drift_per_day,
        spike_rate,
        run_length: (8 * 60 / interval_mins).max(1) as usize,
    };
    let mut sim = simulation::LineSimulator::new(spec, seed)?;
    let file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let written = sim.write_csv(std::io::BufWriter::new(file))?;
    info!(path = %output.display(), samples = written, "Simulated line log written");
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.json);

    let line_config = load_config(args.config.as_ref())?;
    let site = if line_config.line.site.is_empty() {
        "unset"
    } else {
        line_config.line.site.as_str()
    };
    info!(line = %line_config.line.name, site, "Linewatch starting");
    config::init(line_config);

    match &args.command {
        Command::Limits {
            parameter,
            n_sigma,
            range,
        } => run_limits(&args, parameter, *n_sigma, range),
        Command::Capability {
            parameter,
            lsl,
            usl,
            range,
        } => run_capability(&args, parameter, *lsl, *usl, range),
        Command::Detect {
            window_hours,
            product,
        } => run_detect(&args, *window_hours, product.as_deref()),
        Command::Monitor {
            interval_secs,
            window_hours,
            product,
        } => {
            let defaults = &config::get().anomaly;
            let monitor = build_monitor(&args, product.as_deref())?;
            let interval = interval_secs
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| defaults.monitor_interval());

            // Graceful shutdown via Ctrl+C
            let cancel_token = CancellationToken::new();
            let shutdown_token = cancel_token.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Received Ctrl+C, initiating shutdown");
                shutdown_token.cancel();
            });

            run_monitor(
                monitor,
                window_hours.unwrap_or(defaults.window_hours),
                interval,
                cancel_token,
            )
            .await
        }
        Command::Forecast {
            parameter,
            horizon,
            exploratory,
            range,
        } => run_forecast(&args, parameter, *horizon, *exploratory, range),
        Command::AnomalyConfig(command) => run_config_command(&args, command),
        Command::Alerts(command) => run_alert_command(&args, command),
        Command::Simulate {
            output,
            days,
            interval_mins,
            drift_parameter,
            drift_per_day,
            spike_rate,
            seed,
        } => run_simulate(
            output,
            *days,
            *interval_mins,
            drift_parameter.clone(),
            *drift_per_day,
            *spike_rate,
            *seed,
        ),
    }
}
