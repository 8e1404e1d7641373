use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use relay_probe::endpoint::{filter_by_country, load_endpoints};
use relay_probe::prober::build_prober;
use relay_probe::report::save_report;
use relay_probe::{
    AppConfig, LatencyGrade, ProberKind, ProgressSnapshot, RunOptions, RunReport,
};

#[derive(Debug, Parser)]
#[command(version, about = "Rank VPN relay endpoints by reachability and latency")]
struct Cli {
    /// JSON file holding the endpoint list
    endpoints: PathBuf,

    /// Per-attempt timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Retries after a failed attempt
    #[arg(long)]
    retries: Option<u32>,

    /// Probes in flight at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Upper bound on concurrency (0 = twice the CPU count)
    #[arg(long)]
    max_threads: Option<usize>,

    /// auto, icmp, system or tcp
    #[arg(long)]
    prober: Option<ProberKind>,

    /// Port used by the tcp prober
    #[arg(long)]
    tcp_port: Option<u16>,

    /// Only probe endpoints in this country
    #[arg(long)]
    country: Option<String>,

    /// How many ranked endpoints to print
    #[arg(long, default_value_t = 10)]
    top: usize,

    /// Write the full run as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Persist the effective settings as the new defaults
    #[arg(long)]
    save_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(v) = self.timeout_ms {
            config.timeout_ms = v;
        }
        if let Some(v) = self.retries {
            config.max_retries = v;
        }
        if let Some(v) = self.concurrency {
            config.concurrency = v;
        }
        if let Some(v) = self.max_threads {
            config.max_threads = v;
        }
        if let Some(v) = self.prober {
            config.prober = v;
        }
        if let Some(v) = self.tcp_port {
            config.tcp_port = v;
        }
        config
    }
}

fn progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

fn spawn_progress_display(
    bar: ProgressBar,
    mut updates: watch::Receiver<ProgressSnapshot>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = *updates.borrow_and_update();
            bar.set_position(snapshot.completed as u64);
            bar.set_message(format!("{} up, {} down", snapshot.succeeded, snapshot.failed));
        }
        bar.finish_and_clear();
    })
}

fn print_report(report: &RunReport, config: &AppConfig, top: usize) {
    let thresholds = config.thresholds();

    println!(
        "{:>4}  {:<28} {:<16} {:<16} {:>10}  {:<11} {:>8}",
        "#", "HOST", "COUNTRY", "CITY", "LATENCY", "GRADE", "ATTEMPTS"
    );
    for (rank, outcome) in report.outcomes.iter().take(top).enumerate() {
        let latency = outcome
            .latency_ms
            .map(|ms| format!("{ms:.1} ms"))
            .unwrap_or_else(|| "-".to_string());
        let grade = LatencyGrade::from_latency(outcome.latency_ms, &thresholds);
        println!(
            "{:>4}  {:<28} {:<16} {:<16} {:>10}  {:<11} {:>8}",
            rank + 1,
            outcome.endpoint.hostname,
            outcome.endpoint.country,
            outcome.endpoint.city,
            latency,
            grade.label(),
            outcome.attempts
        );
    }

    let stats = &report.statistics;
    println!();
    println!("{} reachable, {} unreachable", stats.reachable, stats.unreachable);
    if let (Some(mean), Some(min), Some(max)) =
        (stats.mean_latency_ms, stats.min_latency_ms, stats.max_latency_ms)
    {
        println!("latency mean {mean:.1} ms, min {min:.1} ms, max {max:.1} ms");
    }
    println!("good {}, medium {}, bad {}", stats.good, stats.medium, stats.bad);
    if report.partial {
        println!(
            "partial run: {} of {} endpoints measured",
            report.outcomes.len(),
            report.total
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "info" } else { "warn" }),
    )
    .init();

    let config = cli.apply(AppConfig::load());
    config.validate().context("invalid settings")?;
    if cli.save_config {
        let path = config.save().context("failed to save config")?;
        info!("saved settings to {}", path.display());
    }

    let mut endpoints = load_endpoints(&cli.endpoints)
        .with_context(|| format!("failed to load endpoints from {}", cli.endpoints.display()))?;
    if let Some(country) = &cli.country {
        endpoints = filter_by_country(endpoints, country);
    }
    if endpoints.is_empty() {
        warn!("no endpoints to probe");
    }

    let limit = config.concurrency_limit()?;
    let prober = build_prober(config.prober, config.tcp_port)
        .context("failed to set up the prober")?;
    let prober_name = prober.name();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let (progress_tx, progress_rx) = watch::channel(ProgressSnapshot::default());
    let display = spawn_progress_display(progress_bar(endpoints.len()), progress_rx);

    let options = RunOptions::default()
        .with_progress(progress_tx)
        .with_cancellation(cancel)
        .with_thresholds(config.thresholds());
    let report = relay_probe::run(endpoints, prober, config.retry_policy(), limit, options).await?;

    // The sender was dropped with the run, so the display task is winding down.
    let _ = tokio::time::timeout(Duration::from_secs(1), display).await;

    print_report(&report, &config, cli.top);

    if let Some(path) = &cli.report {
        save_report(&report, prober_name, path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!("report written to {}", path.display());
    }

    Ok(())
}
