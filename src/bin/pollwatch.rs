use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use pollwatch::{
    config::{Config, read_targets_file},
    discord::{DeliveryResult, DiscordNotifier},
    pipeline::{ProbeKind, RunOutcome, SeriesProbe, run_document, run_series},
    render::{ChartStyle, ManifestPresenter, SeriesLabels, StatusPresenter},
    sources::{LatencySource, ManifestSource, PopulationSource, StatusSource},
    storage::{CsvSeriesStore, JsonDocumentStore},
    util::get_default_samples,
};
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Poll a remote system and report changes to a Discord webhook")]
struct Args {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    probe: Probe,
}

#[derive(Debug, Clone, Subcommand)]
enum Probe {
    /// Record the player count of every game server
    Population(PopulationArgs),

    /// Measure TCP connect latency to the game servers
    Latency(LatencyArgs),

    /// Report changes to the Discord distribution manifest
    Manifest(DocumentArgs),

    /// Report changes to the Discord status page
    Status(DocumentArgs),
}

#[derive(Debug, Clone, ClapArgs)]
struct PopulationArgs {
    #[arg(long, default_value = "data.csv")]
    history: PathBuf,

    #[arg(long, default_value = "chart.png")]
    chart: PathBuf,
}

#[derive(Debug, Clone, ClapArgs)]
struct LatencyArgs {
    #[arg(long, default_value = "latency.csv")]
    history: PathBuf,

    #[arg(long, default_value = "latency.png")]
    chart: PathBuf,

    /// JSON file listing the targets to probe
    #[arg(long, default_value = "targets.json")]
    targets: PathBuf,

    /// Connect attempts per address
    #[arg(long, default_value_t = get_default_samples())]
    samples: usize,

    /// Timeout of a single connect attempt
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
}

#[derive(Debug, Clone, ClapArgs)]
struct DocumentArgs {
    /// Where the last seen document is kept
    #[arg(long)]
    history: Option<PathBuf>,
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new()
        .with_targets(vec![("pollwatch", level)])
        .with_default(LevelFilter::WARN);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn report(probe: ProbeKind, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Unchanged => info!("{probe}: nothing changed, no notification sent"),
        RunOutcome::Notified(DeliveryResult::Delivered { status }) => {
            info!("{probe}: notification delivered ({status})")
        }
        RunOutcome::Notified(DeliveryResult::Skipped) => {
            warn!("{probe}: no webhook configured, notification skipped")
        }
        RunOutcome::Notified(DeliveryResult::Rejected { status, .. }) => {
            error!("{probe}: webhook rejected the notification ({status})")
        }
        RunOutcome::Notified(DeliveryResult::Failed(reason)) => {
            error!("{probe}: could not deliver notification: {reason}")
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = Config::from_env()?;
    let client = config.http_client()?;

    let (kind, outcome) = match args.probe {
        Probe::Population(PopulationArgs { history, chart }) => {
            let kind = ProbeKind::Population;
            let credentials = config.credentials()?;
            let source =
                PopulationSource::new(client.clone(), &config.endpoints.login_url, credentials);
            let notifier =
                DiscordNotifier::new(client, config.webhook_for(kind).map(str::to_string));
            let probe = SeriesProbe {
                kind,
                labels: SeriesLabels::new("AQW Server Populations", "Count", ""),
                chart: ChartStyle::new(
                    "Population Analysis Across Multiple Timezones",
                    "Players",
                    "chart.png",
                ),
                chart_path: Some(chart),
            };
            let store = CsvSeriesStore::new(history);
            (kind, run_series(&probe, &source, &store, &notifier).await?)
        }
        Probe::Latency(LatencyArgs {
            history,
            chart,
            targets,
            samples,
            timeout_ms,
        }) => {
            let kind = ProbeKind::Latency;
            let targets = read_targets_file(&targets)?;
            let source =
                LatencySource::new(&targets.targets, samples, Duration::from_millis(timeout_ms));
            let notifier =
                DiscordNotifier::new(client, config.webhook_for(kind).map(str::to_string));
            let probe = SeriesProbe {
                kind,
                labels: SeriesLabels::new("AQW Server Latency", "Latency", "ms"),
                chart: ChartStyle::new(
                    "Latency Across Multiple Timezones",
                    "Latency (ms)",
                    "latency.png",
                ),
                chart_path: Some(chart),
            };
            let store = CsvSeriesStore::new(history);
            (kind, run_series(&probe, &source, &store, &notifier).await?)
        }
        Probe::Manifest(DocumentArgs { history }) => {
            let kind = ProbeKind::Manifest;
            let source = ManifestSource::new(client.clone(), &config.endpoints.manifest_url);
            let notifier =
                DiscordNotifier::new(client, config.webhook_for(kind).map(str::to_string));
            let store =
                JsonDocumentStore::new(history.unwrap_or_else(|| "manifest_cache.json".into()));
            let outcome =
                run_document(kind, &source, &store, &notifier, &ManifestPresenter).await?;
            (kind, outcome)
        }
        Probe::Status(DocumentArgs { history }) => {
            let kind = ProbeKind::Status;
            let source = StatusSource::new(client.clone(), &config.endpoints.status_api_url);
            let notifier =
                DiscordNotifier::new(client, config.webhook_for(kind).map(str::to_string));
            let store =
                JsonDocumentStore::new(history.unwrap_or_else(|| "status_cache.json".into()));
            let outcome = run_document(kind, &source, &store, &notifier, &StatusPresenter).await?;
            (kind, outcome)
        }
    };

    report(kind, &outcome);
    Ok(())
}
