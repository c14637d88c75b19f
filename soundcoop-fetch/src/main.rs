use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use soundcoop_fetch::config::FetchConfig;
use soundcoop_fetch::{fetcher, store};

/// Download passive acoustic monitoring NetCDF files for recording stations
/// from S3- and GCS-compatible buckets.
#[derive(Debug, Parser)]
#[command(name = "soundcoop-fetch", version)]
struct Args {
    /// Station configuration file (TOML). Uses the built-in stations if omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local root directory; overrides `data_dir` from the configuration.
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Only fetch these stations (repeatable).
    #[arg(short, long = "station")]
    stations: Vec<String>,

    /// Fetch this year for every station instead of the configured one.
    #[arg(short, long)]
    year: Option<i32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => FetchConfig::load(path)?,
        None => FetchConfig::builtin(),
    };
    config.select(&args.stations)?;
    if let Some(year) = args.year {
        config.set_year(year);
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    info!(
        data_dir = %config.data_dir.display(),
        stations = config.stations.len(),
        "soundcoop-fetch starting"
    );

    for station in &config.stations {
        let store = store::from_station(station, config.timeout())
            .with_context(|| format!("Failed to set up store for station {}", station.name))?;
        let summary = fetcher::fetch_station(station, store.as_ref(), &config.data_dir)
            .await
            .with_context(|| format!("Fetch failed for station {}", station.name))?;
        info!(
            station = %station.name,
            listed = summary.listed,
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            ignored = summary.ignored,
            bytes = summary.bytes,
            "Station complete"
        );
    }

    info!("All stations complete");
    Ok(())
}
