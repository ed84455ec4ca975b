//! aqi-map: air-quality station layer for a map view.
//!
//! Single-binary Tokio application that:
//! 1. Bulk-loads every station in the configured region from AQICN
//! 2. Keeps the station set fresh on a fixed interval
//! 3. Adds the nearest station for each clicked coordinate
//! 4. Logs what a map would render

mod config;

use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use aqicn_client::AqicnClient;
use common::config::ServiceConfig;
use common::{AqiCategory, StationRecord};
use stations::{CachedSource, MapSession, RefreshOutcome, StationService};

/// AQI station map layer
#[derive(Parser)]
#[command(name = "aqi-map", about = "AQI station aggregation and caching layer")]
struct Cli {
    /// Run one bulk region load, print a JSON summary, then exit.
    #[arg(long)]
    once: bool,

    /// Query every configured city concurrently, print the stations, then exit.
    #[arg(long, conflicts_with = "once")]
    cities: bool,

    /// Look up the station nearest LAT,LNG, print it, then exit.
    #[arg(long, value_name = "LAT,LNG", value_parser = parse_lat_lng, conflicts_with_all = ["once", "cities"])]
    near: Option<(f64, f64)>,
}

fn parse_lat_lng(raw: &str) -> Result<(f64, f64), String> {
    let (lat, lng) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LNG, got {raw:?}"))?;
    let lat = lat
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid latitude {:?}", lat.trim()))?;
    let lng = lng
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid longitude {:?}", lng.trim()))?;
    Ok((lat, lng))
}

type Source = CachedSource<AqicnClient>;

fn build_service(cfg: &ServiceConfig) -> Result<StationService<Source>, common::Error> {
    let client = AqicnClient::new(
        &cfg.aqicn_token,
        Duration::from_secs(cfg.timing.request_timeout_secs),
    )?;
    let source = CachedSource::new(client, Duration::from_secs(cfg.timing.cache_ttl_secs));
    Ok(StationService::new(source))
}

fn category_counts(stations: &[StationRecord]) -> serde_json::Value {
    let mut counts = serde_json::Map::new();
    for category in AqiCategory::ALL {
        let n = stations.iter().filter(|s| s.category() == category).count();
        counts.insert(category.label().to_string(), json!(n));
    }
    serde_json::Value::Object(counts)
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(out) => println!("{}", out),
        Err(e) => error!("Failed to encode output: {}", e),
    }
}

fn log_marker(record: &StationRecord) {
    info!(
        "Marker: {} [{}] AQI {} {} ({}) size={}px at {:.4},{:.4}",
        record.city,
        record.id,
        record.aqi,
        record.level(),
        record.color(),
        record.marker_size_px(),
        record.position.lat(),
        record.position.lng()
    );
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "aqi_map=info,aqicn_client=info,stations=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("🌫️  AQI map starting up...");

    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Region: S{} W{} N{} E{}",
        cfg.region.south, cfg.region.west, cfg.region.north, cfg.region.east
    );
    info!(
        "Timing: cache_ttl={}s refresh={}s request_timeout={}s",
        cfg.timing.cache_ttl_secs, cfg.timing.refresh_interval_secs, cfg.timing.request_timeout_secs
    );

    let service = match build_service(&cfg) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to initialize AQICN client: {}", e);
            std::process::exit(1);
        }
    };

    // ── One-shot modes ───────────────────────────────────────────────
    if cli.once {
        match service.load_region(cfg.region).await {
            Ok(batch) => {
                print_json(&json!({
                    "total": batch.total(),
                    "bounds": batch.bounds(),
                    "fetchedAt": batch.fetched_at(),
                    "categories": category_counts(batch.stations()),
                }));
            }
            Err(e) => {
                error!("Region load failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if cli.cities {
        let stations = service.load_named(&cfg.cities).await;
        print_json(&stations);
        return;
    }

    if let Some((lat, lng)) = cli.near {
        match service.load_near(lat, lng).await {
            Ok(record) => print_json(&record),
            Err(e) => {
                error!("Point lookup failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // ── Session mode ─────────────────────────────────────────────────
    let mut session = MapSession::new(
        service,
        cfg.region,
        Duration::from_secs(cfg.timing.refresh_interval_secs),
    );
    match session.start().await {
        RefreshOutcome::Replaced(n) => info!("Initial load: {} stations", n),
        RefreshOutcome::Failed(e) => warn!("Initial load failed, will retry on schedule: {}", e),
        RefreshOutcome::Superseded => {}
    }

    let mut heartbeat =
        tokio::time::interval(Duration::from_secs(cfg.timing.heartbeat_secs));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("🚀 AQI map is running. Enter LAT,LNG to click, \"refresh\" to retry, Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            _ = heartbeat.tick() => {
                let snap = session.store().snapshot().await;
                info!(
                    "HEARTBEAT: stations={} cached_queries={} last_error={}",
                    snap.total,
                    session.service().source().cached_keys(),
                    snap.last_error.as_deref().unwrap_or("none")
                );
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => handle_input(&session, line.trim()).await,
                    Ok(None) => {
                        info!("stdin closed; session keeps refreshing");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }
        }
    }

    session.shutdown();
    info!("AQI map shut down.");
}

async fn handle_input(session: &MapSession<Source>, input: &str) {
    if input.is_empty() {
        return;
    }
    if input.eq_ignore_ascii_case("refresh") {
        match session.refresh_now().await {
            RefreshOutcome::Replaced(n) => info!("Manual refresh: {} stations", n),
            RefreshOutcome::Failed(e) => warn!("Manual refresh failed: {}", e),
            RefreshOutcome::Superseded => info!("Manual refresh superseded"),
        }
        return;
    }

    let (lat, lng) = match parse_lat_lng(input) {
        Ok(p) => p,
        Err(e) => {
            warn!("Ignoring input: {}", e);
            return;
        }
    };
    // Errors are logged by the session; no marker is added.
    if let Ok(Some(record)) = session.click(lat, lng).await {
        log_marker(&record);
    }
}
