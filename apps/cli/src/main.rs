mod session;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use engine::{EngineConfig, RaceEngine, RaceState};
use parking_lot::Mutex;
use race_ingest_core::region_channel;
use race_ingest_replay::{ReplayConfig, ReplaySource, SimRegionMonitor};
use race_io::JsonRouteStore;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let (Some(store_path), Some(route_name), Some(fixes_path)) =
        (args.next(), args.next(), args.next())
    else {
        bail!("usage: race-cli <routes.json> <route name> <fixes.csv> [rate]");
    };
    let rate: f64 = match args.next() {
        Some(raw) => raw.parse().context("rate must be a number")?,
        None => 10.0,
    };

    let store = JsonRouteStore::new(&store_path);
    let route = store
        .load()?
        .into_iter()
        .find(|r| r.name == route_name)
        .with_context(|| format!("no route named '{route_name}' in {store_path}"))?;
    info!(
        route = %route.name,
        waypoints = route.waypoint_count(),
        planned_m = route.total_length_m(),
        "loaded route"
    );
    let route = Arc::new(route);

    let config = EngineConfig::default();
    let (region_tx, region_rx) = region_channel();
    let monitor = Arc::new(SimRegionMonitor::new(region_tx));
    let engine = Arc::new(Mutex::new(RaceEngine::new(
        route.clone(),
        monitor.clone(),
        &config,
    )?));

    let source = ReplaySource::new(ReplayConfig { path: fixes_path.into(), rate });
    let pump = session::spawn(
        engine.clone(),
        monitor,
        source,
        region_rx,
        &config,
        Arc::new(store),
        rate,
        true,
    );

    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let snapshot = engine.lock().snapshot();
        if snapshot.state == RaceState::InProgress {
            info!(
                elapsed = %format_hms(snapshot.elapsed_s),
                distance_km = format!("{:.2}", snapshot.distance_m / 1000.0),
                speed_kmh = format!("{:.1}", snapshot.speed_mps * 3.6),
                remaining_km = format!("{:.2}", snapshot.remaining_m / 1000.0),
                "racing"
            );
        }
        if snapshot.state == RaceState::Completed || pump.is_finished() {
            break;
        }
    }
    engine.lock().cleanup();

    let eng = engine.lock();
    match eng.last_result() {
        Some(result) => {
            println!("finished '{}' in {}", route.name, format_hms(result.total_duration_s));
            for (i, split) in result.segment_durations_s.iter().enumerate() {
                println!("  segment {}: {}", i + 1, format_hms(*split));
            }
            println!("  distance: {:.2} km", result.total_distance_m / 1000.0);
            println!("  average:  {:.1} km/h", result.average_speed_mps * 3.6);
        }
        None => warn!("replay ended before the race completed"),
    }
    Ok(())
}

fn format_hms(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
