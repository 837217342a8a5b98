//! Replay position source and a software proximity monitor, used by the
//! CLI driver and integration tests in place of platform location services.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use model::{haversine_distance_m, Coordinate};
use parking_lot::Mutex;
use race_ingest_core::{
    FixTx, IngestError, PositionFix, PositionSource, Region, RegionEvent, RegionEventKind,
    RegionEventTx, RegionMonitor,
};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Clone, Debug)]
pub struct ReplayConfig {
    /// CSV fix log to replay.
    pub path: PathBuf,
    /// Playback rate multiplier; 1.0 replays in real time.
    pub rate: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { path: "fixes.csv".into(), rate: 1.0 }
    }
}

#[derive(Debug, Deserialize)]
struct FixRow {
    t_s: f64,
    latitude: f64,
    longitude: f64,
    horizontal_accuracy_m: f64,
    speed_mps: f64,
}

pub fn load_fixes(path: &Path) -> Result<Vec<PositionFix>, IngestError> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("open fix log {}", path.display()))?;
    let mut fixes = Vec::new();
    for rec in rdr.deserialize() {
        let row: FixRow = rec.context("malformed fix row")?;
        fixes.push(PositionFix {
            latitude: row.latitude,
            longitude: row.longitude,
            horizontal_accuracy_m: row.horizontal_accuracy_m,
            speed_mps: row.speed_mps,
            t_s: row.t_s,
        });
    }
    Ok(fixes)
}

/// Replays a recorded fix log, sleeping between fixes to reproduce the
/// original cadence scaled by `rate`.
pub struct ReplaySource {
    cfg: ReplayConfig,
}

impl ReplaySource {
    pub fn new(cfg: ReplayConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait::async_trait]
impl PositionSource for ReplaySource {
    async fn run(&self, tx: FixTx) -> Result<(), IngestError> {
        let fixes = load_fixes(&self.cfg.path)?;
        info!(
            count = fixes.len(),
            path = %self.cfg.path.display(),
            rate = self.cfg.rate,
            "replaying fix log"
        );

        let rate = if self.cfg.rate > 0.0 { self.cfg.rate } else { 1.0 };
        let mut last_t = None;
        for fix in fixes {
            if let Some(prev) = last_t {
                let dt: f64 = fix.t_s - prev;
                if dt > 0.0 {
                    tokio::time::sleep(Duration::from_secs_f64(dt / rate)).await;
                }
            }
            last_t = Some(fix.t_s);
            if tx.send(fix).is_err() {
                // receiver gone, replay is over
                break;
            }
        }
        Ok(())
    }
}

/// Software stand-in for a platform geofencing facility: evaluates every
/// observed position against the registered circular regions and emits
/// enter/exit transitions on the event channel.
pub struct SimRegionMonitor {
    tx: RegionEventTx,
    state: Mutex<SimState>,
}

#[derive(Default)]
struct SimState {
    regions: HashMap<String, Region>,
    inside: HashMap<String, bool>,
    last: Option<(f64, f64)>,
}

impl SimRegionMonitor {
    pub fn new(tx: RegionEventTx) -> Self {
        Self { tx, state: Mutex::new(SimState::default()) }
    }
}

fn within(region: &Region, latitude: f64, longitude: f64) -> bool {
    let center = Coordinate::new(region.latitude, region.longitude);
    let here = Coordinate::new(latitude, longitude);
    haversine_distance_m(&center, &here) <= region.radius_m
}

impl RegionMonitor for SimRegionMonitor {
    fn monitor(&self, region: &Region) {
        let mut state = self.state.lock();
        let inside = state
            .last
            .map(|(lat, lon)| within(region, lat, lon))
            .unwrap_or(false);
        state.inside.insert(region.id.clone(), inside);
        state.regions.insert(region.id.clone(), region.clone());
        debug!(id = %region.id, radius_m = region.radius_m, "region monitored");
    }

    fn stop_monitoring(&self, id: &str) {
        let mut state = self.state.lock();
        state.regions.remove(id);
        state.inside.remove(id);
        debug!(id, "region monitoring stopped");
    }

    fn is_inside(&self, id: &str) -> Option<bool> {
        let state = self.state.lock();
        let region = state.regions.get(id)?;
        let (lat, lon) = state.last?;
        Some(within(region, lat, lon))
    }

    fn observe(&self, latitude: f64, longitude: f64) {
        let mut state = self.state.lock();
        state.last = Some((latitude, longitude));

        let mut transitions = Vec::new();
        for (id, region) in &state.regions {
            let now = within(region, latitude, longitude);
            let was = state.inside.get(id).copied().unwrap_or(false);
            if now != was {
                transitions.push((id.clone(), now));
            }
        }
        for (id, now) in transitions {
            state.inside.insert(id.clone(), now);
            let kind = if now { RegionEventKind::Entered } else { RegionEventKind::Exited };
            debug!(id = %id, entered = now, "region transition");
            let _ = self.tx.send(RegionEvent { id, kind });
        }
    }
}
