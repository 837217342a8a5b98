//! Core sensing model and traits used by the race engine

use serde::{Deserialize, Serialize};

/// A raw position reading as delivered by a source, before any filtering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters; negative means invalid.
    pub horizontal_accuracy_m: f64,
    /// Instantaneous speed in m/s; negative means the source could not
    /// estimate it.
    pub speed_mps: f64,
    /// Seconds on the source's own clock.
    pub t_s: f64,
}

/// A circular region watched by a proximity-monitoring facility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionEventKind {
    Entered,
    Exited,
    /// State determined right after monitoring began, before any crossing.
    Initial { inside: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionEvent {
    pub id: String,
    pub kind: RegionEventKind,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{0}")]
    Msg(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type FixTx = crossbeam_channel::Sender<PositionFix>;
pub type FixRx = crossbeam_channel::Receiver<PositionFix>;
pub type RegionEventTx = crossbeam_channel::Sender<RegionEvent>;
pub type RegionEventRx = crossbeam_channel::Receiver<RegionEvent>;

/// Trait for any live position source
#[async_trait::async_trait]
pub trait PositionSource: Send + Sync {
    async fn run(&self, tx: FixTx) -> Result<(), IngestError>;
}

/// External proximity-monitoring facility. Region events are delivered
/// asynchronously on the channel the implementation was constructed with;
/// none of these calls block.
pub trait RegionMonitor: Send + Sync {
    fn monitor(&self, region: &Region);
    fn stop_monitoring(&self, id: &str);
    /// Whether the latest known position is inside the region, `None` when
    /// no position has been seen yet or the region is unknown.
    fn is_inside(&self, id: &str) -> Option<bool>;
    /// Raw fix feed for software implementations; platform-backed monitors
    /// ignore it.
    fn observe(&self, _latitude: f64, _longitude: f64) {}
}

pub fn fix_channel() -> (FixTx, FixRx) {
    crossbeam_channel::unbounded()
}

pub fn region_channel() -> (RegionEventTx, RegionEventRx) {
    crossbeam_channel::unbounded()
}
