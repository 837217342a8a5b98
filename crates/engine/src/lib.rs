//! Race execution engine: position filtering, distance accumulation,
//! proximity-zone lifecycle and the waypoint-sequencing state machine.

pub mod distance;
pub mod filter;
pub mod race;
pub mod zones;

pub use distance::{DistanceAccumulator, DistanceDelta};
pub use filter::{AcceptedFix, KalmanFilter, PositionFilter};
pub use race::{RaceEngine, RaceError, RaceEvent, RaceSnapshot, RaceState, ResultSink};
pub use zones::{ProximityZoneManager, ZoneEvent, ZoneId};

/// Tunables for the engine and its sensing pipeline.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Fixes with horizontal accuracy at or above this are rejected.
    pub accuracy_threshold_m: f64,
    /// Distance deltas at or below this are treated as GPS noise.
    pub min_delta_m: f64,
    /// Distance deltas at or above this are treated as tracking glitches.
    pub max_delta_m: f64,
    /// Default proximity-zone radius.
    pub zone_radius_m: f64,
    /// Elapsed-time tick period.
    pub tick_interval_ms: u64,
    /// Smooth accepted speed with a Kalman filter.
    pub smooth_speed: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            accuracy_threshold_m: 65.0,
            min_delta_m: 0.2,
            max_delta_m: 200.0,
            zone_radius_m: 30.0,
            tick_interval_ms: 100,
            smooth_speed: false,
        }
    }
}
