use std::collections::VecDeque;
use std::sync::Arc;

use model::{RaceResult, Route};
use race_ingest_core::{RegionEvent, RegionEventKind, RegionMonitor};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::zones::{ProximityZoneManager, ZoneEvent, ZoneId};
use crate::EngineConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaceState {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, thiserror::Error)]
pub enum RaceError {
    #[error("current position is outside the start zone")]
    NotInStartZone,
    #[error("a race is already in progress")]
    AlreadyInProgress,
    #[error("route needs at least two waypoints, got {0}")]
    RouteTooShort(usize),
}

/// Notifications drained by the session layer after each engine call.
#[derive(Clone, Debug, PartialEq)]
pub enum RaceEvent {
    /// A race began; the sensing pipeline must reset and switch the
    /// source to its race mode.
    Started,
    SegmentCompleted { index: usize, duration_s: f64 },
    RaceCompleted(RaceResult),
}

/// Plain copyable view of the live race state for display layers.
#[derive(Clone, Debug, PartialEq)]
pub struct RaceSnapshot {
    pub state: RaceState,
    pub elapsed_s: f64,
    pub distance_m: f64,
    pub remaining_m: f64,
    pub speed_mps: f64,
    pub cursor: usize,
    pub segments_s: Vec<f64>,
    pub in_start_zone: bool,
}

/// Receives one result per completed race; the implementation owns
/// attaching it to the route's history and storing it durably.
pub trait ResultSink: Send + Sync {
    fn record(&self, route_id: Uuid, result: &RaceResult) -> anyhow::Result<()>;
}

/// The race orchestrator: consumes zone-entry events and elapsed time,
/// advances the waypoint cursor, records segment splits and emits a final
/// result. All mutating calls must be externally serialized; each event
/// is processed to completion before the next.
#[derive(Debug)]
pub struct RaceEngine {
    route: Arc<Route>,
    zones: ProximityZoneManager,
    state: RaceState,
    /// Index of the next unreached waypoint.
    cursor: usize,
    ticking: bool,
    elapsed_s: f64,
    last_split_s: f64,
    segments_s: Vec<f64>,
    distance_m: f64,
    speed_mps: f64,
    planned_m: f64,
    remaining_m: f64,
    last_result: Option<RaceResult>,
    events: VecDeque<RaceEvent>,
}

impl RaceEngine {
    /// Builds an engine for `route` and arms the start zone so the
    /// precondition for `start` can be satisfied.
    pub fn new(
        route: Arc<Route>,
        monitor: Arc<dyn RegionMonitor>,
        config: &EngineConfig,
    ) -> Result<Self, RaceError> {
        if route.waypoint_count() < 2 {
            return Err(RaceError::RouteTooShort(route.waypoint_count()));
        }

        let planned_m = route.total_length_m();
        let zones = ProximityZoneManager::new(monitor, config.zone_radius_m);
        let mut engine = Self {
            route,
            zones,
            state: RaceState::NotStarted,
            cursor: 1,
            ticking: false,
            elapsed_s: 0.0,
            last_split_s: 0.0,
            segments_s: Vec::new(),
            distance_m: 0.0,
            speed_mps: 0.0,
            planned_m,
            remaining_m: planned_m,
            last_result: None,
            events: VecDeque::new(),
        };
        engine.arm_start();
        Ok(engine)
    }

    /// Arms (or re-arms) the start zone; needed again after a completed
    /// race before the route can be re-raced.
    pub fn arm_start(&mut self) {
        let center = self.route.coordinates[0];
        if let Some(event) = self.zones.arm(ZoneId::Start, center, None) {
            self.process_zone_event(event);
        }
    }

    /// Begins a race. Fails unless the current position is inside the
    /// start zone and no race is in progress; on failure nothing changes.
    pub fn start(&mut self) -> Result<(), RaceError> {
        if self.state == RaceState::InProgress {
            return Err(RaceError::AlreadyInProgress);
        }
        if !self.zones.is_inside_start() {
            return Err(RaceError::NotInStartZone);
        }

        info!(route = %self.route.name, "race started");
        self.state = RaceState::InProgress;
        self.ticking = true;
        self.elapsed_s = 0.0;
        self.last_split_s = 0.0;
        self.segments_s.clear();
        self.cursor = 1;
        self.distance_m = 0.0;
        self.speed_mps = 0.0;
        self.remaining_m = self.planned_m;
        self.events.push_back(RaceEvent::Started);

        self.zones.disarm(ZoneId::Start);
        self.arm_cursor_zone();
        Ok(())
    }

    fn arm_cursor_zone(&mut self) {
        if self.state != RaceState::InProgress {
            debug!("race not in progress, not arming next zone");
            return;
        }
        let count = self.route.waypoint_count();
        if self.cursor >= count {
            warn!(cursor = self.cursor, "no waypoint left to arm");
            return;
        }

        let zone = ZoneId::for_waypoint(self.cursor, count);
        let center = self.route.coordinates[self.cursor];
        if let Some(event) = self.zones.arm(zone, center, None) {
            self.process_zone_event(event);
        }
    }

    /// Entry point for events from the proximity-monitoring facility.
    pub fn on_region_event(&mut self, event: &RegionEvent) {
        let Some(zone_event) = self.zones.handle(event) else {
            return;
        };
        self.process_zone_event(zone_event);
    }

    fn process_zone_event(&mut self, event: ZoneEvent) {
        let entered = matches!(
            event.kind,
            RegionEventKind::Entered | RegionEventKind::Initial { inside: true }
        );
        if !entered {
            return;
        }
        if self.state != RaceState::InProgress {
            debug!(zone = %event.zone, "zone entry ignored, race not in progress");
            return;
        }

        // The entered zone is retired immediately, so at most one entry
        // per identifier can ever be in flight.
        self.zones.disarm(event.zone);

        let mut split = self.elapsed_s - self.last_split_s;
        if split < 0.0 {
            warn!(zone = %event.zone, split_s = split, "negative segment duration clamped to zero");
            split = 0.0;
        }
        self.segments_s.push(split);
        self.last_split_s = self.elapsed_s;
        let index = self.segments_s.len() - 1;
        debug!(zone = %event.zone, split_s = split, "segment recorded");
        self.events.push_back(RaceEvent::SegmentCompleted { index, duration_s: split });

        match event.zone {
            ZoneId::Finish => self.complete(),
            ZoneId::Checkpoint(entered_index) if entered_index == self.cursor => {
                self.cursor += 1;
                if self.cursor < self.route.waypoint_count() {
                    self.arm_cursor_zone();
                } else {
                    warn!(cursor = self.cursor, "cursor ran past the last waypoint, forcing completion");
                    self.complete();
                }
            }
            ZoneId::Checkpoint(entered_index) => {
                warn!(
                    entered = entered_index,
                    expected = self.cursor,
                    "out-of-sequence checkpoint entry ignored"
                );
            }
            ZoneId::Start => {
                debug!("start zone entry while racing ignored");
            }
        }
    }

    /// Finishes the race: captures the final distance, stops time accrual,
    /// retires all zones and emits the result. No-op unless in progress.
    pub fn complete(&mut self) {
        if self.state != RaceState::InProgress {
            debug!(state = ?self.state, "complete() ignored, race not in progress");
            return;
        }

        let total_distance = self.distance_m;
        self.state = RaceState::Completed;
        self.ticking = false;
        self.zones.disarm_all();

        let elapsed = self.elapsed_s;
        let average = if elapsed > 0.0 && total_distance > 0.0 {
            total_distance / elapsed
        } else {
            0.0
        };

        let result = RaceResult {
            id: Uuid::new_v4(),
            date: OffsetDateTime::now_utc(),
            total_duration_s: elapsed,
            segment_durations_s: self.segments_s.clone(),
            total_distance_m: total_distance,
            average_speed_mps: average,
        };
        info!(
            duration_s = elapsed,
            distance_m = total_distance,
            average_mps = average,
            segments = result.segment_durations_s.len(),
            "race completed"
        );
        self.last_result = Some(result.clone());
        self.events.push_back(RaceEvent::RaceCompleted(result));
    }

    /// Cancellation path: stops time accrual and retires all zones without
    /// touching segment or result data. Idempotent, callable in any state.
    pub fn cleanup(&mut self) {
        self.ticking = false;
        self.zones.disarm_all();
    }

    /// Periodic elapsed-time accrual; presentational granularity only.
    pub fn on_tick(&mut self, dt_s: f64) {
        if self.state == RaceState::InProgress && self.ticking {
            self.elapsed_s += dt_s;
        }
    }

    /// Live cumulative distance and speed from the sensing pipeline.
    pub fn on_distance(&mut self, cumulative_m: f64, speed_mps: f64) {
        self.distance_m = cumulative_m;
        self.speed_mps = speed_mps;
        if self.state == RaceState::InProgress {
            self.remaining_m = (self.planned_m - cumulative_m).max(0.0);
        }
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        RaceSnapshot {
            state: self.state,
            elapsed_s: self.elapsed_s,
            distance_m: self.distance_m,
            remaining_m: self.remaining_m,
            speed_mps: self.speed_mps,
            cursor: self.cursor,
            segments_s: self.segments_s.clone(),
            in_start_zone: self.zones.is_inside_start(),
        }
    }

    pub fn poll_event(&mut self) -> Option<RaceEvent> {
        self.events.pop_front()
    }

    pub fn state(&self) -> RaceState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn segments_s(&self) -> &[f64] {
        &self.segments_s
    }

    pub fn last_result(&self) -> Option<&RaceResult> {
        self.last_result.as_ref()
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn zones(&self) -> &ProximityZoneManager {
        &self.zones
    }
}
