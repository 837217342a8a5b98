use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use model::Coordinate;
use race_ingest_core::{Region, RegionEvent, RegionEventKind, RegionMonitor};
use tracing::{debug, warn};

pub const START_ZONE_ID: &str = "race_start";
pub const FINISH_ZONE_ID: &str = "race_finish";
const CHECKPOINT_PREFIX: &str = "checkpoint_";

/// Typed proximity-zone identifier. `Start` is used only before a race
/// begins, `Finish` is reserved for the last waypoint, every interior
/// waypoint uses `Checkpoint` with its positional index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ZoneId {
    Start,
    Checkpoint(usize),
    Finish,
}

impl ZoneId {
    /// Identifier for the waypoint at `index` in a route of `count` points.
    pub fn for_waypoint(index: usize, count: usize) -> ZoneId {
        if index + 1 == count {
            ZoneId::Finish
        } else {
            ZoneId::Checkpoint(index)
        }
    }

    pub fn parse(id: &str) -> Option<ZoneId> {
        match id {
            START_ZONE_ID => Some(ZoneId::Start),
            FINISH_ZONE_ID => Some(ZoneId::Finish),
            _ => id
                .strip_prefix(CHECKPOINT_PREFIX)
                .and_then(|rest| rest.parse().ok())
                .map(ZoneId::Checkpoint),
        }
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneId::Start => f.write_str(START_ZONE_ID),
            ZoneId::Checkpoint(index) => write!(f, "{CHECKPOINT_PREFIX}{index}"),
            ZoneId::Finish => f.write_str(FINISH_ZONE_ID),
        }
    }
}

/// A region event resolved to a typed zone identifier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoneEvent {
    pub zone: ZoneId,
    pub kind: RegionEventKind,
}

/// Bookkeeping wrapper over the external proximity-monitoring facility.
/// Owns the set of currently armed zones, tracks whether the user is
/// inside the start zone, and synthesizes an entry-equivalent event when
/// a zone is armed around a position we are already standing in.
pub struct ProximityZoneManager {
    monitor: Arc<dyn RegionMonitor>,
    default_radius_m: f64,
    active: HashSet<String>,
    in_start_zone: bool,
}

impl fmt::Debug for ProximityZoneManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProximityZoneManager")
            .field("default_radius_m", &self.default_radius_m)
            .field("active", &self.active)
            .field("in_start_zone", &self.in_start_zone)
            .finish_non_exhaustive()
    }
}

impl ProximityZoneManager {
    pub fn new(monitor: Arc<dyn RegionMonitor>, default_radius_m: f64) -> Self {
        Self {
            monitor,
            default_radius_m,
            active: HashSet::new(),
            in_start_zone: false,
        }
    }

    /// Arms a circular zone, replacing any previous zone with the same id.
    /// Returns a synthesized initial-state event when the latest known
    /// position is already inside the zone.
    pub fn arm(&mut self, zone: ZoneId, center: Coordinate, radius_m: Option<f64>) -> Option<ZoneEvent> {
        let id = zone.to_string();
        if self.active.remove(&id) {
            self.monitor.stop_monitoring(&id);
        }

        let radius_m = radius_m.unwrap_or(self.default_radius_m);
        let region = Region {
            id: id.clone(),
            latitude: center.latitude,
            longitude: center.longitude,
            radius_m,
        };
        self.monitor.monitor(&region);
        self.active.insert(id.clone());
        debug!(zone = %zone, radius_m, "zone armed");

        match self.monitor.is_inside(&id) {
            Some(true) => {
                if zone == ZoneId::Start {
                    self.in_start_zone = true;
                }
                debug!(zone = %zone, "already inside armed zone");
                Some(ZoneEvent {
                    zone,
                    kind: RegionEventKind::Initial { inside: true },
                })
            }
            _ => None,
        }
    }

    pub fn disarm(&mut self, zone: ZoneId) {
        let id = zone.to_string();
        if self.active.remove(&id) {
            self.monitor.stop_monitoring(&id);
            debug!(zone = %zone, "zone disarmed");
        }
        if zone == ZoneId::Start {
            self.in_start_zone = false;
        }
    }

    /// Clears every armed zone; safe to call when none are armed.
    pub fn disarm_all(&mut self) {
        for id in self.active.drain() {
            self.monitor.stop_monitoring(&id);
        }
        self.in_start_zone = false;
    }

    /// Resolves a raw region event to a typed zone event, maintaining the
    /// start-zone flag along the way. Events for identifiers we never
    /// issued are dropped.
    pub fn handle(&mut self, event: &RegionEvent) -> Option<ZoneEvent> {
        let Some(zone) = ZoneId::parse(&event.id) else {
            warn!(id = %event.id, "event for unknown region id dropped");
            return None;
        };

        if zone == ZoneId::Start {
            self.in_start_zone = match event.kind {
                RegionEventKind::Entered => true,
                RegionEventKind::Exited => false,
                RegionEventKind::Initial { inside } => inside,
            };
        }

        Some(ZoneEvent { zone, kind: event.kind })
    }

    pub fn is_inside_start(&self) -> bool {
        self.in_start_zone
    }

    pub fn is_armed(&self, zone: ZoneId) -> bool {
        self.active.contains(&zone.to_string())
    }

    pub fn armed_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMonitor {
        state: Mutex<RecordingState>,
    }

    #[derive(Default)]
    struct RecordingState {
        monitored: Vec<String>,
        stopped: Vec<String>,
        inside: HashSet<String>,
    }

    impl RecordingMonitor {
        fn place_inside(&self, id: &str) {
            self.state.lock().unwrap().inside.insert(id.to_string());
        }
    }

    impl RegionMonitor for RecordingMonitor {
        fn monitor(&self, region: &Region) {
            self.state.lock().unwrap().monitored.push(region.id.clone());
        }

        fn stop_monitoring(&self, id: &str) {
            self.state.lock().unwrap().stopped.push(id.to_string());
        }

        fn is_inside(&self, id: &str) -> Option<bool> {
            Some(self.state.lock().unwrap().inside.contains(id))
        }
    }

    fn manager() -> (Arc<RecordingMonitor>, ProximityZoneManager) {
        let monitor = Arc::new(RecordingMonitor::default());
        let mgr = ProximityZoneManager::new(monitor.clone(), 30.0);
        (monitor, mgr)
    }

    fn center() -> Coordinate {
        Coordinate::new(46.52, 6.63)
    }

    #[test]
    fn zone_id_round_trips() {
        for zone in [ZoneId::Start, ZoneId::Checkpoint(3), ZoneId::Finish] {
            assert_eq!(ZoneId::parse(&zone.to_string()), Some(zone));
        }
        assert_eq!(ZoneId::parse("checkpoint_x"), None);
        assert_eq!(ZoneId::parse("somewhere"), None);
    }

    #[test]
    fn finish_id_is_reserved_for_last_waypoint() {
        assert_eq!(ZoneId::for_waypoint(2, 3), ZoneId::Finish);
        assert_eq!(ZoneId::for_waypoint(1, 3), ZoneId::Checkpoint(1));
    }

    #[test]
    fn rearming_replaces_previous_zone() {
        let (monitor, mut mgr) = manager();
        mgr.arm(ZoneId::Checkpoint(1), center(), None);
        mgr.arm(ZoneId::Checkpoint(1), center(), None);

        assert_eq!(mgr.armed_count(), 1);
        let state = monitor.state.lock().unwrap();
        assert_eq!(state.monitored.len(), 2);
        assert_eq!(state.stopped, vec!["checkpoint_1".to_string()]);
    }

    #[test]
    fn arm_synthesizes_initial_event_when_already_inside() {
        let (monitor, mut mgr) = manager();
        monitor.place_inside("checkpoint_1");
        let event = mgr.arm(ZoneId::Checkpoint(1), center(), None);
        assert_eq!(
            event,
            Some(ZoneEvent {
                zone: ZoneId::Checkpoint(1),
                kind: RegionEventKind::Initial { inside: true },
            })
        );
    }

    #[test]
    fn disarm_all_twice_is_a_no_op() {
        let (monitor, mut mgr) = manager();
        mgr.arm(ZoneId::Start, center(), None);
        mgr.arm(ZoneId::Checkpoint(1), center(), None);

        mgr.disarm_all();
        assert_eq!(mgr.armed_count(), 0);
        assert_eq!(monitor.state.lock().unwrap().stopped.len(), 2);

        mgr.disarm_all();
        assert_eq!(mgr.armed_count(), 0);
        assert_eq!(monitor.state.lock().unwrap().stopped.len(), 2);
    }

    #[test]
    fn start_zone_flag_follows_events() {
        let (_, mut mgr) = manager();
        assert!(!mgr.is_inside_start());

        mgr.handle(&RegionEvent {
            id: START_ZONE_ID.into(),
            kind: RegionEventKind::Entered,
        });
        assert!(mgr.is_inside_start());

        mgr.handle(&RegionEvent {
            id: START_ZONE_ID.into(),
            kind: RegionEventKind::Exited,
        });
        assert!(!mgr.is_inside_start());
    }

    #[test]
    fn disarming_start_resets_flag() {
        let (monitor, mut mgr) = manager();
        monitor.place_inside(START_ZONE_ID);
        mgr.arm(ZoneId::Start, center(), None);
        assert!(mgr.is_inside_start());

        mgr.disarm(ZoneId::Start);
        assert!(!mgr.is_inside_start());
    }

    #[test]
    fn unknown_region_ids_are_dropped() {
        let (_, mut mgr) = manager();
        let event = RegionEvent {
            id: "not_a_zone".into(),
            kind: RegionEventKind::Entered,
        };
        assert_eq!(mgr.handle(&event), None);
    }
}
