use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Mean earth radius in meters, used for great-circle distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn distance_m(&self, other: &Coordinate) -> f64 {
        haversine_distance_m(self, other)
    }
}

/// Great-circle distance between two coordinates in meters.
pub fn haversine_distance_m(a: &Coordinate, b: &Coordinate) -> f64 {
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum WaypointRole {
    Start,
    Checkpoint,
    End,
}

/// A single point of a route, addressed by its position in the coordinate
/// sequence. The first point is the start, the last is the end, everything
/// in between is a checkpoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Waypoint {
    pub index: usize,
    pub role: WaypointRole,
    pub coordinate: Coordinate,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct RaceResult {
    #[serde(with = "uuid::serde::simple")]
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub total_duration_s: f64,
    pub segment_durations_s: Vec<f64>,
    pub total_distance_m: f64,
    pub average_speed_mps: f64,
}

/// A recorded route: an ordered coordinate sequence plus the results of
/// every race run against it. Treated as read-only while a race is in
/// progress.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Route {
    #[serde(with = "uuid::serde::simple")]
    pub id: Uuid,
    pub name: String,
    pub coordinates: Vec<Coordinate>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub race_history: Vec<RaceResult>,
}

impl Route {
    pub fn new(name: impl Into<String>, coordinates: Vec<Coordinate>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            coordinates,
            created_at: OffsetDateTime::now_utc(),
            race_history: Vec::new(),
        }
    }

    pub fn waypoint_count(&self) -> usize {
        self.coordinates.len()
    }

    pub fn waypoint(&self, index: usize) -> Option<Waypoint> {
        let coordinate = *self.coordinates.get(index)?;
        let role = if index == 0 {
            WaypointRole::Start
        } else if index + 1 == self.coordinates.len() {
            WaypointRole::End
        } else {
            WaypointRole::Checkpoint
        };
        Some(Waypoint { index, role, coordinate })
    }

    pub fn waypoints(&self) -> Vec<Waypoint> {
        (0..self.coordinates.len())
            .filter_map(|i| self.waypoint(i))
            .collect()
    }

    pub fn start_coordinate(&self) -> Option<Coordinate> {
        self.coordinates.first().copied()
    }

    pub fn end_coordinate(&self) -> Option<Coordinate> {
        self.coordinates.last().copied()
    }

    /// Planned route length: the sum of the great-circle legs between
    /// consecutive waypoints.
    pub fn total_length_m(&self) -> f64 {
        self.coordinates
            .windows(2)
            .map(|pair| haversine_distance_m(&pair[0], &pair[1]))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_route() -> Route {
        Route::new(
            "riverside loop",
            vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(0.0, 0.01),
                Coordinate::new(0.0, 0.02),
            ],
        )
    }

    #[test]
    fn haversine_one_degree_at_equator() {
        let d = haversine_distance_m(&Coordinate::new(0.0, 0.0), &Coordinate::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 200.0);
    }

    #[test]
    fn waypoint_roles_follow_position() {
        let route = test_route();
        assert_eq!(route.waypoint(0).unwrap().role, WaypointRole::Start);
        assert_eq!(route.waypoint(1).unwrap().role, WaypointRole::Checkpoint);
        assert_eq!(route.waypoint(2).unwrap().role, WaypointRole::End);
        assert!(route.waypoint(3).is_none());
    }

    #[test]
    fn total_length_sums_legs() {
        let route = test_route();
        let leg = haversine_distance_m(&route.coordinates[0], &route.coordinates[1]);
        let total = route.total_length_m();
        assert!((total - 2.0 * leg).abs() < 1e-6);
    }

    #[test]
    fn route_round_trips_through_json() {
        let mut route = test_route();
        route.race_history.push(RaceResult {
            id: Uuid::new_v4(),
            date: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
            total_duration_s: 30.0,
            segment_durations_s: vec![12.3, 17.7],
            total_distance_m: 2224.0,
            average_speed_mps: 74.1,
        });

        let json = serde_json::to_string(&route).unwrap();
        let back: Route = serde_json::from_str(&json).unwrap();
        assert_eq!(back, route);
    }
}
