use model::{haversine_distance_m, Coordinate};
use tracing::debug;

use crate::filter::AcceptedFix;

/// Outcome of feeding one accepted fix to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceDelta {
    /// First accepted fix of the session; nothing to measure from.
    First,
    /// Delta accepted into the cumulative total.
    Accumulated(f64),
    /// Delta at or below the noise floor; cumulative unchanged.
    Noise(f64),
    /// Implausible jump; cumulative unchanged.
    Glitch(f64),
}

/// Turns consecutive accepted fixes into a cumulative traveled distance.
/// Deltas outside the plausible window contribute nothing, but the
/// previous-fix pointer always advances so the next delta is measured
/// from a good point.
pub struct DistanceAccumulator {
    min_delta_m: f64,
    max_delta_m: f64,
    cumulative_m: f64,
    previous: Option<AcceptedFix>,
}

impl DistanceAccumulator {
    pub fn new(min_delta_m: f64, max_delta_m: f64) -> Self {
        Self {
            min_delta_m,
            max_delta_m,
            cumulative_m: 0.0,
            previous: None,
        }
    }

    pub fn update(&mut self, current: &AcceptedFix) -> DistanceDelta {
        let Some(previous) = self.previous.replace(*current) else {
            return DistanceDelta::First;
        };

        let delta = haversine_distance_m(
            &Coordinate::new(previous.latitude, previous.longitude),
            &Coordinate::new(current.latitude, current.longitude),
        );

        if delta > self.min_delta_m && delta < self.max_delta_m {
            self.cumulative_m += delta;
            DistanceDelta::Accumulated(delta)
        } else if delta >= self.max_delta_m {
            debug!(delta_m = delta, "implausible jump skipped");
            DistanceDelta::Glitch(delta)
        } else {
            DistanceDelta::Noise(delta)
        }
    }

    pub fn cumulative_m(&self) -> f64 {
        self.cumulative_m
    }

    /// Zeroes the total and forgets the previous fix; called exactly once
    /// at the start of a race session.
    pub fn reset(&mut self) {
        self.cumulative_m = 0.0;
        self.previous = None;
    }
}
