use race_ingest_core::PositionFix;
use tracing::debug;

use crate::EngineConfig;

/// One-dimensional Kalman filter. `q` is process noise, `r` measurement
/// noise; the estimate seeds itself from the first measurement.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    q: f64,
    r: f64,
    p: f64,
    k: f64,
    x: Option<f64>,
}

impl KalmanFilter {
    pub fn new(q: f64, r: f64) -> Self {
        Self { q, r, p: 1.0, k: 1.0, x: None }
    }

    pub fn filter(&mut self, measurement: f64) -> f64 {
        let Some(x) = self.x.as_mut() else {
            self.x = Some(measurement);
            return measurement;
        };

        // prediction update
        self.p += self.q;

        // measurement update
        self.k = self.p / (self.p + self.r);
        *x += self.k * (measurement - *x);
        self.p *= 1.0 - self.k;

        *x
    }

    pub fn reset(&mut self) {
        self.p = 1.0;
        self.k = 1.0;
        self.x = None;
    }
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new(0.1, 5.0)
    }
}

/// A position fix that passed accuracy filtering. Speed is clamped to
/// non-negative; sources report negative speed to mean "invalid".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptedFix {
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy_m: f64,
    pub speed_mps: f64,
    pub t_s: f64,
}

/// Gate between raw fixes and the distance/speed pipeline. Fixes with
/// negative or too-coarse horizontal accuracy produce no output and leave
/// the pipeline untouched.
pub struct PositionFilter {
    accuracy_threshold_m: f64,
    smoother: Option<KalmanFilter>,
}

impl PositionFilter {
    pub fn new(accuracy_threshold_m: f64) -> Self {
        Self { accuracy_threshold_m, smoother: None }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            accuracy_threshold_m: config.accuracy_threshold_m,
            smoother: config.smooth_speed.then(KalmanFilter::default),
        }
    }

    pub fn accept(&mut self, fix: &PositionFix) -> Option<AcceptedFix> {
        if fix.horizontal_accuracy_m < 0.0 || fix.horizontal_accuracy_m >= self.accuracy_threshold_m {
            debug!(
                accuracy_m = fix.horizontal_accuracy_m,
                "fix rejected: poor accuracy"
            );
            return None;
        }

        let mut speed_mps = fix.speed_mps.max(0.0);
        if let Some(smoother) = self.smoother.as_mut() {
            speed_mps = smoother.filter(speed_mps);
        }

        Some(AcceptedFix {
            latitude: fix.latitude,
            longitude: fix.longitude,
            horizontal_accuracy_m: fix.horizontal_accuracy_m,
            speed_mps,
            t_s: fix.t_s,
        })
    }

    /// Clears smoother state; called when a tracking session starts.
    pub fn reset(&mut self) {
        if let Some(smoother) = self.smoother.as_mut() {
            smoother.reset();
        }
    }
}
