//! Triple-shake recognizer.
//!
//! A timestamp-driven state machine. It owns no clock and no thread: the
//! caller feeds samples in arrival order and gets `Some(TripleShake)` back when
//! the gesture completes.
//!
//! ## Algorithm
//!
//! ```text
//! g = |a| - G
//! g > threshold            -> candidate shake
//! t - last < slop          -> debounced
//! count == 0 or
//! t - first > window       -> window restarts at t
//! count += 1, last = t
//! count >= threshold_count -> TripleShake, count = 0
//! ```
//!
//! The window is anchored at the first shake, so a slow shake outside the
//! window starts a new count instead of completing the old one.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::storage::config::DetectionConfig;

/// Standard gravity in m/s². Sensors report gravity-included acceleration.
pub const GRAVITY_EARTH: f64 = 9.80665;

/// One 3-axis accelerometer reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Monotonic timestamp in milliseconds.
    pub t_ms: u64,
}

impl Sample {
    pub fn new(x: f32, y: f32, z: f32, t_ms: u64) -> Self {
        Self { x, y, z, t_ms }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Gravity-subtracted magnitude in m/s².
    pub fn linear_magnitude(&self) -> f64 {
        let (x, y, z) = (self.x as f64, self.y as f64, self.z as f64);
        (x * x + y * y + z * z).sqrt() - GRAVITY_EARTH
    }
}

/// Mutable window state. `first_shake_ms` is meaningful only while `count > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShakeWindow {
    pub first_shake_ms: u64,
    /// Absent until the first shake is ever counted.
    pub last_shake_ms: Option<u64>,
    pub count: u32,
}

/// A completed gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleShake {
    /// Timestamp of the shake that completed the gesture.
    pub at_ms: u64,
    /// Timestamp of the shake that opened the window.
    pub first_shake_ms: u64,
    pub shakes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecognizerStats {
    pub samples_seen: u64,
    pub rejected_samples: u64,
    pub shakes_counted: u64,
    pub shakes_debounced: u64,
    pub gestures: u64,
}

pub struct ShakeRecognizer {
    config: DetectionConfig,
    window: ShakeWindow,
    stats: RecognizerStats,
}

impl ShakeRecognizer {
    pub fn new(mut config: DetectionConfig) -> Self {
        config.threshold_count = config.threshold_count.max(1);
        Self {
            config,
            window: ShakeWindow::default(),
            stats: RecognizerStats::default(),
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn window(&self) -> &ShakeWindow {
        &self.window
    }

    pub fn stats(&self) -> RecognizerStats {
        self.stats
    }

    /// Feed one sample. Invalid samples are logged and skipped.
    pub fn process(&mut self, sample: &Sample) -> Option<TripleShake> {
        self.stats.samples_seen += 1;

        if !sample.is_finite() {
            self.stats.rejected_samples += 1;
            warn!(t_ms = sample.t_ms, "discarding non-finite accelerometer sample");
            return None;
        }

        if sample.linear_magnitude() <= self.config.shake_threshold {
            return None;
        }

        let t = sample.t_ms;
        if let Some(last) = self.window.last_shake_ms {
            if t < last {
                self.stats.rejected_samples += 1;
                warn!(t_ms = t, last_shake_ms = last, "discarding shake older than the last one");
                return None;
            }
            if t - last < self.config.slop_ms {
                self.stats.shakes_debounced += 1;
                return None;
            }
        }

        if self.window.count == 0 || t.saturating_sub(self.window.first_shake_ms) > self.config.window_ms {
            self.window.count = 0;
            self.window.first_shake_ms = t;
        }

        self.window.count += 1;
        self.window.last_shake_ms = Some(t);
        self.stats.shakes_counted += 1;
        debug!(
            count = self.window.count,
            of = self.config.threshold_count,
            t_ms = t,
            "shake counted"
        );

        if self.window.count >= self.config.threshold_count {
            let gesture = TripleShake {
                at_ms: t,
                first_shake_ms: self.window.first_shake_ms,
                shakes: self.window.count,
            };
            self.window.count = 0;
            self.stats.gestures += 1;
            info!(
                at_ms = t,
                span_ms = t.saturating_sub(gesture.first_shake_ms),
                "triple shake detected"
            );
            return Some(gesture);
        }

        None
    }

    /// Feed samples in order and collect every gesture.
    pub fn process_batch(&mut self, samples: &[Sample]) -> Vec<TripleShake> {
        samples.iter().filter_map(|s| self.process(s)).collect()
    }

    /// Forget the window and the stats.
    pub fn reset(&mut self) {
        self.window = ShakeWindow::default();
        self.stats = RecognizerStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sample along z with the given raw magnitude.
    fn hit(magnitude: f32, t_ms: u64) -> Sample {
        Sample::new(0.0, 0.0, magnitude, t_ms)
    }

    fn tight_slop() -> DetectionConfig {
        DetectionConfig {
            slop_ms: 100,
            ..DetectionConfig::default()
        }
    }

    #[test]
    fn resting_device_never_shakes() {
        let mut r = ShakeRecognizer::new(DetectionConfig::default());
        let samples: Vec<_> = (0..10).map(|i| hit(9.8, i * 100)).collect();
        assert!(r.process_batch(&samples).is_empty());
        assert_eq!(r.stats().shakes_counted, 0);
        assert_eq!(r.window().count, 0);
    }

    #[test]
    fn three_quick_shakes_emit_at_third() {
        let mut r = ShakeRecognizer::new(tight_slop());
        assert!(r.process(&hit(30.0, 0)).is_none());
        assert!(r.process(&hit(30.0, 100)).is_none());
        let g = r.process(&hit(30.0, 200)).expect("gesture at t=200");
        assert_eq!(g.at_ms, 200);
        assert_eq!(g.first_shake_ms, 0);
        assert_eq!(r.window().count, 0);
    }

    #[test]
    fn third_shake_outside_window_restarts_count() {
        let mut r = ShakeRecognizer::new(tight_slop());
        let out = r.process_batch(&[hit(30.0, 0), hit(30.0, 100), hit(30.0, 3500)]);
        assert!(out.is_empty());
        assert_eq!(r.window().first_shake_ms, 3500);
        assert_eq!(r.window().count, 1);
    }

    #[test]
    fn fourth_shake_opens_new_window() {
        let mut r = ShakeRecognizer::new(tight_slop());
        let out = r.process_batch(&[hit(30.0, 0), hit(30.0, 200), hit(30.0, 400), hit(30.0, 600)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].at_ms, 400);
        assert_eq!(r.window().count, 1);
        assert_eq!(r.window().first_shake_ms, 600);
    }

    #[test]
    fn default_slop_debounces_fast_repeats() {
        let mut r = ShakeRecognizer::new(DetectionConfig::default());
        let out = r.process_batch(&[hit(30.0, 0), hit(30.0, 100), hit(30.0, 200)]);
        assert!(out.is_empty());
        assert_eq!(r.window().count, 1);
        assert_eq!(r.stats().shakes_debounced, 2);
    }

    #[test]
    fn default_slop_accepts_spaced_shakes() {
        let mut r = ShakeRecognizer::new(DetectionConfig::default());
        let out = r.process_batch(&[hit(30.0, 0), hit(30.0, 600), hit(30.0, 1200)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].at_ms, 1200);
    }

    #[test]
    fn slop_boundary_is_inclusive() {
        let mut r = ShakeRecognizer::new(DetectionConfig::default());
        r.process(&hit(30.0, 1000));
        r.process(&hit(30.0, 1500));
        assert_eq!(r.window().count, 2);
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let mut r = ShakeRecognizer::new(DetectionConfig::default());
        let out = r.process_batch(&[hit(30.0, 0), hit(30.0, 1500), hit(30.0, 3000)]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn below_threshold_is_ignored() {
        let mut r = ShakeRecognizer::new(DetectionConfig::default());
        // 24 m/s² raw is about 14.2 m/s² after removing gravity.
        let out = r.process_batch(&[hit(24.0, 0), hit(24.0, 600), hit(24.0, 1200)]);
        assert!(out.is_empty());
    }

    #[test]
    fn stricter_threshold_rejects_moderate_shakes() {
        let config = DetectionConfig {
            shake_threshold: 2.7 * GRAVITY_EARTH,
            ..DetectionConfig::default()
        };
        let mut r = ShakeRecognizer::new(config);
        let out = r.process_batch(&[hit(30.0, 0), hit(30.0, 600), hit(30.0, 1200)]);
        assert!(out.is_empty());
        let out = r.process_batch(&[hit(40.0, 2000), hit(40.0, 2600), hit(40.0, 3200)]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn non_finite_samples_are_rejected() {
        let mut r = ShakeRecognizer::new(DetectionConfig::default());
        assert!(r.process(&Sample::new(f32::NAN, 0.0, 30.0, 0)).is_none());
        assert!(r.process(&Sample::new(0.0, f32::INFINITY, 0.0, 10)).is_none());
        assert_eq!(r.stats().rejected_samples, 2);
        assert_eq!(r.window().count, 0);
    }

    #[test]
    fn out_of_order_timestamp_is_rejected() {
        let mut r = ShakeRecognizer::new(DetectionConfig::default());
        r.process(&hit(30.0, 5000));
        assert!(r.process(&hit(30.0, 4000)).is_none());
        assert_eq!(r.window().count, 1);
        assert_eq!(r.stats().rejected_samples, 1);
        assert_eq!(r.stats().shakes_debounced, 0);
    }

    #[test]
    fn backwards_shakes_without_slop_never_complete() {
        let config = DetectionConfig {
            slop_ms: 0,
            ..DetectionConfig::default()
        };
        let mut r = ShakeRecognizer::new(config);
        let out = r.process_batch(&[hit(30.0, 5000), hit(30.0, 4000), hit(30.0, 3000)]);
        assert!(out.is_empty());
        assert_eq!(r.window().count, 1);
        assert_eq!(r.window().first_shake_ms, 5000);
        assert_eq!(r.stats().rejected_samples, 2);
    }

    #[test]
    fn zero_threshold_count_is_clamped() {
        let config = DetectionConfig {
            threshold_count: 0,
            ..DetectionConfig::default()
        };
        let mut r = ShakeRecognizer::new(config);
        assert!(r.process(&hit(30.0, 0)).is_some());
    }

    #[test]
    fn reset_clears_window() {
        let mut r = ShakeRecognizer::new(DetectionConfig::default());
        r.process(&hit(30.0, 0));
        r.reset();
        assert_eq!(*r.window(), ShakeWindow::default());
        assert_eq!(r.stats(), RecognizerStats::default());
    }
}
