//! Client-side prediction: forward extrapolation of the local player's
//! trail position between server snapshots.
//!
//! Snapshots arrive every ~100 ms while the client renders at 60 Hz. The
//! [`ClientPredictor`] fills the gap by extrapolating from the last
//! authoritative position using the velocity observed over a bounded
//! window of recent snapshots, blended with a nominal travel speed. The
//! horizon is capped so a stalled connection never lets the prediction run
//! away.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default number of samples kept in the smoothing window.
pub const DEFAULT_SMOOTHING_WINDOW: usize = 10;

/// Default exponential decay rate for visual correction offsets (per second).
pub const DEFAULT_CORRECTION_DECAY_RATE: f64 = 10.0;

// ---------------------------------------------------------------------------
// PredictionConfig
// ---------------------------------------------------------------------------

/// Per-client prediction and reconciliation tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Scale applied to the extrapolated velocity.
    pub speed_multiplier: f64,
    /// Largest drift trusted without counting a correction.
    pub tolerance: f64,
    /// Smallest blend factor applied to a correction. Must lie in (0, 1).
    pub blend_factor: f64,
    /// Largest blend factor applied to a correction. Must lie in
    /// `[blend_factor, 1)`.
    pub max_blend_factor: f64,
    /// Longest extrapolation horizon in seconds.
    pub max_prediction_time: f64,
    /// Number of samples kept in the smoothing window.
    pub smoothing_window: usize,
    /// Drift beyond which the smoothing window is discarded and reseeded.
    pub hard_desync_threshold: f64,
    /// Nominal travel speed in trail steps per second.
    pub nominal_speed: f64,
    /// Weight of the observed velocity against the nominal speed, `0..=1`.
    pub velocity_weight: f64,
    /// Decay rate of the visual correction offset, per second.
    pub correction_decay_rate: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            tolerance: 0.15,
            blend_factor: 0.2,
            max_blend_factor: 0.8,
            max_prediction_time: 0.5,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            hard_desync_threshold: 5.0,
            nominal_speed: 2.0,
            velocity_weight: 0.75,
            correction_decay_rate: DEFAULT_CORRECTION_DECAY_RATE,
        }
    }
}

/// A [`PredictionConfig`] that violates one of its invariants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictionConfigError {
    /// `blend_factor` is outside (0, 1).
    #[error("blend factor {0} must lie strictly between 0 and 1")]
    BlendFactor(f64),

    /// `max_blend_factor` is outside `[blend_factor, 1)`.
    #[error("maximum blend factor {max} must lie in [{min}, 1)")]
    MaxBlendFactor {
        /// Configured minimum blend factor.
        min: f64,
        /// Configured maximum blend factor.
        max: f64,
    },

    /// `tolerance` is negative or not finite.
    #[error("tolerance {0} must be finite and non-negative")]
    Tolerance(f64),

    /// `hard_desync_threshold` does not exceed `tolerance`.
    #[error("hard desync threshold {threshold} must exceed tolerance {tolerance}")]
    HardDesyncThreshold {
        /// Configured threshold.
        threshold: f64,
        /// Configured tolerance.
        tolerance: f64,
    },

    /// A rate or horizon is negative or not finite.
    #[error("{name} must be finite and non-negative, got {value}")]
    NonNegative {
        /// Field name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// `velocity_weight` is outside `0..=1`.
    #[error("velocity weight {0} must lie in [0, 1]")]
    VelocityWeight(f64),

    /// The smoothing window cannot yield a velocity.
    #[error("smoothing window must hold at least 2 samples, got {0}")]
    SmoothingWindow(usize),
}

impl PredictionConfig {
    /// Checks every invariant.
    pub fn validate(&self) -> Result<(), PredictionConfigError> {
        if !(self.blend_factor > 0.0 && self.blend_factor < 1.0) {
            return Err(PredictionConfigError::BlendFactor(self.blend_factor));
        }
        if !(self.max_blend_factor >= self.blend_factor && self.max_blend_factor < 1.0) {
            return Err(PredictionConfigError::MaxBlendFactor {
                min: self.blend_factor,
                max: self.max_blend_factor,
            });
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(PredictionConfigError::Tolerance(self.tolerance));
        }
        if !(self.hard_desync_threshold > self.tolerance) {
            return Err(PredictionConfigError::HardDesyncThreshold {
                threshold: self.hard_desync_threshold,
                tolerance: self.tolerance,
            });
        }
        for (name, value) in [
            ("speed multiplier", self.speed_multiplier),
            ("maximum prediction time", self.max_prediction_time),
            ("nominal speed", self.nominal_speed),
            ("correction decay rate", self.correction_decay_rate),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PredictionConfigError::NonNegative { name, value });
            }
        }
        if !(0.0..=1.0).contains(&self.velocity_weight) {
            return Err(PredictionConfigError::VelocityWeight(self.velocity_weight));
        }
        if self.smoothing_window < 2 {
            return Err(PredictionConfigError::SmoothingWindow(self.smoothing_window));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// Where a window sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSource {
    /// An authoritative position from a snapshot.
    Observed,
    /// A locally extrapolated position.
    Predicted,
}

/// One position at one point in time (seconds on the client's clock).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Client time in seconds.
    pub time: f64,
    /// Trail position.
    pub position: f64,
    /// Origin of the sample.
    pub source: SampleSource,
}

/// Bounded FIFO of samples.
#[derive(Debug, Clone)]
struct Window {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, sample: Sample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }
}

// ---------------------------------------------------------------------------
// ClientPredictor
// ---------------------------------------------------------------------------

/// Extrapolates the local player's position between snapshots.
#[derive(Debug, Clone)]
pub struct ClientPredictor {
    config: PredictionConfig,
    /// Authoritative samples, used for the velocity estimate.
    observed: Window,
    /// Every observed and predicted sample, used for jitter.
    recent: Window,
    upper_bound: Option<f64>,
}

impl ClientPredictor {
    /// Creates a predictor after validating `config`.
    pub fn new(config: PredictionConfig) -> Result<Self, PredictionConfigError> {
        config.validate()?;
        Ok(Self {
            observed: Window::new(config.smoothing_window),
            recent: Window::new(config.smoothing_window),
            config,
            upper_bound: None,
        })
    }

    /// The configuration in force.
    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// Caps predictions at `bound` (the trail length).
    pub fn set_upper_bound(&mut self, bound: f64) {
        self.upper_bound = Some(bound);
    }

    /// Records an authoritative position. Samples older than the newest
    /// observation are ignored.
    pub fn observe(&mut self, time: f64, position: f64) {
        if self
            .observed
            .samples
            .back()
            .is_some_and(|last| time < last.time)
        {
            tracing::trace!("Ignoring out-of-order observation at t={time}");
            return;
        }
        let sample = Sample {
            time,
            position,
            source: SampleSource::Observed,
        };
        self.observed.push(sample);
        self.recent.push(sample);
    }

    /// Discards every sample and starts over from one authoritative
    /// position.
    pub fn reseed(&mut self, time: f64, position: f64) {
        self.clear();
        self.observe(time, position);
    }

    /// Discards every sample.
    pub fn clear(&mut self) {
        self.observed.samples.clear();
        self.recent.samples.clear();
    }

    /// Average velocity across the observed window, in steps per second.
    /// Trail positions never decrease, so neither does this estimate.
    pub fn observed_velocity(&self) -> f64 {
        let (Some(first), Some(last)) = (self.observed.samples.front(), self.observed.samples.back())
        else {
            return 0.0;
        };
        let dt = last.time - first.time;
        if dt <= 0.0 {
            return 0.0;
        }
        ((last.position - first.position) / dt).max(0.0)
    }

    /// Velocity used for extrapolation. A player the window shows standing
    /// still is predicted to keep standing still.
    pub fn blended_velocity(&self) -> f64 {
        let observed = self.observed_velocity();
        if observed <= 0.0 {
            return 0.0;
        }
        let w = self.config.velocity_weight;
        (w * observed + (1.0 - w) * self.config.nominal_speed) * self.config.speed_multiplier
    }

    /// Extrapolates from `last_known` (received at `last_snapshot_time`)
    /// to `now`. The elapsed time is capped at `max_prediction_time`, and
    /// the result never falls behind `last_known` nor passes the upper
    /// bound.
    pub fn predict(&mut self, last_known: f64, last_snapshot_time: f64, now: f64) -> f64 {
        let elapsed = (now - last_snapshot_time).clamp(0.0, self.config.max_prediction_time);
        let mut position = last_known + self.blended_velocity() * elapsed;
        if let Some(bound) = self.upper_bound {
            position = position.min(bound.max(last_known));
        }
        self.recent.push(Sample {
            time: now,
            position,
            source: SampleSource::Predicted,
        });
        position
    }

    /// Mean absolute delta between consecutive window entries.
    pub fn jitter(&self) -> f64 {
        let samples = &self.recent.samples;
        if samples.len() < 2 {
            return 0.0;
        }
        let total: f64 = samples
            .iter()
            .zip(samples.iter().skip(1))
            .map(|(a, b)| (b.position - a.position).abs())
            .sum();
        total / (samples.len() - 1) as f64
    }

    /// Recent observed and predicted samples, oldest first.
    pub fn window(&self) -> impl Iterator<Item = &Sample> {
        self.recent.samples.iter()
    }

    /// Number of authoritative samples currently held.
    pub fn observed_len(&self) -> usize {
        self.observed.samples.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn predictor() -> ClientPredictor {
        ClientPredictor::new(PredictionConfig::default()).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(PredictionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let bad_blend = PredictionConfig {
            blend_factor: 1.0,
            ..Default::default()
        };
        assert_eq!(
            bad_blend.validate(),
            Err(PredictionConfigError::BlendFactor(1.0))
        );

        let bad_max = PredictionConfig {
            max_blend_factor: 0.1,
            ..Default::default()
        };
        assert!(matches!(
            bad_max.validate(),
            Err(PredictionConfigError::MaxBlendFactor { .. })
        ));

        let bad_threshold = PredictionConfig {
            hard_desync_threshold: 0.1,
            ..Default::default()
        };
        assert!(matches!(
            bad_threshold.validate(),
            Err(PredictionConfigError::HardDesyncThreshold { .. })
        ));

        let bad_horizon = PredictionConfig {
            max_prediction_time: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            bad_horizon.validate(),
            Err(PredictionConfigError::NonNegative { .. })
        ));

        let bad_window = PredictionConfig {
            smoothing_window: 1,
            ..Default::default()
        };
        assert!(ClientPredictor::new(bad_window).is_err());
    }

    #[test]
    fn test_stationary_player_is_not_extrapolated() {
        let mut p = predictor();
        p.observe(0.0, 5.0);
        p.observe(0.1, 5.0);
        assert_eq!(p.observed_velocity(), 0.0);
        assert_eq!(p.predict(5.0, 0.1, 0.3), 5.0);
    }

    #[test]
    fn test_moving_player_extrapolates_forward() {
        let mut p = predictor();
        for i in 0..5 {
            p.observe(i as f64, i as f64);
        }
        assert!((p.observed_velocity() - 1.0).abs() < 1e-9);

        // 0.75 * 1.0 + 0.25 * 2.0 = 1.25 steps/s
        let predicted = p.predict(4.0, 4.0, 4.2);
        assert!((predicted - 4.25).abs() < 1e-9);
    }

    #[test]
    fn test_horizon_is_capped() {
        let mut p = predictor();
        p.observe(0.0, 0.0);
        p.observe(1.0, 1.0);
        let near = p.predict(1.0, 1.0, 1.5);
        let stalled = p.predict(1.0, 1.0, 60.0);
        assert_eq!(near, stalled);
    }

    #[test]
    fn test_prediction_respects_upper_bound() {
        let mut p = predictor();
        p.set_upper_bound(100.0);
        p.observe(0.0, 90.0);
        p.observe(0.1, 99.9);
        assert_eq!(p.predict(99.9, 0.1, 0.6), 100.0);
    }

    #[test]
    fn test_prediction_never_falls_behind_last_known() {
        let mut p = predictor();
        p.observe(0.0, 3.0);
        assert_eq!(p.predict(3.0, 0.0, -1.0), 3.0);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut p = predictor();
        for i in 0..50 {
            p.observe(i as f64, i as f64);
            p.predict(i as f64, i as f64, i as f64 + 0.05);
        }
        assert_eq!(p.window().count(), DEFAULT_SMOOTHING_WINDOW);
        assert_eq!(p.observed_len(), DEFAULT_SMOOTHING_WINDOW);
    }

    #[test]
    fn test_jitter_is_mean_absolute_delta() {
        let mut p = predictor();
        p.observe(0.0, 1.0);
        p.observe(1.0, 3.0);
        p.observe(2.0, 4.0);
        assert!((p.jitter() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_order_observation_is_ignored() {
        let mut p = predictor();
        p.observe(2.0, 2.0);
        p.observe(1.0, 1.0);
        assert_eq!(p.observed_len(), 1);
    }

    #[test]
    fn test_reseed_discards_history() {
        let mut p = predictor();
        for i in 0..5 {
            p.observe(i as f64, i as f64);
        }
        p.reseed(10.0, 50.0);
        assert_eq!(p.observed_len(), 1);
        assert_eq!(p.observed_velocity(), 0.0);
        assert_eq!(p.window().next().unwrap().position, 50.0);
    }
}
