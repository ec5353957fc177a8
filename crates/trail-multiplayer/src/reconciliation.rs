//! Reconciliation: pulls a predicted position toward the authoritative one
//! carried by a fresh snapshot.
//!
//! Two thresholds shape the correction. Drift within `tolerance` is
//! expected and the authoritative value is taken as-is. Larger drift is
//! blended by a factor that grows with the error, so small corrections are
//! gentle and large ones converge quickly without a visible teleport. Drift
//! beyond `hard_desync_threshold` is flagged so the caller can discard its
//! smoothing window.

use crate::prediction::PredictionConfig;

// ---------------------------------------------------------------------------
// Reconciliation result
// ---------------------------------------------------------------------------

/// How a snapshot was reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileKind {
    /// Drift within tolerance; the authoritative value was trusted.
    Trusted,
    /// Drift beyond tolerance; the prediction was blended toward the
    /// authoritative value.
    Blended,
    /// Drift beyond the hard-desync threshold; blended, and the prediction
    /// window must be reseeded.
    HardDesync,
}

/// Outcome of [`ReconciliationEngine::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciliation {
    /// Corrected position.
    pub position: f64,
    /// Absolute drift between prediction and authority.
    pub error: f64,
    /// Blend factor applied (1.0 when trusted outright).
    pub factor: f64,
    /// Which branch was taken.
    pub kind: ReconcileKind,
}

// ---------------------------------------------------------------------------
// ReconciliationEngine
// ---------------------------------------------------------------------------

/// Blends predictions toward authority and counts corrections.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    tolerance: f64,
    blend_factor: f64,
    max_blend_factor: f64,
    hard_desync_threshold: f64,
    corrections: u64,
    hard_resets: u64,
}

impl ReconciliationEngine {
    /// Creates an engine from the client's prediction settings.
    pub fn new(config: &PredictionConfig) -> Self {
        Self {
            tolerance: config.tolerance,
            blend_factor: config.blend_factor,
            max_blend_factor: config.max_blend_factor,
            hard_desync_threshold: config.hard_desync_threshold,
            corrections: 0,
            hard_resets: 0,
        }
    }

    /// Number of corrections applied so far (blended or hard desync).
    pub fn corrections(&self) -> u64 {
        self.corrections
    }

    /// Number of hard desyncs seen so far.
    pub fn hard_resets(&self) -> u64 {
        self.hard_resets
    }

    /// Blend factor for a given drift: proportional to `error / tolerance`,
    /// clamped to `[blend_factor, max_blend_factor]`.
    pub fn blend_factor_for(&self, error: f64) -> f64 {
        let scaled = if self.tolerance > 0.0 {
            self.blend_factor * error / self.tolerance
        } else {
            self.max_blend_factor
        };
        scaled.clamp(self.blend_factor, self.max_blend_factor)
    }

    /// Reconciles `predicted` against `authoritative`.
    pub fn reconcile(&mut self, predicted: f64, authoritative: f64) -> Reconciliation {
        let error = (predicted - authoritative).abs();

        if !error.is_finite() {
            tracing::warn!("Non-finite prediction {predicted}, adopting authoritative {authoritative}");
            self.hard_resets += 1;
            return Reconciliation {
                position: authoritative,
                error,
                factor: 1.0,
                kind: ReconcileKind::HardDesync,
            };
        }

        if error <= self.tolerance {
            return Reconciliation {
                position: authoritative,
                error,
                factor: 1.0,
                kind: ReconcileKind::Trusted,
            };
        }

        let factor = self.blend_factor_for(error);
        let position = predicted + (authoritative - predicted) * factor;
        self.corrections += 1;

        let kind = if error > self.hard_desync_threshold {
            self.hard_resets += 1;
            tracing::debug!("Hard desync: predicted {predicted:.3}, authoritative {authoritative:.3}");
            ReconcileKind::HardDesync
        } else {
            tracing::trace!("Correction of {error:.3} blended with factor {factor:.3}");
            ReconcileKind::Blended
        };

        Reconciliation {
            position,
            error,
            factor,
            kind,
        }
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new(&PredictionConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
