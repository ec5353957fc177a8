//! Per-client glue between prediction and reconciliation.
//!
//! [`ClientSession`] tracks the local player's last authoritative position,
//! produces a predicted position every render frame, and reconciles each
//! new snapshot against what it predicted. A blended correction is carried
//! as a visual offset that decays exponentially, so the rendered position
//! converges on the authoritative track instead of jumping to it.

use crate::prediction::{ClientPredictor, PredictionConfig, PredictionConfigError};
use crate::reconciliation::{ReconcileKind, Reconciliation, ReconciliationEngine};

/// Offsets smaller than this snap to zero.
const MIN_OFFSET: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Anchor {
    position: f64,
    time: f64,
}

/// Prediction and reconciliation state for the local player.
#[derive(Debug, Clone)]
pub struct ClientSession {
    player_name: String,
    predictor: ClientPredictor,
    reconciler: ReconciliationEngine,
    decay_rate: f64,
    anchor: Option<Anchor>,
    visual_offset: f64,
    last_frame: Option<f64>,
    displayed: Option<f64>,
}

impl ClientSession {
    /// Creates a session for `player_name`.
    pub fn new(
        player_name: impl Into<String>,
        config: PredictionConfig,
    ) -> Result<Self, PredictionConfigError> {
        let reconciler = ReconciliationEngine::new(&config);
        let decay_rate = config.correction_decay_rate;
        Ok(Self {
            player_name: player_name.into(),
            predictor: ClientPredictor::new(config)?,
            reconciler,
            decay_rate,
            anchor: None,
            visual_offset: 0.0,
            last_frame: None,
            displayed: None,
        })
    }

    /// Name of the local player.
    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    /// The underlying predictor.
    pub fn predictor(&self) -> &ClientPredictor {
        &self.predictor
    }

    /// The underlying reconciliation engine.
    pub fn reconciler(&self) -> &ReconciliationEngine {
        &self.reconciler
    }

    /// Latest position produced by [`frame`](Self::frame) or a snapshot.
    pub fn predicted_position(&self) -> Option<f64> {
        self.displayed
    }

    /// Handles the local player's authoritative position from a snapshot
    /// received at `time`. Returns `None` for the first snapshot, which
    /// seeds the session.
    pub fn on_authoritative(
        &mut self,
        position: f64,
        time: f64,
        trail_length: f64,
    ) -> Option<Reconciliation> {
        self.predictor.set_upper_bound(trail_length);

        let Some(anchor) = self.anchor else {
            self.predictor.reseed(time, position);
            self.anchor = Some(Anchor { position, time });
            self.visual_offset = 0.0;
            self.displayed = Some(position);
            return None;
        };

        let predicted =
            self.predictor.predict(anchor.position, anchor.time, time) + self.visual_offset;
        let reconciliation = self.reconciler.reconcile(predicted, position);

        if reconciliation.kind == ReconcileKind::HardDesync {
            self.predictor.reseed(time, position);
        } else {
            self.predictor.observe(time, position);
        }

        self.anchor = Some(Anchor { position, time });
        self.visual_offset = reconciliation.position - position;
        self.displayed = Some(reconciliation.position);
        Some(reconciliation)
    }

    /// Produces the position to render at `now`.
    pub fn frame(&mut self, now: f64) -> Option<f64> {
        let anchor = self.anchor?;

        if let Some(last) = self.last_frame {
            let dt = (now - last).max(0.0);
            self.visual_offset *= (-self.decay_rate * dt).exp();
            if self.visual_offset.abs() < MIN_OFFSET {
                self.visual_offset = 0.0;
            }
        }
        self.last_frame = Some(now);

        let position =
            (self.predictor.predict(anchor.position, anchor.time, now) + self.visual_offset).max(0.0);
        self.displayed = Some(position);
        Some(position)
    }

    /// Forgets all history, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.predictor.clear();
        self.anchor = None;
        self.visual_offset = 0.0;
        self.last_frame = None;
        self.displayed = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
