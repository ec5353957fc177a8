//! The boundary a front end drives.
//!
//! [`TrailClient`] is all a renderer or input layer needs: submit an action,
//! read the latest snapshot, and read where the local wagon should be drawn
//! this frame. The caller owns frame timing and passes its clock to
//! [`TrailClient::tick`] in seconds.

use std::sync::Arc;

use tokio::sync::watch;
use trail_multiplayer::{
    ClientSession, PlayerCommand, PredictionConfig, PredictionConfigError, ReconcileKind,
    Reconciliation,
};

use crate::messages::Snapshot;
use crate::tcp_client::{ClientError, GameClient};

/// Prediction health, for status displays and logs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyncStats {
    /// Snapshots that moved the drawn position (blended or hard).
    pub corrections: u64,
    /// Snapshots that were too far off to blend.
    pub hard_resets: u64,
    /// Mean step between recent position samples.
    pub jitter: f64,
}

/// A connected client plus prediction for its own player.
pub struct TrailClient {
    client: GameClient,
    session: ClientSession,
    snapshots: watch::Receiver<Option<Arc<Snapshot>>>,
    last_reconciliation: Option<Reconciliation>,
}

impl TrailClient {
    /// Wraps a connected client.
    pub fn new(client: GameClient, prediction: PredictionConfig) -> Result<Self, PredictionConfigError> {
        let session = ClientSession::new(client.player_name(), prediction)?;
        let snapshots = client.subscribe_snapshots();
        Ok(Self {
            client,
            session,
            snapshots,
            last_reconciliation: None,
        })
    }

    /// The underlying connection.
    pub fn client(&self) -> &GameClient {
        &self.client
    }

    /// Swaps in a fresh connection after a reconnect. Prediction history
    /// from the old connection is discarded.
    pub fn replace_client(&mut self, client: GameClient) {
        self.snapshots = client.subscribe_snapshots();
        self.client = client;
        self.session.reset();
        self.last_reconciliation = None;
    }

    /// Submits an action by its wire name (`"move"`, `"hunt"`, ...).
    pub async fn submit(&self, action: &str) -> Result<(), ClientError> {
        let command = PlayerCommand::from_action_name(action)
            .ok_or_else(|| ClientError::UnknownAction(action.to_string()))?;
        self.client.submit(command).await
    }

    /// Answers the event stamped `event_time` with `choice`.
    pub async fn choose(&self, event_time: u64, choice: impl Into<String>) -> Result<(), ClientError> {
        self.client
            .submit(PlayerCommand::EventChoice {
                event_time,
                choice: choice.into(),
            })
            .await
    }

    /// The newest snapshot received.
    pub fn latest_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.client.latest_snapshot()
    }

    /// The position produced by the last [`tick`](Self::tick).
    pub fn predicted_position(&self) -> Option<f64> {
        self.session.predicted_position()
    }

    /// The outcome of the last snapshot reconciliation.
    pub fn last_reconciliation(&self) -> Option<&Reconciliation> {
        self.last_reconciliation.as_ref()
    }

    /// Correction counters and jitter of the local prediction.
    pub fn sync_stats(&self) -> SyncStats {
        SyncStats {
            corrections: self.session.reconciler().corrections(),
            hard_resets: self.session.reconciler().hard_resets(),
            jitter: self.session.predictor().jitter(),
        }
    }

    /// Runs one render frame at `now` seconds: folds in a newly arrived
    /// snapshot, if any, then returns the position to draw. `None` until a
    /// snapshot containing this player has arrived.
    pub fn tick(&mut self, now: f64) -> Option<f64> {
        if self.snapshots.has_changed().unwrap_or(false) {
            let latest = self.snapshots.borrow_and_update().clone();
            if let Some(snapshot) = latest {
                self.on_snapshot(&snapshot, now);
            }
        }
        self.session.frame(now)
    }

    fn on_snapshot(&mut self, snapshot: &Snapshot, now: f64) {
        let Some(me) = snapshot.player(self.session.player_name()) else {
            return;
        };
        let reconciliation = self.session.on_authoritative(
            f64::from(me.position),
            now,
            f64::from(snapshot.trail_length),
        );
        if let Some(r) = &reconciliation {
            tracing::trace!("Reconciled {} -> {:?}", me.name, r);
            if r.kind != ReconcileKind::Trusted {
                let stats = self.sync_stats();
                tracing::debug!(
                    "Corrected {} (error {:.3}); {} corrections, {} hard resets, jitter {:.3}",
                    me.name,
                    r.error,
                    stats.corrections,
                    stats.hard_resets,
                    stats.jitter
                );
            }
        }
        if reconciliation.is_some() {
            self.last_reconciliation = reconciliation;
        }
    }
}
