//! The state-owning task.
//!
//! The [`AuthoritativeSimulator`] lives inside a single spawned task and is
//! reached only through a bounded [`mpsc`] queue. Actions, snapshot
//! requests and the weather/day timers are all serialized through that one
//! task, so no two mutations of the canonical state ever interleave and
//! actions apply in the order they were queued.

use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use trail_multiplayer::{ActionOutcome, ActionRejected, AuthoritativeSimulator};

use crate::messages::{Action, Snapshot};

/// Default capacity of the command queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Timer and queue settings for the simulation task.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// How often the weather is redrawn. Default: 30 s.
    pub weather_interval: Duration,
    /// How often the day counter advances. Default: 60 s.
    pub day_interval: Duration,
    /// Command queue capacity. Default: 1024.
    pub queue_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            weather_interval: Duration::from_secs(30),
            day_interval: Duration::from_secs(60),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// The simulation task has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("simulation task is not running")]
pub struct SimulationClosed;

enum SimCommand {
    Apply {
        action: Action,
        reply: oneshot::Sender<Result<ActionOutcome, ActionRejected>>,
    },
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
}

/// Cloneable handle to the simulation task.
#[derive(Debug, Clone)]
pub struct SimulationHandle {
    tx: mpsc::Sender<SimCommand>,
}

impl SimulationHandle {
    /// Moves `simulator` into a new task and returns a handle to it. The
    /// task exits once `shutdown` turns `true` or every handle is dropped.
    pub fn spawn<R>(
        simulator: AuthoritativeSimulator<R>,
        config: SimulationConfig,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>)
    where
        R: Rng + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let task = tokio::spawn(run(simulator, config, rx, shutdown));
        (Self { tx }, task)
    }

    /// Queues `action` and waits for its outcome.
    pub async fn apply(
        &self,
        action: Action,
    ) -> Result<Result<ActionOutcome, ActionRejected>, SimulationClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SimCommand::Apply { action, reply })
            .await
            .map_err(|_| SimulationClosed)?;
        rx.await.map_err(|_| SimulationClosed)
    }

    /// Copies the canonical state, consistent with every action queued
    /// before this call.
    pub async fn snapshot(&self) -> Result<Snapshot, SimulationClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SimCommand::Snapshot { reply })
            .await
            .map_err(|_| SimulationClosed)?;
        rx.await.map_err(|_| SimulationClosed)
    }
}

async fn run<R: Rng>(
    mut simulator: AuthoritativeSimulator<R>,
    config: SimulationConfig,
    mut rx: mpsc::Receiver<SimCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    // A zero period would make `interval` panic.
    let weather_period = config.weather_interval.max(Duration::from_millis(1));
    let day_period = config.day_interval.max(Duration::from_millis(1));
    let mut weather = interval_at(Instant::now() + weather_period, weather_period);
    let mut day = interval_at(Instant::now() + day_period, day_period);
    weather.set_missed_tick_behavior(MissedTickBehavior::Skip);
    day.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!("Simulation task started");
    loop {
        tokio::select! {
            command = rx.recv() => {
                let Some(command) = command else { break };
                handle(&mut simulator, command);
            }
            _ = weather.tick() => {
                simulator.tick_weather();
            }
            _ = day.tick() => {
                let today = simulator.advance_day();
                tracing::debug!("Day {today} begins");
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!("Simulation task stopped");
}

fn handle<R: Rng>(simulator: &mut AuthoritativeSimulator<R>, command: SimCommand) {
    match command {
        SimCommand::Apply { action, reply } => {
            let result =
                simulator.apply_action(&action.player, &action.command, action.skills.as_ref());
            match &result {
                Ok(outcome) => tracing::trace!("{} -> {outcome:?}", action.player),
                Err(rejected) => tracing::debug!(
                    "Rejected {} from {}: {rejected}",
                    action.command.action_name(),
                    action.player
                ),
            }
            // The requester may have gone away; the action still applied.
            let _ = reply.send(result);
        }
        SimCommand::Snapshot { reply } => {
            let _ = reply.send(Snapshot::from(simulator.state()));
        }
    }
}
