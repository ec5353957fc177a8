//! Client reconnection with exponential backoff.
//!
//! [`ReconnectState`] computes increasing delays with jitter so a fleet of
//! clients dropped by the same server restart does not reconnect in
//! lockstep. [`reconnect_loop`] drives the attempts. Reconnecting under the
//! same player name resumes the same wagon on the server.

use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;

use crate::tcp_client::{ClientConfig, ClientError, GameClient};

/// Client reconnection behaviour.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first attempt. Default: 1 s.
    pub initial_delay: Duration,
    /// Multiplier applied after each failed attempt. Default: 2.0.
    pub backoff_multiplier: f64,
    /// Upper bound on any delay. Default: 30 s.
    pub max_delay: Duration,
    /// Attempts before giving up. Default: 20.
    pub max_attempts: u32,
    /// Jitter factor in [0, 1], applied as ±jitter. Default: 0.25.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 20,
            jitter: 0.25,
        }
    }
}

/// Attempt counter and backoff schedule.
pub struct ReconnectState {
    config: ReconnectConfig,
    attempts: u32,
    current_delay: Duration,
}

impl ReconnectState {
    /// Creates a fresh schedule.
    pub fn new(config: ReconnectConfig) -> Self {
        let initial = config.initial_delay;
        Self {
            config,
            attempts: 0,
            current_delay: initial,
        }
    }

    /// Advances the attempt counter and returns the delay to wait first, or
    /// `None` once the attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.config.max_attempts {
            return None;
        }
        let base = self.current_delay;
        self.attempts += 1;

        let jitter = self.config.jitter.clamp(0.0, 1.0);
        let jittered = if jitter > 0.0 {
            let factor = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
            base.mul_f64(factor)
        } else {
            base
        };

        self.current_delay = self
            .current_delay
            .mul_f64(self.config.backoff_multiplier.max(1.0))
            .min(self.config.max_delay);

        Some(jittered.min(self.config.max_delay))
    }

    /// Restarts the schedule after a successful reconnect.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current_delay = self.config.initial_delay;
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Reconnection failures.
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError {
    /// Every configured attempt failed.
    #[error("gave up after {attempts} reconnection attempts")]
    MaxAttemptsExhausted {
        /// Attempts made.
        attempts: u32,
        /// The last attempt's failure.
        last: Option<ClientError>,
    },
}

/// Reconnects to `addr` as `player`, backing off between attempts.
pub async fn reconnect_loop(
    addr: SocketAddr,
    player: &str,
    client: &ClientConfig,
    config: ReconnectConfig,
) -> Result<GameClient, ReconnectError> {
    let mut state = ReconnectState::new(config);
    let mut last = None;

    while let Some(delay) = state.next_delay() {
        tracing::info!("Reconnection attempt {} in {delay:?}", state.attempts());
        tokio::time::sleep(delay).await;

        match GameClient::connect(addr, player, client.clone()).await {
            Ok(connected) => {
                tracing::info!("Reconnected after {} attempts", state.attempts());
                return Ok(connected);
            }
            Err(e) => {
                tracing::warn!("Reconnection attempt {} failed: {e}", state.attempts());
                last = Some(e);
            }
        }
    }

    Err(ReconnectError::MaxAttemptsExhausted {
        attempts: state.attempts(),
        last,
    })
}
