//! Trail game rules and state sync: the canonical game state, the scripted
//! event engine, the server-authoritative simulator, and client-side
//! prediction and reconciliation.

pub mod authority;
pub mod events;
pub mod prediction;
pub mod reconciliation;
pub mod session;
pub mod state;

pub use authority::{
    ActionOutcome, ActionRejected, AuthoritativeSimulator, PlayerCommand, SimulationRules,
};
pub use events::{EventClock, EventEngine, Resolution};
pub use prediction::{ClientPredictor, PredictionConfig, PredictionConfigError};
pub use reconciliation::{ReconcileKind, Reconciliation, ReconciliationEngine};
pub use session::ClientSession;
pub use state::{
    ChainProgress, EffectBundle, Event, EventKind, EventLog, GameState, Player, Weather,
    default_landmarks,
};
