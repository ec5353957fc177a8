//! Canonical game state: players, their event logs, weather, and the trail.
//!
//! Everything here is plain data. Mutation rules (who may change what, and
//! when) live in [`crate::authority`]; this module only guarantees the
//! per-field invariants: resources never go negative, vitals stay within
//! `0..=100`, and the event log never holds more than
//! [`EVENT_LOG_CAPACITY`] entries.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rand::Rng;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of events retained in a player's log.
pub const EVENT_LOG_CAPACITY: usize = 10;

/// Upper bound for health and wagon condition.
pub const MAX_VITAL: u32 = 100;

/// Default trail length in steps.
pub const DEFAULT_TRAIL_LENGTH: u32 = 100;

/// Food a new player starts with.
pub const STARTING_FOOD: u32 = 100;

/// Ammo a new player starts with.
pub const STARTING_AMMO: u32 = 20;

/// Money a new player starts with.
pub const STARTING_MONEY: u32 = 50;

/// Effect tag carried while a player is ill.
pub const EFFECT_ILLNESS: &str = "illness";

/// Effect tag carried while a wagon wheel is broken.
pub const EFFECT_BROKEN_WHEEL: &str = "broken_wheel";

// ---------------------------------------------------------------------------
// Arithmetic helpers
// ---------------------------------------------------------------------------

/// Applies a signed delta to an unsigned quantity, saturating at zero.
pub fn offset(value: u32, delta: i32) -> u32 {
    if delta >= 0 {
        value.saturating_add(delta.unsigned_abs())
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

/// Applies a signed delta to a vital, clamping into `0..=MAX_VITAL`.
pub fn offset_vital(value: u32, delta: i32) -> u32 {
    offset(value, delta).min(MAX_VITAL)
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

/// Trail-wide weather. Changes on a fixed timer, independent of actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    /// No passive effects.
    #[default]
    Clear,
    /// No passive effects.
    Rain,
    /// Damages wagons on every move.
    Storm,
    /// Spoils food on every move.
    Heat,
    /// No passive effects.
    Snow,
}

impl Weather {
    /// Every weather variant, in declaration order.
    pub const ALL: [Weather; 5] = [
        Weather::Clear,
        Weather::Rain,
        Weather::Storm,
        Weather::Heat,
        Weather::Snow,
    ];

    /// Uniform draw over [`Weather::ALL`].
    pub fn random(rng: &mut impl Rng) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }

    /// Lower-case display label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Rain => "rain",
            Self::Storm => "storm",
            Self::Heat => "heat",
            Self::Snow => "snow",
        }
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Signed deltas applied atomically to a player when an event choice is
/// resolved. Keys that a choice does not mention are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectBundle {
    /// Health delta (result clamped to `0..=100`).
    pub health: i32,
    /// Food delta (result clamped at 0).
    pub food: i32,
    /// Ammo delta (result clamped at 0).
    pub ammo: i32,
    /// Money delta (result clamped at 0).
    pub money: i32,
    /// Wagon condition delta (result clamped to `0..=100`).
    pub wagon_condition: i32,
    /// Days to advance the global day counter.
    pub day: i32,
}

impl EffectBundle {
    /// The empty bundle.
    pub const NONE: Self = Self {
        health: 0,
        food: 0,
        ammo: 0,
        money: 0,
        wagon_condition: 0,
        day: 0,
    };

    /// Returns `true` if every delta is zero.
    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Closed set of scripted event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A party member falls ill.
    Illness,
    /// The weather turns against the party.
    Weather,
    /// A trading post offers supplies.
    TradingPost,
    /// Hunting outcomes and windfalls.
    Hunting,
    /// The wagon is damaged.
    WagonDamage,
    /// The party reached a landmark.
    Landmark,
    /// Multi-step river crossing chain.
    RiverCrossing,
}

impl EventKind {
    /// Active-effect tag held by a player while an event of this kind is
    /// unresolved in their log.
    pub const fn effect_tag(self) -> Option<&'static str> {
        match self {
            Self::Illness => Some(EFFECT_ILLNESS),
            Self::WagonDamage => Some(EFFECT_BROKEN_WHEEL),
            _ => None,
        }
    }
}

/// Position of an event within a multi-step chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProgress {
    /// Steps already resolved before this one.
    pub progress: u32,
    /// Total number of steps in the chain.
    pub total_steps: u32,
}

impl ChainProgress {
    /// Progress after resolving the current step.
    pub fn advanced(self) -> Self {
        Self {
            progress: (self.progress + 1).min(self.total_steps),
            total_steps: self.total_steps,
        }
    }

    /// Returns `true` once every step has been resolved.
    pub fn is_complete(self) -> bool {
        self.progress >= self.total_steps
    }
}

/// A single event record in a player's log.
///
/// `timestamp` is unique per server process and identifies the event when a
/// client later picks one of its choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event type.
    pub kind: EventKind,
    /// Human-readable description.
    pub description: String,
    /// Choice identifier → human-readable choice text.
    pub choices: BTreeMap<String, String>,
    /// Choice identifier → effects applied when that choice is picked.
    pub effects: BTreeMap<String, EffectBundle>,
    /// Creation time in milliseconds; doubles as the event's identity.
    pub timestamp: u64,
    /// Chain position, for multi-step events.
    pub chain: Option<ChainProgress>,
}

impl Event {
    /// An informational event with no choices.
    pub fn notice(kind: EventKind, description: impl Into<String>, timestamp: u64) -> Self {
        Self {
            kind,
            description: description.into(),
            choices: BTreeMap::new(),
            effects: BTreeMap::new(),
            timestamp,
            chain: None,
        }
    }

    /// Adds a choice with its description and effects.
    pub fn with_choice(
        mut self,
        key: impl Into<String>,
        description: impl Into<String>,
        effects: EffectBundle,
    ) -> Self {
        let key = key.into();
        self.choices.insert(key.clone(), description.into());
        self.effects.insert(key, effects);
        self
    }

    /// Returns `true` if the player can resolve this event.
    pub fn has_choices(&self) -> bool {
        !self.effects.is_empty()
    }
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Fixed-capacity ring of the most recent events, oldest evicted first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Event>", into = "Vec<Event>")]
pub struct EventLog {
    entries: VecDeque<Event>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event, returning the evicted oldest entry if the log was
    /// full.
    pub fn push(&mut self, event: Event) -> Option<Event> {
        let evicted = if self.entries.len() >= EVENT_LOG_CAPACITY {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(event);
        evicted
    }

    /// Looks up an event by timestamp.
    pub fn find(&self, timestamp: u64) -> Option<&Event> {
        self.entries.iter().find(|e| e.timestamp == timestamp)
    }

    /// Removes and returns the event with the given timestamp.
    pub fn take(&mut self, timestamp: u64) -> Option<Event> {
        let index = self.entries.iter().position(|e| e.timestamp == timestamp)?;
        self.entries.remove(index)
    }

    /// Returns `true` if an unresolved event of `kind` is still logged.
    pub fn contains_kind(&self, kind: EventKind) -> bool {
        self.entries.iter().any(|e| e.kind == kind && e.has_choices())
    }

    /// Most recently appended event.
    pub fn latest(&self) -> Option<&Event> {
        self.entries.back()
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.entries.iter()
    }

    /// Number of logged events.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<Event>> for EventLog {
    fn from(mut events: Vec<Event>) -> Self {
        let excess = events.len().saturating_sub(EVENT_LOG_CAPACITY);
        events.drain(..excess);
        Self {
            entries: events.into(),
        }
    }
}

impl From<EventLog> for Vec<Event> {
    fn from(log: EventLog) -> Self {
        log.entries.into()
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One traveler on the trail. Keyed by `name` in [`GameState::players`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Unique player name.
    pub name: String,
    /// Steps travelled, never beyond the trail length.
    pub position: u32,
    /// Food in pounds.
    pub food: u32,
    /// Rounds of ammunition.
    pub ammo: u32,
    /// Money in dollars.
    pub money: u32,
    /// Party health, `0..=100`.
    pub health: u32,
    /// Wagon condition, `0..=100`.
    pub wagon_condition: u32,
    /// Server-tracked hunting skill level.
    pub hunting_skill: u32,
    /// Tags of ongoing conditions such as [`EFFECT_ILLNESS`].
    pub active_effects: BTreeSet<String>,
    /// Most recent events.
    pub event_log: EventLog,
}

impl Player {
    /// Creates a player with the starting loadout.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: 0,
            food: STARTING_FOOD,
            ammo: STARTING_AMMO,
            money: STARTING_MONEY,
            health: MAX_VITAL,
            wagon_condition: MAX_VITAL,
            hunting_skill: 0,
            active_effects: BTreeSet::new(),
            event_log: EventLog::new(),
        }
    }

    /// Eats `amount` food, stopping at zero.
    pub fn consume_food(&mut self, amount: u32) {
        self.food = self.food.saturating_sub(amount);
    }

    /// Adds food.
    pub fn add_food(&mut self, amount: u32) {
        self.food = self.food.saturating_add(amount);
    }

    /// Spends `amount` ammo, stopping at zero.
    pub fn use_ammo(&mut self, amount: u32) {
        self.ammo = self.ammo.saturating_sub(amount);
    }

    /// Spends money if the player can afford it. Returns `false` (and
    /// changes nothing) otherwise.
    pub fn spend_money(&mut self, amount: u32) -> bool {
        if self.money >= amount {
            self.money -= amount;
            true
        } else {
            false
        }
    }

    /// Adjusts health, clamped to `0..=100`.
    pub fn adjust_health(&mut self, delta: i32) {
        self.health = offset_vital(self.health, delta);
    }

    /// Adjusts wagon condition, clamped to `0..=100`.
    pub fn adjust_wagon(&mut self, delta: i32) {
        self.wagon_condition = offset_vital(self.wagon_condition, delta);
    }

    /// Applies every per-player delta in `effects`. The `day` delta is
    /// global and left to the caller.
    pub fn apply_effects(&mut self, effects: &EffectBundle) {
        self.adjust_health(effects.health);
        self.food = offset(self.food, effects.food);
        self.ammo = offset(self.ammo, effects.ammo);
        self.money = offset(self.money, effects.money);
        self.adjust_wagon(effects.wagon_condition);
    }

    /// Returns `true` if the player carries the effect tag.
    pub fn has_effect(&self, tag: &str) -> bool {
        self.active_effects.contains(tag)
    }
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// The single source of truth on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Players keyed by name.
    pub players: BTreeMap<String, Player>,
    /// Length of the trail in steps.
    pub trail_length: u32,
    /// Landmarks keyed by trail position.
    pub landmarks: BTreeMap<u32, String>,
    /// Current trail-wide weather.
    pub weather: Weather,
    /// Day counter, starting at 1.
    pub day: u32,
}

impl GameState {
    /// Creates an empty state for the given trail.
    pub fn new(trail_length: u32, landmarks: BTreeMap<u32, String>) -> Self {
        Self {
            players: BTreeMap::new(),
            trail_length,
            landmarks,
            weather: Weather::Clear,
            day: 1,
        }
    }

    /// Looks up a player by name.
    pub fn player(&self, name: &str) -> Option<&Player> {
        self.players.get(name)
    }

    /// Mutably looks up a player, creating it with the starting loadout if
    /// the name has not been seen before.
    pub fn player_or_insert(&mut self, name: &str) -> &mut Player {
        join(&mut self.players, name)
    }

    /// Advances (or rewinds) the day counter, never below day 1.
    pub fn advance_day(&mut self, days: i32) {
        self.day = offset(self.day, days).max(1);
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(DEFAULT_TRAIL_LENGTH, default_landmarks())
    }
}

/// Returns the named player, inserting a fresh one for an unseen name.
pub(crate) fn join<'a>(players: &'a mut BTreeMap<String, Player>, name: &str) -> &'a mut Player {
    players.entry(name.to_string()).or_insert_with(|| {
        tracing::info!("New player {name} joined the trail");
        Player::new(name)
    })
}

/// The stock landmark table for a [`DEFAULT_TRAIL_LENGTH`] trail.
pub fn default_landmarks() -> BTreeMap<u32, String> {
    [
        (10, "Kansas River"),
        (25, "Fort Kearney"),
        (40, "Chimney Rock"),
        (55, "Fort Laramie"),
        (70, "South Pass"),
        (85, "Fort Boise"),
        (100, "Willamette Valley"),
    ]
    .into_iter()
    .map(|(pos, name)| (pos, name.to_string()))
    .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
