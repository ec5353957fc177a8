//! Scripted trail events: generation, chains, and choice resolution.
//!
//! [`EventEngine`] draws random events for a player, materializes them from
//! a fixed catalogue, appends them to the player's bounded log, and resolves
//! the player's later choice into an [`EffectBundle`]. Resolving a choice
//! removes the event from the log, so a second resolution of the same event
//! is rejected as unknown.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::authority::ActionRejected;
use crate::state::{ChainProgress, EffectBundle, Event, EventKind, Player, Weather};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default probability of a random event after a move.
pub const DEFAULT_EVENT_PROBABILITY: f64 = 0.2;

/// Default probability of a windfall after a successful hunt.
pub const DEFAULT_WINDFALL_PROBABILITY: f64 = 0.1;

/// Number of steps in the river crossing chain.
pub const RIVER_CROSSING_STEPS: u32 = 3;

/// Event types that can be drawn after a move.
const TRAVEL_EVENTS: [EventKind; 5] = [
    EventKind::Illness,
    EventKind::Weather,
    EventKind::TradingPost,
    EventKind::WagonDamage,
    EventKind::RiverCrossing,
];

// ---------------------------------------------------------------------------
// EventClock
// ---------------------------------------------------------------------------

/// Issues strictly increasing millisecond timestamps.
///
/// Wall-clock based, but never repeats a value: two events created within
/// the same millisecond still get distinct identities.
#[derive(Debug, Default)]
pub struct EventClock {
    last: u64,
}

impl EventClock {
    /// Creates a clock that has issued nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next unique timestamp.
    pub fn next(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last = now.max(self.last + 1);
        self.last
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Result of resolving an event choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Effects applied to the player. The `day` delta is still pending and
    /// must be applied to the global day counter by the caller.
    pub effects: EffectBundle,
    /// Timestamp of the next chain step, if the chain continues.
    pub next_step: Option<u64>,
}

// ---------------------------------------------------------------------------
// EventEngine
// ---------------------------------------------------------------------------

/// Generates, tracks and resolves scripted events attached to players.
#[derive(Debug)]
pub struct EventEngine {
    clock: EventClock,
    event_probability: f64,
    windfall_probability: f64,
}

impl Default for EventEngine {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_PROBABILITY, DEFAULT_WINDFALL_PROBABILITY)
    }
}

impl EventEngine {
    /// Creates an engine with the given draw probabilities (clamped to
    /// `0.0..=1.0`).
    pub fn new(event_probability: f64, windfall_probability: f64) -> Self {
        Self {
            clock: EventClock::new(),
            event_probability: event_probability.clamp(0.0, 1.0),
            windfall_probability: windfall_probability.clamp(0.0, 1.0),
        }
    }

    /// With the travel-event probability, draws an event type, materializes
    /// it and appends it to the player's log. Returns its timestamp.
    pub fn maybe_generate_event(
        &mut self,
        player: &mut Player,
        weather: Weather,
        rng: &mut impl Rng,
    ) -> Option<u64> {
        if !rng.random_bool(self.event_probability) {
            return None;
        }
        let kind = TRAVEL_EVENTS[rng.random_range(0..TRAVEL_EVENTS.len())];
        Some(self.generate(kind, player, weather))
    }

    /// With the windfall probability, offers the player extra game after a
    /// successful hunt.
    pub fn maybe_windfall(&mut self, player: &mut Player, rng: &mut impl Rng) -> Option<u64> {
        if !rng.random_bool(self.windfall_probability) {
            return None;
        }
        Some(self.generate(EventKind::Hunting, player, Weather::Clear))
    }

    /// Materializes an event of `kind` from the catalogue and appends it.
    /// River crossings start at the first step of their chain.
    pub fn generate(&mut self, kind: EventKind, player: &mut Player, weather: Weather) -> u64 {
        let timestamp = self.clock.next();
        let event = catalogue_event(kind, weather, timestamp);
        tracing::debug!("Event {kind:?} for {}: {}", player.name, event.description);
        Self::append(player, event);
        timestamp
    }

    /// Appends an informational (choice-less) event to the log.
    pub fn record(
        &mut self,
        player: &mut Player,
        kind: EventKind,
        description: impl Into<String>,
    ) -> u64 {
        let timestamp = self.clock.next();
        Self::append(player, Event::notice(kind, description, timestamp));
        timestamp
    }

    /// Resolves `choice` on the event identified by `event_time`.
    ///
    /// On success the event is removed from the log, the per-player effects
    /// are applied, and a chained event spawns its next step. Unknown events
    /// and choices are rejected without touching the player; so is a choice
    /// that costs more money than the player holds (the event stays open).
    pub fn resolve(
        &mut self,
        player: &mut Player,
        event_time: u64,
        choice: &str,
    ) -> Result<Resolution, ActionRejected> {
        let unknown = || ActionRejected::UnknownEventOrChoice {
            event_time,
            choice: choice.to_string(),
        };

        let event = player.event_log.find(event_time).ok_or_else(unknown)?;
        let effects = *event.effects.get(choice).ok_or_else(unknown)?;

        if effects.money < 0 && player.money < effects.money.unsigned_abs() {
            return Err(ActionRejected::InsufficientFunds {
                needed: effects.money.unsigned_abs(),
                available: player.money,
            });
        }

        let event = player.event_log.take(event_time).ok_or_else(unknown)?;
        player.apply_effects(&effects);
        Self::release_tag(player, event.kind);

        let next_step = match event.chain.map(ChainProgress::advanced) {
            Some(progress) if !progress.is_complete() => {
                let timestamp = self.clock.next();
                Self::append(player, river_crossing_step(progress, timestamp));
                Some(timestamp)
            }
            _ => None,
        };

        Ok(Resolution { effects, next_step })
    }

    fn append(player: &mut Player, event: Event) {
        let kind = event.kind;
        if event.has_choices()
            && let Some(tag) = kind.effect_tag()
        {
            player.active_effects.insert(tag.to_string());
        }
        if let Some(evicted) = player.event_log.push(event) {
            Self::release_tag(player, evicted.kind);
        }
    }

    /// Drops the effect tag of `kind` once no unresolved event of that kind
    /// remains in the log.
    fn release_tag(player: &mut Player, kind: EventKind) {
        if let Some(tag) = kind.effect_tag()
            && !player.event_log.contains_kind(kind)
        {
            player.active_effects.remove(tag);
        }
    }
}

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

fn catalogue_event(kind: EventKind, weather: Weather, timestamp: u64) -> Event {
    match kind {
        EventKind::Illness => Event::notice(kind, "A member of your party has fallen ill.", timestamp)
            .with_choice(
                "rest",
                "Rest until they recover",
                EffectBundle {
                    health: 10,
                    day: 1,
                    ..EffectBundle::NONE
                },
            )
            .with_choice(
                "continue",
                "Keep moving",
                EffectBundle {
                    health: -10,
                    ..EffectBundle::NONE
                },
            ),
        EventKind::Weather => Event::notice(
            kind,
            format!("The {} weather makes the trail treacherous.", weather.label()),
            timestamp,
        )
        .with_choice(
            "continue",
            "Press on through it",
            EffectBundle {
                health: -5,
                wagon_condition: -5,
                ..EffectBundle::NONE
            },
        )
        .with_choice(
            "wait",
            "Wait for it to pass",
            EffectBundle {
                day: 1,
                ..EffectBundle::NONE
            },
        ),
        EventKind::TradingPost => {
            Event::notice(kind, "You come across a trading post.", timestamp)
                .with_choice(
                    "buy_food",
                    "Buy 20 lbs of food for $10",
                    EffectBundle {
                        money: -10,
                        food: 20,
                        ..EffectBundle::NONE
                    },
                )
                .with_choice(
                    "buy_ammo",
                    "Buy 10 rounds for $10",
                    EffectBundle {
                        money: -10,
                        ammo: 10,
                        ..EffectBundle::NONE
                    },
                )
                .with_choice(
                    "repair",
                    "Have the wagon repaired for $15",
                    EffectBundle {
                        money: -15,
                        wagon_condition: 20,
                        ..EffectBundle::NONE
                    },
                )
                .with_choice("leave", "Move on", EffectBundle::NONE)
        }
        EventKind::Hunting => Event::notice(kind, "You spot a herd of bison nearby.", timestamp)
            .with_choice(
                "take",
                "Spend a day hunting them",
                EffectBundle {
                    food: 10,
                    day: 1,
                    ..EffectBundle::NONE
                },
            )
            .with_choice("leave", "Leave them be", EffectBundle::NONE),
        EventKind::WagonDamage => Event::notice(kind, "A wagon wheel has cracked.", timestamp)
            .with_choice(
                "repair",
                "Pay $10 for a replacement",
                EffectBundle {
                    money: -10,
                    wagon_condition: 15,
                    ..EffectBundle::NONE
                },
            )
            .with_choice(
                "continue",
                "Limp along",
                EffectBundle {
                    wagon_condition: -10,
                    ..EffectBundle::NONE
                },
            ),
        EventKind::RiverCrossing => river_crossing_step(
            ChainProgress {
                progress: 0,
                total_steps: RIVER_CROSSING_STEPS,
            },
            timestamp,
        ),
        EventKind::Landmark => Event::notice(kind, "You see a landmark ahead.", timestamp),
    }
}

fn river_crossing_step(progress: ChainProgress, timestamp: u64) -> Event {
    let kind = EventKind::RiverCrossing;
    let event = match progress.progress {
        0 => Event::notice(kind, "You reach a wide river.", timestamp)
            .with_choice(
                "ford",
                "Ford the river",
                EffectBundle {
                    health: -5,
                    wagon_condition: -10,
                    ..EffectBundle::NONE
                },
            )
            .with_choice(
                "caulk",
                "Caulk the wagon and float it",
                EffectBundle {
                    wagon_condition: -5,
                    day: 1,
                    ..EffectBundle::NONE
                },
            )
            .with_choice(
                "ferry",
                "Pay $10 for the ferry",
                EffectBundle {
                    money: -10,
                    ..EffectBundle::NONE
                },
            ),
        1 => Event::notice(kind, "Midstream, the current strengthens.", timestamp)
            .with_choice(
                "push_on",
                "Push on",
                EffectBundle {
                    health: -5,
                    food: -10,
                    ..EffectBundle::NONE
                },
            )
            .with_choice(
                "turn_back",
                "Turn back and try again upstream",
                EffectBundle {
                    food: -5,
                    day: 1,
                    ..EffectBundle::NONE
                },
            ),
        _ => Event::notice(kind, "You reach the far bank.", timestamp)
            .with_choice(
                "dry_out",
                "Dry out your supplies",
                EffectBundle {
                    health: 5,
                    day: 1,
                    ..EffectBundle::NONE
                },
            )
            .with_choice("press_on", "Press on", EffectBundle::NONE),
    };
    Event {
        chain: Some(progress),
        ..event
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
