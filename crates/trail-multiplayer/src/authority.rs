//! Server-authoritative simulation: player commands, rules, and the
//! single-writer simulator that owns the canonical [`GameState`].
//!
//! Clients submit [`PlayerCommand`]s describing *what they want to do*. The
//! server applies them one at a time through
//! [`AuthoritativeSimulator::apply_action`], which either returns an
//! [`ActionOutcome`] or a signaled [`ActionRejected`] no-op.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::events::{DEFAULT_EVENT_PROBABILITY, DEFAULT_WINDFALL_PROBABILITY, EventEngine};
use crate::state::{
    EFFECT_BROKEN_WHEEL, EFFECT_ILLNESS, EventKind, GameState, Weather, join, offset,
};

// ---------------------------------------------------------------------------
// PlayerCommand
// ---------------------------------------------------------------------------

/// A player's requested action. One variant per action kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerCommand {
    /// Advance one step along the trail.
    Move,
    /// Spend ammo for a chance at food.
    Hunt,
    /// Exchange money for food.
    BuyFood,
    /// Exchange money for wagon condition.
    RepairWagon,
    /// Exchange money for health.
    Rest,
    /// Resolve a logged event by picking one of its choices.
    EventChoice {
        /// Timestamp identifying the event.
        event_time: u64,
        /// Choice identifier.
        choice: String,
    },
}

impl PlayerCommand {
    /// Parses the plain action identifiers used by input adapters
    /// (`move`, `hunt`, `buy_food`, `repair_wagon`, `rest`).
    pub fn from_action_name(name: &str) -> Option<Self> {
        match name {
            "move" => Some(Self::Move),
            "hunt" => Some(Self::Hunt),
            "buy_food" => Some(Self::BuyFood),
            "repair_wagon" => Some(Self::RepairWagon),
            "rest" => Some(Self::Rest),
            _ => None,
        }
    }

    /// The action identifier for this command.
    pub fn action_name(&self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Hunt => "hunt",
            Self::BuyFood => "buy_food",
            Self::RepairWagon => "repair_wagon",
            Self::Rest => "rest",
            Self::EventChoice { .. } => "event_choice",
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What an applied command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The player moved.
    Moved {
        /// Position after the move.
        position: u32,
        /// Landmark reached by this move.
        landmark: Option<String>,
        /// Timestamp of a randomly generated event.
        event: Option<u64>,
    },
    /// The player hunted.
    Hunted {
        /// Whether the hunt succeeded.
        success: bool,
        /// Food gained (0 on failure).
        food_gained: u32,
        /// Timestamp of a windfall event offered after success.
        windfall: Option<u64>,
    },
    /// The player bought food.
    BoughtFood {
        /// Food after the purchase.
        food: u32,
    },
    /// The player repaired the wagon.
    RepairedWagon {
        /// Wagon condition after the repair.
        wagon_condition: u32,
    },
    /// The player rested.
    Rested {
        /// Health after resting.
        health: u32,
    },
    /// An event choice was applied.
    ChoiceResolved {
        /// Timestamp of the next chain step, if any.
        next_step: Option<u64>,
    },
}

/// Reasons a command is rejected. A rejected command changes nothing
/// beyond creating the player on first contact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionRejected {
    /// The player cannot pay for the action or choice.
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        /// Price of the action.
        needed: u32,
        /// Money the player holds.
        available: u32,
    },

    /// The player lacks the ammo to hunt.
    #[error("insufficient ammo: need {needed}, have {available}")]
    InsufficientAmmo {
        /// Ammo required.
        needed: u32,
        /// Ammo the player holds.
        available: u32,
    },

    /// The event does not exist (or was already resolved), or it has no
    /// such choice.
    #[error("unknown event {event_time} or choice {choice:?}")]
    UnknownEventOrChoice {
        /// Referenced event timestamp.
        event_time: u64,
        /// Referenced choice identifier.
        choice: String,
    },
}

// ---------------------------------------------------------------------------
// SimulationRules
// ---------------------------------------------------------------------------

/// Tunable constants of the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationRules {
    /// Steps advanced per move.
    pub move_step: u32,
    /// Food eaten per move.
    pub move_food_cost: u32,
    /// Health lost on a move that leaves the party without food.
    pub starvation_health_penalty: u32,
    /// Wagon condition lost per move in a storm.
    pub storm_wagon_damage: u32,
    /// Food spoiled per move in the heat.
    pub heat_food_spoilage: u32,
    /// Health lost per move while ill.
    pub illness_health_cost: u32,
    /// Wagon condition lost per move on a broken wheel.
    pub broken_wheel_wear: u32,
    /// Ammo spent per hunt, also the minimum required to hunt.
    pub hunt_ammo_cost: u32,
    /// Base probability a hunt succeeds.
    pub hunt_success_probability: f64,
    /// Added success probability per hunting skill level.
    pub hunt_skill_bonus: f64,
    /// Ceiling for skill-boosted success probability.
    pub hunt_success_cap: f64,
    /// Highest hunting skill level.
    pub max_hunting_skill: u32,
    /// Smallest food gain on a successful hunt.
    pub hunt_food_min: u32,
    /// Largest food gain on a successful hunt.
    pub hunt_food_max: u32,
    /// Price of `buy_food`.
    pub buy_food_price: u32,
    /// Food gained by `buy_food`.
    pub buy_food_amount: u32,
    /// Price of `repair_wagon`.
    pub repair_price: u32,
    /// Wagon condition gained by `repair_wagon`.
    pub repair_amount: u32,
    /// Price of `rest`.
    pub rest_price: u32,
    /// Health gained by `rest`.
    pub rest_health: u32,
    /// Probability of a random event after each move.
    pub event_probability: f64,
    /// Probability of a windfall after a successful hunt.
    pub windfall_probability: f64,
}

impl Default for SimulationRules {
    fn default() -> Self {
        Self {
            move_step: 1,
            move_food_cost: 5,
            starvation_health_penalty: 10,
            storm_wagon_damage: 5,
            heat_food_spoilage: 3,
            illness_health_cost: 3,
            broken_wheel_wear: 2,
            hunt_ammo_cost: 2,
            hunt_success_probability: 0.7,
            hunt_skill_bonus: 0.04,
            hunt_success_cap: 0.95,
            max_hunting_skill: 5,
            hunt_food_min: 15,
            hunt_food_max: 25,
            buy_food_price: 10,
            buy_food_amount: 15,
            repair_price: 20,
            repair_amount: 25,
            rest_price: 5,
            rest_health: 15,
            event_probability: DEFAULT_EVENT_PROBABILITY,
            windfall_probability: DEFAULT_WINDFALL_PROBABILITY,
        }
    }
}

impl SimulationRules {
    /// Success probability for a hunter of the given skill level. Skill
    /// never pushes the chance past the cap, nor pulls it below the base.
    pub fn hunt_probability(&self, skill: u32) -> f64 {
        let base = self.hunt_success_probability.clamp(0.0, 1.0);
        let boosted = base + self.hunt_skill_bonus * f64::from(skill);
        boosted.min(base.max(self.hunt_success_cap)).clamp(0.0, 1.0)
    }
}

/// Negated amount as a signed delta.
fn loss(amount: u32) -> i32 {
    -(amount.min(i32::MAX as u32) as i32)
}

/// Amount as a signed delta.
fn gain(amount: u32) -> i32 {
    amount.min(i32::MAX as u32) as i32
}

// ---------------------------------------------------------------------------
// AuthoritativeSimulator
// ---------------------------------------------------------------------------

/// Owns the canonical [`GameState`] and is the only thing allowed to
/// mutate it. Callers must serialize access: one command at a time.
pub struct AuthoritativeSimulator<R = StdRng> {
    state: GameState,
    rules: SimulationRules,
    events: EventEngine,
    rng: R,
}

impl AuthoritativeSimulator<StdRng> {
    /// Creates a simulator seeded from the operating system.
    pub fn new(state: GameState, rules: SimulationRules) -> Self {
        Self::with_rng(state, rules, StdRng::from_os_rng())
    }
}

impl<R: Rng> AuthoritativeSimulator<R> {
    /// Creates a simulator with an explicit random source.
    pub fn with_rng(state: GameState, rules: SimulationRules, rng: R) -> Self {
        let events = EventEngine::new(rules.event_probability, rules.windfall_probability);
        Self {
            state,
            rules,
            events,
            rng,
        }
    }

    /// Read-only view of the canonical state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// The rules in force.
    pub fn rules(&self) -> &SimulationRules {
        &self.rules
    }

    /// Applies one command for `player_name`, creating the player on first
    /// contact. Client-reported skills are never trusted; they are logged
    /// and ignored in favor of the server-tracked skill.
    pub fn apply_action(
        &mut self,
        player_name: &str,
        command: &PlayerCommand,
        reported_skills: Option<&BTreeMap<String, i32>>,
    ) -> Result<ActionOutcome, ActionRejected> {
        if let Some(skills) = reported_skills {
            tracing::debug!("Ignoring client-reported skills for {player_name}: {skills:?}");
        }

        let GameState {
            players,
            trail_length,
            landmarks,
            weather,
            day,
        } = &mut self.state;
        let rules = &self.rules;
        let events = &mut self.events;
        let rng = &mut self.rng;
        let player = join(players, player_name);

        let outcome = match command {
            PlayerCommand::Move => {
                let before = player.position;
                player.position = player
                    .position
                    .saturating_add(rules.move_step)
                    .min(*trail_length);

                player.consume_food(rules.move_food_cost);
                if player.food == 0 {
                    player.adjust_health(loss(rules.starvation_health_penalty));
                }

                match weather {
                    Weather::Storm => player.adjust_wagon(loss(rules.storm_wagon_damage)),
                    Weather::Heat => player.consume_food(rules.heat_food_spoilage),
                    Weather::Clear | Weather::Rain | Weather::Snow => {}
                }
                if player.has_effect(EFFECT_ILLNESS) {
                    player.adjust_health(loss(rules.illness_health_cost));
                }
                if player.has_effect(EFFECT_BROKEN_WHEEL) {
                    player.adjust_wagon(loss(rules.broken_wheel_wear));
                }

                let landmark = if player.position != before {
                    landmarks.get(&player.position).cloned()
                } else {
                    None
                };
                if let Some(name) = &landmark {
                    events.record(player, EventKind::Landmark, format!("Arrived at {name}."));
                }

                let event = events.maybe_generate_event(player, *weather, rng);
                ActionOutcome::Moved {
                    position: player.position,
                    landmark,
                    event,
                }
            }

            PlayerCommand::Hunt => {
                if player.ammo < rules.hunt_ammo_cost {
                    return Err(ActionRejected::InsufficientAmmo {
                        needed: rules.hunt_ammo_cost,
                        available: player.ammo,
                    });
                }
                player.use_ammo(rules.hunt_ammo_cost);

                let probability = rules.hunt_probability(player.hunting_skill);
                if rng.random_bool(probability) {
                    let lo = rules.hunt_food_min.min(rules.hunt_food_max);
                    let hi = rules.hunt_food_min.max(rules.hunt_food_max);
                    let food_gained = rng.random_range(lo..=hi);
                    player.add_food(food_gained);
                    player.hunting_skill = (player.hunting_skill + 1).min(rules.max_hunting_skill);
                    events.record(
                        player,
                        EventKind::Hunting,
                        format!("The hunt was a success: {food_gained} lbs of food."),
                    );
                    let windfall = events.maybe_windfall(player, rng);
                    ActionOutcome::Hunted {
                        success: true,
                        food_gained,
                        windfall,
                    }
                } else {
                    events.record(
                        player,
                        EventKind::Hunting,
                        "The hunt came back empty-handed.",
                    );
                    ActionOutcome::Hunted {
                        success: false,
                        food_gained: 0,
                        windfall: None,
                    }
                }
            }

            PlayerCommand::BuyFood => {
                if !player.spend_money(rules.buy_food_price) {
                    return Err(ActionRejected::InsufficientFunds {
                        needed: rules.buy_food_price,
                        available: player.money,
                    });
                }
                player.add_food(rules.buy_food_amount);
                ActionOutcome::BoughtFood { food: player.food }
            }

            PlayerCommand::RepairWagon => {
                if !player.spend_money(rules.repair_price) {
                    return Err(ActionRejected::InsufficientFunds {
                        needed: rules.repair_price,
                        available: player.money,
                    });
                }
                player.adjust_wagon(gain(rules.repair_amount));
                ActionOutcome::RepairedWagon {
                    wagon_condition: player.wagon_condition,
                }
            }

            PlayerCommand::Rest => {
                if !player.spend_money(rules.rest_price) {
                    return Err(ActionRejected::InsufficientFunds {
                        needed: rules.rest_price,
                        available: player.money,
                    });
                }
                player.adjust_health(gain(rules.rest_health));
                ActionOutcome::Rested {
                    health: player.health,
                }
            }

            PlayerCommand::EventChoice { event_time, choice } => {
                let resolution = events.resolve(player, *event_time, choice)?;
                *day = offset(*day, resolution.effects.day).max(1);
                ActionOutcome::ChoiceResolved {
                    next_step: resolution.next_step,
                }
            }
        };

        Ok(outcome)
    }

    /// Draws the next trail-wide weather uniformly.
    pub fn tick_weather(&mut self) -> Weather {
        let next = Weather::random(&mut self.rng);
        if next != self.state.weather {
            tracing::debug!(
                "Weather changed from {} to {}",
                self.state.weather.label(),
                next.label()
            );
        }
        self.state.weather = next;
        next
    }

    /// Advances the global day counter by one.
    pub fn advance_day(&mut self) -> u32 {
        self.state.advance_day(1);
        self.state.day
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{EVENT_LOG_CAPACITY, MAX_VITAL};

    /// Rules with all randomness removed: no events, guaranteed hunts.
    fn quiet_rules() -> SimulationRules {
        SimulationRules {
            event_probability: 0.0,
            windfall_probability: 0.0,
            hunt_success_probability: 1.0,
            ..SimulationRules::default()
        }
    }

    fn simulator(rules: SimulationRules) -> AuthoritativeSimulator<StdRng> {
        AuthoritativeSimulator::with_rng(GameState::default(), rules, StdRng::seed_from_u64(7))
    }

    fn alice(sim: &AuthoritativeSimulator<StdRng>) -> &crate::state::Player {
        sim.state().player("Alice").unwrap()
    }

    #[test]
    fn test_alice_scenario() {
        let mut sim = simulator(quiet_rules());

        let moved = sim.apply_action("Alice", &PlayerCommand::Move, None).unwrap();
        assert!(matches!(moved, ActionOutcome::Moved { position: 1, .. }));
        assert_eq!(alice(&sim).position, 1);
        assert_eq!(alice(&sim).food, 95);

        let log_before = alice(&sim).event_log.len();
        let hunted = sim.apply_action("Alice", &PlayerCommand::Hunt, None).unwrap();
        let ActionOutcome::Hunted {
            success,
            food_gained,
            ..
        } = hunted
        else {
            panic!("expected a hunt outcome, got {hunted:?}");
        };
        assert!(success);
        assert!((15..=25).contains(&food_gained));
        assert_eq!(alice(&sim).ammo, 18);
        assert_eq!(alice(&sim).food, 95 + food_gained);
        assert_eq!(alice(&sim).event_log.len(), log_before + 1);

        let food_before = alice(&sim).food;
        sim.apply_action("Alice", &PlayerCommand::BuyFood, None)
            .unwrap();
        assert_eq!(alice(&sim).money, 40);
        assert_eq!(alice(&sim).food, food_before + 15);
    }

    #[test]
    fn test_sixth_purchase_is_insufficient_funds() {
        let mut sim = simulator(quiet_rules());
        for _ in 0..5 {
            sim.apply_action("Alice", &PlayerCommand::BuyFood, None)
                .unwrap();
        }
        assert_eq!(alice(&sim).money, 0);
        let food = alice(&sim).food;

        let sixth = sim.apply_action("Alice", &PlayerCommand::BuyFood, None);
        assert_eq!(
            sixth,
            Err(ActionRejected::InsufficientFunds {
                needed: 10,
                available: 0
            })
        );
        assert_eq!(alice(&sim).money, 0);
        assert_eq!(alice(&sim).food, food);
    }

    #[test]
    fn test_moves_are_monotonic_and_bounded() {
        let mut sim = simulator(SimulationRules::default());
        let trail = sim.state().trail_length;
        let mut prev = 0;
        for _ in 0..(trail + 50) {
            let _ = sim.apply_action("Alice", &PlayerCommand::Move, None);
            let pos = alice(&sim).position;
            assert!(pos >= prev);
            assert!(pos <= trail);
            prev = pos;
        }
        assert_eq!(prev, trail);
    }

    #[test]
    fn test_landmark_arrival_is_logged_once() {
        let mut sim = simulator(quiet_rules());
        let mut arrivals = Vec::new();
        for _ in 0..10 {
            if let Ok(ActionOutcome::Moved {
                landmark: Some(name),
                ..
            }) = sim.apply_action("Alice", &PlayerCommand::Move, None)
            {
                arrivals.push(name);
            }
        }
        assert_eq!(arrivals, vec!["Kansas River".to_string()]);
        let latest = alice(&sim).event_log.latest().unwrap();
        assert_eq!(latest.kind, EventKind::Landmark);
        assert!(latest.description.contains("Kansas River"));
    }

    #[test]
    fn test_no_landmark_relogged_at_trail_end() {
        let mut sim = simulator(quiet_rules());
        for _ in 0..100 {
            let _ = sim.apply_action("Alice", &PlayerCommand::Move, None);
        }
        let outcome = sim.apply_action("Alice", &PlayerCommand::Move, None).unwrap();
        assert!(matches!(
            outcome,
            ActionOutcome::Moved {
                position: 100,
                landmark: None,
                ..
            }
        ));
    }

    #[test]
    fn test_starvation_costs_health() {
        let mut sim = simulator(quiet_rules());
        for _ in 0..19 {
            sim.apply_action("Alice", &PlayerCommand::Move, None).unwrap();
        }
        assert_eq!(alice(&sim).food, 5);
        assert_eq!(alice(&sim).health, 100);

        sim.apply_action("Alice", &PlayerCommand::Move, None).unwrap();
        assert_eq!(alice(&sim).food, 0);
        assert_eq!(alice(&sim).health, 90);

        sim.apply_action("Alice", &PlayerCommand::Move, None).unwrap();
        assert_eq!(alice(&sim).health, 80);
    }

    #[test]
    fn test_weather_passive_effects() {
        let mut sim = simulator(quiet_rules());
        sim.state.weather = Weather::Storm;
        sim.apply_action("Alice", &PlayerCommand::Move, None).unwrap();
        assert_eq!(alice(&sim).wagon_condition, 95);

        sim.state.weather = Weather::Heat;
        sim.apply_action("Alice", &PlayerCommand::Move, None).unwrap();
        assert_eq!(alice(&sim).food, 100 - 5 - 5 - 3);
    }

    #[test]
    fn test_hunt_without_ammo_is_rejected_but_joins_player() {
        let mut sim = simulator(quiet_rules());
        sim.state.player_or_insert("Bob").ammo = 1;
        let result = sim.apply_action("Bob", &PlayerCommand::Hunt, None);
        assert_eq!(
            result,
            Err(ActionRejected::InsufficientAmmo {
                needed: 2,
                available: 1
            })
        );
        assert_eq!(sim.state().player("Bob").unwrap().ammo, 1);

        let choice = PlayerCommand::EventChoice {
            event_time: 1,
            choice: "rest".into(),
        };
        let rejected = sim.apply_action("Carol", &choice, None);
        assert!(rejected.is_err());
        assert!(sim.state().player("Carol").is_some());
    }

    #[test]
    fn test_failed_hunt_still_spends_ammo() {
        let mut sim = simulator(SimulationRules {
            hunt_success_probability: 0.0,
            hunt_skill_bonus: 0.0,
            ..quiet_rules()
        });
        let outcome = sim.apply_action("Alice", &PlayerCommand::Hunt, None).unwrap();
        assert_eq!(
            outcome,
            ActionOutcome::Hunted {
                success: false,
                food_gained: 0,
                windfall: None
            }
        );
        assert_eq!(alice(&sim).ammo, 18);
        assert_eq!(alice(&sim).food, 100);
        assert_eq!(alice(&sim).event_log.len(), 1);
    }

    #[test]
    fn test_hunt_probability_respects_cap_and_base() {
        let rules = SimulationRules::default();
        assert!((rules.hunt_probability(0) - 0.7).abs() < 1e-9);
        assert!((rules.hunt_probability(5) - 0.9).abs() < 1e-9);
        assert!((rules.hunt_probability(100) - 0.95).abs() < 1e-9);
        assert_eq!(quiet_rules().hunt_probability(3), 1.0);
    }

    #[test]
    fn test_reported_skills_are_ignored() {
        let mut sim = simulator(quiet_rules());
        let skills = BTreeMap::from([("hunting".to_string(), 99)]);
        sim.apply_action("Alice", &PlayerCommand::Move, Some(&skills))
            .unwrap();
        assert_eq!(alice(&sim).hunting_skill, 0);
    }

    #[test]
    fn test_repair_and_rest_exchanges() {
        let mut sim = simulator(quiet_rules());
        sim.state.player_or_insert("Alice").wagon_condition = 50;
        sim.state.player_or_insert("Alice").health = 95;

        sim.apply_action("Alice", &PlayerCommand::RepairWagon, None)
            .unwrap();
        assert_eq!(alice(&sim).wagon_condition, 75);
        assert_eq!(alice(&sim).money, 30);

        let rested = sim.apply_action("Alice", &PlayerCommand::Rest, None).unwrap();
        assert_eq!(rested, ActionOutcome::Rested { health: MAX_VITAL });
        assert_eq!(alice(&sim).money, 25);
    }

    #[test]
    fn test_event_choice_advances_global_day_and_is_idempotent() {
        let mut sim = simulator(quiet_rules());
        let ts = {
            let player = sim.state.player_or_insert("Alice");
            sim.events.generate(EventKind::Weather, player, Weather::Rain)
        };
        let choice = PlayerCommand::EventChoice {
            event_time: ts,
            choice: "wait".into(),
        };

        sim.apply_action("Alice", &choice, None).unwrap();
        assert_eq!(sim.state().day, 2);
        let after_first = sim.state().clone();

        let second = sim.apply_action("Alice", &choice, None);
        assert!(matches!(
            second,
            Err(ActionRejected::UnknownEventOrChoice { .. })
        ));
        assert_eq!(sim.state(), &after_first);
    }

    #[test]
    fn test_invariants_hold_under_random_play() {
        let mut sim = simulator(SimulationRules {
            event_probability: 0.5,
            windfall_probability: 0.5,
            ..SimulationRules::default()
        });
        let mut rng = StdRng::seed_from_u64(42);
        let names = ["Alice", "Bob", "Carol"];

        for _ in 0..2_000 {
            let name = names[rng.random_range(0..names.len())];
            let command = match rng.random_range(0..6) {
                0 => PlayerCommand::Move,
                1 => PlayerCommand::Hunt,
                2 => PlayerCommand::BuyFood,
                3 => PlayerCommand::RepairWagon,
                4 => PlayerCommand::Rest,
                _ => {
                    let player = sim.state().player(name);
                    let open = player.and_then(|p| p.event_log.iter().find(|e| e.has_choices()));
                    match open {
                        Some(event) => {
                            let keys: Vec<_> = event.choices.keys().cloned().collect();
                            PlayerCommand::EventChoice {
                                event_time: event.timestamp,
                                choice: keys[rng.random_range(0..keys.len())].clone(),
                            }
                        }
                        None => PlayerCommand::Move,
                    }
                }
            };
            let _ = sim.apply_action(name, &command, None);
            if rng.random_bool(0.05) {
                sim.tick_weather();
            }

            for player in sim.state().players.values() {
                assert!(player.health <= MAX_VITAL);
                assert!(player.wagon_condition <= MAX_VITAL);
                assert!(player.position <= sim.state().trail_length);
                assert!(player.event_log.len() <= EVENT_LOG_CAPACITY);
            }
        }
    }

    #[test]
    fn test_tick_weather_and_day() {
        let mut sim = simulator(quiet_rules());
        for _ in 0..20 {
            let weather = sim.tick_weather();
            assert_eq!(sim.state().weather, weather);
            assert!(Weather::ALL.contains(&weather));
        }
        assert_eq!(sim.advance_day(), 2);
        assert_eq!(sim.advance_day(), 3);
    }

    #[test]
    fn test_command_names_roundtrip() {
        for command in [
            PlayerCommand::Move,
            PlayerCommand::Hunt,
            PlayerCommand::BuyFood,
            PlayerCommand::RepairWagon,
            PlayerCommand::Rest,
        ] {
            assert_eq!(
                PlayerCommand::from_action_name(command.action_name()),
                Some(command)
            );
        }
        assert_eq!(PlayerCommand::from_action_name("fly"), None);
    }
}
