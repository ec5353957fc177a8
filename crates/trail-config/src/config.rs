//! Configuration structs with sensible defaults and RON persistence.

use std::collections::BTreeMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use trail_multiplayer::{GameState, PredictionConfig, SimulationRules, default_landmarks};
use trail_net::{CompressionConfig, FrameConfig, WireCodec};

use crate::error::ConfigError;

/// File name inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration shared by the server and the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Transport settings.
    pub network: NetworkConfig,
    /// The trail itself and its clocks.
    pub trail: TrailConfig,
    /// Simulation constants (server only).
    pub rules: SimulationRules,
    /// Client prediction and reconciliation tuning.
    pub prediction: PredictionConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the client connects to.
    pub server_address: String,
    /// Address the server binds.
    pub bind_address: String,
    /// Port for both.
    pub server_port: u16,
    /// Maximum concurrent connections (server only).
    pub max_players: u32,
    /// Snapshot broadcast period in milliseconds.
    pub snapshot_interval_ms: u64,
    /// Per-connection snapshot write deadline in milliseconds.
    pub write_timeout_ms: u64,
    /// Largest accepted frame payload in bytes.
    pub max_frame_bytes: u32,
    /// Payloads at least this large are LZ4-compressed.
    pub compression_threshold: usize,
    /// Enable payload compression.
    pub compression_enabled: bool,
}

/// Trail layout and game clocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrailConfig {
    /// Trail length in steps.
    pub trail_length: u32,
    /// Landmarks keyed by position.
    pub landmarks: BTreeMap<u32, String>,
    /// Seconds between weather changes.
    pub weather_interval_secs: u64,
    /// Seconds per in-game day.
    pub day_interval_secs: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log filter (e.g., "debug", "info,trail_net=trace").
    pub log_level: String,
    /// Directory for the JSON log file in debug builds.
    pub log_dir: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            bind_address: "0.0.0.0".to_string(),
            server_port: 50000,
            max_players: 64,
            snapshot_interval_ms: 100,
            write_timeout_ms: 2000,
            max_frame_bytes: 1_048_576,
            compression_threshold: 256,
            compression_enabled: true,
        }
    }
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            trail_length: 100,
            landmarks: default_landmarks(),
            weather_interval_secs: 30,
            day_interval_secs: 60,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

// --- Derived values ---

impl NetworkConfig {
    /// Snapshot broadcast period.
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    /// Snapshot write deadline.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// The address the server binds.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        resolve(&self.bind_address, self.server_port, "network.bind_address")
    }

    /// The address the client connects to. Host names are resolved.
    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        resolve(&self.server_address, self.server_port, "network.server_address")
    }

    /// Wire codec with this section's frame limit and compression policy.
    pub fn codec(&self) -> WireCodec {
        WireCodec::new(
            FrameConfig {
                max_payload_size: self.max_frame_bytes,
            },
            CompressionConfig {
                threshold: self.compression_threshold,
                enabled: self.compression_enabled,
            },
        )
    }
}

fn resolve(host: &str, port: u16, field: &'static str) -> Result<SocketAddr, ConfigError> {
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or(ConfigError::Invalid {
            field,
            reason: "not a resolvable address",
        })
}

impl TrailConfig {
    /// Seconds between weather changes.
    pub fn weather_interval(&self) -> Duration {
        Duration::from_secs(self.weather_interval_secs)
    }

    /// Length of an in-game day.
    pub fn day_interval(&self) -> Duration {
        Duration::from_secs(self.day_interval_secs)
    }

    /// A fresh game state for this trail.
    pub fn game_state(&self) -> GameState {
        GameState::new(self.trail_length, self.landmarks.clone())
    }
}

// --- Validation ---

impl Config {
    /// Rejects settings the server or client could not run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prediction.validate()?;

        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });
        if self.trail.trail_length == 0 {
            return invalid("trail.trail_length", "must be positive");
        }
        if self
            .trail
            .landmarks
            .keys()
            .any(|&pos| pos > self.trail.trail_length)
        {
            return invalid("trail.landmarks", "landmark beyond the end of the trail");
        }
        if self.network.snapshot_interval_ms == 0 {
            return invalid("network.snapshot_interval_ms", "must be positive");
        }
        if self.network.max_players == 0 {
            return invalid("network.max_players", "must be positive");
        }
        if self.rules.hunt_food_min > self.rules.hunt_food_max {
            return invalid("rules.hunt_food_min", "exceeds rules.hunt_food_max");
        }
        for (field, p) in [
            ("rules.event_probability", self.rules.event_probability),
            ("rules.windfall_probability", self.rules.windfall_probability),
            ("rules.hunt_success_probability", self.rules.hunt_success_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return invalid(field, "must be within [0, 1]");
            }
        }
        Ok(())
    }
}

// --- Load / Save / Reload ---

/// Platform config directory for the trail (e.g. `~/.config/wagon-trail`).
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wagon-trail"))
}

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }
}
