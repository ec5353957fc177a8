//! Command-line argument parsing shared by the server and client binaries.

use std::fmt;
use std::path::PathBuf;

use clap::Parser;

use crate::{CONFIG_FILE, Config, ConfigError, default_config_dir};

/// Wagon trail command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "wagon-trail", about = "Multiplayer wagon trail")]
pub struct CliArgs {
    /// Server address (client) or bind address (server).
    #[arg(long)]
    pub host: Option<String>,

    /// Server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Player name (client only).
    #[arg(long)]
    pub name: Option<String>,

    /// Maximum concurrent players (server only).
    #[arg(long)]
    pub max_players: Option<u32>,

    /// Snapshot broadcast period in milliseconds (server only).
    #[arg(long)]
    pub snapshot_interval_ms: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Where [`Config::from_cli`] found its settings. Returned rather than
/// logged, since logging is configured from the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// Read from an existing file.
    Loaded(PathBuf),
    /// No file existed; defaults were written here.
    Created(PathBuf),
    /// No config directory could be determined.
    Defaults,
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded(path) => write!(f, "loaded config from {}", path.display()),
            Self::Created(path) => write!(f, "created default config at {}", path.display()),
            Self::Defaults => f.write_str("no config directory available, using defaults"),
        }
    }
}

impl Config {
    /// Loads the config named by `--config` (or the platform default
    /// directory), applies the remaining flags, and validates the result.
    pub fn from_cli(args: &CliArgs, server: bool) -> Result<(Self, ConfigOrigin), ConfigError> {
        let (mut config, origin) = match args.config.clone().or_else(default_config_dir) {
            Some(dir) => {
                let path = dir.join(CONFIG_FILE);
                let existed = path.exists();
                let config = Config::load_or_create(&dir)?;
                if existed {
                    (config, ConfigOrigin::Loaded(path))
                } else {
                    (config, ConfigOrigin::Created(path))
                }
            }
            None => (Config::default(), ConfigOrigin::Defaults),
        };
        config.apply_cli_overrides(args, server);
        config.validate()?;
        Ok((config, origin))
    }

    /// Apply CLI overrides to a loaded config. `--host` sets the bind
    /// address when `server` is true and the connect address otherwise.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs, server: bool) {
        if let Some(ref host) = args.host {
            if server {
                self.network.bind_address = host.clone();
            } else {
                self.network.server_address = host.clone();
            }
        }
        if let Some(port) = args.port {
            self.network.server_port = port;
        }
        if let Some(max) = args.max_players {
            self.network.max_players = max;
        }
        if let Some(ms) = args.snapshot_interval_ms {
            self.network.snapshot_interval_ms = ms;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            host: Some("192.168.1.1".to_string()),
            port: Some(6000),
            ..Default::default()
        };
        config.apply_cli_overrides(&args, false);
        assert_eq!(config.network.server_address, "192.168.1.1");
        assert_eq!(config.network.server_port, 6000);
        // Non-overridden fields retain defaults
        assert_eq!(config.network.bind_address, "0.0.0.0");
        assert_eq!(config.network.max_players, 64);
    }

    #[test]
    fn test_host_targets_bind_address_on_server() {
        let mut config = Config::default();
        let args = CliArgs {
            host: Some("127.0.0.1".to_string()),
            max_players: Some(4),
            ..Default::default()
        };
        config.apply_cli_overrides(&args, true);
        assert_eq!(config.network.bind_address, "127.0.0.1");
        assert_eq!(config.network.server_address, "127.0.0.1");
        assert_eq!(config.network.max_players, 4);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default(), true);
        assert_eq!(config, original);
    }

    #[test]
    fn test_from_cli_loads_directory_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let args = CliArgs {
            config: Some(dir.path().to_path_buf()),
            port: Some(6100),
            ..Default::default()
        };
        let (config, origin) = Config::from_cli(&args, true).unwrap();
        let path = dir.path().join(CONFIG_FILE);
        assert_eq!(config.network.server_port, 6100);
        assert!(path.exists());
        assert_eq!(origin, ConfigOrigin::Created(path.clone()));

        let (_, origin) = Config::from_cli(&args, true).unwrap();
        assert_eq!(origin, ConfigOrigin::Loaded(path));
        assert!(origin.to_string().starts_with("loaded config from"));
    }

    #[test]
    fn test_from_cli_rejects_invalid_override() {
        let dir = tempfile::tempdir().unwrap();
        let args = CliArgs {
            config: Some(dir.path().to_path_buf()),
            max_players: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            Config::from_cli(&args, true),
            Err(ConfigError::Invalid { field: "network.max_players", .. })
        ));
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from([
            "wagon-trail",
            "--port",
            "7000",
            "--name",
            "Alice",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.port, Some(7000));
        assert_eq!(args.name.as_deref(), Some("Alice"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.host.is_none());
    }
}
