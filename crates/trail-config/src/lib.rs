//! Configuration for the trail server and client.
//!
//! Settings persist to disk as `config.ron`, every section falls back to
//! its defaults when missing, and command-line flags override the file.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, ConfigOrigin};
pub use config::{CONFIG_FILE, Config, DebugConfig, NetworkConfig, TrailConfig, default_config_dir};
pub use error::ConfigError;
