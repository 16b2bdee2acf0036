mod config;

pub use config::{Config, ConfigError, TimingConfig, TournamentDefaults};
