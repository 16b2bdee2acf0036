//! Configuration of the orchestrator, read from named environment values.

use std::env;
use std::str::FromStr;

use alloy_primitives::{Address, U256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Phase and batching timings, all overridable from the environment.
/// Durations are milliseconds.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    pub negotiation_ms: u64,
    pub choice_ms: u64,
    pub settle_grace_ms: u64,
    pub settle_flush_ms: u64,
    pub batch_cap: usize,
    pub auth_challenge_ttl_ms: u64,
    pub pairing_debounce_ms: u64,
    pub match_retention_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            negotiation_ms: 45_000,
            choice_ms: 15_000,
            settle_grace_ms: 10_000,
            settle_flush_ms: 200,
            batch_cap: 30,
            auth_challenge_ttl_ms: 60_000,
            pairing_debounce_ms: 200,
            match_retention_ms: 300_000,
        }
    }
}

/// Tournament lobby defaults.
#[derive(Debug, Clone)]
pub struct TournamentDefaults {
    pub min_players: u32,
    pub max_players: u32,
    pub total_rounds: u32,
    pub registration_secs: u64,
    pub trigger_delay_ms: u64,
    pub join_timeout_ms: u64,
    pub choice_window_secs: u32,
    pub entry_stake: U256,
}

impl Default for TournamentDefaults {
    fn default() -> Self {
        Self {
            min_players: 4,
            max_players: 8,
            total_rounds: 3,
            registration_secs: 120,
            trigger_delay_ms: 3_000,
            join_timeout_ms: 30_000,
            choice_window_secs: 15,
            // 1 token unit at 18 decimals
            entry_stake: U256::from(10).pow(U256::from(18)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub operator_key: String,
    pub rpc_url: String,
    pub rpc_url_fallback: Option<String>,
    pub chain_id: u64,
    pub game_contract: Address,
    pub token_contract: Address,
    pub registry_contract: Address,
    pub multicall_contract: Address,
    pub port: u16,
    pub timing: TimingConfig,
    pub tournament: TournamentDefaults,
}

/// Canonical Multicall3 deployment address.
const DEFAULT_MULTICALL: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(name, e.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_address(name: &'static str, raw: &str) -> Result<Address, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::Invalid(name, raw.to_string()))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = TimingConfig::default();
        let timing = TimingConfig {
            negotiation_ms: parse_var("NEGOTIATION_MS", defaults.negotiation_ms)?,
            choice_ms: parse_var("CHOICE_MS", defaults.choice_ms)?,
            settle_grace_ms: parse_var("SETTLE_GRACE_MS", defaults.settle_grace_ms)?,
            settle_flush_ms: parse_var("SETTLE_FLUSH_MS", defaults.settle_flush_ms)?,
            batch_cap: parse_var("BATCH_CAP", defaults.batch_cap)?,
            auth_challenge_ttl_ms: parse_var(
                "AUTH_CHALLENGE_TTL_MS",
                defaults.auth_challenge_ttl_ms,
            )?,
            pairing_debounce_ms: parse_var("PAIRING_DEBOUNCE_MS", defaults.pairing_debounce_ms)?,
            match_retention_ms: parse_var("MATCH_RETENTION_MS", defaults.match_retention_ms)?,
        };

        let t_defaults = TournamentDefaults::default();
        let tournament = TournamentDefaults {
            min_players: parse_var("TOURNAMENT_MIN_PLAYERS", t_defaults.min_players)?,
            max_players: parse_var("TOURNAMENT_MAX_PLAYERS", t_defaults.max_players)?,
            total_rounds: parse_var("TOURNAMENT_TOTAL_ROUNDS", t_defaults.total_rounds)?,
            registration_secs: parse_var(
                "TOURNAMENT_REGISTRATION_SECS",
                t_defaults.registration_secs,
            )?,
            trigger_delay_ms: parse_var("TOURNAMENT_TRIGGER_DELAY_MS", t_defaults.trigger_delay_ms)?,
            join_timeout_ms: parse_var("TOURNAMENT_JOIN_TIMEOUT_MS", t_defaults.join_timeout_ms)?,
            choice_window_secs: parse_var(
                "TOURNAMENT_CHOICE_WINDOW_SECS",
                t_defaults.choice_window_secs,
            )?,
            entry_stake: match env::var("TOURNAMENT_ENTRY_STAKE") {
                Ok(raw) => U256::from_str(&raw)
                    .map_err(|e| ConfigError::Invalid("TOURNAMENT_ENTRY_STAKE", e.to_string()))?,
                Err(_) => t_defaults.entry_stake,
            },
        };

        Ok(Self {
            operator_key: required("OPERATOR_KEY")?,
            rpc_url: required("RPC_URL")?,
            rpc_url_fallback: env::var("RPC_URL_FALLBACK").ok(),
            chain_id: parse_var("CHAIN_ID", 0).and_then(|v: u64| {
                if v == 0 {
                    Err(ConfigError::Missing("CHAIN_ID"))
                } else {
                    Ok(v)
                }
            })?,
            game_contract: parse_address("GAME_CONTRACT", &required("GAME_CONTRACT")?)?,
            token_contract: parse_address("TOKEN_CONTRACT", &required("TOKEN_CONTRACT")?)?,
            registry_contract: parse_address("REGISTRY_CONTRACT", &required("REGISTRY_CONTRACT")?)?,
            multicall_contract: match env::var("MULTICALL_CONTRACT") {
                Ok(raw) => parse_address("MULTICALL_CONTRACT", &raw)?,
                Err(_) => parse_address("MULTICALL_CONTRACT", DEFAULT_MULTICALL)?,
            },
            port: parse_var("PORT", 8800)?,
            timing,
            tournament,
        })
    }
}
