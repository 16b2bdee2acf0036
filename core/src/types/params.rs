use serde::{Deserialize, Serialize};

use super::common::{Address, Bytes, B256, U256};
use super::game::Choice;

/// One entry of a multi-settle batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementParams {
    pub match_id: u64,
    pub choice_a: Choice,
    pub nonce_a: U256,
    pub sig_a: Bytes,
    pub choice_b: Choice,
    pub nonce_b: U256,
    pub sig_b: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialTimeoutParams {
    pub match_id: u64,
    pub choice: Choice,
    pub nonce: U256,
    pub sig: Bytes,
    pub agent_a_timed_out: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTournamentParams {
    pub entry_stake: U256,
    pub max_players: u32,
    pub total_rounds: u32,
    pub registration_duration_secs: u64,
}

/// Gasless join submitted by the operator on the agent's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTournamentParams {
    pub tournament_id: u64,
    pub agent: Address,
    pub nonce: U256,
    pub join_sig: Bytes,
    pub permit_deadline: U256,
    pub v: u8,
    pub r: B256,
    pub s: B256,
}
