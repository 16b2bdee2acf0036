use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

use super::common::{current_timestamp, Address, Bytes, B256, U256};
use super::game::{AgentStats, Choice, MatchResult};

/// Server → client events. On the wire each event is one JSON frame,
/// `{"type": "...", "payload": {...}, "timestamp": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    AuthChallenge {
        challenge: String,
        challenge_id: String,
        expires_at: u64,
    },
    #[serde(rename_all = "camelCase")]
    AuthSuccess { address: Address, name: String },
    #[serde(rename_all = "camelCase")]
    AuthFailed { reason: String },

    #[serde(rename_all = "camelCase")]
    QueueJoined { position: u32, queue_size: u32 },
    #[serde(rename_all = "camelCase")]
    QueueUpdate { queue_size: u32 },

    #[serde(rename_all = "camelCase")]
    TournamentQueueJoined {
        position: u32,
        queue_size: u32,
        min_players: u32,
    },
    #[serde(rename_all = "camelCase")]
    TournamentQueueUpdate {
        size: u32,
        min_players: u32,
        agents: Vec<Address>,
    },
    #[serde(rename_all = "camelCase")]
    TournamentJoinRequest {
        tournament_id: u64,
        entry_stake: U256,
        nonce: U256,
        signing_payload: Value,
        permit_data: Value,
        registration_duration: u64,
        min_players: u32,
        max_players: u32,
        total_rounds: u32,
    },
    #[serde(rename_all = "camelCase")]
    TournamentJoined { tournament_id: u64, tx_hash: B256 },
    #[serde(rename_all = "camelCase")]
    TournamentJoinFailed { tournament_id: u64, reason: String },

    #[serde(rename_all = "camelCase")]
    TournamentCreated {
        tournament_id: u64,
        entry_stake: U256,
        max_players: u32,
        total_rounds: u32,
    },
    #[serde(rename_all = "camelCase")]
    TournamentStarted {
        tournament_id: u64,
        players: Vec<Address>,
        total_rounds: u32,
    },
    #[serde(rename_all = "camelCase")]
    TournamentPlayerJoined {
        tournament_id: u64,
        agent: Address,
        agent_name: String,
        joined: u32,
    },
    #[serde(rename_all = "camelCase")]
    TournamentRoundStarted {
        tournament_id: u64,
        round: u32,
        total_rounds: u32,
        match_ids: Vec<u64>,
        bye_player: Option<Address>,
    },
    #[serde(rename_all = "camelCase")]
    TournamentUpdate {
        tournament_id: u64,
        round: u32,
        standings: Value,
    },
    #[serde(rename_all = "camelCase")]
    TournamentRoundComplete { tournament_id: u64, round: u32 },
    #[serde(rename_all = "camelCase")]
    TournamentComplete {
        tournament_id: u64,
        rankings: Value,
    },

    #[serde(rename_all = "camelCase")]
    MatchStarted {
        match_id: u64,
        agent_a: Address,
        agent_b: Address,
        agent_a_name: String,
        agent_b_name: String,
        tournament_id: u64,
        negotiation_duration: u64,
        choice_duration: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        you: Option<Address>,
        #[serde(skip_serializing_if = "Option::is_none")]
        opponent: Option<Address>,
        #[serde(skip_serializing_if = "Option::is_none")]
        opponent_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        opponent_stats: Option<AgentStats>,
    },
    #[serde(rename_all = "camelCase")]
    NegotiationMessage {
        match_id: u64,
        from: Address,
        from_name: String,
        message: String,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    ChoicePhaseStarted {
        match_id: u64,
        agent_a: Address,
        agent_b: Address,
        agent_a_name: String,
        agent_b_name: String,
        deadline: u64,
    },
    #[serde(rename_all = "camelCase")]
    SignChoice {
        match_id: u64,
        nonce: U256,
        deadline: u64,
        typed_data: Value,
    },
    #[serde(rename_all = "camelCase")]
    ChoiceLocked {
        match_id: u64,
        agent: Address,
        agent_name: String,
        commit_hash: B256,
    },
    #[serde(rename_all = "camelCase")]
    ChoiceAccepted { match_id: u64, choice: Choice },
    #[serde(rename_all = "camelCase")]
    ChoicesRevealed {
        match_id: u64,
        agent_a: Address,
        agent_b: Address,
        choice_a: Choice,
        choice_b: Choice,
        sig_a: Bytes,
        sig_b: Bytes,
        nonce_a: U256,
        nonce_b: U256,
        result: MatchResult,
        result_name: String,
        match_salt: B256,
    },
    #[serde(rename_all = "camelCase")]
    ChoiceTimeout {
        match_id: u64,
        agent_a: Address,
        agent_b: Address,
        agent_a_submitted: bool,
        agent_b_submitted: bool,
    },
    #[serde(rename_all = "camelCase")]
    MatchConfirmed {
        match_id: u64,
        tx_hash: B256,
        agent_a: Address,
        agent_b: Address,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<MatchResult>,
        #[serde(skip_serializing_if = "Option::is_none")]
        choice_a: Option<Choice>,
        #[serde(skip_serializing_if = "Option::is_none")]
        choice_b: Option<Choice>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timed_out: Option<bool>,
    },

    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

impl ServerEvent {
    /// Serialize to the outbound frame, stamping the envelope timestamp.
    pub fn to_frame(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(ref mut map) = value {
            map.insert("timestamp".into(), Value::from(current_timestamp()));
        }
        Ok(serde_json::to_string(&value)?)
    }
}

/// Client → server events, dispatched on `type` by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    AuthResponse {
        address: Address,
        signature: Bytes,
        challenge_id: String,
    },
    JoinQueue {},
    LeaveQueue {},
    JoinTournamentQueue {},
    LeaveTournamentQueue {},
    #[serde(rename_all = "camelCase")]
    MatchMessage { match_id: u64, message: String },
    #[serde(rename_all = "camelCase")]
    ChoiceSubmitted {
        match_id: u64,
        choice: Choice,
        signature: Bytes,
    },
    #[serde(rename_all = "camelCase")]
    TournamentJoinSigned {
        tournament_id: u64,
        join_signature: Bytes,
        permit_deadline: U256,
        v: u8,
        r: B256,
        s: B256,
    },
    Disconnect {},
}
