use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    #[error("Invalid choice")]
    InvalidChoice,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Not a participant")]
    NotAParticipant,

    #[error("Choice already submitted")]
    ChoiceAlreadySubmitted,

    #[error("Wrong match state: {0}")]
    WrongMatchState(String),

    #[error("Match not found: {0}")]
    MatchNotFound(u64),

    #[error("Agent already queued")]
    AgentAlreadyQueued,

    #[error("Agent is in a live match")]
    AgentInLiveMatch,

    #[error("Tournament creation pending")]
    TournamentCreationPending,

    #[error("Tournament not found: {0}")]
    TournamentNotFound(u64),

    #[error("Wrong tournament phase: {0}")]
    WrongTournamentPhase(String),

    #[error("No pending join for agent")]
    NoPendingJoin,

    #[error("Agent not registered")]
    AgentNotRegistered,

    #[error("Challenge expired or unknown")]
    ChallengeExpired,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Unknown event type")]
    UnknownEventType,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Rpc error: {0}")]
    RpcError(String),

    #[error("Transaction reverted: {0}")]
    TxReverted(String),

    #[error("Retry budget exhausted: {0}")]
    RetriesExhausted(String),

    #[error("Failed to decode event log: {0}")]
    LogDecodeFailed(String),

    #[error("Signing error: {0}")]
    SigningError(String),

    #[error("Invalid enum value: {0}")]
    InvalidEnumValue(u8),

    #[error("Json error: {0}")]
    JsonError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::JsonError(e.to_string())
    }
}
