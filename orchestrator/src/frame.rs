//! Frames passed between components. Every component owns one input
//! channel; cross-component notifications travel as [`SignalFrame`]s
//! through the context signal loop.

use tokio::sync::oneshot;

use signals_core::error::Result;
use signals_core::types::{
    Address, Bytes, Choice, CreateTournamentParams, MatchResult, B256, U256,
};

/// Top-level signals handled by the application context.
#[derive(Debug)]
pub enum SignalFrame {
    MatchComplete {
        match_id: u64,
        tournament_id: u64,
        agent_a: Address,
        agent_b: Address,
        outcome: MatchOutcome,
    },
    RemoveMatch {
        match_id: u64,
    },
    Shutdown,
}

impl std::fmt::Display for SignalFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalFrame::MatchComplete { match_id, .. } => {
                write!(f, "MatchComplete: {}", match_id)
            }
            SignalFrame::RemoveMatch { match_id } => write!(f, "RemoveMatch: {}", match_id),
            SignalFrame::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Canonical outcome of a match, produced exactly once on the transition
/// into COMPLETE. Tournament scoring reads points only from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Revealed {
        result: MatchResult,
        choice_a: Choice,
        choice_b: Choice,
    },
    PartialTimeout {
        agent_a_submitted: bool,
    },
    BothTimeout,
    /// Settlement could not be submitted; nothing was awarded.
    Abandoned,
}

impl MatchOutcome {
    /// Points awarded to (agentA, agentB).
    pub fn points(&self) -> (u32, u32) {
        match self {
            MatchOutcome::Revealed { result, .. } => result.points(),
            MatchOutcome::PartialTimeout { agent_a_submitted } => {
                if *agent_a_submitted {
                    (1, 0)
                } else {
                    (0, 1)
                }
            }
            MatchOutcome::BothTimeout | MatchOutcome::Abandoned => (0, 0),
        }
    }
}

/// Input of a match state machine.
#[derive(Debug)]
pub enum MatchFrame {
    Message {
        from: Address,
        body: String,
    },
    SubmitChoice {
        from: Address,
        choice: Choice,
        signature: Bytes,
        resp: oneshot::Sender<Result<()>>,
    },
    Settled {
        tx_hash: B256,
    },
    Shutdown,
}

impl std::fmt::Display for MatchFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchFrame::Message { from, .. } => write!(f, "Message from {}", from),
            MatchFrame::SubmitChoice { from, .. } => write!(f, "SubmitChoice from {}", from),
            MatchFrame::Settled { tx_hash } => write!(f, "Settled in {}", tx_hash),
            MatchFrame::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Input of the quick-match queue.
#[derive(Debug)]
pub enum QueueFrame {
    Join {
        agent: Address,
        resp: oneshot::Sender<Result<()>>,
    },
    Leave {
        agent: Address,
    },
    Contains {
        agent: Address,
        resp: oneshot::Sender<bool>,
    },
    Size {
        resp: oneshot::Sender<u32>,
    },
    Shutdown,
}

/// Input of the tournament controller.
#[derive(Debug)]
pub enum TournamentFrame {
    Create {
        params: CreateTournamentParams,
        choice_window_secs: u32,
        resp: oneshot::Sender<Result<u64>>,
    },
    RegisterPlayer {
        tournament_id: u64,
        agent: Address,
    },
    Start {
        tournament_id: u64,
    },
    Cancel {
        tournament_id: u64,
    },
    MatchComplete {
        tournament_id: u64,
        match_id: u64,
        agent_a: Address,
        agent_b: Address,
        points_a: u32,
        points_b: u32,
    },
    Standings {
        tournament_id: u64,
        resp: oneshot::Sender<Option<serde_json::Value>>,
    },
    ActiveIds {
        resp: oneshot::Sender<Vec<u64>>,
    },
    Shutdown,
}

/// Input of the tournament queue (lobby).
#[derive(Debug)]
pub enum LobbyFrame {
    Join {
        agent: Address,
        resp: oneshot::Sender<Result<()>>,
    },
    Leave {
        agent: Address,
    },
    JoinSigned {
        agent: Address,
        tournament_id: u64,
        join_signature: Bytes,
        permit_deadline: U256,
        v: u8,
        r: B256,
        s: B256,
    },
    Size {
        resp: oneshot::Sender<u32>,
    },
    Shutdown,
}
