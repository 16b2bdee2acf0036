use serde::{Deserialize, Serialize};

use crate::error::Error;

use super::common::{Address, U256};

/// Wire-identical to the ledger contract.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Choice {
    #[default]
    None = 0,
    Split = 1,
    Steal = 2,
}

impl From<Choice> for u8 {
    fn from(c: Choice) -> u8 {
        c as u8
    }
}

impl TryFrom<u8> for Choice {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self, Error> {
        match v {
            0 => Ok(Choice::None),
            1 => Ok(Choice::Split),
            2 => Ok(Choice::Steal),
            _ => Err(Error::InvalidEnumValue(v)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MatchResult {
    BothSplit = 0,
    AgentASteals = 1,
    AgentBSteals = 2,
    BothSteal = 3,
}

impl From<MatchResult> for u8 {
    fn from(r: MatchResult) -> u8 {
        r as u8
    }
}

impl TryFrom<u8> for MatchResult {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self, Error> {
        match v {
            0 => Ok(MatchResult::BothSplit),
            1 => Ok(MatchResult::AgentASteals),
            2 => Ok(MatchResult::AgentBSteals),
            3 => Ok(MatchResult::BothSteal),
            _ => Err(Error::InvalidEnumValue(v)),
        }
    }
}

impl MatchResult {
    /// Total on the 4-element domain of locked choices.
    pub fn from_choices(choice_a: Choice, choice_b: Choice) -> Option<Self> {
        match (choice_a, choice_b) {
            (Choice::Split, Choice::Split) => Some(MatchResult::BothSplit),
            (Choice::Steal, Choice::Split) => Some(MatchResult::AgentASteals),
            (Choice::Split, Choice::Steal) => Some(MatchResult::AgentBSteals),
            (Choice::Steal, Choice::Steal) => Some(MatchResult::BothSteal),
            _ => None,
        }
    }

    /// Points awarded to (agentA, agentB).
    pub fn points(&self) -> (u32, u32) {
        match self {
            MatchResult::BothSplit => (3, 3),
            MatchResult::AgentASteals => (5, 1),
            MatchResult::AgentBSteals => (1, 5),
            MatchResult::BothSteal => (0, 0),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MatchResult::BothSplit => "BOTH_SPLIT",
            MatchResult::AgentASteals => "AGENT_A_STEALS",
            MatchResult::AgentBSteals => "AGENT_B_STEALS",
            MatchResult::BothSteal => "BOTH_STEAL",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PoolState {
    #[default]
    None = 0,
    Open = 1,
    Closed = 2,
    Settled = 3,
}

impl From<PoolState> for u8 {
    fn from(s: PoolState) -> u8 {
        s as u8
    }
}

impl TryFrom<u8> for PoolState {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self, Error> {
        match v {
            0 => Ok(PoolState::None),
            1 => Ok(PoolState::Open),
            2 => Ok(PoolState::Closed),
            3 => Ok(PoolState::Settled),
            _ => Err(Error::InvalidEnumValue(v)),
        }
    }
}

/// Lifecycle of a live match as driven by the match state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchPhase {
    Negotiation,
    AwaitingChoices,
    Settling,
    Complete,
}

/// One negotiation message, kept in arrival order on the match record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMessage {
    pub from: Address,
    pub from_name: String,
    pub body: String,
    pub timestamp: u64,
}

/// Aggregate per-agent stats as read from the ledger.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStats {
    pub address: Address,
    pub total_points: u64,
    pub matches_played: u32,
    pub splits: u32,
    pub steals: u32,
    pub timeouts: u32,
}

/// A settled (or in-flight) match as read back from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub match_id: u64,
    pub tournament_id: u64,
    pub agent_a: Address,
    pub agent_b: Address,
    pub choice_a: Choice,
    pub choice_b: Choice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MatchResult>,
    pub settled: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BettingPool {
    pub match_id: u64,
    pub state: PoolState,
    pub total: U256,
    /// Indexed by `MatchResult` discriminant.
    pub outcome_pools: [U256; 4],
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolOdds {
    pub match_id: u64,
    /// Payout multiplier per outcome, scaled by 1e18.
    pub odds: [U256; 4],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    pub match_id: u64,
    pub bettor: Address,
    pub outcome: MatchResult,
    pub amount: U256,
    pub claimed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub total_points: u64,
    pub matches_played: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_total_and_bijective() {
        let domain = [
            (Choice::Split, Choice::Split),
            (Choice::Steal, Choice::Split),
            (Choice::Split, Choice::Steal),
            (Choice::Steal, Choice::Steal),
        ];
        let mut seen = vec![];
        for (a, b) in domain {
            let r = MatchResult::from_choices(a, b).unwrap();
            assert!(!seen.contains(&r));
            seen.push(r);
        }
        assert_eq!(seen.len(), 4);
        assert!(MatchResult::from_choices(Choice::None, Choice::Split).is_none());
    }

    #[test]
    fn test_scoring_table() {
        assert_eq!(MatchResult::BothSplit.points(), (3, 3));
        assert_eq!(MatchResult::AgentASteals.points(), (5, 1));
        assert_eq!(MatchResult::AgentBSteals.points(), (1, 5));
        assert_eq!(MatchResult::BothSteal.points(), (0, 0));
    }

    #[test]
    fn test_choice_wire_format() {
        assert_eq!(serde_json::to_string(&Choice::Steal).unwrap(), "2");
        assert_eq!(
            serde_json::from_str::<Choice>("1").unwrap(),
            Choice::Split
        );
        assert!(serde_json::from_str::<Choice>("9").is_err());
    }
}
