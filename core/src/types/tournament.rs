use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::Error;

use super::common::{Address, U256};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TournamentState {
    #[default]
    None = 0,
    Registration = 1,
    Active = 2,
    Final = 3,
    Complete = 4,
    Cancelled = 5,
}

impl From<TournamentState> for u8 {
    fn from(s: TournamentState) -> u8 {
        s as u8
    }
}

impl TryFrom<u8> for TournamentState {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self, Error> {
        match v {
            0 => Ok(TournamentState::None),
            1 => Ok(TournamentState::Registration),
            2 => Ok(TournamentState::Active),
            3 => Ok(TournamentState::Final),
            4 => Ok(TournamentState::Complete),
            5 => Ok(TournamentState::Cancelled),
            _ => Err(Error::InvalidEnumValue(v)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentPlayer {
    pub address: Address,
    pub name: String,
    pub points: u32,
    pub matches_played: u32,
    pub has_bye: bool,
}

impl TournamentPlayer {
    pub fn new(address: Address, name: String) -> Self {
        Self {
            address,
            name,
            points: 0,
            matches_played: 0,
            has_bye: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub round_number: u32,
    pub pairs: Vec<(Address, Address)>,
    pub match_ids: Vec<u64>,
    pub completed_match_ids: HashSet<u64>,
    pub bye_player: Option<Address>,
}

impl Round {
    pub fn new(round_number: u32) -> Self {
        Self {
            round_number,
            pairs: vec![],
            match_ids: vec![],
            completed_match_ids: HashSet::new(),
            bye_player: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_match_ids.len() == self.match_ids.len()
    }
}

/// In-memory tournament record, owned by the tournament controller.
///
/// Players are kept in joining order; standings sorts are stable, so ties
/// preserve that order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tournament {
    pub id: u64,
    pub phase: TournamentState,
    pub players: Vec<TournamentPlayer>,
    #[serde(skip)]
    player_index: HashMap<Address, usize>,
    pub rounds: Vec<Round>,
    pub current_round: u32,
    pub total_rounds: u32,
    pub choice_window_secs: u32,
    #[serde(skip)]
    pub past_opponents: HashMap<Address, HashSet<Address>>,
    pub entry_stake: U256,
}

impl Tournament {
    pub fn new(id: u64, total_rounds: u32, choice_window_secs: u32, entry_stake: U256) -> Self {
        Self {
            id,
            phase: TournamentState::Registration,
            players: vec![],
            player_index: HashMap::new(),
            rounds: vec![],
            current_round: 0,
            total_rounds,
            choice_window_secs,
            past_opponents: HashMap::new(),
            entry_stake,
        }
    }

    /// Insert a player if not present. Returns whether a row was added.
    pub fn add_player(&mut self, address: Address, name: String) -> bool {
        if self.player_index.contains_key(&address) {
            return false;
        }
        self.player_index.insert(address, self.players.len());
        self.players.push(TournamentPlayer::new(address, name));
        true
    }

    pub fn player(&self, address: &Address) -> Option<&TournamentPlayer> {
        self.player_index.get(address).map(|i| &self.players[*i])
    }

    pub fn player_mut(&mut self, address: &Address) -> Option<&mut TournamentPlayer> {
        self.player_index
            .get(address)
            .map(|i| &mut self.players[*i])
    }

    pub fn record_opponents(&mut self, a: Address, b: Address) {
        self.past_opponents.entry(a).or_default().insert(b);
        self.past_opponents.entry(b).or_default().insert(a);
    }

    pub fn have_played(&self, a: &Address, b: &Address) -> bool {
        self.past_opponents
            .get(a)
            .is_some_and(|set| set.contains(b))
    }

    pub fn current_round_mut(&mut self) -> Option<&mut Round> {
        let idx = self.current_round.checked_sub(1)? as usize;
        self.rounds.get_mut(idx)
    }

    /// Players sorted by points descending; stable, so ties keep joining order.
    pub fn standings(&self) -> Vec<TournamentPlayer> {
        let mut ranked = self.players.clone();
        ranked.sort_by(|a, b| b.points.cmp(&a.points));
        ranked
    }
}

/// Tournament record as read from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentOnChain {
    pub id: u64,
    pub state: TournamentState,
    pub entry_stake: U256,
    pub max_players: u32,
    pub total_rounds: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentPlayerStats {
    pub points: u32,
    pub matches_played: u32,
}
