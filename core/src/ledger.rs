use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    Address, AgentStats, Bet, BettingPool, CreateTournamentParams, JoinTournamentParams,
    LeaderboardEntry, MatchRecord, PartialTimeoutParams, PoolOdds, SettlementParams,
    TournamentOnChain, TournamentPlayerStats, B256, U256,
};

/// The ledger gateway interface. One implementation talks to the EVM chain
/// with the operator key; the mock in `signals-test` records calls.
///
/// All writes are submitted with the operator's serialized nonce and retried
/// on transient errors inside the implementation; `Ok` means the transaction
/// was accepted and confirmed.
#[async_trait]
pub trait LedgerT: Send + Sync {
    /// Create matches for the given pairs in one transaction and return the
    /// ledger-assigned match ids, in pair order, decoded from the
    /// `MatchCreated` logs.
    async fn create_quick_match_batch(&self, pairs: Vec<(Address, Address)>) -> Result<Vec<u64>>;

    async fn create_tournament_match_batch(
        &self,
        tournament_id: u64,
        pairs: Vec<(Address, Address)>,
        choice_window_secs: u32,
    ) -> Result<Vec<u64>>;

    /// Settle a chunk of revealed matches atomically. The whole chunk
    /// succeeds or the call errors; partial application is a contract
    /// concern, not ours.
    async fn settle_multiple(&self, settlements: Vec<SettlementParams>) -> Result<B256>;

    /// Settlement path for a match where neither side submitted.
    async fn settle_timeout(&self, match_id: u64) -> Result<B256>;

    /// Settlement path for a match where exactly one side submitted.
    async fn settle_partial_timeout(&self, params: PartialTimeoutParams) -> Result<B256>;

    async fn close_betting(&self, match_id: u64) -> Result<B256>;

    async fn close_betting_batch(&self, match_ids: Vec<u64>) -> Result<B256>;

    /// Returns the new tournament id, decoded from the `TournamentCreated` log.
    async fn create_tournament(&self, params: CreateTournamentParams) -> Result<u64>;

    async fn start_tournament(&self, tournament_id: u64) -> Result<B256>;

    async fn cancel_tournament(&self, tournament_id: u64) -> Result<B256>;

    async fn advance_to_final(&self, tournament_id: u64) -> Result<B256>;

    async fn complete_tournament(&self, tournament_id: u64) -> Result<B256>;

    async fn set_final_rankings(&self, tournament_id: u64, ranked: Vec<Address>) -> Result<B256>;

    async fn join_tournament_for(&self, params: JoinTournamentParams) -> Result<B256>;

    async fn get_match(&self, match_id: u64) -> Result<MatchRecord>;

    async fn get_pool(&self, match_id: u64) -> Result<BettingPool>;

    async fn get_odds(&self, match_id: u64) -> Result<PoolOdds>;

    /// Per-address replay counter for choice signatures.
    async fn choice_nonce(&self, agent: Address) -> Result<U256>;

    async fn is_registered(&self, agent: Address) -> Result<bool>;

    /// Display name from the identity registry, if the agent has one.
    async fn agent_name(&self, agent: Address) -> Result<Option<String>>;

    async fn get_agent_stats(&self, agent: Address) -> Result<AgentStats>;

    /// One aggregated RPC for N agents' stats.
    async fn get_multi_agent_stats(&self, agents: Vec<Address>) -> Result<Vec<AgentStats>>;

    async fn get_agent_match_ids(&self, agent: Address) -> Result<Vec<u64>>;

    async fn get_bettor_match_ids(&self, bettor: Address) -> Result<Vec<u64>>;

    async fn get_bet(&self, match_id: u64, bettor: Address) -> Result<Bet>;

    async fn get_tournament(&self, tournament_id: u64) -> Result<TournamentOnChain>;

    async fn get_tournament_players(&self, tournament_id: u64) -> Result<Vec<Address>>;

    async fn get_tournament_match_ids(&self, tournament_id: u64) -> Result<Vec<u64>>;

    async fn get_player_stats(
        &self,
        tournament_id: u64,
        agent: Address,
    ) -> Result<TournamentPlayerStats>;

    async fn leaderboard(&self, offset: u32, count: u32) -> Result<Vec<LeaderboardEntry>>;

    /// Drop read caches that settlement invalidates (stats, leaderboard).
    fn invalidate_settlement_caches(&self) {}
}
