//! An in-memory ledger for tests: records every write, assigns monotonic
//! ids, and can be told to fail upcoming calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use signals_core::error::{Error, Result};
use signals_core::ledger::LedgerT;
use signals_core::types::{
    Address, AgentStats, Bet, BettingPool, CreateTournamentParams, JoinTournamentParams,
    LeaderboardEntry, MatchRecord, PartialTimeoutParams, PoolOdds, SettlementParams,
    TournamentOnChain, TournamentPlayerStats, TournamentState, B256, U256,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedMatch {
    pub match_id: u64,
    pub tournament_id: u64,
    pub agent_a: Address,
    pub agent_b: Address,
}

#[derive(Default)]
pub struct MockLedger {
    next_match_id: AtomicU64,
    next_tournament_id: AtomicU64,
    tx_counter: AtomicU64,
    fail_settles: AtomicU32,
    fail_creates: AtomicU32,
    fail_joins: AtomicU32,
    created: Mutex<Vec<CreatedMatch>>,
    settles: Mutex<Vec<Vec<SettlementParams>>>,
    close_batches: Mutex<Vec<Vec<u64>>>,
    timeout_settles: Mutex<Vec<u64>>,
    partial_settles: Mutex<Vec<PartialTimeoutParams>>,
    joins: Mutex<Vec<JoinTournamentParams>>,
    rankings: Mutex<Vec<(u64, Vec<Address>)>>,
    ops: Mutex<Vec<String>>,
    nonces: Mutex<HashMap<Address, U256>>,
    names: Mutex<HashMap<Address, String>>,
    unregistered: Mutex<Vec<Address>>,
    stats: Mutex<HashMap<Address, AgentStats>>,
}

impl MockLedger {
    fn tx_hash(&self) -> B256 {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        B256::from(U256::from(n))
    }

    fn log(&self, op: impl Into<String>) {
        self.ops.lock().unwrap().push(op.into());
    }

    fn take_failure(&self, counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    // ---- knobs ----

    pub fn fail_next_settles(&self, n: u32) {
        self.fail_settles.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_creates(&self, n: u32) {
        self.fail_creates.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_joins(&self, n: u32) {
        self.fail_joins.store(n, Ordering::SeqCst);
    }

    pub fn set_nonce(&self, agent: Address, nonce: U256) {
        self.nonces.lock().unwrap().insert(agent, nonce);
    }

    pub fn set_name(&self, agent: Address, name: &str) {
        self.names.lock().unwrap().insert(agent, name.to_string());
    }

    pub fn set_unregistered(&self, agent: Address) {
        self.unregistered.lock().unwrap().push(agent);
    }

    pub fn set_stats(&self, stats: AgentStats) {
        self.stats.lock().unwrap().insert(stats.address, stats);
    }

    // ---- recorded state ----

    pub fn created_matches(&self) -> Vec<CreatedMatch> {
        self.created.lock().unwrap().clone()
    }

    pub fn settle_calls(&self) -> Vec<Vec<SettlementParams>> {
        self.settles.lock().unwrap().clone()
    }

    pub fn close_batch_calls(&self) -> Vec<Vec<u64>> {
        self.close_batches.lock().unwrap().clone()
    }

    pub fn timeout_settle_calls(&self) -> Vec<u64> {
        self.timeout_settles.lock().unwrap().clone()
    }

    pub fn partial_settle_calls(&self) -> Vec<PartialTimeoutParams> {
        self.partial_settles.lock().unwrap().clone()
    }

    pub fn join_calls(&self) -> Vec<JoinTournamentParams> {
        self.joins.lock().unwrap().clone()
    }

    pub fn ranking_calls(&self) -> Vec<(u64, Vec<Address>)> {
        self.rankings.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerT for MockLedger {
    async fn create_quick_match_batch(&self, pairs: Vec<(Address, Address)>) -> Result<Vec<u64>> {
        if self.take_failure(&self.fail_creates) {
            return Err(Error::RpcError("simulated create failure".into()));
        }
        self.log("createQuickMatchBatch");
        let mut ids = vec![];
        let mut created = self.created.lock().unwrap();
        for (agent_a, agent_b) in pairs {
            let match_id = self.next_match_id.fetch_add(1, Ordering::SeqCst) + 1;
            created.push(CreatedMatch {
                match_id,
                tournament_id: 0,
                agent_a,
                agent_b,
            });
            ids.push(match_id);
        }
        Ok(ids)
    }

    async fn create_tournament_match_batch(
        &self,
        tournament_id: u64,
        pairs: Vec<(Address, Address)>,
        _choice_window_secs: u32,
    ) -> Result<Vec<u64>> {
        if self.take_failure(&self.fail_creates) {
            return Err(Error::RpcError("simulated create failure".into()));
        }
        self.log(format!("createTournamentMatchBatch({tournament_id})"));
        let mut ids = vec![];
        let mut created = self.created.lock().unwrap();
        for (agent_a, agent_b) in pairs {
            let match_id = self.next_match_id.fetch_add(1, Ordering::SeqCst) + 1;
            created.push(CreatedMatch {
                match_id,
                tournament_id,
                agent_a,
                agent_b,
            });
            ids.push(match_id);
        }
        Ok(ids)
    }

    async fn settle_multiple(&self, settlements: Vec<SettlementParams>) -> Result<B256> {
        if self.take_failure(&self.fail_settles) {
            return Err(Error::RpcError("simulated settle failure".into()));
        }
        self.log("settleMultiple");
        self.settles.lock().unwrap().push(settlements);
        Ok(self.tx_hash())
    }

    async fn settle_timeout(&self, match_id: u64) -> Result<B256> {
        self.log(format!("settleTimeout({match_id})"));
        self.timeout_settles.lock().unwrap().push(match_id);
        Ok(self.tx_hash())
    }

    async fn settle_partial_timeout(&self, params: PartialTimeoutParams) -> Result<B256> {
        self.log(format!("settlePartialTimeout({})", params.match_id));
        self.partial_settles.lock().unwrap().push(params);
        Ok(self.tx_hash())
    }

    async fn close_betting(&self, match_id: u64) -> Result<B256> {
        self.log(format!("closeBetting({match_id})"));
        Ok(self.tx_hash())
    }

    async fn close_betting_batch(&self, match_ids: Vec<u64>) -> Result<B256> {
        self.log("closeBettingBatch");
        self.close_batches.lock().unwrap().push(match_ids);
        Ok(self.tx_hash())
    }

    async fn create_tournament(&self, _params: CreateTournamentParams) -> Result<u64> {
        let id = self.next_tournament_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.log(format!("createTournament -> {id}"));
        Ok(id)
    }

    async fn start_tournament(&self, tournament_id: u64) -> Result<B256> {
        self.log(format!("startTournament({tournament_id})"));
        Ok(self.tx_hash())
    }

    async fn cancel_tournament(&self, tournament_id: u64) -> Result<B256> {
        self.log(format!("cancelTournament({tournament_id})"));
        Ok(self.tx_hash())
    }

    async fn advance_to_final(&self, tournament_id: u64) -> Result<B256> {
        self.log(format!("advanceToFinal({tournament_id})"));
        Ok(self.tx_hash())
    }

    async fn complete_tournament(&self, tournament_id: u64) -> Result<B256> {
        self.log(format!("completeTournament({tournament_id})"));
        Ok(self.tx_hash())
    }

    async fn set_final_rankings(&self, tournament_id: u64, ranked: Vec<Address>) -> Result<B256> {
        self.log(format!("setFinalRankings({tournament_id})"));
        self.rankings.lock().unwrap().push((tournament_id, ranked));
        Ok(self.tx_hash())
    }

    async fn join_tournament_for(&self, params: JoinTournamentParams) -> Result<B256> {
        if self.take_failure(&self.fail_joins) {
            return Err(Error::TxReverted("simulated join revert".into()));
        }
        self.log(format!(
            "joinTournamentFor({}, {})",
            params.tournament_id, params.agent
        ));
        self.joins.lock().unwrap().push(params);
        Ok(self.tx_hash())
    }

    async fn get_match(&self, match_id: u64) -> Result<MatchRecord> {
        let created = self.created.lock().unwrap();
        let m = created
            .iter()
            .find(|m| m.match_id == match_id)
            .ok_or(Error::MatchNotFound(match_id))?;
        Ok(MatchRecord {
            match_id,
            tournament_id: m.tournament_id,
            agent_a: m.agent_a,
            agent_b: m.agent_b,
            choice_a: Default::default(),
            choice_b: Default::default(),
            result: None,
            settled: false,
        })
    }

    async fn get_pool(&self, match_id: u64) -> Result<BettingPool> {
        Ok(BettingPool {
            match_id,
            ..Default::default()
        })
    }

    async fn get_odds(&self, match_id: u64) -> Result<PoolOdds> {
        Ok(PoolOdds {
            match_id,
            ..Default::default()
        })
    }

    async fn choice_nonce(&self, agent: Address) -> Result<U256> {
        Ok(self
            .nonces
            .lock()
            .unwrap()
            .get(&agent)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn is_registered(&self, agent: Address) -> Result<bool> {
        Ok(!self.unregistered.lock().unwrap().contains(&agent))
    }

    async fn agent_name(&self, agent: Address) -> Result<Option<String>> {
        Ok(self.names.lock().unwrap().get(&agent).cloned())
    }

    async fn get_agent_stats(&self, agent: Address) -> Result<AgentStats> {
        Ok(self
            .stats
            .lock()
            .unwrap()
            .get(&agent)
            .cloned()
            .unwrap_or(AgentStats {
                address: agent,
                ..Default::default()
            }))
    }

    async fn get_multi_agent_stats(&self, agents: Vec<Address>) -> Result<Vec<AgentStats>> {
        let stats = self.stats.lock().unwrap();
        Ok(agents
            .into_iter()
            .map(|agent| {
                stats.get(&agent).cloned().unwrap_or(AgentStats {
                    address: agent,
                    ..Default::default()
                })
            })
            .collect())
    }

    async fn get_agent_match_ids(&self, agent: Address) -> Result<Vec<u64>> {
        Ok(self
            .created
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.agent_a == agent || m.agent_b == agent)
            .map(|m| m.match_id)
            .collect())
    }

    async fn get_bettor_match_ids(&self, _bettor: Address) -> Result<Vec<u64>> {
        Ok(vec![])
    }

    async fn get_bet(&self, match_id: u64, _bettor: Address) -> Result<Bet> {
        Err(Error::MatchNotFound(match_id))
    }

    async fn get_tournament(&self, tournament_id: u64) -> Result<TournamentOnChain> {
        Ok(TournamentOnChain {
            id: tournament_id,
            state: TournamentState::Registration,
            entry_stake: U256::ZERO,
            max_players: 8,
            total_rounds: 3,
        })
    }

    async fn get_tournament_players(&self, _tournament_id: u64) -> Result<Vec<Address>> {
        Ok(vec![])
    }

    async fn get_tournament_match_ids(&self, tournament_id: u64) -> Result<Vec<u64>> {
        Ok(self
            .created
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.tournament_id == tournament_id)
            .map(|m| m.match_id)
            .collect())
    }

    async fn get_player_stats(
        &self,
        _tournament_id: u64,
        _agent: Address,
    ) -> Result<TournamentPlayerStats> {
        Ok(TournamentPlayerStats::default())
    }

    async fn leaderboard(&self, _offset: u32, _count: u32) -> Result<Vec<LeaderboardEntry>> {
        Ok(vec![])
    }
}
