use std::future::Future;
use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionReceipt;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

use signals_core::error::{Error, Result};
use signals_core::ledger::LedgerT;
use signals_core::types::{
    Address, AgentStats, Bet, BettingPool, Choice, CreateTournamentParams, JoinTournamentParams,
    LeaderboardEntry, MatchRecord, MatchResult, PartialTimeoutParams, PoolOdds, PoolState,
    SettlementParams, TournamentOnChain, TournamentPlayerStats, TournamentState, B256, U256,
};
use signals_env::Config;

use crate::abi::{IAgentRegistry, IMulticall3, ISignalsGame};
use crate::cache::TtlCache;
use crate::nonce::NonceManager;
use crate::retry::{
    backoff_delay, classify, ErrorClass, MAX_ATTEMPTS, NONCE_BACKOFF_CAP, RATE_LIMIT_BACKOFF_CAP,
};

fn rpc_err<E: std::fmt::Display>(e: E) -> Error {
    Error::RpcError(e.to_string())
}

/// The EVM-backed ledger gateway. Owns the operator key; all writes funnel
/// through one gate so the operator nonce stays serialized.
pub struct EvmLedger {
    provider: DynProvider,
    fallback: Option<DynProvider>,
    operator: Address,
    game_addr: Address,
    registry_addr: Address,
    multicall_addr: Address,
    batch_cap: usize,
    write_gate: Mutex<()>,
    nonces: NonceManager,
    stats_cache: TtlCache<Address, AgentStats>,
    nonce_cache: TtlCache<Address, U256>,
    registration_cache: TtlCache<Address, bool>,
    leaderboard_cache: TtlCache<(u32, u32), Vec<LeaderboardEntry>>,
    settled_match_cache: TtlCache<u64, MatchRecord>,
    name_cache: TtlCache<Address, String>,
}

impl EvmLedger {
    pub async fn try_new(config: &Config) -> Result<Self> {
        let signer: PrivateKeySigner = config
            .operator_key
            .parse()
            .map_err(|_| Error::SigningError("invalid operator key".into()))?;
        let operator = signer.address();
        info!("Operator address: {}", operator);

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect(&config.rpc_url)
            .await
            .map_err(rpc_err)?
            .erased();

        let fallback = match &config.rpc_url_fallback {
            Some(url) => Some(
                ProviderBuilder::new()
                    .connect(url)
                    .await
                    .map_err(rpc_err)?
                    .erased(),
            ),
            None => None,
        };

        Ok(Self {
            provider,
            fallback,
            operator,
            game_addr: config.game_contract,
            registry_addr: config.registry_contract,
            multicall_addr: config.multicall_contract,
            batch_cap: config.timing.batch_cap,
            write_gate: Mutex::new(()),
            nonces: NonceManager::new(),
            stats_cache: TtlCache::new(Some(Duration::from_secs(60))),
            nonce_cache: TtlCache::new(Some(Duration::from_secs(30))),
            registration_cache: TtlCache::new(Some(Duration::from_secs(300))),
            leaderboard_cache: TtlCache::new(Some(Duration::from_secs(30))),
            settled_match_cache: TtlCache::new(None),
            name_cache: TtlCache::new(None),
        })
    }

    fn game(&self) -> ISignalsGame::ISignalsGameInstance<DynProvider> {
        ISignalsGame::new(self.game_addr, self.provider.clone())
    }

    /// Run a read against the primary, retrying transient failures with
    /// back-off; after the budget is spent, try the fallback RPC once.
    async fn read<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err = Error::RpcError("unreachable".into());
        for attempt in 0..MAX_ATTEMPTS {
            match call(self.provider.clone()).await {
                Ok(v) => return Ok(v),
                Err(e) => match classify(&e.to_string()) {
                    ErrorClass::RateLimit | ErrorClass::Transport => {
                        warn!("Read {} failed, attempt {}: {}", op, attempt + 1, e);
                        sleep(backoff_delay(attempt, RATE_LIMIT_BACKOFF_CAP)).await;
                        last_err = e;
                    }
                    _ => return Err(e),
                },
            }
        }
        match &self.fallback {
            Some(fallback) => {
                info!("Read {} on fallback RPC", op);
                call(fallback.clone()).await
            }
            None => Err(last_err),
        }
    }

    /// Submit a write with the serialized operator nonce. Nonce collisions
    /// reset the manager; rate limits and transport failures back off. Both
    /// budgets are bounded at [`MAX_ATTEMPTS`].
    async fn send_write<F, Fut>(&self, op: &'static str, build: F) -> Result<TransactionReceipt>
    where
        F: Fn(u64) -> Fut,
        Fut: Future<Output = Result<TransactionReceipt>>,
    {
        let _gate = self.write_gate.lock().await;
        let mut nonce_attempts = 0u32;
        let mut transient_attempts = 0u32;
        loop {
            let nonce = self
                .nonces
                .reserve(|| async {
                    self.provider
                        .get_transaction_count(self.operator)
                        .pending()
                        .await
                        .map_err(rpc_err)
                })
                .await?;

            match build(nonce).await {
                Ok(receipt) => {
                    if receipt.status() {
                        return Ok(receipt);
                    }
                    return Err(Error::TxReverted(format!(
                        "{} reverted in {}",
                        op, receipt.transaction_hash
                    )));
                }
                Err(e) => match classify(&e.to_string()) {
                    ErrorClass::Nonce => {
                        nonce_attempts += 1;
                        if nonce_attempts > MAX_ATTEMPTS {
                            return Err(Error::RetriesExhausted(format!("{}: {}", op, e)));
                        }
                        warn!("Nonce collision on {}, resetting signer nonce: {}", op, e);
                        self.nonces.reset().await;
                        sleep(backoff_delay(nonce_attempts - 1, NONCE_BACKOFF_CAP)).await;
                    }
                    ErrorClass::RateLimit | ErrorClass::Transport => {
                        transient_attempts += 1;
                        if transient_attempts > MAX_ATTEMPTS {
                            return Err(Error::RetriesExhausted(format!("{}: {}", op, e)));
                        }
                        warn!("Transient failure on {}: {}", op, e);
                        // The tx may or may not have landed; refetch the nonce.
                        self.nonces.reset().await;
                        sleep(backoff_delay(transient_attempts - 1, RATE_LIMIT_BACKOFF_CAP)).await;
                    }
                    ErrorClass::Terminal => return Err(Error::TxReverted(format!("{}: {}", op, e))),
                },
            }
        }
    }

    fn decode_match_ids(receipt: &TransactionReceipt) -> Result<Vec<u64>> {
        let mut ids = vec![];
        for log in receipt.inner.logs() {
            if let Ok(decoded) = log.log_decode::<ISignalsGame::MatchCreated>() {
                let id = u64::try_from(decoded.inner.data.matchId)
                    .map_err(|_| Error::LogDecodeFailed("matchId out of range".into()))?;
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Err(Error::LogDecodeFailed("no MatchCreated logs".into()));
        }
        Ok(ids)
    }
}

fn stats_from_view(agent: Address, view: ISignalsGame::AgentStatsView) -> AgentStats {
    AgentStats {
        address: agent,
        total_points: u64::try_from(view.totalPoints).unwrap_or(u64::MAX),
        matches_played: view.matchesPlayed,
        splits: view.splits,
        steals: view.steals,
        timeouts: view.timeouts,
    }
}

fn record_from_view(view: ISignalsGame::MatchView) -> Result<MatchRecord> {
    Ok(MatchRecord {
        match_id: u64::try_from(view.matchId)
            .map_err(|_| Error::LogDecodeFailed("matchId out of range".into()))?,
        tournament_id: u64::try_from(view.tournamentId).unwrap_or(0),
        agent_a: view.agentA,
        agent_b: view.agentB,
        choice_a: Choice::try_from(view.choiceA)?,
        choice_b: Choice::try_from(view.choiceB)?,
        result: if view.settled {
            MatchResult::try_from(view.result).ok()
        } else {
            None
        },
        settled: view.settled,
    })
}

fn split_pairs(pairs: &[(Address, Address)]) -> (Vec<Address>, Vec<Address>) {
    pairs.iter().map(|(a, b)| (*a, *b)).unzip()
}

fn ids_to_u256(ids: &[u64]) -> Vec<U256> {
    ids.iter().map(|id| U256::from(*id)).collect()
}

fn u256_ids(raw: Vec<U256>) -> Vec<u64> {
    raw.into_iter()
        .filter_map(|id| u64::try_from(id).ok())
        .collect()
}

#[async_trait]
impl LedgerT for EvmLedger {
    async fn create_quick_match_batch(&self, pairs: Vec<(Address, Address)>) -> Result<Vec<u64>> {
        let mut ids = Vec::with_capacity(pairs.len());
        for chunk in pairs.chunks(self.batch_cap) {
            let (agents_a, agents_b) = split_pairs(chunk);
            let receipt = self
                .send_write("createQuickMatchBatch", |nonce| {
                    let game = self.game();
                    let agents_a = agents_a.clone();
                    let agents_b = agents_b.clone();
                    async move {
                        game.createQuickMatchBatch(agents_a, agents_b)
                            .nonce(nonce)
                            .send()
                            .await
                            .map_err(rpc_err)?
                            .get_receipt()
                            .await
                            .map_err(rpc_err)
                    }
                })
                .await?;
            ids.extend(Self::decode_match_ids(&receipt)?);
        }
        Ok(ids)
    }

    async fn create_tournament_match_batch(
        &self,
        tournament_id: u64,
        pairs: Vec<(Address, Address)>,
        choice_window_secs: u32,
    ) -> Result<Vec<u64>> {
        let mut ids = Vec::with_capacity(pairs.len());
        for chunk in pairs.chunks(self.batch_cap) {
            let (agents_a, agents_b) = split_pairs(chunk);
            let receipt = self
                .send_write("createTournamentMatchBatch", |nonce| {
                    let game = self.game();
                    let agents_a = agents_a.clone();
                    let agents_b = agents_b.clone();
                    async move {
                        game.createTournamentMatchBatch(
                            U256::from(tournament_id),
                            agents_a,
                            agents_b,
                            U256::from(choice_window_secs),
                        )
                        .nonce(nonce)
                        .send()
                        .await
                        .map_err(rpc_err)?
                        .get_receipt()
                        .await
                        .map_err(rpc_err)
                    }
                })
                .await?;
            ids.extend(Self::decode_match_ids(&receipt)?);
        }
        Ok(ids)
    }

    async fn settle_multiple(&self, settlements: Vec<SettlementParams>) -> Result<B256> {
        let entries: Vec<ISignalsGame::Settlement> =
            settlements.into_iter().map(Into::into).collect();
        let receipt = self
            .send_write("settleMultiple", |nonce| {
                let game = self.game();
                let entries = entries.clone();
                async move {
                    game.settleMultiple(entries)
                        .nonce(nonce)
                        .send()
                        .await
                        .map_err(rpc_err)?
                        .get_receipt()
                        .await
                        .map_err(rpc_err)
                }
            })
            .await?;
        Ok(receipt.transaction_hash)
    }

    async fn settle_timeout(&self, match_id: u64) -> Result<B256> {
        let receipt = self
            .send_write("settleTimeout", |nonce| {
                let game = self.game();
                async move {
                    game.settleTimeout(U256::from(match_id))
                        .nonce(nonce)
                        .send()
                        .await
                        .map_err(rpc_err)?
                        .get_receipt()
                        .await
                        .map_err(rpc_err)
                }
            })
            .await?;
        self.invalidate_settlement_caches();
        Ok(receipt.transaction_hash)
    }

    async fn settle_partial_timeout(&self, params: PartialTimeoutParams) -> Result<B256> {
        let receipt = self
            .send_write("settlePartialTimeout", |nonce| {
                let game = self.game();
                let params = params.clone();
                async move {
                    game.settlePartialTimeout(
                        U256::from(params.match_id),
                        params.choice.into(),
                        params.nonce,
                        params.sig,
                        params.agent_a_timed_out,
                    )
                    .nonce(nonce)
                    .send()
                    .await
                    .map_err(rpc_err)?
                    .get_receipt()
                    .await
                    .map_err(rpc_err)
                }
            })
            .await?;
        self.invalidate_settlement_caches();
        Ok(receipt.transaction_hash)
    }

    async fn close_betting(&self, match_id: u64) -> Result<B256> {
        let receipt = self
            .send_write("closeBetting", |nonce| {
                let game = self.game();
                async move {
                    game.closeBetting(U256::from(match_id))
                        .nonce(nonce)
                        .send()
                        .await
                        .map_err(rpc_err)?
                        .get_receipt()
                        .await
                        .map_err(rpc_err)
                }
            })
            .await?;
        Ok(receipt.transaction_hash)
    }

    async fn close_betting_batch(&self, match_ids: Vec<u64>) -> Result<B256> {
        let ids = ids_to_u256(&match_ids);
        let receipt = self
            .send_write("closeBettingBatch", |nonce| {
                let game = self.game();
                let ids = ids.clone();
                async move {
                    game.closeBettingBatch(ids)
                        .nonce(nonce)
                        .send()
                        .await
                        .map_err(rpc_err)?
                        .get_receipt()
                        .await
                        .map_err(rpc_err)
                }
            })
            .await?;
        Ok(receipt.transaction_hash)
    }

    async fn create_tournament(&self, params: CreateTournamentParams) -> Result<u64> {
        let receipt = self
            .send_write("createTournament", |nonce| {
                let game = self.game();
                let params = params.clone();
                async move {
                    game.createTournament(
                        params.entry_stake,
                        params.max_players as u8,
                        params.total_rounds as u8,
                        U256::from(params.registration_duration_secs),
                    )
                    .nonce(nonce)
                    .send()
                    .await
                    .map_err(rpc_err)?
                    .get_receipt()
                    .await
                    .map_err(rpc_err)
                }
            })
            .await?;
        for log in receipt.inner.logs() {
            if let Ok(decoded) = log.log_decode::<ISignalsGame::TournamentCreated>() {
                return u64::try_from(decoded.inner.data.tournamentId)
                    .map_err(|_| Error::LogDecodeFailed("tournamentId out of range".into()));
            }
        }
        Err(Error::LogDecodeFailed("no TournamentCreated log".into()))
    }

    async fn start_tournament(&self, tournament_id: u64) -> Result<B256> {
        let receipt = self
            .send_write("startTournament", |nonce| {
                let game = self.game();
                async move {
                    game.startTournament(U256::from(tournament_id))
                        .nonce(nonce)
                        .send()
                        .await
                        .map_err(rpc_err)?
                        .get_receipt()
                        .await
                        .map_err(rpc_err)
                }
            })
            .await?;
        Ok(receipt.transaction_hash)
    }

    async fn cancel_tournament(&self, tournament_id: u64) -> Result<B256> {
        let receipt = self
            .send_write("cancelTournament", |nonce| {
                let game = self.game();
                async move {
                    game.cancelTournament(U256::from(tournament_id))
                        .nonce(nonce)
                        .send()
                        .await
                        .map_err(rpc_err)?
                        .get_receipt()
                        .await
                        .map_err(rpc_err)
                }
            })
            .await?;
        Ok(receipt.transaction_hash)
    }

    async fn advance_to_final(&self, tournament_id: u64) -> Result<B256> {
        let receipt = self
            .send_write("advanceToFinal", |nonce| {
                let game = self.game();
                async move {
                    game.advanceToFinal(U256::from(tournament_id))
                        .nonce(nonce)
                        .send()
                        .await
                        .map_err(rpc_err)?
                        .get_receipt()
                        .await
                        .map_err(rpc_err)
                }
            })
            .await?;
        Ok(receipt.transaction_hash)
    }

    async fn complete_tournament(&self, tournament_id: u64) -> Result<B256> {
        let receipt = self
            .send_write("completeTournament", |nonce| {
                let game = self.game();
                async move {
                    game.completeTournament(U256::from(tournament_id))
                        .nonce(nonce)
                        .send()
                        .await
                        .map_err(rpc_err)?
                        .get_receipt()
                        .await
                        .map_err(rpc_err)
                }
            })
            .await?;
        Ok(receipt.transaction_hash)
    }

    async fn set_final_rankings(&self, tournament_id: u64, ranked: Vec<Address>) -> Result<B256> {
        let receipt = self
            .send_write("setFinalRankings", |nonce| {
                let game = self.game();
                let ranked = ranked.clone();
                async move {
                    game.setFinalRankings(U256::from(tournament_id), ranked)
                        .nonce(nonce)
                        .send()
                        .await
                        .map_err(rpc_err)?
                        .get_receipt()
                        .await
                        .map_err(rpc_err)
                }
            })
            .await?;
        Ok(receipt.transaction_hash)
    }

    async fn join_tournament_for(&self, params: JoinTournamentParams) -> Result<B256> {
        let receipt = self
            .send_write("joinTournamentFor", |nonce| {
                let game = self.game();
                let params = params.clone();
                async move {
                    game.joinTournamentFor(
                        U256::from(params.tournament_id),
                        params.agent,
                        params.nonce,
                        params.join_sig,
                        params.permit_deadline,
                        params.v,
                        params.r,
                        params.s,
                    )
                    .nonce(nonce)
                    .send()
                    .await
                    .map_err(rpc_err)?
                    .get_receipt()
                    .await
                    .map_err(rpc_err)
                }
            })
            .await?;
        Ok(receipt.transaction_hash)
    }

    async fn get_match(&self, match_id: u64) -> Result<MatchRecord> {
        if let Some(record) = self.settled_match_cache.get(&match_id) {
            return Ok(record);
        }
        let game_addr = self.game_addr;
        let view = self
            .read("getMatch", |provider| async move {
                ISignalsGame::new(game_addr, provider)
                    .getMatch(U256::from(match_id))
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await?;
        let record = record_from_view(view)?;
        if record.settled {
            self.settled_match_cache.insert(match_id, record.clone());
        }
        Ok(record)
    }

    async fn get_pool(&self, match_id: u64) -> Result<BettingPool> {
        let game_addr = self.game_addr;
        let view = self
            .read("getPool", |provider| async move {
                ISignalsGame::new(game_addr, provider)
                    .getPool(U256::from(match_id))
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await?;
        Ok(BettingPool {
            match_id,
            state: PoolState::try_from(view.state)?,
            total: view.total,
            outcome_pools: view.outcomePools,
        })
    }

    async fn get_odds(&self, match_id: u64) -> Result<PoolOdds> {
        let game_addr = self.game_addr;
        let odds = self
            .read("getOdds", |provider| async move {
                ISignalsGame::new(game_addr, provider)
                    .getOdds(U256::from(match_id))
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await?;
        Ok(PoolOdds { match_id, odds })
    }

    async fn choice_nonce(&self, agent: Address) -> Result<U256> {
        if let Some(nonce) = self.nonce_cache.get(&agent) {
            return Ok(nonce);
        }
        let game_addr = self.game_addr;
        let nonce = self
            .read("choiceNonces", |provider| async move {
                ISignalsGame::new(game_addr, provider)
                    .choiceNonces(agent)
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await?;
        self.nonce_cache.insert(agent, nonce);
        Ok(nonce)
    }

    async fn is_registered(&self, agent: Address) -> Result<bool> {
        if let Some(registered) = self.registration_cache.get(&agent) {
            return Ok(registered);
        }
        let registry_addr = self.registry_addr;
        let registered = self
            .read("isRegistered", |provider| async move {
                IAgentRegistry::new(registry_addr, provider)
                    .isRegistered(agent)
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await?;
        self.registration_cache.insert(agent, registered);
        Ok(registered)
    }

    async fn agent_name(&self, agent: Address) -> Result<Option<String>> {
        if let Some(name) = self.name_cache.get(&agent) {
            return Ok(Some(name));
        }
        let registry_addr = self.registry_addr;
        let info = self
            .read("getAgentByWallet", |provider| async move {
                IAgentRegistry::new(registry_addr, provider)
                    .getAgentByWallet(agent)
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await;
        match info {
            Ok(info) if !info.name.is_empty() => {
                self.name_cache.insert(agent, info.name.clone());
                Ok(Some(info.name))
            }
            _ => Ok(None),
        }
    }

    async fn get_agent_stats(&self, agent: Address) -> Result<AgentStats> {
        if let Some(stats) = self.stats_cache.get(&agent) {
            return Ok(stats);
        }
        let game_addr = self.game_addr;
        let view = self
            .read("getAgentStats", |provider| async move {
                ISignalsGame::new(game_addr, provider)
                    .getAgentStats(agent)
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await?;
        let stats = stats_from_view(agent, view);
        self.stats_cache.insert(agent, stats.clone());
        Ok(stats)
    }

    async fn get_multi_agent_stats(&self, agents: Vec<Address>) -> Result<Vec<AgentStats>> {
        if agents.is_empty() {
            return Ok(vec![]);
        }
        let calls: Vec<IMulticall3::Call3> = agents
            .iter()
            .map(|agent| IMulticall3::Call3 {
                target: self.game_addr,
                allowFailure: true,
                callData: ISignalsGame::getAgentStatsCall { agent: *agent }
                    .abi_encode()
                    .into(),
            })
            .collect();
        let multicall_addr = self.multicall_addr;
        let results = self
            .read("aggregate3", |provider| {
                let calls = calls.clone();
                async move {
                    IMulticall3::new(multicall_addr, provider)
                        .aggregate3(calls)
                        .call()
                        .await
                        .map_err(rpc_err)
                }
            })
            .await?;

        let mut out = Vec::with_capacity(agents.len());
        for (agent, result) in agents.iter().zip(results) {
            if !result.success {
                return Err(Error::RpcError(format!("stats call failed for {agent}")));
            }
            let view = ISignalsGame::getAgentStatsCall::abi_decode_returns(&result.returnData)
                .map_err(|e| Error::LogDecodeFailed(e.to_string()))?;
            let stats = stats_from_view(*agent, view);
            self.stats_cache.insert(*agent, stats.clone());
            out.push(stats);
        }
        Ok(out)
    }

    async fn get_agent_match_ids(&self, agent: Address) -> Result<Vec<u64>> {
        let game_addr = self.game_addr;
        let raw = self
            .read("getAgentMatchIds", |provider| async move {
                ISignalsGame::new(game_addr, provider)
                    .getAgentMatchIds(agent)
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await?;
        Ok(u256_ids(raw))
    }

    async fn get_bettor_match_ids(&self, bettor: Address) -> Result<Vec<u64>> {
        let game_addr = self.game_addr;
        let raw = self
            .read("getBettorMatchIds", |provider| async move {
                ISignalsGame::new(game_addr, provider)
                    .getBettorMatchIds(bettor)
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await?;
        Ok(u256_ids(raw))
    }

    async fn get_bet(&self, match_id: u64, bettor: Address) -> Result<Bet> {
        let game_addr = self.game_addr;
        let view = self
            .read("getBet", |provider| async move {
                ISignalsGame::new(game_addr, provider)
                    .getBet(U256::from(match_id), bettor)
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await?;
        Ok(Bet {
            match_id,
            bettor,
            outcome: MatchResult::try_from(view.outcome)?,
            amount: view.amount,
            claimed: view.claimed,
        })
    }

    async fn get_tournament(&self, tournament_id: u64) -> Result<TournamentOnChain> {
        let game_addr = self.game_addr;
        let view = self
            .read("tournaments", |provider| async move {
                ISignalsGame::new(game_addr, provider)
                    .tournaments(U256::from(tournament_id))
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await?;
        Ok(TournamentOnChain {
            id: tournament_id,
            state: TournamentState::try_from(view.state)?,
            entry_stake: view.entryStake,
            max_players: view.maxPlayers as u32,
            total_rounds: view.totalRounds as u32,
        })
    }

    async fn get_tournament_players(&self, tournament_id: u64) -> Result<Vec<Address>> {
        // Derived from match history on chain; the in-memory roster is the
        // live source, this read backs the public endpoints.
        let game_addr = self.game_addr;
        let ids = self
            .read("getTournamentMatchIds", |provider| async move {
                ISignalsGame::new(game_addr, provider)
                    .getTournamentMatchIds(U256::from(tournament_id))
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await?;
        let mut players = vec![];
        for id in u256_ids(ids) {
            let record = self.get_match(id).await?;
            if !players.contains(&record.agent_a) {
                players.push(record.agent_a);
            }
            if !players.contains(&record.agent_b) {
                players.push(record.agent_b);
            }
        }
        Ok(players)
    }

    async fn get_tournament_match_ids(&self, tournament_id: u64) -> Result<Vec<u64>> {
        let game_addr = self.game_addr;
        let raw = self
            .read("getTournamentMatchIds", |provider| async move {
                ISignalsGame::new(game_addr, provider)
                    .getTournamentMatchIds(U256::from(tournament_id))
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await?;
        Ok(u256_ids(raw))
    }

    async fn get_player_stats(
        &self,
        tournament_id: u64,
        agent: Address,
    ) -> Result<TournamentPlayerStats> {
        let game_addr = self.game_addr;
        let view = self
            .read("getPlayerStats", |provider| async move {
                ISignalsGame::new(game_addr, provider)
                    .getPlayerStats(U256::from(tournament_id), agent)
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await?;
        Ok(TournamentPlayerStats {
            points: view.points,
            matches_played: view.matchesPlayed,
        })
    }

    async fn leaderboard(&self, offset: u32, count: u32) -> Result<Vec<LeaderboardEntry>> {
        if let Some(page) = self.leaderboard_cache.get(&(offset, count)) {
            return Ok(page);
        }
        let game_addr = self.game_addr;
        let page = self
            .read("getLeaderboard", |provider| async move {
                ISignalsGame::new(game_addr, provider)
                    .getLeaderboard(U256::from(offset), U256::from(count))
                    .call()
                    .await
                    .map_err(rpc_err)
            })
            .await?;
        let mut entries = Vec::with_capacity(page.agents.len());
        for (i, agent) in page.agents.iter().enumerate() {
            entries.push(LeaderboardEntry {
                address: *agent,
                name: self.name_cache.get(agent),
                total_points: page
                    .points
                    .get(i)
                    .and_then(|p| u64::try_from(*p).ok())
                    .unwrap_or(0),
                matches_played: page.matchesPlayed.get(i).copied().unwrap_or(0),
            });
        }
        self.leaderboard_cache.insert((offset, count), entries.clone());
        Ok(entries)
    }

    fn invalidate_settlement_caches(&self) {
        self.stats_cache.clear();
        self.leaderboard_cache.clear();
        self.nonce_cache.clear();
    }
}

impl From<SettlementParams> for ISignalsGame::Settlement {
    fn from(p: SettlementParams) -> Self {
        Self {
            matchId: U256::from(p.match_id),
            choiceA: p.choice_a.into(),
            nonceA: p.nonce_a,
            sigA: p.sig_a,
            choiceB: p.choice_b.into(),
            nonceB: p.nonce_b,
            sigB: p.sig_b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signals_core::types::Bytes;

    #[test]
    fn test_settlement_abi_conversion() {
        let params = SettlementParams {
            match_id: 7,
            choice_a: Choice::Split,
            nonce_a: U256::from(1),
            sig_a: Bytes::from(vec![1u8; 65]),
            choice_b: Choice::Steal,
            nonce_b: U256::from(2),
            sig_b: Bytes::from(vec![2u8; 65]),
        };
        let entry: ISignalsGame::Settlement = params.into();
        assert_eq!(entry.matchId, U256::from(7));
        assert_eq!(entry.choiceA, 1);
        assert_eq!(entry.choiceB, 2);
    }

    #[test]
    fn test_record_from_view_unsettled_has_no_result() {
        let view = ISignalsGame::MatchView {
            matchId: U256::from(3),
            tournamentId: U256::ZERO,
            agentA: Address::repeat_byte(1),
            agentB: Address::repeat_byte(2),
            choiceA: 0,
            choiceB: 0,
            result: 0,
            settled: false,
        };
        let record = record_from_view(view).unwrap();
        assert_eq!(record.result, None);
        assert!(!record.settled);
    }
}
