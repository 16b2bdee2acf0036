//! Registry of live matches and the address → matchId index. Creates the
//! per-match state machines and routes inbound frames to them. Records
//! stay discoverable until the retention signal removes them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};

use signals_core::error::{Error, Result};
use signals_core::ledger::LedgerT;
use signals_core::types::{addr_shorthand, Address, Bytes, Choice, MatchPhase, B256};
use signals_ledger::SettlementBatcher;
use signals_signing::SigningContext;

use crate::component::common::{Component, PortsHandle};
use crate::component::match_loop::{MatchContext, MatchInfo, MatchLoop};
use crate::component::Broadcaster;
use crate::frame::{MatchFrame, SignalFrame};

/// Everything a match state machine needs besides its own identity.
pub struct MatchDeps {
    pub ledger: Arc<dyn LedgerT>,
    pub settlements: SettlementBatcher,
    pub broadcaster: Arc<Broadcaster>,
    pub signing: SigningContext,
    pub signal_tx: mpsc::Sender<SignalFrame>,
    pub negotiation_ms: u64,
    pub choice_ms: u64,
    pub settle_grace_ms: u64,
}

struct MatchEntry {
    info: Arc<MatchInfo>,
    handle: PortsHandle<MatchFrame>,
}

pub struct MatchManager {
    deps: MatchDeps,
    matches: Mutex<HashMap<u64, MatchEntry>>,
    by_address: Mutex<HashMap<Address, u64>>,
}

impl MatchManager {
    pub fn new(deps: MatchDeps) -> Self {
        Self {
            deps,
            matches: Mutex::new(HashMap::new()),
            by_address: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a display name: live connection first, then the identity
    /// registry, then the truncated address.
    async fn resolve_name(&self, address: Address) -> String {
        if let Some(name) = self.deps.broadcaster.agent_display_name(address).await {
            return name;
        }
        match self.deps.ledger.agent_name(address).await {
            Ok(Some(name)) => name,
            _ => addr_shorthand(&address),
        }
    }

    /// Spawn the state machine for a ledger-created match. Idempotent on
    /// match id.
    pub async fn launch_match(
        &self,
        match_id: u64,
        tournament_id: u64,
        round: u32,
        agent_a: Address,
        agent_b: Address,
        choice_window_secs: Option<u32>,
    ) {
        {
            let matches = self.matches.lock().await;
            if matches.contains_key(&match_id) {
                warn!("Match {} already launched", match_id);
                return;
            }
        }
        let agent_a_name = self.resolve_name(agent_a).await;
        let agent_b_name = self.resolve_name(agent_b).await;
        let info = Arc::new(MatchInfo::new(
            match_id,
            tournament_id,
            round,
            agent_a,
            agent_b,
            agent_a_name,
            agent_b_name,
        ));
        let ctx = MatchContext {
            info: info.clone(),
            negotiation_ms: self.deps.negotiation_ms,
            choice_ms: choice_window_secs
                .map(|secs| secs as u64 * 1000)
                .unwrap_or(self.deps.choice_ms),
            settle_grace_ms: self.deps.settle_grace_ms,
            ledger: self.deps.ledger.clone(),
            settlements: self.deps.settlements.clone(),
            broadcaster: self.deps.broadcaster.clone(),
            signing: self.deps.signing,
            signal_tx: self.deps.signal_tx.clone(),
        };
        let handle = MatchLoop::start(ctx);

        let mut matches = self.matches.lock().await;
        let mut by_address = self.by_address.lock().await;
        by_address.insert(agent_a, match_id);
        by_address.insert(agent_b, match_id);
        matches.insert(match_id, MatchEntry { info, handle });
        info!("Launched match {}", match_id);
    }

    /// An address is busy while it has a registry entry that has not
    /// reached COMPLETE.
    pub async fn is_agent_busy(&self, address: Address) -> bool {
        let by_address = self.by_address.lock().await;
        let Some(match_id) = by_address.get(&address) else {
            return false;
        };
        let matches = self.matches.lock().await;
        matches
            .get(match_id)
            .is_some_and(|entry| entry.info.phase() != MatchPhase::Complete)
    }

    pub async fn send_message(&self, match_id: u64, from: Address, body: String) -> Result<()> {
        let matches = self.matches.lock().await;
        let entry = matches.get(&match_id).ok_or(Error::MatchNotFound(match_id))?;
        entry.handle.send(MatchFrame::Message { from, body }).await;
        Ok(())
    }

    pub async fn submit_choice(
        &self,
        match_id: u64,
        from: Address,
        choice: Choice,
        signature: Bytes,
    ) -> Result<()> {
        let (resp, rx) = oneshot::channel();
        {
            let matches = self.matches.lock().await;
            let entry = matches.get(&match_id).ok_or(Error::MatchNotFound(match_id))?;
            entry
                .handle
                .send(MatchFrame::SubmitChoice {
                    from,
                    choice,
                    signature,
                    resp,
                })
                .await;
        }
        rx.await
            .map_err(|_| Error::InternalError("match loop dropped submission".into()))?
    }

    /// Settlement confirmation from the batcher. Unknown matchId is an
    /// invariant breach: log and no-op.
    pub async fn settled(&self, match_id: u64, tx_hash: B256) {
        let matches = self.matches.lock().await;
        match matches.get(&match_id) {
            Some(entry) => entry.handle.send(MatchFrame::Settled { tx_hash }).await,
            None => warn!("Settlement callback for unknown match {}", match_id),
        }
    }

    /// Retention expiry: drop the record and its index entries.
    pub async fn remove_match(&self, match_id: u64) {
        let entry = {
            let mut matches = self.matches.lock().await;
            matches.remove(&match_id)
        };
        let Some(entry) = entry else {
            return;
        };
        entry.handle.send(MatchFrame::Shutdown).await;
        let mut by_address = self.by_address.lock().await;
        by_address.retain(|_, id| *id != match_id);
        info!("Released match {}", match_id);
    }

    pub async fn get_info(&self, match_id: u64) -> Option<Arc<MatchInfo>> {
        self.matches
            .lock()
            .await
            .get(&match_id)
            .map(|e| e.info.clone())
    }

    pub async fn active_matches(&self) -> Vec<Arc<MatchInfo>> {
        self.matches
            .lock()
            .await
            .values()
            .filter(|e| e.info.phase() != MatchPhase::Complete)
            .map(|e| e.info.clone())
            .collect()
    }

    /// Everything still in the registry, completed matches included.
    pub async fn all_matches(&self) -> Vec<Arc<MatchInfo>> {
        self.matches
            .lock()
            .await
            .values()
            .map(|e| e.info.clone())
            .collect()
    }

    pub async fn live_match_count(&self) -> u32 {
        self.active_matches().await.len() as u32
    }

    pub async fn shutdown(&self) {
        let matches = self.matches.lock().await;
        for entry in matches.values() {
            entry.handle.send(MatchFrame::Shutdown).await;
        }
    }
}
