//! Application context: wires the components together and runs the signal
//! loop that routes match completions, retention cleanup, and shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use signals_core::ledger::LedgerT;
use signals_env::Config;
use signals_ledger::SettlementBatcher;
use signals_signing::SigningContext;

use crate::component::common::Component;
use crate::component::{
    AuthManager, Broadcaster, MatchDeps, MatchManager, QuickQueue, QuickQueueContext,
    TournamentContext, TournamentController, TournamentQueue, TournamentQueueContext,
};
use crate::frame::{LobbyFrame, QueueFrame, SignalFrame, TournamentFrame};

pub struct ApplicationContext {
    pub config: Config,
    pub ledger: Arc<dyn LedgerT>,
    pub broadcaster: Arc<Broadcaster>,
    pub auth: AuthManager,
    pub manager: Arc<MatchManager>,
    pub settlements: SettlementBatcher,
    pub quick_queue_tx: mpsc::Sender<QueueFrame>,
    pub controller_tx: mpsc::Sender<TournamentFrame>,
    pub lobby_tx: mpsc::Sender<LobbyFrame>,
    pub signal_tx: mpsc::Sender<SignalFrame>,
}

impl ApplicationContext {
    /// Build the component set and start the signal loop. Returns the
    /// context and the signal loop handle to await on shutdown.
    pub fn start(config: Config, ledger: Arc<dyn LedgerT>) -> (Arc<Self>, JoinHandle<()>) {
        info!("Initialize application context");
        let broadcaster = Arc::new(Broadcaster::new());
        let auth = AuthManager::new(config.timing.auth_challenge_ttl_ms);
        let signing = SigningContext::new(config.chain_id, config.game_contract);
        let settlements = SettlementBatcher::start(
            ledger.clone(),
            config.timing.settle_flush_ms,
            config.timing.batch_cap,
        );
        let (signal_tx, signal_rx) = mpsc::channel(32);

        let manager = Arc::new(MatchManager::new(MatchDeps {
            ledger: ledger.clone(),
            settlements: settlements.clone(),
            broadcaster: broadcaster.clone(),
            signing,
            signal_tx: signal_tx.clone(),
            negotiation_ms: config.timing.negotiation_ms,
            choice_ms: config.timing.choice_ms,
            settle_grace_ms: config.timing.settle_grace_ms,
        }));

        let mut quick_handle = QuickQueue::start(QuickQueueContext {
            ledger: ledger.clone(),
            manager: manager.clone(),
            broadcaster: broadcaster.clone(),
            debounce_ms: config.timing.pairing_debounce_ms,
        });
        let mut controller_handle = TournamentController::start(TournamentContext {
            ledger: ledger.clone(),
            manager: manager.clone(),
            broadcaster: broadcaster.clone(),
        });
        let mut lobby_handle = TournamentQueue::start(TournamentQueueContext {
            ledger: ledger.clone(),
            manager: manager.clone(),
            broadcaster: broadcaster.clone(),
            controller_tx: controller_handle.sender(),
            quick_queue_tx: quick_handle.sender(),
            signing,
            defaults: config.tournament.clone(),
            token_contract: config.token_contract,
            game_contract: config.game_contract,
        });

        // Settlement confirmations flow back into the owning match.
        let (settled_tx, mut settled_rx) = mpsc::unbounded_channel();
        settlements.set_on_settled(settled_tx);
        {
            let manager = manager.clone();
            tokio::spawn(async move {
                while let Some((match_id, tx_hash)) = settled_rx.recv().await {
                    manager.settled(match_id, tx_hash).await;
                }
            });
        }

        let ctx = Arc::new(Self {
            quick_queue_tx: quick_handle.sender(),
            controller_tx: controller_handle.sender(),
            lobby_tx: lobby_handle.sender(),
            signal_tx,
            config,
            ledger,
            broadcaster,
            auth,
            manager,
            settlements,
        });

        let signal_loop = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.run_signal_loop(signal_rx).await;
                quick_handle.send(QueueFrame::Shutdown).await;
                lobby_handle.send(LobbyFrame::Shutdown).await;
                controller_handle.send(TournamentFrame::Shutdown).await;
                quick_handle.wait().await;
                lobby_handle.wait().await;
                controller_handle.wait().await;
                info!("All components stopped");
            })
        };

        (ctx, signal_loop)
    }

    pub fn signing(&self) -> SigningContext {
        SigningContext::new(self.config.chain_id, self.config.game_contract)
    }

    async fn run_signal_loop(&self, mut signal_rx: mpsc::Receiver<SignalFrame>) {
        info!("Starting signal loop");
        while let Some(signal) = signal_rx.recv().await {
            match signal {
                SignalFrame::MatchComplete {
                    match_id,
                    tournament_id,
                    agent_a,
                    agent_b,
                    outcome,
                } => {
                    if tournament_id != 0 {
                        let (points_a, points_b) = outcome.points();
                        let frame = TournamentFrame::MatchComplete {
                            tournament_id,
                            match_id,
                            agent_a,
                            agent_b,
                            points_a,
                            points_b,
                        };
                        if self.controller_tx.send(frame).await.is_err() {
                            warn!("Tournament controller is gone");
                        }
                    }
                    // Keep the record discoverable, then release it.
                    let retention = Duration::from_millis(self.config.timing.match_retention_ms);
                    let signal_tx = self.signal_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(retention).await;
                        let _ = signal_tx.send(SignalFrame::RemoveMatch { match_id }).await;
                    });
                }
                SignalFrame::RemoveMatch { match_id } => {
                    self.manager.remove_match(match_id).await;
                }
                SignalFrame::Shutdown => {
                    info!("Shutting down components");
                    self.manager.shutdown().await;
                    self.settlements.shutdown();
                    break;
                }
            }
        }
    }

    pub async fn shutdown(&self) {
        if self.signal_tx.send(SignalFrame::Shutdown).await.is_err() {
            warn!("Signal loop already stopped");
        }
    }
}
