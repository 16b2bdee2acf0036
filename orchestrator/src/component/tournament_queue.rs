//! The tournament lobby. Collects agents until the minimum is reached,
//! creates the tournament after a short trigger delay, gathers gasless
//! join signatures under a response deadline, and either starts or
//! cancels-and-requeues.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};

use signals_core::error::{Error, Result};
use signals_core::ledger::LedgerT;
use signals_core::types::{
    current_timestamp, Address, Bytes, CreateTournamentParams, JoinTournamentParams, ServerEvent,
    B256, U256,
};
use signals_env::TournamentDefaults;
use signals_signing::SigningContext;

use crate::component::common::{CloseReason, Component, ConsumerPorts, Ports};
use crate::component::{Broadcaster, MatchManager};
use crate::frame::{LobbyFrame, QueueFrame, TournamentFrame};

pub struct TournamentQueueContext {
    pub ledger: Arc<dyn LedgerT>,
    pub manager: Arc<MatchManager>,
    pub broadcaster: Arc<Broadcaster>,
    pub controller_tx: mpsc::Sender<TournamentFrame>,
    pub quick_queue_tx: mpsc::Sender<QueueFrame>,
    pub signing: SigningContext,
    pub defaults: TournamentDefaults,
    pub token_contract: Address,
    pub game_contract: Address,
}

struct PendingTournament {
    tournament_id: u64,
    invited: Vec<Address>,
    nonces: HashMap<Address, U256>,
    joined: HashSet<Address>,
    deadline: Instant,
}

struct LobbyState {
    queue: VecDeque<Address>,
    queued: HashSet<Address>,
    trigger_deadline: Option<Instant>,
    pending: Option<PendingTournament>,
}

pub struct TournamentQueue {}

#[async_trait]
impl Component<ConsumerPorts<LobbyFrame>, TournamentQueueContext> for TournamentQueue {
    fn name() -> &'static str {
        "Tournament Queue"
    }

    async fn run(mut ports: ConsumerPorts<LobbyFrame>, ctx: TournamentQueueContext) {
        let mut state = LobbyState {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            trigger_deadline: None,
            pending: None,
        };
        let far = || Instant::now() + Duration::from_secs(3600);

        loop {
            let trigger_at = state.trigger_deadline.unwrap_or_else(far);
            let join_at = state.pending.as_ref().map(|p| p.deadline).unwrap_or_else(far);
            select! {
                frame = ports.recv() => match frame {
                    None | Some(LobbyFrame::Shutdown) => break,
                    Some(LobbyFrame::Join { agent, resp }) => {
                        let result = join(&ctx, &mut state, agent).await;
                        let _ = resp.send(result);
                    }
                    Some(LobbyFrame::Leave { agent }) => {
                        if state.queued.remove(&agent) {
                            state.queue.retain(|a| *a != agent);
                            broadcast_update(&ctx, &state).await;
                        }
                    }
                    Some(LobbyFrame::JoinSigned {
                        agent,
                        tournament_id,
                        join_signature,
                        permit_deadline,
                        v,
                        r,
                        s,
                    }) => {
                        on_join_signed(
                            &ctx, &mut state, agent, tournament_id, join_signature,
                            permit_deadline, v, r, s,
                        )
                        .await;
                    }
                    Some(LobbyFrame::Size { resp }) => {
                        let _ = resp.send(state.queue.len() as u32);
                    }
                },
                _ = sleep_until(trigger_at), if state.trigger_deadline.is_some() => {
                    state.trigger_deadline = None;
                    trigger(&ctx, &mut state).await;
                }
                _ = sleep_until(join_at), if state.pending.is_some() => {
                    on_join_deadline(&ctx, &mut state).await;
                }
            }
        }
        ports.close(CloseReason::Complete);
    }
}

async fn join(
    ctx: &TournamentQueueContext,
    state: &mut LobbyState,
    agent: Address,
) -> Result<()> {
    if state.pending.is_some() {
        return Err(Error::TournamentCreationPending);
    }
    if state.queued.contains(&agent) {
        return Err(Error::AgentAlreadyQueued);
    }
    let (resp, rx) = oneshot::channel();
    let in_quick_queue = match ctx
        .quick_queue_tx
        .send(QueueFrame::Contains { agent, resp })
        .await
    {
        Ok(()) => rx.await.unwrap_or(false),
        Err(_) => false,
    };
    if in_quick_queue {
        return Err(Error::AgentAlreadyQueued);
    }
    if ctx.manager.is_agent_busy(agent).await {
        return Err(Error::AgentInLiveMatch);
    }

    state.queue.push_back(agent);
    state.queued.insert(agent);
    let queue_size = state.queue.len() as u32;
    if queue_size >= ctx.defaults.min_players && state.trigger_deadline.is_none() {
        state.trigger_deadline =
            Some(Instant::now() + Duration::from_millis(ctx.defaults.trigger_delay_ms));
    }

    ctx.broadcaster
        .send_to_agent(
            agent,
            &ServerEvent::TournamentQueueJoined {
                position: queue_size,
                queue_size,
                min_players: ctx.defaults.min_players,
            },
        )
        .await;
    broadcast_update(ctx, state).await;
    Ok(())
}

async fn requeue(ctx: &TournamentQueueContext, state: &mut LobbyState, agents: Vec<Address>) {
    for agent in agents {
        if state.queued.insert(agent) {
            state.queue.push_back(agent);
        }
    }
    broadcast_update(ctx, state).await;
    if state.queue.len() as u32 >= ctx.defaults.min_players && state.trigger_deadline.is_none() {
        state.trigger_deadline =
            Some(Instant::now() + Duration::from_millis(ctx.defaults.trigger_delay_ms));
    }
}

async fn broadcast_update(ctx: &TournamentQueueContext, state: &LobbyState) {
    ctx.broadcaster
        .broadcast_all(&ServerEvent::TournamentQueueUpdate {
            size: state.queue.len() as u32,
            min_players: ctx.defaults.min_players,
            agents: state.queue.iter().copied().collect(),
        })
        .await;
}

/// Trigger delay elapsed: create the tournament and invite up to
/// MAX_PLAYERS from the queue to sign their joins.
async fn trigger(ctx: &TournamentQueueContext, state: &mut LobbyState) {
    if (state.queue.len() as u32) < ctx.defaults.min_players {
        return;
    }
    let take = state.queue.len().min(ctx.defaults.max_players as usize);
    let invited: Vec<Address> = state.queue.drain(..take).collect();
    for agent in &invited {
        state.queued.remove(agent);
    }

    let params = CreateTournamentParams {
        entry_stake: ctx.defaults.entry_stake,
        max_players: ctx.defaults.max_players,
        total_rounds: ctx.defaults.total_rounds,
        registration_duration_secs: ctx.defaults.registration_secs,
    };
    let (resp, rx) = oneshot::channel();
    let created = ctx
        .controller_tx
        .send(TournamentFrame::Create {
            params,
            choice_window_secs: ctx.defaults.choice_window_secs,
            resp,
        })
        .await;
    let tournament_id = match created {
        Ok(()) => match rx.await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                error!("Tournament creation failed, re-queueing invitees: {}", e);
                requeue(ctx, state, invited).await;
                return;
            }
            Err(_) => return,
        },
        Err(_) => return,
    };

    info!(
        "Tournament {} created, inviting {} agents",
        tournament_id,
        invited.len()
    );
    let mut nonces = HashMap::new();
    let permit_deadline = current_timestamp() / 1000 + ctx.defaults.registration_secs;
    for agent in &invited {
        let nonce = match ctx.ledger.choice_nonce(*agent).await {
            Ok(nonce) => nonce,
            Err(e) => {
                warn!("Nonce read failed for {}: {}", agent, e);
                U256::ZERO
            }
        };
        nonces.insert(*agent, nonce);

        let signing_payload = ctx
            .signing
            .build_tournament_join_payload(tournament_id, nonce)
            .unwrap_or(serde_json::Value::Null);
        let permit_data = serde_json::json!({
            "token": ctx.token_contract,
            "spender": ctx.game_contract,
            "value": ctx.defaults.entry_stake,
            "deadline": permit_deadline,
        });
        ctx.broadcaster
            .send_to_agent(
                *agent,
                &ServerEvent::TournamentJoinRequest {
                    tournament_id,
                    entry_stake: ctx.defaults.entry_stake,
                    nonce,
                    signing_payload,
                    permit_data,
                    registration_duration: ctx.defaults.registration_secs,
                    min_players: ctx.defaults.min_players,
                    max_players: ctx.defaults.max_players,
                    total_rounds: ctx.defaults.total_rounds,
                },
            )
            .await;
    }

    state.pending = Some(PendingTournament {
        tournament_id,
        invited,
        nonces,
        joined: HashSet::new(),
        deadline: Instant::now() + Duration::from_millis(ctx.defaults.join_timeout_ms),
    });
    broadcast_update(ctx, state).await;
}

#[allow(clippy::too_many_arguments)]
async fn on_join_signed(
    ctx: &TournamentQueueContext,
    state: &mut LobbyState,
    agent: Address,
    tournament_id: u64,
    join_signature: Bytes,
    permit_deadline: U256,
    v: u8,
    r: B256,
    s: B256,
) {
    let Some(pending) = state.pending.as_mut() else {
        warn!("Join signature without a pending tournament from {}", agent);
        return;
    };
    if pending.tournament_id != tournament_id
        || !pending.invited.contains(&agent)
        || pending.joined.contains(&agent)
    {
        ctx.broadcaster
            .send_to_agent(
                agent,
                &ServerEvent::TournamentJoinFailed {
                    tournament_id,
                    reason: "No pending join for agent".into(),
                },
            )
            .await;
        return;
    }

    let nonce = pending.nonces.get(&agent).copied().unwrap_or(U256::ZERO);
    if !ctx
        .signing
        .verify_tournament_join(tournament_id, nonce, &join_signature, agent)
    {
        ctx.broadcaster
            .send_to_agent(
                agent,
                &ServerEvent::TournamentJoinFailed {
                    tournament_id,
                    reason: "Invalid join signature".into(),
                },
            )
            .await;
        return;
    }

    let join = ctx
        .ledger
        .join_tournament_for(JoinTournamentParams {
            tournament_id,
            agent,
            nonce,
            join_sig: join_signature,
            permit_deadline,
            v,
            r,
            s,
        })
        .await;
    match join {
        Ok(tx_hash) => {
            pending.joined.insert(agent);
            let joined = pending.joined.len();
            let everyone_in = joined == pending.invited.len();
            let _ = ctx
                .controller_tx
                .send(TournamentFrame::RegisterPlayer {
                    tournament_id,
                    agent,
                })
                .await;
            ctx.broadcaster
                .send_to_agent(
                    agent,
                    &ServerEvent::TournamentJoined {
                        tournament_id,
                        tx_hash,
                    },
                )
                .await;
            info!("Agent {} joined tournament {}", agent, tournament_id);

            // Everyone answered: no reason to sit out the response window.
            if everyone_in && joined as u32 >= ctx.defaults.min_players {
                state.pending = None;
                let _ = ctx
                    .controller_tx
                    .send(TournamentFrame::Start { tournament_id })
                    .await;
            }
        }
        Err(e) => {
            warn!("joinTournamentFor failed for {}: {}", agent, e);
            ctx.broadcaster
                .send_to_agent(
                    agent,
                    &ServerEvent::TournamentJoinFailed {
                        tournament_id,
                        reason: e.to_string(),
                    },
                )
                .await;
        }
    }
}

/// Join window closed: start with a quorum, otherwise cancel and put the
/// still-connected invitees back in the queue.
async fn on_join_deadline(ctx: &TournamentQueueContext, state: &mut LobbyState) {
    let Some(pending) = state.pending.take() else {
        return;
    };
    let tournament_id = pending.tournament_id;
    if pending.joined.len() as u32 >= ctx.defaults.min_players {
        info!(
            "Tournament {} starting with {} of {} invited",
            tournament_id,
            pending.joined.len(),
            pending.invited.len()
        );
        let _ = ctx
            .controller_tx
            .send(TournamentFrame::Start { tournament_id })
            .await;
        return;
    }

    warn!(
        "Tournament {} under-subscribed ({} joined), cancelling",
        tournament_id,
        pending.joined.len()
    );
    let _ = ctx
        .controller_tx
        .send(TournamentFrame::Cancel { tournament_id })
        .await;

    for agent in pending.invited {
        if ctx.broadcaster.is_agent_connected(agent).await && !state.queued.contains(&agent) {
            state.queue.push_back(agent);
            state.queued.insert(agent);
        }
    }
    broadcast_update(ctx, state).await;
    if state.queue.len() as u32 >= ctx.defaults.min_players {
        state.trigger_deadline =
            Some(Instant::now() + Duration::from_millis(ctx.defaults.trigger_delay_ms));
    }
}
