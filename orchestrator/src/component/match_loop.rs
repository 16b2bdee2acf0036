//! The per-match state machine: NEGOTIATION → AWAITING_CHOICES → SETTLING →
//! COMPLETE. One task per match; one armed deadline at a time. Everything
//! the match emits goes through the broadcaster, and its single transition
//! into COMPLETE produces the `MatchComplete` signal the tournament
//! controller scores from.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use signals_core::error::{Error, Result};
use signals_core::ledger::LedgerT;
use signals_core::types::{
    current_timestamp, Address, AgentStats, Bytes, Choice, MatchMessage, MatchPhase, MatchResult,
    PartialTimeoutParams, ServerEvent, SettlementParams, B256, U256,
};
use signals_ledger::SettlementBatcher;
use signals_signing::{generate_commit_hash, generate_match_salt, SigningContext};

use crate::component::common::{CloseReason, Component, ConsumerPorts, Ports};
use crate::component::Broadcaster;
use crate::frame::{MatchFrame, MatchOutcome, SignalFrame};

/// Match facts shared with the manager and the read API. The loop is the
/// only writer of `phase` and `messages`.
pub struct MatchInfo {
    pub match_id: u64,
    pub tournament_id: u64,
    pub round: u32,
    pub agent_a: Address,
    pub agent_b: Address,
    pub agent_a_name: String,
    pub agent_b_name: String,
    phase: AtomicU8,
    pub messages: Mutex<Vec<MatchMessage>>,
}

impl MatchInfo {
    pub fn new(
        match_id: u64,
        tournament_id: u64,
        round: u32,
        agent_a: Address,
        agent_b: Address,
        agent_a_name: String,
        agent_b_name: String,
    ) -> Self {
        Self {
            match_id,
            tournament_id,
            round,
            agent_a,
            agent_b,
            agent_a_name,
            agent_b_name,
            phase: AtomicU8::new(0),
            messages: Mutex::new(vec![]),
        }
    }

    pub fn phase(&self) -> MatchPhase {
        match self.phase.load(Ordering::SeqCst) {
            0 => MatchPhase::Negotiation,
            1 => MatchPhase::AwaitingChoices,
            2 => MatchPhase::Settling,
            _ => MatchPhase::Complete,
        }
    }

    fn set_phase(&self, phase: MatchPhase) {
        let raw = match phase {
            MatchPhase::Negotiation => 0,
            MatchPhase::AwaitingChoices => 1,
            MatchPhase::Settling => 2,
            MatchPhase::Complete => 3,
        };
        self.phase.store(raw, Ordering::SeqCst);
    }

    pub fn is_participant(&self, address: Address) -> bool {
        address == self.agent_a || address == self.agent_b
    }

    fn name_of(&self, address: Address) -> String {
        if address == self.agent_a {
            self.agent_a_name.clone()
        } else {
            self.agent_b_name.clone()
        }
    }
}

pub struct MatchContext {
    pub info: Arc<MatchInfo>,
    pub negotiation_ms: u64,
    pub choice_ms: u64,
    pub settle_grace_ms: u64,
    pub ledger: Arc<dyn LedgerT>,
    pub settlements: SettlementBatcher,
    pub broadcaster: Arc<Broadcaster>,
    pub signing: SigningContext,
    pub signal_tx: mpsc::Sender<SignalFrame>,
}

struct Side {
    choice: Choice,
    signature: Bytes,
    nonce: U256,
}

struct MatchState {
    ctx: MatchContext,
    prefix: String,
    salt: B256,
    side_a: Option<Side>,
    side_b: Option<Side>,
    nonce_a: U256,
    nonce_b: U256,
    deadline: Option<Instant>,
    outcome: Option<MatchOutcome>,
    grace_logged: bool,
}

pub struct MatchLoop {}

#[async_trait]
impl Component<ConsumerPorts<MatchFrame>, MatchContext> for MatchLoop {
    fn name() -> &'static str {
        "Match Loop"
    }

    async fn run(mut ports: ConsumerPorts<MatchFrame>, ctx: MatchContext) {
        let mut state = MatchState {
            prefix: format!("[m#{}]", ctx.info.match_id),
            ctx,
            salt: generate_match_salt(),
            side_a: None,
            side_b: None,
            nonce_a: U256::ZERO,
            nonce_b: U256::ZERO,
            deadline: None,
            outcome: None,
            grace_logged: false,
        };

        state.begin().await;

        loop {
            let fire_at = state
                .deadline
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
            select! {
                frame = ports.recv() => match frame {
                    None | Some(MatchFrame::Shutdown) => break,
                    Some(MatchFrame::Message { from, body }) => {
                        state.on_message(from, body).await;
                    }
                    Some(MatchFrame::SubmitChoice { from, choice, signature, resp }) => {
                        let result = state.on_submit(from, choice, signature).await;
                        let accepted = result.is_ok();
                        if resp.send(result).is_err() {
                            debug!("{} Submitter went away", state.prefix);
                        }
                        if accepted && state.side_a.is_some() && state.side_b.is_some() {
                            state.enter_settling().await;
                        }
                    }
                    Some(MatchFrame::Settled { tx_hash }) => {
                        state.on_settled(tx_hash).await;
                    }
                },
                _ = sleep_until(fire_at), if state.deadline.is_some() => {
                    state.deadline = None;
                    state.on_deadline().await;
                }
            }
        }
        ports.close(CloseReason::Complete);
    }
}

impl MatchState {
    fn info(&self) -> &Arc<MatchInfo> {
        &self.ctx.info
    }

    /// NEGOTIATION entry: resolve opponent stats, announce the match to
    /// both sides and the public, arm the negotiation timer.
    async fn begin(&mut self) {
        let info = self.info().clone();
        info!(
            "{} Match started: {} vs {} (tournament {})",
            self.prefix, info.agent_a_name, info.agent_b_name, info.tournament_id
        );

        let (stats_a, stats_b) = match self
            .ctx
            .ledger
            .get_multi_agent_stats(vec![info.agent_a, info.agent_b])
            .await
        {
            Ok(stats) if stats.len() == 2 => {
                let mut it = stats.into_iter();
                (it.next(), it.next())
            }
            Ok(_) => (None, None),
            Err(e) => {
                warn!("{} Stats read failed, omitting: {}", self.prefix, e);
                (None, None)
            }
        };

        let to_a = self.started_event(Some((info.agent_a, stats_b)));
        let to_b = self.started_event(Some((info.agent_b, stats_a)));
        let public = self.started_event(None);
        self.ctx.broadcaster.send_to_agent(info.agent_a, &to_a).await;
        self.ctx.broadcaster.send_to_agent(info.agent_b, &to_b).await;
        self.ctx.broadcaster.broadcast_public(&public).await;

        self.deadline = Some(Instant::now() + Duration::from_millis(self.ctx.negotiation_ms));
    }

    fn started_event(&self, personal: Option<(Address, Option<AgentStats>)>) -> ServerEvent {
        let info = self.info();
        let (you, opponent, opponent_name, opponent_stats) = match personal {
            Some((you, stats)) => {
                let opponent = if you == info.agent_a {
                    info.agent_b
                } else {
                    info.agent_a
                };
                (
                    Some(you),
                    Some(opponent),
                    Some(info.name_of(opponent)),
                    stats,
                )
            }
            None => (None, None, None, None),
        };
        ServerEvent::MatchStarted {
            match_id: info.match_id,
            agent_a: info.agent_a,
            agent_b: info.agent_b,
            agent_a_name: info.agent_a_name.clone(),
            agent_b_name: info.agent_b_name.clone(),
            tournament_id: info.tournament_id,
            negotiation_duration: self.ctx.negotiation_ms,
            choice_duration: self.ctx.choice_ms,
            you,
            opponent,
            opponent_name,
            opponent_stats,
        }
    }

    /// Relay a negotiation message to the opponent and the public.
    async fn on_message(&mut self, from: Address, body: String) {
        let info = self.info().clone();
        if info.phase() != MatchPhase::Negotiation {
            debug!("{} Message outside negotiation, ignored", self.prefix);
            return;
        }
        if !info.is_participant(from) {
            debug!("{} Message from non-participant {}", self.prefix, from);
            return;
        }
        let from_name = info.name_of(from);
        let timestamp = current_timestamp();
        info.messages
            .lock()
            .expect("messages lock")
            .push(MatchMessage {
                from,
                from_name: from_name.clone(),
                body: body.clone(),
                timestamp,
            });

        let event = ServerEvent::NegotiationMessage {
            match_id: info.match_id,
            from,
            from_name,
            message: body,
            timestamp,
        };
        let opponent = if from == info.agent_a {
            info.agent_b
        } else {
            info.agent_a
        };
        self.ctx.broadcaster.send_to_agent(opponent, &event).await;
        self.ctx.broadcaster.broadcast_public(&event).await;
    }

    /// AWAITING_CHOICES entry: fetch replay nonces, hand each side its
    /// typed payload, announce the choice phase.
    async fn enter_choice_phase(&mut self) {
        let info = self.info().clone();
        info.set_phase(MatchPhase::AwaitingChoices);

        // A failed nonce read falls back to 0; a real mismatch is caught by
        // signature verification on submit.
        self.nonce_a = match self.ctx.ledger.choice_nonce(info.agent_a).await {
            Ok(nonce) => nonce,
            Err(e) => {
                warn!("{} Nonce read failed for {}: {}", self.prefix, info.agent_a, e);
                U256::ZERO
            }
        };
        self.nonce_b = match self.ctx.ledger.choice_nonce(info.agent_b).await {
            Ok(nonce) => nonce,
            Err(e) => {
                warn!("{} Nonce read failed for {}: {}", self.prefix, info.agent_b, e);
                U256::ZERO
            }
        };

        let deadline = current_timestamp() + self.ctx.choice_ms;
        for (agent, nonce) in [(info.agent_a, self.nonce_a), (info.agent_b, self.nonce_b)] {
            let typed_data = match self.ctx.signing.build_choice_payload(info.match_id, nonce) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("{} Payload build failed: {}", self.prefix, e);
                    serde_json::Value::Null
                }
            };
            let event = ServerEvent::SignChoice {
                match_id: info.match_id,
                nonce,
                deadline,
                typed_data,
            };
            self.ctx.broadcaster.send_to_agent(agent, &event).await;
        }

        self.ctx
            .broadcaster
            .broadcast_public(&ServerEvent::ChoicePhaseStarted {
                match_id: info.match_id,
                agent_a: info.agent_a,
                agent_b: info.agent_b,
                agent_a_name: info.agent_a_name.clone(),
                agent_b_name: info.agent_b_name.clone(),
                deadline,
            })
            .await;

        self.deadline = Some(Instant::now() + Duration::from_millis(self.ctx.choice_ms));
    }

    async fn on_submit(&mut self, from: Address, choice: Choice, signature: Bytes) -> Result<()> {
        let info = self.info().clone();
        if info.phase() != MatchPhase::AwaitingChoices {
            return Err(Error::WrongMatchState(format!("{:?}", info.phase())));
        }
        if !matches!(choice, Choice::Split | Choice::Steal) {
            return Err(Error::InvalidChoice);
        }
        if !info.is_participant(from) {
            return Err(Error::NotAParticipant);
        }
        let is_a = from == info.agent_a;
        let nonce = if is_a { self.nonce_a } else { self.nonce_b };
        let slot = if is_a {
            &mut self.side_a
        } else {
            &mut self.side_b
        };
        if slot.is_some() {
            return Err(Error::ChoiceAlreadySubmitted);
        }
        if !self
            .ctx
            .signing
            .verify_choice(info.match_id, choice, nonce, &signature, from)
        {
            return Err(Error::InvalidSignature);
        }

        let commit_hash = generate_commit_hash(&signature, &self.salt);
        *slot = Some(Side {
            choice,
            signature,
            nonce,
        });
        info!("{} Choice locked by {}", self.prefix, from);

        self.ctx
            .broadcaster
            .broadcast_all(&ServerEvent::ChoiceLocked {
                match_id: info.match_id,
                agent: from,
                agent_name: info.name_of(from),
                commit_hash,
            })
            .await;
        self.ctx
            .broadcaster
            .send_to_agent(
                from,
                &ServerEvent::ChoiceAccepted {
                    match_id: info.match_id,
                    choice,
                },
            )
            .await;
        Ok(())
    }

    /// Both sides locked: reveal, enqueue the settlement tuple, and wait
    /// for the batch confirmation.
    async fn enter_settling(&mut self) {
        let info = self.info().clone();
        let (Some(a), Some(b)) = (&self.side_a, &self.side_b) else {
            error!("{} Settling without both choices", self.prefix);
            return;
        };
        let Some(result) = MatchResult::from_choices(a.choice, b.choice) else {
            error!("{} Locked choices do not form a result", self.prefix);
            return;
        };

        info.set_phase(MatchPhase::Settling);
        self.deadline = Some(Instant::now() + Duration::from_millis(self.ctx.settle_grace_ms));

        self.ctx
            .broadcaster
            .broadcast_all(&ServerEvent::ChoicesRevealed {
                match_id: info.match_id,
                agent_a: info.agent_a,
                agent_b: info.agent_b,
                choice_a: a.choice,
                choice_b: b.choice,
                sig_a: a.signature.clone(),
                sig_b: b.signature.clone(),
                nonce_a: a.nonce,
                nonce_b: b.nonce,
                result,
                result_name: result.name().to_string(),
                match_salt: self.salt,
            })
            .await;

        self.outcome = Some(MatchOutcome::Revealed {
            result,
            choice_a: a.choice,
            choice_b: b.choice,
        });
        self.ctx.settlements.enqueue(SettlementParams {
            match_id: info.match_id,
            choice_a: a.choice,
            nonce_a: a.nonce,
            sig_a: a.signature.clone(),
            choice_b: b.choice,
            nonce_b: b.nonce,
            sig_b: b.signature.clone(),
        });
    }

    async fn on_deadline(&mut self) {
        match self.info().phase() {
            MatchPhase::Negotiation => self.enter_choice_phase().await,
            MatchPhase::AwaitingChoices => self.on_choice_timeout().await,
            MatchPhase::Settling => {
                if !self.grace_logged {
                    self.grace_logged = true;
                    warn!("{} Settlement confirmation overdue", self.prefix);
                }
            }
            MatchPhase::Complete => (),
        }
    }

    /// Deadline fired with at most one signature: settle on the timeout
    /// path directly (not batched) and confirm from its receipt.
    async fn on_choice_timeout(&mut self) {
        let info = self.info().clone();
        let agent_a_submitted = self.side_a.is_some();
        let agent_b_submitted = self.side_b.is_some();
        if agent_a_submitted && agent_b_submitted {
            // Raced with the second submission; settling path owns it.
            return;
        }
        info.set_phase(MatchPhase::Settling);
        info!(
            "{} Choice timeout, submitted: a={} b={}",
            self.prefix, agent_a_submitted, agent_b_submitted
        );

        self.ctx
            .broadcaster
            .broadcast_all(&ServerEvent::ChoiceTimeout {
                match_id: info.match_id,
                agent_a: info.agent_a,
                agent_b: info.agent_b,
                agent_a_submitted,
                agent_b_submitted,
            })
            .await;

        let settled = if agent_a_submitted || agent_b_submitted {
            let side = if agent_a_submitted {
                self.side_a.as_ref()
            } else {
                self.side_b.as_ref()
            };
            let Some(side) = side else {
                error!("{} Partial timeout without a stored side", self.prefix);
                return;
            };
            self.ctx
                .ledger
                .settle_partial_timeout(PartialTimeoutParams {
                    match_id: info.match_id,
                    choice: side.choice,
                    nonce: side.nonce,
                    sig: side.signature.clone(),
                    agent_a_timed_out: !agent_a_submitted,
                })
                .await
        } else {
            self.ctx.ledger.settle_timeout(info.match_id).await
        };

        let outcome = if agent_a_submitted || agent_b_submitted {
            MatchOutcome::PartialTimeout { agent_a_submitted }
        } else {
            MatchOutcome::BothTimeout
        };

        match settled {
            Ok(tx_hash) => {
                self.ctx
                    .broadcaster
                    .broadcast_all(&ServerEvent::MatchConfirmed {
                        match_id: info.match_id,
                        tx_hash,
                        agent_a: info.agent_a,
                        agent_b: info.agent_b,
                        result: None,
                        choice_a: self.side_a.as_ref().map(|s| s.choice),
                        choice_b: self.side_b.as_ref().map(|s| s.choice),
                        timed_out: Some(true),
                    })
                    .await;
                self.complete(outcome).await;
            }
            Err(e) => {
                error!("{} Timeout settlement failed: {}", self.prefix, e);
                self.complete(MatchOutcome::Abandoned).await;
            }
        }
    }

    /// Settlement batch confirmed on the ledger.
    async fn on_settled(&mut self, tx_hash: B256) {
        let info = self.info().clone();
        if info.phase() != MatchPhase::Settling {
            warn!("{} Unexpected settlement callback, ignored", self.prefix);
            return;
        }
        let Some(outcome) = self.outcome else {
            warn!("{} Settlement callback without an outcome", self.prefix);
            return;
        };
        let (result, choice_a, choice_b) = match outcome {
            MatchOutcome::Revealed {
                result,
                choice_a,
                choice_b,
            } => (Some(result), Some(choice_a), Some(choice_b)),
            _ => (None, None, None),
        };
        self.ctx
            .broadcaster
            .broadcast_all(&ServerEvent::MatchConfirmed {
                match_id: info.match_id,
                tx_hash,
                agent_a: info.agent_a,
                agent_b: info.agent_b,
                result,
                choice_a,
                choice_b,
                timed_out: None,
            })
            .await;
        self.complete(outcome).await;
    }

    /// The single transition into COMPLETE.
    async fn complete(&mut self, outcome: MatchOutcome) {
        let info = self.info().clone();
        if info.phase() == MatchPhase::Complete {
            return;
        }
        info.set_phase(MatchPhase::Complete);
        self.deadline = None;
        info!("{} Match complete", self.prefix);

        let signal = SignalFrame::MatchComplete {
            match_id: info.match_id,
            tournament_id: info.tournament_id,
            agent_a: info.agent_a,
            agent_b: info.agent_b,
            outcome,
        };
        if self.ctx.signal_tx.send(signal).await.is_err() {
            warn!("{} Signal loop is gone", self.prefix);
        }
    }
}
