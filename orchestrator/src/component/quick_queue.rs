//! The quick-match queue: FIFO holding area with a debounced pairing pass.
//! Pairing is greedy in arrival order and avoids immediate rematches
//! unless the queue is down to two agents.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::select;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};

use signals_core::error::Error;
use signals_core::ledger::LedgerT;
use signals_core::types::{Address, ServerEvent};

use crate::component::common::{CloseReason, Component, ConsumerPorts, Ports};
use crate::component::{Broadcaster, MatchManager};
use crate::frame::QueueFrame;

pub struct QuickQueueContext {
    pub ledger: Arc<dyn LedgerT>,
    pub manager: Arc<MatchManager>,
    pub broadcaster: Arc<Broadcaster>,
    pub debounce_ms: u64,
}

pub struct QuickQueue {}

struct QueueState {
    queue: VecDeque<Address>,
    queued: HashSet<Address>,
    last_opponent: HashMap<Address, Address>,
    deadline: Option<Instant>,
}

#[async_trait]
impl Component<ConsumerPorts<QueueFrame>, QuickQueueContext> for QuickQueue {
    fn name() -> &'static str {
        "Quick-Match Queue"
    }

    async fn run(mut ports: ConsumerPorts<QueueFrame>, ctx: QuickQueueContext) {
        let mut state = QueueState {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            last_opponent: HashMap::new(),
            deadline: None,
        };

        loop {
            let fire_at = state
                .deadline
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
            select! {
                frame = ports.recv() => match frame {
                    None | Some(QueueFrame::Shutdown) => break,
                    Some(QueueFrame::Join { agent, resp }) => {
                        let result = join(&ctx, &mut state, agent).await;
                        let _ = resp.send(result);
                    }
                    Some(QueueFrame::Leave { agent }) => {
                        if state.queued.remove(&agent) {
                            state.queue.retain(|a| *a != agent);
                            broadcast_size(&ctx, &state).await;
                        }
                    }
                    Some(QueueFrame::Contains { agent, resp }) => {
                        let _ = resp.send(state.queued.contains(&agent));
                    }
                    Some(QueueFrame::Size { resp }) => {
                        let _ = resp.send(state.queue.len() as u32);
                    }
                },
                _ = sleep_until(fire_at), if state.deadline.is_some() => {
                    state.deadline = None;
                    pairing_pass(&ctx, &mut state).await;
                }
            }
        }
        ports.close(CloseReason::Complete);
    }
}

async fn join(
    ctx: &QuickQueueContext,
    state: &mut QueueState,
    agent: Address,
) -> signals_core::error::Result<()> {
    if state.queued.contains(&agent) {
        return Err(Error::AgentAlreadyQueued);
    }
    if ctx.manager.is_agent_busy(agent).await {
        return Err(Error::AgentInLiveMatch);
    }
    state.queue.push_back(agent);
    state.queued.insert(agent);
    if state.deadline.is_none() {
        state.deadline = Some(Instant::now() + Duration::from_millis(ctx.debounce_ms));
    }

    let queue_size = state.queue.len() as u32;
    ctx.broadcaster
        .send_to_agent(
            agent,
            &ServerEvent::QueueJoined {
                position: queue_size,
                queue_size,
            },
        )
        .await;
    broadcast_size(ctx, state).await;
    Ok(())
}

async fn broadcast_size(ctx: &QuickQueueContext, state: &QueueState) {
    ctx.broadcaster
        .broadcast_public(&ServerEvent::QueueUpdate {
            queue_size: state.queue.len() as u32,
        })
        .await;
}

/// One pairing pass over the queue. Paired agents are committed to the
/// ledger; on failure they are dropped, not re-queued.
async fn pairing_pass(ctx: &QuickQueueContext, state: &mut QueueState) {
    let pairs = pair_fifo(&mut state.queue, &mut state.queued, &state.last_opponent);
    if !pairs.is_empty() {
        for (a, b) in &pairs {
            state.last_opponent.insert(*a, *b);
            state.last_opponent.insert(*b, *a);
        }
        match ctx.ledger.create_quick_match_batch(pairs.clone()).await {
            Ok(match_ids) => {
                info!("Created {} quick matches", match_ids.len());
                for (match_id, (agent_a, agent_b)) in match_ids.into_iter().zip(pairs) {
                    ctx.manager
                        .launch_match(match_id, 0, 0, agent_a, agent_b, None)
                        .await;
                }
            }
            Err(e) => {
                // Policy: paired agents are not re-queued on create failure.
                error!("Quick match batch failed, {} pairs dropped: {}", pairs.len(), e);
            }
        }
        broadcast_size(ctx, state).await;
    }
    if state.queue.len() >= 2 {
        state.deadline = Some(Instant::now() + Duration::from_millis(ctx.debounce_ms));
        warn!("{} agents left unpaired, scheduling another pass", state.queue.len());
    }
}

/// Greedy FIFO-biased pairing. For each still-unpaired agent in arrival
/// order, take the first later agent that is not its last opponent; the
/// rematch constraint is relaxed when only two agents are queued.
fn pair_fifo(
    queue: &mut VecDeque<Address>,
    queued: &mut HashSet<Address>,
    last_opponent: &HashMap<Address, Address>,
) -> Vec<(Address, Address)> {
    let relax = queue.len() <= 2;
    let arrival: Vec<Address> = queue.iter().copied().collect();
    let mut paired: HashSet<Address> = HashSet::new();
    let mut pairs = vec![];

    for (i, a) in arrival.iter().enumerate() {
        if paired.contains(a) {
            continue;
        }
        for b in arrival.iter().skip(i + 1) {
            if paired.contains(b) {
                continue;
            }
            let rematch = last_opponent.get(b) == Some(a) || last_opponent.get(a) == Some(b);
            if rematch && !relax {
                continue;
            }
            paired.insert(*a);
            paired.insert(*b);
            pairs.push((*a, *b));
            break;
        }
    }

    queue.retain(|a| !paired.contains(a));
    queued.retain(|a| !paired.contains(a));
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::common::PortsHandle;
    use crate::component::MatchDeps;
    use signals_ledger::SettlementBatcher;
    use signals_signing::SigningContext;
    use signals_test::MockLedger;
    use tokio::sync::{mpsc, oneshot};
    use tokio::time::sleep;

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    async fn start_queue() -> (PortsHandle<QueueFrame>, Arc<MockLedger>) {
        let ledger: Arc<MockLedger> = Arc::new(MockLedger::default());
        let broadcaster = Arc::new(Broadcaster::new());
        let (signal_tx, _signal_rx) = mpsc::channel(8);
        let settlements = SettlementBatcher::start(ledger.clone(), 20, 30);
        let manager = Arc::new(MatchManager::new(MatchDeps {
            ledger: ledger.clone(),
            settlements,
            broadcaster: broadcaster.clone(),
            signing: SigningContext::new(31337, Address::repeat_byte(0x99)),
            signal_tx,
            negotiation_ms: 10_000,
            choice_ms: 10_000,
            settle_grace_ms: 10_000,
        }));
        let handle = QuickQueue::start(QuickQueueContext {
            ledger: ledger.clone(),
            manager,
            broadcaster,
            debounce_ms: 30,
        });
        (handle, ledger)
    }

    async fn join_queue(handle: &PortsHandle<QueueFrame>, agent: Address) -> signals_core::error::Result<()> {
        let (resp, rx) = oneshot::channel();
        handle.send(QueueFrame::Join { agent, resp }).await;
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_pairing_after_debounce() {
        let (handle, ledger) = start_queue().await;
        join_queue(&handle, addr(1)).await.unwrap();
        join_queue(&handle, addr(2)).await.unwrap();
        sleep(Duration::from_millis(100)).await;

        let created = ledger.created_matches();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].agent_a, addr(1));
        assert_eq!(created[0].agent_b, addr(2));
    }

    #[tokio::test]
    async fn test_duplicate_join_rejected() {
        let (handle, _ledger) = start_queue().await;
        join_queue(&handle, addr(1)).await.unwrap();
        assert_eq!(
            join_queue(&handle, addr(1)).await.unwrap_err(),
            Error::AgentAlreadyQueued
        );
        // Membership unchanged.
        let (resp, rx) = oneshot::channel();
        handle.send(QueueFrame::Size { resp }).await;
        assert_eq!(rx.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_agent_in_match_rejected() {
        let (handle, ledger) = start_queue().await;
        join_queue(&handle, addr(1)).await.unwrap();
        join_queue(&handle, addr(2)).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(ledger.created_matches().len(), 1);

        assert_eq!(
            join_queue(&handle, addr(1)).await.unwrap_err(),
            Error::AgentInLiveMatch
        );
    }

    #[tokio::test]
    async fn test_create_failure_does_not_requeue() {
        let (handle, ledger) = start_queue().await;
        ledger.fail_next_creates(1);
        join_queue(&handle, addr(1)).await.unwrap();
        join_queue(&handle, addr(2)).await.unwrap();
        sleep(Duration::from_millis(100)).await;

        assert!(ledger.created_matches().is_empty());
        let (resp, rx) = oneshot::channel();
        handle.send(QueueFrame::Size { resp }).await;
        assert_eq!(rx.await.unwrap(), 0);
    }

    #[test]
    fn test_anti_rematch_pairing() {
        // [A, B, A', B'] where A and B just played: expect (A, A'), (B, B').
        let mut queue: VecDeque<Address> = [addr(1), addr(2), addr(3), addr(4)].into();
        let mut queued: HashSet<Address> = queue.iter().copied().collect();
        let mut last = HashMap::new();
        last.insert(addr(1), addr(2));
        last.insert(addr(2), addr(1));

        let pairs = pair_fifo(&mut queue, &mut queued, &last);
        assert_eq!(pairs, vec![(addr(1), addr(3)), (addr(2), addr(4))]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_rematch_relaxed_at_two() {
        let mut queue: VecDeque<Address> = [addr(1), addr(2)].into();
        let mut queued: HashSet<Address> = queue.iter().copied().collect();
        let mut last = HashMap::new();
        last.insert(addr(1), addr(2));
        last.insert(addr(2), addr(1));

        let pairs = pair_fifo(&mut queue, &mut queued, &last);
        assert_eq!(pairs, vec![(addr(1), addr(2))]);
    }

    #[test]
    fn test_odd_agent_left_queued() {
        let mut queue: VecDeque<Address> = [addr(1), addr(2), addr(3)].into();
        let mut queued: HashSet<Address> = queue.iter().copied().collect();
        let pairs = pair_fifo(&mut queue, &mut queued, &HashMap::new());
        assert_eq!(pairs, vec![(addr(1), addr(2))]);
        assert_eq!(queue, VecDeque::from([addr(3)]));
    }

    #[test]
    fn test_empty_queue_is_noop() {
        let mut queue = VecDeque::new();
        let mut queued = HashSet::new();
        assert!(pair_fifo(&mut queue, &mut queued, &HashMap::new()).is_empty());
    }
}
