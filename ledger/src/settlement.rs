//! The settlement buffer. Callers enqueue settlement tuples; a single-shot
//! debounce timer flushes the buffer in chunks of at most `batch_cap`. Each
//! chunk closes its betting pools first (failure ignored, empty pools are
//! auto-closed) and then submits one multi-settle transaction. A failed
//! chunk is re-queued whole on a shorter delay.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use signals_core::ledger::LedgerT;
use signals_core::types::{SettlementParams, B256};

enum BatcherCmd {
    Enqueue(SettlementParams),
    SetOnSettled(mpsc::UnboundedSender<(u64, B256)>),
    Shutdown,
}

/// Handle to the settlement flush task.
#[derive(Clone)]
pub struct SettlementBatcher {
    tx: mpsc::UnboundedSender<BatcherCmd>,
}

impl SettlementBatcher {
    pub fn start(ledger: Arc<dyn LedgerT>, flush_ms: u64, batch_cap: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(ledger, rx, flush_ms, batch_cap));
        Self { tx }
    }

    pub fn enqueue(&self, params: SettlementParams) {
        if self.tx.send(BatcherCmd::Enqueue(params)).is_err() {
            warn!("Settlement batcher is gone, dropping settlement");
        }
    }

    /// Register the sink for per-match confirmation callbacks. Each settled
    /// matchId is delivered at most once.
    pub fn set_on_settled(&self, sink: mpsc::UnboundedSender<(u64, B256)>) {
        let _ = self.tx.send(BatcherCmd::SetOnSettled(sink));
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(BatcherCmd::Shutdown);
    }
}

async fn run(
    ledger: Arc<dyn LedgerT>,
    mut rx: mpsc::UnboundedReceiver<BatcherCmd>,
    flush_ms: u64,
    batch_cap: usize,
) {
    let flush_delay = Duration::from_millis(flush_ms);
    let retry_delay = Duration::from_millis((flush_ms / 2).max(50));
    let mut buffer: VecDeque<SettlementParams> = VecDeque::new();
    let mut deadline: Option<Instant> = None;
    let mut on_settled: Option<mpsc::UnboundedSender<(u64, B256)>> = None;
    let mut settled_ids: HashSet<u64> = HashSet::new();

    loop {
        let fire_at = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
        select! {
            cmd = rx.recv() => match cmd {
                Some(BatcherCmd::Enqueue(params)) => {
                    buffer.push_back(params);
                    if deadline.is_none() {
                        deadline = Some(Instant::now() + flush_delay);
                    }
                }
                Some(BatcherCmd::SetOnSettled(sink)) => on_settled = Some(sink),
                Some(BatcherCmd::Shutdown) | None => break,
            },
            _ = sleep_until(fire_at), if deadline.is_some() => {
                deadline = None;
                if let Some(retry_at) = flush(
                    &*ledger,
                    &mut buffer,
                    batch_cap,
                    retry_delay,
                    &on_settled,
                    &mut settled_ids,
                ).await {
                    deadline = Some(retry_at);
                }
            }
        }
    }

    // Final drain so settlements enqueued before shutdown still land.
    if !buffer.is_empty() {
        warn!("Flushing {} settlements on shutdown", buffer.len());
        flush(
            &*ledger,
            &mut buffer,
            batch_cap,
            retry_delay,
            &on_settled,
            &mut settled_ids,
        )
        .await;
    }
}

/// Flush the buffer front-to-back in chunks. Returns the retry deadline when
/// a chunk failed and was put back.
async fn flush(
    ledger: &dyn LedgerT,
    buffer: &mut VecDeque<SettlementParams>,
    batch_cap: usize,
    retry_delay: Duration,
    on_settled: &Option<mpsc::UnboundedSender<(u64, B256)>>,
    settled_ids: &mut HashSet<u64>,
) -> Option<Instant> {
    while !buffer.is_empty() {
        let take = buffer.len().min(batch_cap);
        let chunk: Vec<SettlementParams> = buffer.drain(..take).collect();
        let match_ids: Vec<u64> = chunk.iter().map(|s| s.match_id).collect();

        // Pools with no bets are auto-closed on chain; a failure here is
        // expected and ignored.
        if let Err(e) = ledger.close_betting_batch(match_ids.clone()).await {
            info!("closeBettingBatch skipped: {}", e);
        }

        match ledger.settle_multiple(chunk.clone()).await {
            Ok(tx_hash) => {
                info!("Settled {} matches in {}", match_ids.len(), tx_hash);
                ledger.invalidate_settlement_caches();
                for match_id in match_ids {
                    if !settled_ids.insert(match_id) {
                        continue;
                    }
                    if let Some(sink) = on_settled {
                        if sink.send((match_id, tx_hash)).is_err() {
                            warn!("Settlement sink closed, match {}", match_id);
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Settlement chunk of {} failed, re-queueing: {}",
                    chunk.len(),
                    e
                );
                for params in chunk.into_iter().rev() {
                    buffer.push_front(params);
                }
                return Some(Instant::now() + retry_delay);
            }
        }
    }
    None
}
