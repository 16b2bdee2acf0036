//! Serialized operator-nonce allocation. The chain is only consulted when
//! the local view is unknown or was invalidated by a nonce error.

use std::future::Future;

use tokio::sync::Mutex;

use signals_core::error::Result;

#[derive(Default)]
pub struct NonceManager {
    next: Mutex<Option<u64>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next nonce, fetching the on-chain transaction count when
    /// the local view is empty. The lock spans the fetch, so concurrent
    /// reservations stay serialized.
    pub async fn reserve<F, Fut>(&self, fetch: F) -> Result<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64>>,
    {
        let mut next = self.next.lock().await;
        let nonce = match *next {
            Some(n) => n,
            None => fetch().await?,
        };
        *next = Some(nonce + 1);
        Ok(nonce)
    }

    /// Forget the local view after a nonce collision.
    pub async fn reset(&self) {
        *self.next.lock().await = None;
    }
}
