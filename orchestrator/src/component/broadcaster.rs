//! Registry of live connections. Owns the connection → session mapping;
//! every outbound event is serialized once and fanned out to a snapshot of
//! the matching senders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use signals_core::types::{Address, ServerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Agent,
    Spectator,
    Bettor,
}

struct ClientSession {
    kind: ClientKind,
    address: Option<Address>,
    name: Option<String>,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcasterStats {
    pub agents: u32,
    pub spectators: u32,
    pub bettors: u32,
    pub authenticated_agents: u32,
}

#[derive(Default)]
pub struct Broadcaster {
    clients: RwLock<HashMap<u64, ClientSession>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_client(&self, kind: ClientKind, tx: mpsc::UnboundedSender<String>) -> u64 {
        let conn_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.clients.write().await.insert(
            conn_id,
            ClientSession {
                kind,
                address: None,
                name: None,
                tx,
            },
        );
        conn_id
    }

    pub async fn remove_client(&self, conn_id: u64) {
        self.clients.write().await.remove(&conn_id);
    }

    /// Bind the verified signer to the connection.
    pub async fn authenticate_agent(&self, conn_id: u64, address: Address, name: String) -> bool {
        let mut clients = self.clients.write().await;
        match clients.get_mut(&conn_id) {
            Some(session) => {
                session.address = Some(address);
                session.name = Some(name);
                true
            }
            None => false,
        }
    }

    pub async fn connection_address(&self, conn_id: u64) -> Option<Address> {
        self.clients.read().await.get(&conn_id)?.address
    }

    pub async fn is_agent_connected(&self, address: Address) -> bool {
        self.clients
            .read()
            .await
            .values()
            .any(|s| s.address == Some(address))
    }

    pub async fn agent_display_name(&self, address: Address) -> Option<String> {
        self.clients
            .read()
            .await
            .values()
            .find(|s| s.address == Some(address))
            .and_then(|s| s.name.clone())
    }

    pub async fn send_to(&self, conn_id: u64, event: &ServerEvent) {
        let Ok(frame) = event.to_frame() else {
            warn!("Failed to serialize outbound event");
            return;
        };
        if let Some(session) = self.clients.read().await.get(&conn_id) {
            // A closed receiver just means the socket is going away.
            let _ = session.tx.send(frame);
        }
    }

    pub async fn send_to_agent(&self, address: Address, event: &ServerEvent) -> bool {
        let Ok(frame) = event.to_frame() else {
            warn!("Failed to serialize outbound event");
            return false;
        };
        let targets = self.snapshot(|s| s.address == Some(address)).await;
        let mut sent = false;
        for tx in targets {
            sent |= tx.send(frame.clone()).is_ok();
        }
        sent
    }

    /// Send to every connection whose role is in `roles`.
    pub async fn broadcast(&self, event: &ServerEvent, roles: &[ClientKind]) {
        let Ok(frame) = event.to_frame() else {
            warn!("Failed to serialize outbound event");
            return;
        };
        let targets = self.snapshot(|s| roles.contains(&s.kind)).await;
        debug!("Broadcast to {} connections", targets.len());
        for tx in targets {
            let _ = tx.send(frame.clone());
        }
    }

    pub async fn broadcast_all(&self, event: &ServerEvent) {
        self.broadcast(
            event,
            &[ClientKind::Agent, ClientKind::Spectator, ClientKind::Bettor],
        )
        .await;
    }

    /// Everyone except agents.
    pub async fn broadcast_public(&self, event: &ServerEvent) {
        self.broadcast(event, &[ClientKind::Spectator, ClientKind::Bettor])
            .await;
    }

    pub async fn stats(&self) -> BroadcasterStats {
        let clients = self.clients.read().await;
        let mut stats = BroadcasterStats {
            agents: 0,
            spectators: 0,
            bettors: 0,
            authenticated_agents: 0,
        };
        for session in clients.values() {
            match session.kind {
                ClientKind::Agent => {
                    stats.agents += 1;
                    if session.address.is_some() {
                        stats.authenticated_agents += 1;
                    }
                }
                ClientKind::Spectator => stats.spectators += 1,
                ClientKind::Bettor => stats.bettors += 1,
            }
        }
        stats
    }

    async fn snapshot<F>(&self, pred: F) -> Vec<mpsc::UnboundedSender<String>>
    where
        F: Fn(&ClientSession) -> bool,
    {
        self.clients
            .read()
            .await
            .values()
            .filter(|s| pred(s))
            .map(|s| s.tx.clone())
            .collect()
    }
}
