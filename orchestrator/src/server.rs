//! The WS + HTTP gateway. One websocket route carries the framed-JSON
//! agent protocol; the `/api` routes are public reads.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::select;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use signals_core::types::ServerEvent;

use crate::component::ClientKind;
use crate::context::ApplicationContext;
use crate::gateway;

pub async fn run_server(ctx: Arc<ApplicationContext>) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .nest("/api", crate::api::router())
        .layer(cors)
        .with_state(ctx.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server started at {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(ctx): State<Arc<ApplicationContext>>,
) -> impl IntoResponse {
    let kind = match params.get("role").map(String::as_str) {
        Some("agent") => ClientKind::Agent,
        Some("bettor") => ClientKind::Bettor,
        _ => ClientKind::Spectator,
    };
    ws.on_upgrade(move |socket| handle_socket(ctx, socket, kind))
}

async fn handle_socket(ctx: Arc<ApplicationContext>, socket: WebSocket, kind: ClientKind) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut outbound) = mpsc::unbounded_channel::<String>();
    let conn_id = ctx.broadcaster.add_client(kind, tx).await;
    info!("Connection {} opened as {:?}", conn_id, kind);

    // Agents are challenged immediately; the rest just watch.
    if kind == ClientKind::Agent {
        let challenge = ctx.auth.generate_challenge();
        ctx.broadcaster
            .send_to(
                conn_id,
                &ServerEvent::AuthChallenge {
                    challenge: challenge.challenge,
                    challenge_id: challenge.challenge_id,
                    expires_at: challenge.expires_at,
                },
            )
            .await;
    }

    loop {
        select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if !dispatch_frame(&ctx, conn_id, &text).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => (),
                Some(Err(e)) => {
                    debug!("Connection {} socket error: {}", conn_id, e);
                    break;
                }
            },
        }
    }

    ctx.broadcaster.remove_client(conn_id).await;
    info!("Connection {} closed", conn_id);
}

/// Returns false when the client asked to close.
async fn dispatch_frame(ctx: &ApplicationContext, conn_id: u64, text: &str) -> bool {
    match serde_json::from_str(text) {
        Ok(signals_core::types::ClientEvent::Disconnect {}) => return false,
        Ok(event) => gateway::handle_client_event(ctx, conn_id, event).await,
        Err(e) => {
            ctx.broadcaster
                .send_to(
                    conn_id,
                    &ServerEvent::Error {
                        message: format!("Malformed frame: {}", e),
                    },
                )
                .await;
        }
    }
    true
}
