//! Inbound event dispatch. Every event except `AUTH_RESPONSE` requires the
//! connection to be bound to a verified agent address.

use tokio::sync::oneshot;
use tracing::{info, warn};

use signals_core::types::{addr_shorthand, Address, Bytes, ClientEvent, ServerEvent};

use crate::context::ApplicationContext;
use crate::frame::{LobbyFrame, QueueFrame};

pub async fn handle_client_event(ctx: &ApplicationContext, conn_id: u64, event: ClientEvent) {
    match event {
        ClientEvent::AuthResponse {
            address,
            signature,
            challenge_id,
        } => {
            handle_auth(ctx, conn_id, address, signature, challenge_id).await;
        }
        other => {
            let Some(address) = ctx.broadcaster.connection_address(conn_id).await else {
                send_error(ctx, conn_id, "Not authenticated").await;
                return;
            };
            handle_authenticated(ctx, conn_id, address, other).await;
        }
    }
}

async fn handle_auth(
    ctx: &ApplicationContext,
    conn_id: u64,
    address: Address,
    signature: Bytes,
    challenge_id: String,
) {
    if !ctx.auth.verify_challenge(&challenge_id, address, &signature) {
        ctx.broadcaster
            .send_to(
                conn_id,
                &ServerEvent::AuthFailed {
                    reason: "Invalid signature or expired challenge".into(),
                },
            )
            .await;
        return;
    }
    match ctx.ledger.is_registered(address).await {
        Ok(true) => (),
        Ok(false) => {
            ctx.broadcaster
                .send_to(
                    conn_id,
                    &ServerEvent::AuthFailed {
                        reason: "Agent not registered".into(),
                    },
                )
                .await;
            return;
        }
        Err(e) => {
            warn!("Registration check failed for {}: {}", address, e);
            ctx.broadcaster
                .send_to(
                    conn_id,
                    &ServerEvent::AuthFailed {
                        reason: "Registration check failed".into(),
                    },
                )
                .await;
            return;
        }
    }

    let name = match ctx.ledger.agent_name(address).await {
        Ok(Some(name)) => name,
        _ => addr_shorthand(&address),
    };
    ctx.broadcaster
        .authenticate_agent(conn_id, address, name.clone())
        .await;
    info!("Agent {} authenticated as {}", address, name);
    ctx.broadcaster
        .send_to(conn_id, &ServerEvent::AuthSuccess { address, name })
        .await;
}

async fn handle_authenticated(
    ctx: &ApplicationContext,
    conn_id: u64,
    address: Address,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinQueue {} => {
            let (resp, rx) = oneshot::channel();
            ctx.quick_queue_tx
                .send(QueueFrame::Join {
                    agent: address,
                    resp,
                })
                .await
                .ok();
            match rx.await {
                Ok(Ok(())) => (),
                Ok(Err(e)) => send_error(ctx, conn_id, &e.to_string()).await,
                Err(_) => send_error(ctx, conn_id, "Queue unavailable").await,
            }
        }
        ClientEvent::LeaveQueue {} => {
            ctx.quick_queue_tx
                .send(QueueFrame::Leave { agent: address })
                .await
                .ok();
        }
        ClientEvent::JoinTournamentQueue {} => {
            let (resp, rx) = oneshot::channel();
            ctx.lobby_tx
                .send(LobbyFrame::Join {
                    agent: address,
                    resp,
                })
                .await
                .ok();
            match rx.await {
                Ok(Ok(())) => (),
                Ok(Err(e)) => send_error(ctx, conn_id, &e.to_string()).await,
                Err(_) => send_error(ctx, conn_id, "Tournament queue unavailable").await,
            }
        }
        ClientEvent::LeaveTournamentQueue {} => {
            ctx.lobby_tx
                .send(LobbyFrame::Leave { agent: address })
                .await
                .ok();
        }
        ClientEvent::MatchMessage { match_id, message } => {
            if let Err(e) = ctx.manager.send_message(match_id, address, message).await {
                send_error(ctx, conn_id, &e.to_string()).await;
            }
        }
        ClientEvent::ChoiceSubmitted {
            match_id,
            choice,
            signature,
        } => {
            if let Err(e) = ctx
                .manager
                .submit_choice(match_id, address, choice, signature)
                .await
            {
                send_error(ctx, conn_id, &e.to_string()).await;
            }
        }
        ClientEvent::TournamentJoinSigned {
            tournament_id,
            join_signature,
            permit_deadline,
            v,
            r,
            s,
        } => {
            ctx.lobby_tx
                .send(LobbyFrame::JoinSigned {
                    agent: address,
                    tournament_id,
                    join_signature,
                    permit_deadline,
                    v,
                    r,
                    s,
                })
                .await
                .ok();
        }
        ClientEvent::AuthResponse { .. } | ClientEvent::Disconnect {} => {
            // AuthResponse is handled before the auth gate; Disconnect is
            // the socket loop's concern.
        }
    }
}

async fn send_error(ctx: &ApplicationContext, conn_id: u64, message: &str) {
    ctx.broadcaster
        .send_to(
            conn_id,
            &ServerEvent::Error {
                message: message.to_string(),
            },
        )
        .await;
}
