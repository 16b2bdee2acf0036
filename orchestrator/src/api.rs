//! Public read endpoints. Semantics mirror the component query operations;
//! everything here is read-only JSON.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;

use signals_core::error::Error;
use signals_core::types::Address;

use crate::context::ApplicationContext;
use crate::frame::{LobbyFrame, QueueFrame, TournamentFrame};

const LEADERBOARD_PAGE: u32 = 20;

pub enum ApiError {
    NotFound,
    BadRequest(String),
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::MatchNotFound(_) | Error::TournamentNotFound(_) => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND.into_response(),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            }
        }
    }
}

type Ctx = State<Arc<ApplicationContext>>;

pub fn router() -> Router<Arc<ApplicationContext>> {
    Router::new()
        .route("/match/:id", get(match_by_id))
        .route("/matches/active", get(active_matches))
        .route("/matches/recent", get(recent_matches))
        .route("/pool/:id", get(pool))
        .route("/odds/:id", get(odds))
        .route("/queue", get(queue_sizes))
        .route("/tournament/:id", get(tournament_by_id))
        .route("/tournament/:id/standings", get(standings))
        .route("/tournaments", get(tournaments))
        .route("/agent/:addr/stats", get(agent_stats))
        .route("/agent/:addr/matches", get(agent_matches))
        .route("/bettor/:addr/bets", get(bettor_bets))
        .route("/leaderboard", get(leaderboard))
        .route("/stats", get(aggregate_stats))
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid address: {raw}")))
}

fn live_match_json(info: &crate::component::MatchInfo) -> serde_json::Value {
    json!({
        "matchId": info.match_id,
        "tournamentId": info.tournament_id,
        "round": info.round,
        "agentA": info.agent_a,
        "agentB": info.agent_b,
        "agentAName": info.agent_a_name,
        "agentBName": info.agent_b_name,
        "state": info.phase(),
        "messages": *info.messages.lock().expect("messages lock"),
    })
}

async fn match_by_id(
    Path(id): Path<u64>,
    State(ctx): Ctx,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(info) = ctx.manager.get_info(id).await {
        return Ok(Json(live_match_json(&info)));
    }
    let record = ctx.ledger.get_match(id).await?;
    Ok(Json(json!(record)))
}

async fn active_matches(State(ctx): Ctx) -> Json<serde_json::Value> {
    let matches: Vec<_> = ctx
        .manager
        .active_matches()
        .await
        .iter()
        .map(|info| live_match_json(info))
        .collect();
    Json(json!(matches))
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<u32>,
}

async fn recent_matches(Query(query): Query<PageQuery>, State(ctx): Ctx) -> Json<serde_json::Value> {
    // Recent = everything still in the registry, newest first, paged.
    let page = query.page.unwrap_or(0) as usize;
    let mut infos = ctx.manager.all_matches().await;
    infos.sort_by(|a, b| b.match_id.cmp(&a.match_id));
    let matches: Vec<_> = infos
        .iter()
        .skip(page * 20)
        .take(20)
        .map(|info| live_match_json(info))
        .collect();
    Json(json!(matches))
}

async fn pool(Path(id): Path<u64>, State(ctx): Ctx) -> Result<Json<serde_json::Value>, ApiError> {
    let pool = ctx.ledger.get_pool(id).await?;
    Ok(Json(json!(pool)))
}

async fn odds(Path(id): Path<u64>, State(ctx): Ctx) -> Result<Json<serde_json::Value>, ApiError> {
    let odds = ctx.ledger.get_odds(id).await?;
    Ok(Json(json!(odds)))
}

async fn queue_sizes(State(ctx): Ctx) -> Json<serde_json::Value> {
    let quick = {
        let (resp, rx) = oneshot::channel();
        let _ = ctx.quick_queue_tx.send(QueueFrame::Size { resp }).await;
        rx.await.unwrap_or(0)
    };
    let tournament = {
        let (resp, rx) = oneshot::channel();
        let _ = ctx.lobby_tx.send(LobbyFrame::Size { resp }).await;
        rx.await.unwrap_or(0)
    };
    Json(json!({ "quickMatch": quick, "tournament": tournament }))
}

async fn tournament_by_id(
    Path(id): Path<u64>,
    State(ctx): Ctx,
) -> Result<Json<serde_json::Value>, ApiError> {
    let onchain = ctx.ledger.get_tournament(id).await?;
    let standings = {
        let (resp, rx) = oneshot::channel();
        let _ = ctx
            .controller_tx
            .send(TournamentFrame::Standings {
                tournament_id: id,
                resp,
            })
            .await;
        rx.await.ok().flatten()
    };
    Ok(Json(json!({ "tournament": onchain, "standings": standings })))
}

async fn standings(
    Path(id): Path<u64>,
    State(ctx): Ctx,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (resp, rx) = oneshot::channel();
    let _ = ctx
        .controller_tx
        .send(TournamentFrame::Standings {
            tournament_id: id,
            resp,
        })
        .await;
    match rx.await.ok().flatten() {
        Some(standings) => Ok(Json(standings)),
        None => Err(ApiError::NotFound),
    }
}

async fn tournaments(State(ctx): Ctx) -> Json<serde_json::Value> {
    let (resp, rx) = oneshot::channel();
    let _ = ctx.controller_tx.send(TournamentFrame::ActiveIds { resp }).await;
    let ids = rx.await.unwrap_or_default();
    Json(json!({ "active": ids }))
}

async fn agent_stats(
    Path(addr): Path<String>,
    State(ctx): Ctx,
) -> Result<Json<serde_json::Value>, ApiError> {
    let address = parse_address(&addr)?;
    let stats = ctx.ledger.get_agent_stats(address).await?;
    Ok(Json(json!(stats)))
}

async fn agent_matches(
    Path(addr): Path<String>,
    State(ctx): Ctx,
) -> Result<Json<serde_json::Value>, ApiError> {
    let address = parse_address(&addr)?;
    let ids = ctx.ledger.get_agent_match_ids(address).await?;
    Ok(Json(json!(ids)))
}

async fn bettor_bets(
    Path(addr): Path<String>,
    State(ctx): Ctx,
) -> Result<Json<serde_json::Value>, ApiError> {
    let address = parse_address(&addr)?;
    let ids = ctx.ledger.get_bettor_match_ids(address).await?;
    let mut bets = vec![];
    for id in ids {
        if let Ok(bet) = ctx.ledger.get_bet(id, address).await {
            bets.push(bet);
        }
    }
    Ok(Json(json!(bets)))
}

async fn leaderboard(
    Query(query): Query<PageQuery>,
    State(ctx): Ctx,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = query.page.unwrap_or(0);
    let entries = ctx
        .ledger
        .leaderboard(page * LEADERBOARD_PAGE, LEADERBOARD_PAGE)
        .await?;
    Ok(Json(json!(entries)))
}

async fn aggregate_stats(State(ctx): Ctx) -> Json<serde_json::Value> {
    let connections = ctx.broadcaster.stats().await;
    let live_matches = ctx.manager.live_match_count().await;
    let quick = {
        let (resp, rx) = oneshot::channel();
        let _ = ctx.quick_queue_tx.send(QueueFrame::Size { resp }).await;
        rx.await.unwrap_or(0)
    };
    let lobby = {
        let (resp, rx) = oneshot::channel();
        let _ = ctx.lobby_tx.send(LobbyFrame::Size { resp }).await;
        rx.await.unwrap_or(0)
    };
    let (resp, rx) = oneshot::channel();
    let _ = ctx.controller_tx.send(TournamentFrame::ActiveIds { resp }).await;
    let active_tournaments = rx.await.map(|ids| ids.len()).unwrap_or(0);

    Json(json!({
        "connections": connections,
        "liveMatches": live_matches,
        "queueSizes": { "quickMatch": quick, "tournament": lobby },
        "activeTournaments": active_tournaments,
    }))
}
