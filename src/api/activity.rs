use actix_web::{HttpResponse, Responder, get, post, web};
use log::warn;

use super::models::{
    AppState, HistoryEntry, HistoryResponse, LeaderboardEntry, LeaderboardResponse,
    error_response,
};
use crate::activity::LEADERBOARD_SIZE;
use crate::chain::format_address;
use crate::error::{BlockReason, MinerError};

/// Accepted work, newest first.
#[get("/history/")]
pub async fn get_history(state: web::Data<AppState>) -> impl Responder {
    let entries: Vec<HistoryEntry> = state.client.history().iter().map(Into::into).collect();
    HttpResponse::Ok().json(HistoryResponse {
        size: entries.len(),
        entries,
    })
}

#[get("/leaderboard/")]
pub async fn get_leaderboard(state: web::Data<AppState>) -> impl Responder {
    let entries = state
        .client
        .ranking(LEADERBOARD_SIZE)
        .into_iter()
        .enumerate()
        .map(|(i, (miner, count))| LeaderboardEntry {
            rank: i + 1,
            miner: format_address(&miner),
            count,
        })
        .collect();
    HttpResponse::Ok().json(LeaderboardResponse { entries })
}

/// Re-subscribe and rebuild history, e.g. after the feed failed on connect.
#[post("/activity/reload/")]
pub async fn reload(state: web::Data<AppState>) -> impl Responder {
    let client = state.client.clone();
    if !client.view().connected() {
        return error_response(&MinerError::PreconditionBlocked(BlockReason::NoSession));
    }
    match client.subscribe_activity().await {
        Ok(feed) => {
            actix_web::rt::spawn(client.clone().pump_live_events(feed));
            let size = client.history().len();
            HttpResponse::Ok().json(serde_json::json!({ "ok": true, "size": size }))
        }
        Err(e) => {
            warn!("ACTIVITY - reload failed: {}", e);
            error_response(&e)
        }
    }
}
