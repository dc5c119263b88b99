use std::sync::Arc;

use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

use crate::chain::{WorkEvent, format_address, format_ether, format_hash};
use crate::error::{BlockReason, MinerError};
use crate::session::MinerClient;
use crate::submission::Phase;

/// Shared application state: one miner session per process.
pub struct AppState {
    pub client: Arc<MinerClient>,
}

/* ---------- Session API Models ---------- */

#[derive(Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub account: Option<String>,
    pub owner: Option<String>,
    pub is_owner: bool,
    pub difficulty: String,
    pub last_hash: Option<String>,
    pub reward: String,
    pub balance: String,
    pub phase: Phase,
    pub last_outcome: Option<Phase>,
    pub cooldown: u32,
    pub nonce: String,
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn from_client(client: &MinerClient) -> Self {
        let view = client.view();
        let attempt = client.attempt();
        Self {
            connected: view.connected(),
            account: view.account.as_ref().map(format_address),
            owner: view.owner.as_ref().map(format_address),
            is_owner: view.is_privileged(),
            difficulty: view.difficulty.to_string(),
            last_hash: view.last_hash.as_ref().map(format_hash),
            reward: format!("{} ETH", format_ether(view.reward)),
            balance: format!("{} ETH", format_ether(view.balance)),
            phase: attempt.phase,
            last_outcome: attempt.last_outcome,
            cooldown: attempt.cooldown_remaining,
            nonce: attempt.nonce,
            message: attempt.message,
        }
    }
}

/* ---------- Mining API Models ---------- */

#[derive(Deserialize, Default)]
pub struct AutoFindRequest {
    /// Decimal start nonce; random when absent.
    pub start_nonce: Option<String>,
}

#[derive(Serialize)]
pub struct AutoFindResponse {
    pub nonce: String,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Deserialize, Default)]
pub struct SubmitRequest {
    pub nonce: Option<String>,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub accepted: bool,
    pub nonce: String,
    pub block_number: u64,
    pub last_hash: Option<String>,
}

/* ---------- Admin API Models ---------- */

#[derive(Deserialize)]
pub struct SetDifficultyRequest {
    pub difficulty: String,
}

#[derive(Serialize)]
pub struct DifficultyResponse {
    pub difficulty: String,
}

#[derive(Deserialize)]
pub struct SetRewardRequest {
    /// Ether amount, e.g. "0.0005".
    pub reward_eth: String,
}

#[derive(Serialize)]
pub struct RewardResponse {
    pub reward: String,
}

/* ---------- Activity API Models ---------- */

#[derive(Serialize)]
pub struct HistoryEntry {
    pub miner: String,
    pub nonce: String,
    pub hash: String,
    pub reward: String,
}

impl From<&WorkEvent> for HistoryEntry {
    fn from(event: &WorkEvent) -> Self {
        Self {
            miner: format_address(&event.miner),
            nonce: event.nonce.to_string(),
            hash: format_hash(&event.hash),
            reward: format!("{} ETH", format_ether(event.reward)),
        }
    }
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub size: usize,
    pub entries: Vec<HistoryEntry>,
}

#[derive(Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub miner: String,
    pub count: u64,
}

#[derive(Serialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
}

/* ---------- Errors ---------- */

#[derive(Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub message: String,
    pub retryable: bool,
}

/// Map a miner error onto an HTTP status with the user-facing message.
pub fn error_response(err: &MinerError) -> HttpResponse {
    let mut builder = match err {
        MinerError::PreconditionBlocked(BlockReason::InFlight | BlockReason::Cooldown(_)) => {
            HttpResponse::Conflict()
        }
        MinerError::PreconditionBlocked(_) => HttpResponse::BadRequest(),
        MinerError::InvalidDifficulty(_) | MinerError::InvalidInput(_) => {
            HttpResponse::BadRequest()
        }
        MinerError::NotPrivileged => HttpResponse::Forbidden(),
        MinerError::ValidationRejected(_)
        | MinerError::SubmissionFailed(_)
        | MinerError::SearchCancelled { .. } => HttpResponse::Conflict(),
        MinerError::EventSource(_)
        | MinerError::AdminUpdateFailed { .. }
        | MinerError::Chain(_) => HttpResponse::BadGateway(),
    };
    builder.json(ErrorResponse {
        ok: false,
        message: err.user_message(),
        retryable: err.is_retryable(),
    })
}
