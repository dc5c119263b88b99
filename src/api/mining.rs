use actix_web::{HttpResponse, Responder, post, web};
use log::{debug, error, info};
use primitive_types::U256;

use super::models::{
    AppState, AutoFindRequest, AutoFindResponse, CancelResponse, SubmitRequest, SubmitResponse,
    error_response,
};
use crate::chain::format_hash;
use crate::error::MinerError;

fn parse_start(text: &str) -> Result<U256, MinerError> {
    U256::from_dec_str(text.trim())
        .map_err(|_| MinerError::InvalidInput(format!("start nonce '{text}' is not a number")))
}

/// Run the nonce search; the found nonce also lands in the submission input.
#[post("/mining/auto-find/")]
pub async fn auto_find(
    state: web::Data<AppState>,
    req: Option<web::Json<AutoFindRequest>>,
) -> impl Responder {
    let req = req.map(|r| r.into_inner()).unwrap_or_default();
    let start = match req.start_nonce.as_deref().map(parse_start).transpose() {
        Ok(start) => start,
        Err(e) => return error_response(&e),
    };

    match state.client.auto_find(start).await {
        Ok(nonce) => HttpResponse::Ok().json(AutoFindResponse {
            nonce: nonce.to_string(),
        }),
        Err(e) => {
            debug!("MINING - auto-find ended: {}", e);
            error_response(&e)
        }
    }
}

#[post("/mining/cancel/")]
pub async fn cancel_search(state: web::Data<AppState>) -> impl Responder {
    let cancelled = state.client.cancel_search();
    HttpResponse::Ok().json(CancelResponse { cancelled })
}

/// Submit the current input (or the given nonce).
///
/// The submission runs as its own task so a dropped connection cannot
/// abandon it between the trial call and the receipt.
#[post("/mining/submit/")]
pub async fn submit(
    state: web::Data<AppState>,
    req: Option<web::Json<SubmitRequest>>,
) -> impl Responder {
    let nonce = req.and_then(|r| r.into_inner().nonce);
    let client = state.client.clone();
    let handle = actix_web::rt::spawn(async move { client.submit(nonce).await });

    match handle.await {
        Ok(Ok(accepted)) => {
            info!(
                "MINING - nonce {} accepted in block #{}",
                accepted.nonce, accepted.receipt.block_number
            );
            HttpResponse::Ok().json(SubmitResponse {
                accepted: true,
                nonce: accepted.nonce.to_string(),
                block_number: accepted.receipt.block_number,
                last_hash: accepted.last_hash.as_ref().map(format_hash),
            })
        }
        Ok(Err(e)) => error_response(&e),
        Err(e) => {
            error!("MINING - submit task failed: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}
