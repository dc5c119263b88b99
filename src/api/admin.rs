use actix_web::{HttpResponse, Responder, post, web};

use super::models::{
    AppState, DifficultyResponse, RewardResponse, SetDifficultyRequest, SetRewardRequest,
    error_response,
};
use crate::chain::format_ether;

#[post("/admin/difficulty/")]
pub async fn set_difficulty(
    state: web::Data<AppState>,
    req: web::Json<SetDifficultyRequest>,
) -> impl Responder {
    match state.client.set_difficulty(&req.difficulty).await {
        Ok(difficulty) => HttpResponse::Ok().json(DifficultyResponse {
            difficulty: difficulty.to_string(),
        }),
        Err(e) => error_response(&e),
    }
}

#[post("/admin/reward/")]
pub async fn set_reward(
    state: web::Data<AppState>,
    req: web::Json<SetRewardRequest>,
) -> impl Responder {
    match state.client.set_reward(&req.reward_eth).await {
        Ok(wei) => HttpResponse::Ok().json(RewardResponse {
            reward: format!("{} ETH", format_ether(wei)),
        }),
        Err(e) => error_response(&e),
    }
}
