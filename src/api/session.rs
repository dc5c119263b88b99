use actix_web::{HttpResponse, Responder, get, post, web};
use log::{info, warn};

use super::models::{AppState, StatusResponse, error_response};
use crate::error::MinerError;

/// Open the session and start pumping live activity in the background.
#[post("/session/connect/")]
pub async fn connect(state: web::Data<AppState>) -> impl Responder {
    let client = state.client.clone();
    match client.connect().await {
        Ok(feed) => {
            actix_web::rt::spawn(client.clone().pump_live_events(feed));
            HttpResponse::Ok().json(StatusResponse::from_client(&client))
        }
        // Connected, but without live activity; /activity/reload/ retries.
        Err(e @ MinerError::EventSource(_)) => {
            warn!("SESSION - connected without activity feed: {}", e);
            error_response(&e)
        }
        Err(e) => {
            warn!("SESSION - connect failed: {}", e);
            error_response(&e)
        }
    }
}

#[post("/session/disconnect/")]
pub async fn disconnect(state: web::Data<AppState>) -> impl Responder {
    state.client.disconnect().await;
    info!("SESSION - disconnect requested over HTTP");
    HttpResponse::Ok().json(StatusResponse::from_client(&state.client))
}

#[get("/status/")]
pub async fn get_status(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(StatusResponse::from_client(&state.client))
}
