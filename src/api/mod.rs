mod activity;
mod admin;
mod health;
mod mining;
pub mod models;
mod session;


use actix_web::web::{self, ServiceConfig};

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(session::connect)
            .service(session::disconnect)
            .service(session::get_status)
            .service(mining::auto_find)
            .service(mining::cancel_search)
            .service(mining::submit)
            .service(admin::set_difficulty)
            .service(admin::set_reward)
            .service(activity::get_history)
            .service(activity::get_leaderboard)
            .service(activity::reload),
    );
}
