pub mod auth;
pub mod dashboard;
pub mod inquiries;
pub mod requirements;
pub mod sections;
pub mod session;

use crate::state::SharedState;
use axum::{routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/auth", auth::router(state.clone()))
        .nest("/api/sections", sections::router(state.clone()))
        .nest("/api/requirements", requirements::router(state.clone()))
        .nest("/api/inquiries", inquiries::router(state.clone()))
        .nest("/api/dashboard", dashboard::router(state))
}
