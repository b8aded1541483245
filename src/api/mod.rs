pub mod accounts;
pub mod events;
pub mod health;

use crate::db::Repository;
use crate::orchestration::Reconciler;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, reconciler: Arc<Reconciler>) -> Self {
        Self { repo, reconciler }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/accounts/:account/state", get(accounts::get_state))
        .route(
            "/v1/accounts/:account/reconcile",
            post(accounts::post_reconcile),
        )
        .route("/v1/accounts/:account/limits", put(accounts::put_limits))
        .route("/v1/events", post(events::post_event))
        .layer(cors)
        .with_state(state)
}
