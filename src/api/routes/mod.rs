//! API routes module

pub mod chat;
pub mod models;

use std::sync::{Arc, RwLock};

use crate::api::state::AppState;
use axum::Router;

type SharedState = Arc<RwLock<AppState>>;

/// Create the combined API router
pub fn router() -> Router<SharedState> {
    Router::new()
        // Chat session routes
        .nest("/sessions", chat::router())
        // Model catalog and sidebar info
        .merge(models::router())
}
