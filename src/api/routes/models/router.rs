//! Router for the model catalog

use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use axum::{Json, Router, extract::State, routing::get};

use super::public::{InfoResponse, ModelsResponse};
use crate::ai::chat::{QUOTA_NOTE, QUOTA_POLICY_URL, TIPS};
use crate::api::public::ApiError;
use crate::api::state::AppState;

type SharedState = Arc<RwLock<AppState>>;

/// List the models sessions can choose from, lightest first
async fn list_models(State(state): State<SharedState>) -> Result<Json<ModelsResponse>, ApiError> {
    let shared_state = state
        .read()
        .map_err(|_| anyhow!("Unable to read shared state"))?;
    let catalog = shared_state.orchestrator.catalog();

    Ok(Json(ModelsResponse {
        default_model_id: catalog.default_entry().model_id.clone(),
        models: catalog.entries().to_vec(),
    }))
}

async fn info() -> Json<InfoResponse> {
    Json(InfoResponse {
        tips: TIPS.iter().map(|tip| tip.to_string()).collect(),
        quota_note: QUOTA_NOTE.to_string(),
        quota_policy_url: QUOTA_POLICY_URL.to_string(),
    })
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/models", get(list_models))
        .route("/info", get(info))
}
