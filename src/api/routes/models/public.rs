//! Public types for the models API
use serde::{Deserialize, Serialize};

use crate::ai::catalog::CatalogEntry;

#[derive(Serialize, Deserialize, Debug)]
pub struct ModelsResponse {
    pub default_model_id: String,
    pub models: Vec<CatalogEntry>,
}

/// Static text shown alongside the chat
#[derive(Serialize, Deserialize, Debug)]
pub struct InfoResponse {
    pub tips: Vec<String>,
    pub quota_note: String,
    pub quota_policy_url: String,
}
