//! Resolve which models a user can chat with.
//!
//! The selectable catalog is the intersection of what the API key can
//! use and a static preference table ordered from the lightest (least
//! quota intensive) model to the heaviest. The first entry is the
//! default selection.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gemini::{GeminiClient, GeminiError, RemoteModel, model_resource};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelPreference {
    pub name: String,
    pub id: String,
}

impl ModelPreference {
    pub fn new(name: &str, id: &str) -> Self {
        Self {
            name: name.to_string(),
            id: id.to_string(),
        }
    }
}

/// Ordered by priority, lightest models first.
const DEFAULT_PREFERENCES: &[(&str, &str)] = &[
    ("Gemini 2.0 Flash-Lite", "models/gemini-2.0-flash-lite"),
    ("Gemini 1.5 Flash-8B", "models/gemini-1.5-flash-8b"),
    ("Gemini 1.0 Pro", "models/gemini-1.0-pro"),
    ("Gemini 1.5 Flash", "models/gemini-1.5-flash-latest"),
    ("Gemini 2.0 Flash", "models/gemini-2.0-flash"),
    ("Gemini 2.5 Flash", "models/gemini-2.5-flash"),
    ("Gemini 1.5 Pro", "models/gemini-1.5-pro-latest"),
    ("Gemini 2.5 Pro", "models/gemini-2.5-pro"),
];

pub fn default_preferences() -> Vec<ModelPreference> {
    DEFAULT_PREFERENCES
        .iter()
        .map(|(name, id)| ModelPreference::new(name, id))
        .collect()
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Listing models failed: {0}")]
    Fetch(#[from] GeminiError),

    #[error("No available generative models found. Check your API access.")]
    NoGenerationModels,

    #[error("No supported models available in your region")]
    NoSupportedModels,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub display_name: String,
    pub model_id: String,
}

/// Non-empty list of selectable models in preference order.
#[derive(Clone, Debug, Serialize)]
pub struct ModelCatalog {
    entries: Vec<CatalogEntry>,
}

impl ModelCatalog {
    /// Intersect the models reported by the API with `preferences`,
    /// keeping the preference order. Models that can't generate
    /// content are ignored.
    pub fn resolve(
        available: &[RemoteModel],
        preferences: &[ModelPreference],
    ) -> Result<Self, CatalogError> {
        let generation_models: Vec<&RemoteModel> =
            available.iter().filter(|m| m.supports_generation()).collect();
        if generation_models.is_empty() {
            return Err(CatalogError::NoGenerationModels);
        }

        let mut entries: Vec<CatalogEntry> = Vec::new();
        for pref in preferences {
            let model_id = model_resource(&pref.id);
            let is_available = generation_models.iter().any(|m| m.name == model_id);
            let is_duplicate = entries.iter().any(|e| e.model_id == model_id);
            if is_available && !is_duplicate {
                entries.push(CatalogEntry {
                    display_name: pref.name.clone(),
                    model_id,
                });
            }
        }

        if entries.is_empty() {
            return Err(CatalogError::NoSupportedModels);
        }
        Ok(Self { entries })
    }

    /// Fetch the models available to the client's API key and resolve
    /// them against `preferences`.
    pub async fn fetch(
        client: &GeminiClient,
        preferences: &[ModelPreference],
    ) -> Result<Self, CatalogError> {
        let available = client.list_models().await?;
        let catalog = Self::resolve(&available, preferences)?;
        tracing::info!(
            "Resolved {} of {} available models",
            catalog.entries.len(),
            available.len()
        );
        Ok(catalog)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn default_entry(&self) -> &CatalogEntry {
        // `resolve` never builds an empty catalog
        &self.entries[0]
    }

    pub fn get(&self, model_id: &str) -> Option<&CatalogEntry> {
        let model_id = model_resource(model_id);
        self.entries.iter().find(|e| e.model_id == model_id)
    }

    /// Look up an entry the way a person would type it: a 1-based
    /// position in the list, the model id with or without the
    /// `models/` prefix, or the display name ignoring case.
    pub fn find(&self, query: &str) -> Option<&CatalogEntry> {
        let query = query.trim();
        if let Ok(position) = query.parse::<usize>() {
            return position.checked_sub(1).and_then(|i| self.entries.get(i));
        }
        self.get(query).or_else(|| {
            self.entries
                .iter()
                .find(|e| e.display_name.eq_ignore_ascii_case(query))
        })
    }
}
