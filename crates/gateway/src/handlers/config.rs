//! Lookup API key configuration handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use mailscout_common::{
    db::{models::ApiConfig, NewApiConfig},
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize, Validate)]
pub struct SaveConfigRequest {
    #[validate(length(min = 1, max = 256))]
    #[serde(alias = "apiKey")]
    pub api_key: String,
}

/// Active configuration; the key is never echoed in full
#[derive(Serialize)]
pub struct ConfigResponse {
    pub id: Uuid,
    pub api_key: String,
    pub is_active: bool,
    pub created_at: String,
}

impl From<ApiConfig> for ConfigResponse {
    fn from(config: ApiConfig) -> Self {
        Self {
            api_key: config.masked_key(),
            id: config.id,
            is_active: config.is_active,
            created_at: config.created_at.to_rfc3339(),
        }
    }
}

/// Store a new API key and make it the only active one
pub async fn save_config(
    State(state): State<AppState>,
    Json(request): Json<SaveConfigRequest>,
) -> Result<(StatusCode, Json<ConfigResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("api_key".to_string()),
    })?;

    let api_key = request.api_key.trim();
    if api_key.is_empty() {
        return Err(AppError::Validation {
            message: "api_key must not be blank".to_string(),
            field: Some("api_key".to_string()),
        });
    }

    let config = state
        .store
        .save_api_config(NewApiConfig {
            api_key: api_key.to_string(),
        })
        .await?;

    tracing::info!(config_id = %config.id, "API key configured");

    Ok((StatusCode::CREATED, Json(config.into())))
}

/// Get the active configuration
pub async fn get_config(State(state): State<AppState>) -> Result<Json<ConfigResponse>> {
    let config = state
        .store
        .get_active_api_config()
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource_type: "api_config".to_string(),
            id: "active".to_string(),
        })?;

    Ok(Json(config.into()))
}
