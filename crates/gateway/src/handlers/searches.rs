//! Single lookup and search history handlers

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use mailscout_common::{
    batch::RawContact,
    db::{models::SearchRecord, models::SearchType, DEFAULT_PAGE_SIZE},
    errors::{AppError, Result},
};

/// Largest page the history endpoint will return
pub const MAX_PAGE_SIZE: u64 = 500;

/// Request for a single lookup
#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, max = 100))]
    #[serde(alias = "firstName")]
    pub first_name: String,

    #[validate(length(min = 1, max = 100))]
    #[serde(alias = "lastName")]
    pub last_name: String,

    #[validate(length(min = 1, max = 200))]
    pub company: String,

    /// Provenance tag; `batch` is reserved for the batch runner
    #[serde(default, alias = "searchType")]
    pub search_type: Option<SearchType>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ListQuery {
    fn page(&self) -> (u64, u64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (limit, self.offset.unwrap_or(0))
    }
}

#[derive(Serialize)]
pub struct SearchListResponse {
    pub records: Vec<SearchRecord>,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub deleted: u64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub total: u64,
    pub found: u64,
    pub not_found: u64,
    pub errors: u64,
    pub success_rate: f64,
}

/// Look up one contact with the active API key and record the outcome
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchRecord>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let search_type = request.search_type.unwrap_or_default();
    if search_type == SearchType::Batch {
        return Err(AppError::Validation {
            message: "search_type 'batch' is reserved for batch jobs".to_string(),
            field: Some("search_type".to_string()),
        });
    }

    let contact = RawContact::new(&request.first_name, &request.last_name, &request.company)
        .validate()
        .ok_or_else(|| AppError::Validation {
            message: "first_name, last_name and company must not be blank".to_string(),
            field: None,
        })?;

    let config = state
        .store
        .get_active_api_config()
        .await?
        .ok_or(AppError::MissingApiKey)?;

    let outcome = state.lookup.lookup(&contact, &config.api_key).await;
    let record = state
        .store
        .create_search_record(outcome.into_record(&contact, search_type))
        .await?;

    tracing::info!(
        record_id = %record.id,
        status = %record.status,
        search_type = search_type.as_str(),
        "Single lookup recorded"
    );

    Ok(Json(record))
}

/// Search history, most recent first
pub async fn list_searches(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<SearchListResponse>> {
    let (limit, offset) = query.page();
    let records = state.store.list_search_records(limit, offset).await?;

    Ok(Json(SearchListResponse { records, limit, offset }))
}

/// Delete every search record
pub async fn clear_searches(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    let deleted = state.store.clear_search_records().await?;
    tracing::info!(deleted, "Search history cleared");

    Ok(Json(ClearResponse { deleted }))
}

/// Totals by status
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let stats = state.store.search_stats().await?;

    Ok(Json(StatsResponse {
        total: stats.total,
        found: stats.found,
        not_found: stats.not_found,
        errors: stats.errors,
        success_rate: stats.success_rate(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        assert_eq!(ListQuery::default().page(), (DEFAULT_PAGE_SIZE, 0));

        let big = ListQuery { limit: Some(10_000), offset: Some(20) };
        assert_eq!(big.page(), (MAX_PAGE_SIZE, 20));

        let zero = ListQuery { limit: Some(0), offset: None };
        assert_eq!(zero.page(), (1, 0));
    }

    #[test]
    fn test_search_request_validation() {
        let ok: SearchRequest = serde_json::from_str(
            r#"{"firstName":"John","lastName":"Doe","company":"Acme","search_type":"advanced"}"#,
        )
        .unwrap();
        assert!(ok.validate().is_ok());
        assert_eq!(ok.search_type, Some(SearchType::Advanced));

        let empty: SearchRequest =
            serde_json::from_str(r#"{"first_name":"","last_name":"Doe","company":"Acme"}"#).unwrap();
        assert!(empty.validate().is_err());
    }
}
