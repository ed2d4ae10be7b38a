//! Search record entity: one outcome of one lookup attempt

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Outcome of a lookup attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Found,
    NotFound,
    Error,
}

impl SearchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStatus::Found => "found",
            SearchStatus::NotFound => "not_found",
            SearchStatus::Error => "error",
        }
    }
}

impl From<String> for SearchStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "found" => SearchStatus::Found,
            "not_found" => SearchStatus::NotFound,
            _ => SearchStatus::Error,
        }
    }
}

impl From<SearchStatus> for String {
    fn from(status: SearchStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Where a search record came from. Provenance only, no behavior attached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    #[default]
    Single,
    Batch,
    Advanced,
    CompanyDomain,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Single => "single",
            SearchType::Batch => "batch",
            SearchType::Advanced => "advanced",
            SearchType::CompanyDomain => "company_domain",
        }
    }
}

impl From<String> for SearchType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "batch" => SearchType::Batch,
            "advanced" => SearchType::Advanced,
            "company_domain" => SearchType::CompanyDomain,
            _ => SearchType::Single,
        }
    }
}

impl From<SearchType> for String {
    fn from(search_type: SearchType) -> Self {
        search_type.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "search_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub first_name: String,

    #[sea_orm(column_type = "Text")]
    pub last_name: String,

    #[sea_orm(column_type = "Text")]
    pub company: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub email: Option<String>,

    /// 0-100
    pub confidence: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub title: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub domain: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub full_name: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub industry: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub website: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub company_size: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub country: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub city: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub email_status: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub search_type: String,

    pub batch_id: Option<Uuid>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn search_status(&self) -> SearchStatus {
        SearchStatus::from(self.status.clone())
    }

    pub fn kind(&self) -> SearchType {
        SearchType::from(self.search_type.clone())
    }
}

// batch_id is a weak reference: no foreign key, no cascade.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
