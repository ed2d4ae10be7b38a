//! Record store contract
//!
//! The batch runner and the HTTP handlers only ever see `dyn RecordStore`.
//! Two implementations exist: [`MemoryStore`](super::MemoryStore) and the
//! SeaORM-backed [`Repository`](super::Repository).

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

use crate::db::models::{ApiConfig, BatchJob, BatchStatus, SearchRecord, SearchStatus, SearchType};
use crate::errors::Result;

/// Page size used when the caller does not pass a limit
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Hands out strictly increasing creation timestamps at microsecond
/// resolution, the precision Postgres keeps. Records created through one
/// clock never share a `created_at`, so ordering by it is total.
#[derive(Debug, Default)]
pub struct CreationClock {
    last_micros: AtomicI64,
}

impl CreationClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> DateTime<FixedOffset> {
        let now = Utc::now().timestamp_micros();
        let bump = |last: i64| now.max(last + 1);
        let previous = self
            .last_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(bump(last)))
            .unwrap_or_else(|last| last);

        DateTime::from_timestamp_micros(bump(previous))
            .unwrap_or_else(Utc::now)
            .into()
    }
}

/// Fields supplied by the caller when a search record is created.
/// Id and timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSearchRecord {
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub email: Option<String>,
    pub confidence: Option<i32>,
    pub title: Option<String>,
    pub domain: Option<String>,
    pub full_name: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub company_size: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub email_status: Option<String>,
    pub status: SearchStatus,
    pub error_message: Option<String>,
    pub search_type: SearchType,
    pub batch_id: Option<Uuid>,
}

impl NewSearchRecord {
    /// A record with every optional field explicitly absent
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        company: impl Into<String>,
        status: SearchStatus,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            company: company.into(),
            email: None,
            confidence: None,
            title: None,
            domain: None,
            full_name: None,
            industry: None,
            website: None,
            company_size: None,
            country: None,
            city: None,
            email_status: None,
            status,
            error_message: None,
            search_type: SearchType::Single,
            batch_id: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_search_type(mut self, search_type: SearchType) -> Self {
        self.search_type = search_type;
        self
    }

    pub fn in_batch(mut self, batch_id: Uuid) -> Self {
        self.search_type = SearchType::Batch;
        self.batch_id = Some(batch_id);
        self
    }

    pub(crate) fn into_record(self, id: Uuid, created_at: DateTime<FixedOffset>) -> SearchRecord {
        SearchRecord {
            id,
            first_name: self.first_name,
            last_name: self.last_name,
            company: self.company,
            email: self.email,
            confidence: self.confidence,
            title: self.title,
            domain: self.domain,
            full_name: self.full_name,
            industry: self.industry,
            website: self.website,
            company_size: self.company_size,
            country: self.country,
            city: self.city,
            email_status: self.email_status,
            status: self.status.into(),
            error_message: self.error_message,
            search_type: self.search_type.into(),
            batch_id: self.batch_id,
            created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewBatchJob {
    pub file_name: String,
    pub total_records: i32,
    pub status: BatchStatus,
}

/// Partial update for a batch job. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct BatchJobUpdate {
    pub status: Option<BatchStatus>,
    pub processed_records: Option<i32>,
    pub successful_records: Option<i32>,
}

impl BatchJobUpdate {
    pub fn progress(processed: i32, successful: i32) -> Self {
        Self {
            status: None,
            processed_records: Some(processed),
            successful_records: Some(successful),
        }
    }

    pub fn with_status(mut self, status: BatchStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Merge onto an existing job. A merged status of completed or failed
    /// stamps `completed_at` the first time it is seen.
    pub fn merge(&self, mut job: BatchJob, now: DateTime<FixedOffset>) -> BatchJob {
        if let Some(status) = self.status {
            job.status = status.into();
        }
        if let Some(processed) = self.processed_records {
            job.processed_records = processed;
        }
        if let Some(successful) = self.successful_records {
            job.successful_records = successful;
        }
        if job.job_status().stamps_completion() && job.completed_at.is_none() {
            job.completed_at = Some(now);
        }
        job
    }
}

#[derive(Debug, Clone)]
pub struct NewApiConfig {
    pub api_key: String,
}

/// Aggregate counts over all search records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub total: u64,
    pub found: u64,
    pub not_found: u64,
    pub errors: u64,
}

impl SearchStats {
    /// Found records as a percentage of all records
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.found as f64 / self.total as f64) * 100.0
        }
    }
}

/// Repository interface shared by every store implementation.
///
/// Lookups of unknown ids return `Ok(None)`. Storage failures are reported
/// as errors, never as `None`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a search record, assigning its id and creation time
    async fn create_search_record(&self, data: NewSearchRecord) -> Result<SearchRecord>;

    /// Most recent first
    async fn list_search_records(&self, limit: u64, offset: u64) -> Result<Vec<SearchRecord>>;

    /// Records belonging to one batch, most recent first
    async fn list_search_records_by_batch(&self, batch_id: Uuid) -> Result<Vec<SearchRecord>>;

    /// Delete every search record. Returns the number removed.
    async fn clear_search_records(&self) -> Result<u64>;

    async fn search_stats(&self) -> Result<SearchStats>;

    /// Deactivate every existing config and insert `data` as the only active one
    async fn save_api_config(&self, data: NewApiConfig) -> Result<ApiConfig>;

    async fn get_active_api_config(&self) -> Result<Option<ApiConfig>>;

    /// Every stored config, oldest first
    async fn list_api_configs(&self) -> Result<Vec<ApiConfig>>;

    async fn create_batch_job(&self, data: NewBatchJob) -> Result<BatchJob>;

    async fn get_batch_job(&self, id: Uuid) -> Result<Option<BatchJob>>;

    async fn update_batch_job(&self, id: Uuid, update: BatchJobUpdate) -> Result<Option<BatchJob>>;

    /// Cheap connectivity check for readiness probes
    async fn ping(&self) -> Result<()>;
}
