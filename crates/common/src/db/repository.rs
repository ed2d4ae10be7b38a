//! SQL-backed record store
//!
//! Implements `RecordStore` on top of SeaORM. Every storage failure is
//! surfaced as `AppError::Database`, which renders as "fetch failed" and is
//! distinct from a missing record (`Ok(None)`).

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::models::*;
use crate::db::store::{
    BatchJobUpdate, CreationClock, NewApiConfig, NewBatchJob, NewSearchRecord, RecordStore,
    SearchStats,
};
use crate::db::DbPool;
use crate::errors::Result;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
    clock: Arc<CreationClock>,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            clock: Arc::new(CreationClock::new()),
        }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    async fn count_with_status(&self, status: SearchStatus) -> Result<u64> {
        SearchRecordEntity::find()
            .filter(SearchRecordColumn::Status.eq(status.as_str()))
            .count(self.conn())
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl RecordStore for Repository {
    // ========================================================================
    // Search Records
    // ========================================================================

    async fn create_search_record(&self, data: NewSearchRecord) -> Result<SearchRecord> {
        let record = data.into_record(Uuid::new_v4(), self.clock.next());
        let active: SearchRecordActiveModel = SearchRecordActiveModel {
            id: Set(record.id),
            first_name: Set(record.first_name),
            last_name: Set(record.last_name),
            company: Set(record.company),
            email: Set(record.email),
            confidence: Set(record.confidence),
            title: Set(record.title),
            domain: Set(record.domain),
            full_name: Set(record.full_name),
            industry: Set(record.industry),
            website: Set(record.website),
            company_size: Set(record.company_size),
            country: Set(record.country),
            city: Set(record.city),
            email_status: Set(record.email_status),
            status: Set(record.status),
            error_message: Set(record.error_message),
            search_type: Set(record.search_type),
            batch_id: Set(record.batch_id),
            created_at: Set(record.created_at),
        };

        active.insert(self.conn()).await.map_err(Into::into)
    }

    async fn list_search_records(&self, limit: u64, offset: u64) -> Result<Vec<SearchRecord>> {
        SearchRecordEntity::find()
            .order_by_desc(SearchRecordColumn::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn list_search_records_by_batch(&self, batch_id: Uuid) -> Result<Vec<SearchRecord>> {
        SearchRecordEntity::find()
            .filter(SearchRecordColumn::BatchId.eq(batch_id))
            .order_by_desc(SearchRecordColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self))]
    async fn clear_search_records(&self) -> Result<u64> {
        let result = SearchRecordEntity::delete_many().exec(self.conn()).await?;
        debug!(rows = result.rows_affected, "Search records cleared");
        Ok(result.rows_affected)
    }

    async fn search_stats(&self) -> Result<SearchStats> {
        let total = SearchRecordEntity::find().count(self.conn()).await?;
        Ok(SearchStats {
            total,
            found: self.count_with_status(SearchStatus::Found).await?,
            not_found: self.count_with_status(SearchStatus::NotFound).await?,
            errors: self.count_with_status(SearchStatus::Error).await?,
        })
    }

    // ========================================================================
    // API Configuration
    // ========================================================================

    #[instrument(skip(self, data))]
    async fn save_api_config(&self, data: NewApiConfig) -> Result<ApiConfig> {
        let txn = self.conn().begin().await?;

        let deactivated = ApiConfigEntity::update_many()
            .col_expr(ApiConfigColumn::IsActive, Expr::value(false))
            .filter(ApiConfigColumn::IsActive.eq(true))
            .exec(&txn)
            .await?;

        let config = ApiConfigActiveModel {
            id: Set(Uuid::new_v4()),
            api_key: Set(data.api_key),
            is_active: Set(true),
            created_at: Set(Utc::now().into()),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        debug!(
            config_id = %config.id,
            deactivated = deactivated.rows_affected,
            "API config activated"
        );
        Ok(config)
    }

    async fn get_active_api_config(&self) -> Result<Option<ApiConfig>> {
        ApiConfigEntity::find()
            .filter(ApiConfigColumn::IsActive.eq(true))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn list_api_configs(&self) -> Result<Vec<ApiConfig>> {
        ApiConfigEntity::find()
            .order_by_asc(ApiConfigColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Batch Jobs
    // ========================================================================

    async fn create_batch_job(&self, data: NewBatchJob) -> Result<BatchJob> {
        let job = BatchJobActiveModel {
            id: Set(Uuid::new_v4()),
            file_name: Set(data.file_name),
            total_records: Set(data.total_records),
            processed_records: Set(0),
            successful_records: Set(0),
            status: Set(data.status.into()),
            created_at: Set(Utc::now().into()),
            completed_at: Set(None),
        };

        job.insert(self.conn()).await.map_err(Into::into)
    }

    async fn get_batch_job(&self, id: Uuid) -> Result<Option<BatchJob>> {
        BatchJobEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn update_batch_job(&self, id: Uuid, update: BatchJobUpdate) -> Result<Option<BatchJob>> {
        let Some(existing) = BatchJobEntity::find_by_id(id).one(self.conn()).await? else {
            return Ok(None);
        };

        let merged = update.merge(existing.clone(), Utc::now().into());

        let mut job: BatchJobActiveModel = existing.into();
        job.status = Set(merged.status);
        job.processed_records = Set(merged.processed_records);
        job.successful_records = Set(merged.successful_records);
        job.completed_at = Set(merged.completed_at);

        Ok(Some(job.update(self.conn()).await?))
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}
