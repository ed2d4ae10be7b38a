//! In-memory record store
//!
//! Holds everything behind one `RwLock`, so the deactivate-then-insert in
//! `save_api_config` happens under a single write guard.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{ApiConfig, BatchJob, SearchRecord, SearchStatus};
use crate::db::store::{
    BatchJobUpdate, NewApiConfig, NewBatchJob, NewSearchRecord, RecordStore, SearchStats,
};
use crate::errors::Result;

#[derive(Default)]
struct Tables {
    /// Insertion order
    search_records: Vec<SearchRecord>,
    batch_jobs: HashMap<Uuid, BatchJob>,
    /// Insertion order
    api_configs: Vec<ApiConfig>,
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first; records sharing a timestamp keep reverse insertion order.
fn newest_first<'a>(records: impl DoubleEndedIterator<Item = &'a SearchRecord>) -> Vec<SearchRecord> {
    let mut sorted: Vec<SearchRecord> = records.rev().cloned().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_search_record(&self, data: NewSearchRecord) -> Result<SearchRecord> {
        let record = data.into_record(Uuid::new_v4(), Utc::now().into());
        self.tables.write().await.search_records.push(record.clone());
        Ok(record)
    }

    async fn list_search_records(&self, limit: u64, offset: u64) -> Result<Vec<SearchRecord>> {
        let tables = self.tables.read().await;
        Ok(newest_first(tables.search_records.iter())
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn list_search_records_by_batch(&self, batch_id: Uuid) -> Result<Vec<SearchRecord>> {
        let tables = self.tables.read().await;
        let in_batch: Vec<&SearchRecord> = tables
            .search_records
            .iter()
            .filter(|r| r.batch_id == Some(batch_id))
            .collect();
        Ok(newest_first(in_batch.into_iter()))
    }

    async fn clear_search_records(&self) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let removed = tables.search_records.len() as u64;
        tables.search_records.clear();
        Ok(removed)
    }

    async fn search_stats(&self) -> Result<SearchStats> {
        let tables = self.tables.read().await;
        let mut stats = SearchStats::default();
        for record in &tables.search_records {
            stats.total += 1;
            match record.search_status() {
                SearchStatus::Found => stats.found += 1,
                SearchStatus::NotFound => stats.not_found += 1,
                SearchStatus::Error => stats.errors += 1,
            }
        }
        Ok(stats)
    }

    async fn save_api_config(&self, data: NewApiConfig) -> Result<ApiConfig> {
        let mut tables = self.tables.write().await;
        for config in tables.api_configs.iter_mut() {
            config.is_active = false;
        }
        let config = ApiConfig {
            id: Uuid::new_v4(),
            api_key: data.api_key,
            is_active: true,
            created_at: Utc::now().into(),
        };
        tables.api_configs.push(config.clone());
        Ok(config)
    }

    async fn get_active_api_config(&self) -> Result<Option<ApiConfig>> {
        let tables = self.tables.read().await;
        Ok(tables.api_configs.iter().find(|c| c.is_active).cloned())
    }

    async fn list_api_configs(&self) -> Result<Vec<ApiConfig>> {
        Ok(self.tables.read().await.api_configs.clone())
    }

    async fn create_batch_job(&self, data: NewBatchJob) -> Result<BatchJob> {
        let job = BatchJob {
            id: Uuid::new_v4(),
            file_name: data.file_name,
            total_records: data.total_records,
            processed_records: 0,
            successful_records: 0,
            status: data.status.into(),
            created_at: Utc::now().into(),
            completed_at: None,
        };
        self.tables.write().await.batch_jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_batch_job(&self, id: Uuid) -> Result<Option<BatchJob>> {
        Ok(self.tables.read().await.batch_jobs.get(&id).cloned())
    }

    async fn update_batch_job(&self, id: Uuid, update: BatchJobUpdate) -> Result<Option<BatchJob>> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables.batch_jobs.get(&id).cloned() else {
            return Ok(None);
        };
        let merged = update.merge(existing, Utc::now().into());
        tables.batch_jobs.insert(id, merged.clone());
        Ok(Some(merged))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
