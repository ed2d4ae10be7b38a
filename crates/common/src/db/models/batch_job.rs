//! Batch job entity for bulk contact lookups

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Batch job status enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses whose transition stamps `completed_at`
    pub fn stamps_completion(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

impl From<String> for BatchStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => BatchStatus::Pending,
            "processing" => BatchStatus::Processing,
            "completed" => BatchStatus::Completed,
            "failed" => BatchStatus::Failed,
            "cancelled" => BatchStatus::Cancelled,
            _ => BatchStatus::Pending,
        }
    }
}

impl From<BatchStatus> for String {
    fn from(status: BatchStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "batch_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub file_name: String,

    pub total_records: i32,

    pub processed_records: i32,

    pub successful_records: i32,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub created_at: DateTimeWithTimeZone,

    pub completed_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Get the job status as an enum
    pub fn job_status(&self) -> BatchStatus {
        BatchStatus::from(self.status.clone())
    }

    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.job_status(),
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Cancelled
        )
    }

    /// Calculate progress percentage
    pub fn progress_percent(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            (self.processed_records as f64 / self.total_records as f64) * 100.0
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
