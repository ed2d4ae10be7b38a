//! Batch job runner
//!
//! `submit` validates the request, creates the job in `processing` and
//! returns at once. The contacts are then worked off in a detached tokio
//! task: one lookup at a time, in input order, with progress written back
//! after every contact and a fixed pacing delay after every lookup.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use crate::db::models::{BatchJob, BatchStatus, SearchStatus, SearchType};
use crate::db::{BatchJobUpdate, NewBatchJob, NewSearchRecord, RecordStore};
use crate::errors::{AppError, Result};
use crate::lookup::{Contact, EmailLookup};
use crate::metrics;

/// Error message stored for contacts that fail shape validation
pub const INVALID_CONTACT_MESSAGE: &str = "Invalid contact data";

/// Substituted for missing subject fields on invalid contacts
const UNKNOWN_SUBJECT: &str = "Unknown";

/// A contact as uploaded. Any field may be missing, blank or not a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawContact {
    #[serde(default, alias = "firstName", deserialize_with = "string_or_none")]
    pub first_name: Option<String>,
    #[serde(default, alias = "lastName", deserialize_with = "string_or_none")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub company: Option<String>,
}

/// Non-string values become `None` so one malformed contact cannot reject
/// the whole list
fn string_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl RawContact {
    pub fn new(first_name: &str, last_name: &str, company: &str) -> Self {
        Self {
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            company: Some(company.to_string()),
        }
    }

    /// The lookup subject, if all three fields are present and non-blank
    pub fn validate(&self) -> Option<Contact> {
        Some(Contact::new(
            present(&self.first_name)?,
            present(&self.last_name)?,
            present(&self.company)?,
        ))
    }

    fn invalid_record(&self, batch_id: Uuid) -> NewSearchRecord {
        let field = |f: &Option<String>| present(f).unwrap_or(UNKNOWN_SUBJECT).to_string();
        NewSearchRecord::new(
            field(&self.first_name),
            field(&self.last_name),
            field(&self.company),
            SearchStatus::Error,
        )
        .with_error(INVALID_CONTACT_MESSAGE)
        .in_batch(batch_id)
    }
}

/// Counters accumulated by one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: i32,
    pub successful: i32,
    pub invalid: i32,
    /// Search records that could not be persisted
    pub lost_records: i32,
    /// Whether the final `completed` write reached the store
    pub completion_recorded: bool,
}

/// Handle to an accepted batch. Dropping `handle` leaves the task running.
pub struct SubmittedBatch {
    pub job: BatchJob,
    pub handle: JoinHandle<BatchSummary>,
}

/// Drives batch jobs against a record store and a lookup client
#[derive(Clone)]
pub struct BatchRunner {
    store: Arc<dyn RecordStore>,
    lookup: Arc<dyn EmailLookup>,
    pacing: Duration,
}

impl BatchRunner {
    pub fn new(store: Arc<dyn RecordStore>, lookup: Arc<dyn EmailLookup>, pacing: Duration) -> Self {
        Self { store, lookup, pacing }
    }

    /// Accept a batch and start processing it in the background.
    ///
    /// Rejects an empty contact list and a missing active API key before
    /// anything is persisted.
    #[instrument(skip(self, contacts), fields(contacts = contacts.len()))]
    pub async fn submit(&self, file_name: String, contacts: Vec<RawContact>) -> Result<SubmittedBatch> {
        if contacts.is_empty() {
            return Err(AppError::EmptyBatch);
        }

        let config = self
            .store
            .get_active_api_config()
            .await?
            .ok_or(AppError::MissingApiKey)?;

        let total_records = i32::try_from(contacts.len()).map_err(|_| AppError::Validation {
            message: format!("Too many contacts: {}", contacts.len()),
            field: Some("contacts".to_string()),
        })?;

        let job = self
            .store
            .create_batch_job(NewBatchJob {
                file_name,
                total_records,
                status: BatchStatus::Processing,
            })
            .await?;

        info!(batch_id = %job.id, total_records, "Batch job accepted");

        let runner = self.clone();
        let batch_id = job.id;
        let span = info_span!("batch", batch_id = %batch_id);
        let handle = tokio::spawn(
            async move { runner.process(batch_id, config.api_key, contacts).await }.instrument(span),
        );

        Ok(SubmittedBatch { job, handle })
    }

    /// Work through every contact and mark the job completed.
    ///
    /// Never aborts early: lookup failures, invalid contacts and store
    /// errors are recorded or logged and the loop moves on.
    pub async fn process(&self, batch_id: Uuid, api_key: String, contacts: Vec<RawContact>) -> BatchSummary {
        let start = Instant::now();
        let total = contacts.len();
        let mut summary = BatchSummary::default();
        metrics::record_batch_started(total);

        for (index, raw) in contacts.into_iter().enumerate() {
            let looked_up = match raw.validate() {
                Some(contact) => {
                    let outcome = self.lookup.lookup(&contact, &api_key).await;
                    if outcome.is_found() {
                        summary.successful += 1;
                    }
                    let record = outcome.into_record(&contact, SearchType::Batch).in_batch(batch_id);
                    self.persist_record(index, record, &mut summary).await;
                    true
                }
                None => {
                    debug!(contact_index = index, "Invalid contact skipped");
                    summary.invalid += 1;
                    self.persist_record(index, raw.invalid_record(batch_id), &mut summary)
                        .await;
                    false
                }
            };

            summary.processed += 1;
            self.persist_progress(batch_id, &summary).await;

            // Nothing follows the final contact, so its pacing sleep is skipped
            if looked_up && index + 1 < total && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        let completion = BatchJobUpdate::progress(summary.processed, summary.successful)
            .with_status(BatchStatus::Completed);
        summary.completion_recorded = match self.store.update_batch_job(batch_id, completion).await {
            Ok(Some(_)) => true,
            Ok(None) => {
                warn!("Batch job vanished before completion");
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to mark batch job completed");
                false
            }
        };

        metrics::record_batch_finished(start.elapsed().as_secs_f64(), summary.completion_recorded);
        info!(
            processed = summary.processed,
            successful = summary.successful,
            invalid = summary.invalid,
            lost_records = summary.lost_records,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch job completed"
        );

        summary
    }

    async fn persist_record(&self, index: usize, record: NewSearchRecord, summary: &mut BatchSummary) {
        let status = record.status;
        match self.store.create_search_record(record).await {
            Ok(_) => metrics::record_batch_contact(status.as_str()),
            Err(e) => {
                summary.lost_records += 1;
                error!(contact_index = index, error = %e, "Failed to persist search record");
            }
        }
    }

    async fn persist_progress(&self, batch_id: Uuid, summary: &BatchSummary) {
        let update = BatchJobUpdate::progress(summary.processed, summary.successful);
        if let Err(e) = self.store.update_batch_job(batch_id, update).await {
            warn!(
                processed = summary.processed,
                error = %e,
                "Failed to persist batch progress, continuing"
            );
        }
    }
}
