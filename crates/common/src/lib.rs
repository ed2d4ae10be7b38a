//! MailScout Common Library
//!
//! Shared code for the MailScout gateway:
//! - Record store contract, SeaORM models and the in-memory store
//! - Email lookup client abstraction
//! - Batch job runner
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod batch;
pub mod config;
pub mod db;
pub mod errors;
pub mod lookup;
pub mod metrics;

// Re-export commonly used types
pub use batch::{BatchRunner, BatchSummary, RawContact, SubmittedBatch};
pub use config::AppConfig;
pub use db::{MemoryStore, RecordStore, Repository};
pub use errors::{AppError, Result};
pub use lookup::{Contact, EmailLookup, LookupOutcome};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
