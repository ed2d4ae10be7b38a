//! SeaORM entity models
//!
//! Database entities for MailScout

pub mod api_config;
pub mod batch_job;
pub mod search_record;

pub use search_record::{
    Entity as SearchRecordEntity,
    Model as SearchRecord,
    ActiveModel as SearchRecordActiveModel,
    Column as SearchRecordColumn,
    SearchStatus,
    SearchType,
};

pub use batch_job::{
    Entity as BatchJobEntity,
    Model as BatchJob,
    ActiveModel as BatchJobActiveModel,
    Column as BatchJobColumn,
    BatchStatus,
};

pub use api_config::{
    Entity as ApiConfigEntity,
    Model as ApiConfig,
    ActiveModel as ApiConfigActiveModel,
    Column as ApiConfigColumn,
};
