//! API handlers module

pub mod batches;
pub mod config;
pub mod health;
pub mod searches;
