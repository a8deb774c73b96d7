//! GCP-oriented adapters and the serverless handler for the sync job.
//!
//! This crate owns runtime integration details (event handling, REST clients
//! for the warehouse and document store, credentials and log setup) on top of
//! the domain primitives in `sync_core`.

pub mod adapters;
pub mod handlers;
pub mod logging;
