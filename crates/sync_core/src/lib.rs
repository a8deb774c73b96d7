//! Cloud-free primitives for the warehouse to document-store sync job.
//!
//! This crate owns the record model, document id derivation, the batching
//! transfer routine and the configuration/event contracts. It intentionally
//! excludes HTTP clients and serverless runtime concerns; those live in
//! `sync_function`.

pub mod config;
pub mod document_id;
pub mod error;
pub mod event;
pub mod record;
pub mod store;
pub mod transfer;
pub mod warehouse;
