//! Persistence adapters.

pub mod job_store_json;

pub use job_store_json::JobStoreJson;
