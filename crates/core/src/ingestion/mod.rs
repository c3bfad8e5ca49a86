//! Pull-in ingestion: reconcile a source's parsed slots with stored events.

pub mod ports;
pub mod service;

pub use service::{IngestionResult, IngestionService, SourceRef};
