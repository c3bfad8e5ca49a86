//! Infrastructure error plumbing

pub mod conversions;

pub use conversions::{classify_status, InfraError};
