//! Outbound HTTP plumbing shared by provider adapters

pub mod client;
pub mod rate_limits;

pub use client::{ApiResponse, HttpClient, HttpClientBuilder};
pub use rate_limits::RateLimiterRegistry;
