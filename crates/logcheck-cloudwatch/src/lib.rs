//! CloudWatch Logs access for awslogcheck
//!
//! This crate provides the provider seam, the AWS implementation behind it,
//! and the rate-limited discovery and pagination built on top.

mod client;
mod error;
mod fetcher;
mod identity;
mod limiter;
mod locator;
mod provider;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::CloudWatchClient;
pub use error::{CloudWatchError, Result};
pub use fetcher::{EventFetcher, EventPages, EventQuery};
pub use identity::{CallerIdentity, caller_identity};
pub use limiter::RateLimiter;
pub use locator::LogGroupLocator;
pub use provider::LogsProvider;

// Re-export types that are used in our public API
pub use logcheck_types::{EventPage, LogGroupPage, RawEvent, TimeWindow};
