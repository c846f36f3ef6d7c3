//! Log processing for awslogcheck
//!
//! This crate provides the ignore rules, the container filter, per-stream
//! aggregation and the HTML rendering of the report.

mod aggregator;
mod filter;
mod format;
mod rules;

pub use aggregator::{AggregatorStats, BucketState, Observation, StreamAggregator, StreamBucket};
pub use filter::{ContainerFilter, PatternList};
pub use format::{SECTION_SEPARATOR, StreamReport, event_line, header_lines};
pub use rules::{RuleMatcher, RulesError};

// Re-export types used in our public API
pub use logcheck_types::{ContainerIdentity, LogLine, RawEvent};
