use std::future::Future;

use logcheck_types::{EventPage, LogGroupPage};

use crate::error::Result;
use crate::fetcher::EventQuery;

/// The two CloudWatch Logs calls the pipeline depends on
///
/// Implementations issue exactly one request per call. Rate limiting,
/// cancellation and pagination are handled by the callers.
pub trait LogsProvider: Send + Sync {
    /// One page of `DescribeLogGroups`
    fn describe_log_groups(
        &self,
        next_token: Option<String>,
    ) -> impl Future<Output = Result<LogGroupPage>> + Send;

    /// One page of `FilterLogEvents`, interleaved across streams
    fn filter_log_events(
        &self,
        query: &EventQuery,
        next_token: Option<String>,
    ) -> impl Future<Output = Result<EventPage>> + Send;
}
