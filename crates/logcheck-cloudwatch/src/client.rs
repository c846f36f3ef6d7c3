use aws_config::SdkConfig;
use aws_sdk_cloudwatchlogs::Client;
use tracing::trace;

use logcheck_types::{EventPage, LogGroupPage, RawEvent};

use crate::error::{CloudWatchError, Result};
use crate::fetcher::EventQuery;
use crate::provider::LogsProvider;

/// CloudWatch Logs client wrapper
#[derive(Clone, Debug)]
pub struct CloudWatchClient {
    client: Client,
}

impl CloudWatchClient {
    /// Create a client from an already loaded SDK configuration
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }
}

impl LogsProvider for CloudWatchClient {
    async fn describe_log_groups(&self, next_token: Option<String>) -> Result<LogGroupPage> {
        let output = self
            .client
            .describe_log_groups()
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| CloudWatchError::provider("DescribeLogGroups", e))?;

        Ok(LogGroupPage {
            names: output
                .log_groups()
                .iter()
                .filter_map(|group| group.log_group_name().map(str::to_string))
                .collect(),
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn filter_log_events(
        &self,
        query: &EventQuery,
        next_token: Option<String>,
    ) -> Result<EventPage> {
        // Results are always interleaved across streams and ordered by time.
        // The API treats endTime as inclusive.
        let output = self
            .client
            .filter_log_events()
            .log_group_name(&query.group_name)
            .start_time(query.start_ms)
            .end_time(query.end_ms - 1)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| CloudWatchError::provider("FilterLogEvents", e))?;

        let events = output
            .events()
            .iter()
            .filter_map(|event| {
                let raw = RawEvent::new(
                    event.timestamp()?,
                    event.log_stream_name()?,
                    event.message()?,
                );
                Some(raw)
            })
            .collect::<Vec<_>>();
        trace!(
            received = output.events().len(),
            kept = events.len(),
            "FilterLogEvents page"
        );

        Ok(EventPage {
            events,
            next_token: output.next_token().map(str::to_string),
        })
    }
}
