use std::sync::Arc;

use futures::TryStreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use logcheck_cloudwatch::{
    CloudWatchError, EventFetcher, EventQuery, LogGroupLocator, LogsProvider, RateLimiter, TimeWindow,
};
use logcheck_logs::{ContainerFilter, RuleMatcher, StreamAggregator};
use logcheck_report::{MailEnvelope, ReportError, ReportSender, ReportStreamer, ReportWriter};

/// Errors ending a run
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("log group {0} not found")]
    LogGroupNotFound(String),

    #[error(transparent)]
    CloudWatch(#[from] CloudWatchError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("run cancelled")]
    Cancelled,
}

impl CheckError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::CloudWatch(e) => e.is_cancelled(),
            Self::Report(e) => e.is_cancelled(),
            Self::LogGroupNotFound(_) => false,
        }
    }
}

/// What one run saw and sent
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub events_seen: usize,
    pub events_malformed: usize,
    pub streams_seen: usize,
    pub streams_excluded: usize,
    pub lines_emitted: usize,
    pub chunks_dispatched: usize,
    pub dispatch_failures: usize,
}

/// Report settings shared by every run
#[derive(Clone, Debug)]
pub struct ReportOptions {
    pub envelope: MailEnvelope,
    pub max_report_size: usize,
    pub channel_capacity: usize,
}

/// The scan of one log group: locate, fetch, aggregate, report
pub struct LogCheck<P, S> {
    log_group: String,
    locator: LogGroupLocator<P>,
    fetcher: EventFetcher<P>,
    rules: RuleMatcher,
    containers: ContainerFilter,
    sender: S,
    options: ReportOptions,
}

impl<P, S> LogCheck<P, S>
where
    P: LogsProvider,
    S: ReportSender + Clone + 'static,
{
    pub fn new(
        provider: Arc<P>,
        log_group: impl Into<String>,
        rules: RuleMatcher,
        containers: ContainerFilter,
        sender: S,
        options: ReportOptions,
    ) -> Self {
        Self {
            log_group: log_group.into(),
            locator: LogGroupLocator::new(provider.clone(), Arc::new(RateLimiter::describe_log_groups())),
            fetcher: EventFetcher::new(provider, Arc::new(RateLimiter::filter_log_events())),
            rules,
            containers,
            sender,
            options,
        }
    }

    pub fn log_group(&self) -> &str {
        &self.log_group
    }

    /// Scan `window` and mail the surviving lines
    pub async fn run(&self, window: TimeWindow, cancel: &CancellationToken) -> Result<RunSummary, CheckError> {
        if cancel.is_cancelled() {
            return Err(CheckError::Cancelled);
        }
        if !self.locator.locate(cancel, &self.log_group).await? {
            return Err(CheckError::LogGroupNotFound(self.log_group.clone()));
        }
        info!(
            log_group = %self.log_group,
            start = ?window.start(),
            end = ?window.end(),
            "Scanning log group"
        );

        let writer = ReportWriter::new(
            self.sender.clone(),
            self.options.envelope.clone(),
            self.options.max_report_size,
        );
        let streamer = ReportStreamer::spawn(writer, self.options.channel_capacity);

        // The channel is closed by `finish` whatever the producer returned, so
        // the writer always gets to dispatch what it already holds
        let produced = self.produce(window, &streamer, cancel).await;
        let written = streamer.finish().await;

        match (produced, written) {
            (Ok(mut summary), Ok(stats)) => {
                summary.chunks_dispatched = stats.chunks_dispatched;
                summary.dispatch_failures = stats.dispatch_failures;
                info!(
                    events = summary.events_seen,
                    malformed = summary.events_malformed,
                    streams = summary.streams_seen,
                    excluded = summary.streams_excluded,
                    lines = summary.lines_emitted,
                    chunks = summary.chunks_dispatched,
                    failures = summary.dispatch_failures,
                    "Run complete"
                );
                Ok(summary)
            }
            // A closed channel only reports that the writer died; its own error says why
            (Err(CheckError::Report(ReportError::WriterClosed)), Err(e)) => Err(e.into()),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e.into()),
        }
    }

    /// Fetch and aggregate the whole window, then push the report lines
    async fn produce(
        &self,
        window: TimeWindow,
        streamer: &ReportStreamer,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, CheckError> {
        let mut aggregator = StreamAggregator::new(&self.rules, &self.containers);

        let query = EventQuery::new(self.log_group.clone(), window);
        let mut events = std::pin::pin!(self.fetcher.fetch(query, cancel.clone()).into_stream());
        while let Some(event) = events.try_next().await? {
            aggregator.observe(event);
        }

        let (reports, stats) = aggregator.finish();
        debug!(
            streams = reports.len(),
            accepted = stats.events_accepted,
            matched_rule = stats.events_matched_rule,
            "Aggregation complete"
        );

        let mut lines_emitted = 0;
        for report in &reports {
            for line in report.render() {
                streamer.send(line, cancel).await?;
                lines_emitted += 1;
            }
        }

        Ok(RunSummary {
            events_seen: stats.events_seen,
            events_malformed: stats.events_malformed,
            streams_seen: stats.streams_seen,
            streams_excluded: stats.streams_excluded,
            lines_emitted,
            ..RunSummary::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logcheck_cloudwatch::RawEvent;
    use logcheck_cloudwatch::testing::MemoryProvider;
    use logcheck_report::testing::RecordingSender;

    const GROUP: &str = "/aws/containerinsights/prod/application";

    // 2024-01-15 10:00:00 UTC
    const START: i64 = 1_705_312_800_000;

    fn event(offset_secs: i64, stream: &str, container: &str, log: &str) -> RawEvent {
        let payload = serde_json::json!({
            "log": log,
            "kubernetes": {
                "pod_name": format!("{container}-0"),
                "container_image": format!("{container}:1.0"),
                "container_name": container,
                "namespace_name": "default",
            }
        });
        RawEvent::new(START + offset_secs * 1000, stream, payload.to_string())
    }

    fn window() -> TimeWindow {
        TimeWindow::new(START, START + logcheck_types::HOUR_MS)
    }

    fn options(max_report_size: usize) -> ReportOptions {
        ReportOptions {
            envelope: MailEnvelope {
                from: "alerts@example.com".to_string(),
                from_display: String::new(),
                subject: "Logs".to_string(),
                to: "ops@example.com".to_string(),
            },
            max_report_size,
            channel_capacity: 4,
        }
    }

    fn check(
        provider: MemoryProvider,
        rules: RuleMatcher,
        containers: ContainerFilter,
        max_report_size: usize,
    ) -> (LogCheck<MemoryProvider, RecordingSender>, RecordingSender) {
        let sender = RecordingSender::new();
        let check = LogCheck::new(
            Arc::new(provider),
            GROUP,
            rules,
            containers,
            sender.clone(),
            options(max_report_size),
        );
        (check, sender)
    }

    fn no_rules() -> RuleMatcher {
        RuleMatcher::new(Vec::<String>::new())
    }

    fn groups() -> Vec<Vec<&'static str>> {
        vec![vec!["/aws/lambda/other"], vec![GROUP]]
    }

    #[tokio::test]
    async fn test_single_stream_in_timestamp_order() {
        let provider = MemoryProvider::new()
            .with_group_pages(groups())
            .with_events(vec![event(5, "api", "api", "second"), event(1, "api", "api", "first")], 1);
        let (check, sender) = check(provider, no_rules(), ContainerFilter::empty(), 1 << 20);

        let summary = check.run(window(), &CancellationToken::new()).await.unwrap();

        assert_eq!(
            sender.report(),
            concat!(
                "<b>Parse stream</b> :api<br>\n",
                "<b>Container Image</b> :api:1.0<br>\n",
                "<b>Container Name</b> :api<br>\n",
                "2024-01-15 10:00:01 UTC: first<br>\n",
                "2024-01-15 10:00:05 UTC: second<br>\n",
                "<br>\n",
            )
        );
        assert_eq!(summary.events_seen, 2);
        assert_eq!(summary.lines_emitted, 6);
        assert_eq!(summary.chunks_dispatched, 1);
    }

    #[tokio::test]
    async fn test_ignored_container_drops_its_stream() {
        let provider = MemoryProvider::new().with_group_pages(groups()).with_events(
            vec![
                event(1, "mixed", "app", "a1"),
                event(2, "mixed", "sidecar", "s1"),
                event(3, "mixed", "app", "a2"),
                event(4, "clean", "app", "c1"),
            ],
            2,
        );
        let containers = ContainerFilter::new(Vec::<String>::new(), ["^sidecar$"]);
        let (check, sender) = check(provider, no_rules(), containers, 1 << 20);

        let summary = check.run(window(), &CancellationToken::new()).await.unwrap();

        let report = sender.report();
        assert!(!report.contains("s1"));
        assert!(!report.contains("mixed"));
        assert!(report.contains(":clean<br>"));
        assert!(report.contains("UTC: c1<br>"));
        assert_eq!(summary.streams_seen, 2);
        assert_eq!(summary.streams_excluded, 1);
    }

    #[tokio::test]
    async fn test_rules_discard_matching_lines() {
        let provider = MemoryProvider::new().with_group_pages(groups()).with_events(
            vec![
                event(1, "api", "api", "ERROR: disk full"),
                event(2, "api", "api", "DEBUG: retry"),
                event(3, "api", "api", "WARN: slow"),
                event(4, "api", "api", "INFO: started"),
            ],
            10,
        );
        let rules = RuleMatcher::new(["^DEBUG:", "^INFO:"]);
        let (check, sender) = check(provider, rules, ContainerFilter::empty(), 1 << 20);

        check.run(window(), &CancellationToken::new()).await.unwrap();

        let report = sender.report();
        assert!(report.contains("UTC: ERROR: disk full<br>"));
        assert!(report.contains("UTC: WARN: slow<br>"));
        assert!(!report.contains("DEBUG"));
        assert!(!report.contains("INFO"));
    }

    #[tokio::test]
    async fn test_large_report_is_split_into_mails() {
        let events = (0..40)
            .map(|i| event(i, "api", "api", &format!("failure number {i:02}")))
            .collect();
        let provider = MemoryProvider::new().with_group_pages(groups()).with_events(events, 7);
        let (check, sender) = check(provider, no_rules(), ContainerFilter::empty(), 1024);

        let summary = check.run(window(), &CancellationToken::new()).await.unwrap();

        let sent = sender.sent();
        assert!(sent.len() > 1);
        assert_eq!(summary.chunks_dispatched, sent.len());
        for chunk in &sent[..sent.len() - 1] {
            assert!(chunk.len() > 1024);
        }
        assert!(sender.report().starts_with("<b>Parse stream</b> :api<br>\n"));
        assert!(sender.report().ends_with("UTC: failure number 39<br>\n<br>\n"));
    }

    #[tokio::test]
    async fn test_repeated_runs_are_identical() {
        let events = vec![
            event(3, "b-stream", "api", "three"),
            event(1, "a-stream", "web", "one"),
            event(2, "b-stream", "api", "two"),
            event(4, "a-stream", "web", "four"),
        ];
        let first = MemoryProvider::new().with_group_pages(groups()).with_events(events.clone(), 3);
        let second = MemoryProvider::new().with_group_pages(groups()).with_events(events, 1);

        let (check_a, sender_a) = check(first, no_rules(), ContainerFilter::empty(), 1 << 20);
        let (check_b, sender_b) = check(second, no_rules(), ContainerFilter::empty(), 1 << 20);
        check_a.run(window(), &CancellationToken::new()).await.unwrap();
        check_b.run(window(), &CancellationToken::new()).await.unwrap();

        assert_eq!(sender_a.report(), sender_b.report());
        let report = sender_a.report();
        let a = report.find(":a-stream").unwrap();
        let b = report.find(":b-stream").unwrap();
        assert!(a < b);
    }

    #[tokio::test]
    async fn test_no_surviving_lines_sends_nothing() {
        let provider = MemoryProvider::new()
            .with_group_pages(groups())
            .with_events(vec![event(1, "api", "api", "INFO: ok")], 10);
        let (check, sender) = check(provider, RuleMatcher::new(["^INFO"]), ContainerFilter::empty(), 1024);

        let summary = check.run(window(), &CancellationToken::new()).await.unwrap();
        assert!(sender.sent().is_empty());
        assert_eq!(summary.lines_emitted, 0);
        assert_eq!(summary.chunks_dispatched, 0);
    }

    #[tokio::test]
    async fn test_missing_group_fails_before_fetching() {
        let provider = MemoryProvider::new().with_group_pages(vec![vec!["/aws/lambda/other"]]);
        let (check, sender) = check(provider, no_rules(), ContainerFilter::empty(), 1024);

        let err = check.run(window(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CheckError::LogGroupNotFound(ref name) if name == GROUP));
        assert!(!err.is_cancelled());
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fatal() {
        let provider = MemoryProvider::new()
            .with_group_pages(groups())
            .with_events(vec![event(1, "api", "api", "a"), event(2, "api", "api", "b")], 1)
            .failing_events_at(1, "throttled");
        let (check, sender) = check(provider, no_rules(), ContainerFilter::empty(), 1024);

        let err = check.run(window(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CheckError::CloudWatch(CloudWatchError::Provider { .. })));
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run() {
        let provider = MemoryProvider::new()
            .with_group_pages(groups())
            .with_events(vec![event(1, "api", "api", "a")], 1);
        let (check, sender) = check(provider, no_rules(), ContainerFilter::empty(), 1024);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = check.run(window(), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_uses_window() {
        let provider = Arc::new(MemoryProvider::new().with_group_pages(groups()));
        let sender = RecordingSender::new();
        let check = LogCheck::new(
            provider.clone(),
            GROUP,
            no_rules(),
            ContainerFilter::empty(),
            sender,
            options(1024),
        );

        check.run(window(), &CancellationToken::new()).await.unwrap();

        let queries = provider.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].group_name, GROUP);
        assert_eq!(queries[0].start_ms, START);
        assert_eq!(queries[0].end_ms, START + logcheck_types::HOUR_MS);
    }
}
