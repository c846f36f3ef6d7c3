use std::collections::BTreeMap;

use tracing::{debug, warn};

use logcheck_types::{ContainerIdentity, LogLine, RawEvent};

use crate::filter::ContainerFilter;
use crate::format::StreamReport;
use crate::rules::RuleMatcher;

/// Header identity state of one stream
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BucketState {
    /// No line accepted yet
    #[default]
    Unset,
    /// The first accepted line came from this container
    Identified(ContainerIdentity),
    /// A line from an ignored container was seen; nothing is reported
    Excluded,
}

/// Accepted lines of one log stream
#[derive(Clone, Debug, Default)]
pub struct StreamBucket {
    state: BucketState,
    lines: Vec<LogLine>,
}

impl StreamBucket {
    pub fn state(&self) -> &BucketState {
        &self.state
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    pub fn is_excluded(&self) -> bool {
        self.state == BucketState::Excluded
    }

    /// Poison the stream; lines buffered so far are dropped
    fn exclude(&mut self) {
        self.state = BucketState::Excluded;
        self.lines = Vec::new();
    }

    fn accept(&mut self, identity: impl FnOnce() -> ContainerIdentity, line: LogLine) {
        if self.state == BucketState::Unset {
            self.state = BucketState::Identified(identity());
        }
        self.lines.push(line);
    }

    /// Sorted report for this stream, unless it is excluded or empty
    fn into_report(self, stream_name: String) -> Option<StreamReport> {
        let BucketState::Identified(identity) = self.state else {
            return None;
        };
        if self.lines.is_empty() {
            return None;
        }
        let mut lines = self.lines;
        lines.sort_by_key(|line| line.timestamp);
        Some(StreamReport {
            stream_name,
            identity,
            lines,
        })
    }
}

/// What happened to one observed event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    /// Added to its stream's bucket
    Accepted,
    /// Matched an ignore rule and was discarded
    MatchedRule,
    /// Came from an ignored image or container; its stream is now excluded
    IgnoredContainer,
    /// Its stream was already excluded
    StreamExcluded,
    /// The payload was not a valid envelope
    Malformed,
}

/// Counters for one aggregation pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub events_seen: usize,
    pub events_malformed: usize,
    pub events_matched_rule: usize,
    pub events_accepted: usize,
    pub streams_seen: usize,
    pub streams_excluded: usize,
}

/// Groups surviving events per stream until every page has been seen
///
/// Exclusion can be discovered by any event of a stream, so nothing is
/// emitted before [`StreamAggregator::finish`].
pub struct StreamAggregator<'a> {
    rules: &'a RuleMatcher,
    containers: &'a ContainerFilter,

    /// Keyed by stream name; iteration order is the emission order
    buckets: BTreeMap<String, StreamBucket>,

    stats: AggregatorStats,
}

impl<'a> StreamAggregator<'a> {
    pub fn new(rules: &'a RuleMatcher, containers: &'a ContainerFilter) -> Self {
        Self {
            rules,
            containers,
            buckets: BTreeMap::new(),
            stats: AggregatorStats::default(),
        }
    }

    /// Classify one event and file it under its stream
    pub fn observe(&mut self, event: RawEvent) -> Observation {
        let envelope = match event.decode() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(stream = %event.stream_name, error = %e, "Failed to parse log event");
                self.stats.events_malformed += 1;
                return Observation::Malformed;
            }
        };
        self.stats.events_seen += 1;

        let bucket = self
            .buckets
            .entry(event.stream_name)
            .or_insert_with_key(|name| {
                debug!(stream = %name, "New stream group");
                StreamBucket::default()
            });

        if self.rules.matches_any_rule(&envelope.log) {
            self.stats.events_matched_rule += 1;
            return Observation::MatchedRule;
        }

        let meta = &envelope.kubernetes;
        if self.containers.is_ignored(&meta.container_image, &meta.container_name) {
            if !bucket.is_excluded() {
                debug!(
                    container_image = %meta.container_image,
                    container_name = %meta.container_name,
                    "Stream marked as ignored"
                );
            }
            bucket.exclude();
            return Observation::IgnoredContainer;
        }

        if bucket.is_excluded() {
            return Observation::StreamExcluded;
        }

        bucket.accept(|| meta.identity(), LogLine::new(event.timestamp, envelope.log));
        self.stats.events_accepted += 1;
        Observation::Accepted
    }

    pub fn bucket(&self, stream_name: &str) -> Option<&StreamBucket> {
        self.buckets.get(stream_name)
    }

    pub fn stats(&self) -> &AggregatorStats {
        &self.stats
    }

    /// End buffering: reports for every non-excluded, non-empty stream in
    /// ascending stream name order, each sorted by timestamp
    pub fn finish(self) -> (Vec<StreamReport>, AggregatorStats) {
        let mut stats = self.stats;
        stats.streams_seen = self.buckets.len();
        stats.streams_excluded = self.buckets.values().filter(|b| b.is_excluded()).count();

        let reports: Vec<StreamReport> = self
            .buckets
            .into_iter()
            .filter_map(|(name, bucket)| {
                if bucket.is_excluded() {
                    debug!(stream = %name, "Skipping stream due to ignored containers");
                }
                bucket.into_report(name)
            })
            .collect();

        debug!(
            streams = stats.streams_seen,
            excluded = stats.streams_excluded,
            reported = reports.len(),
            "Aggregation complete"
        );
        (reports, stats)
    }
}
