//! In-memory provider serving canned pages, for tests

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use logcheck_types::{EventPage, LogGroupPage, RawEvent};

use crate::error::{CloudWatchError, Result};
use crate::fetcher::EventQuery;
use crate::provider::LogsProvider;

/// Provider backed by fixed pages chained with `token-N` continuation tokens
#[derive(Debug, Default)]
pub struct MemoryProvider {
    group_pages: Vec<Vec<String>>,
    group_failure: Option<String>,
    event_pages: Vec<Vec<RawEvent>>,
    event_failure: Option<(usize, String)>,
    group_calls: AtomicUsize,
    event_calls: AtomicUsize,
    queries: Mutex<Vec<EventQuery>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group_pages(mut self, pages: Vec<Vec<&str>>) -> Self {
        self.group_pages = pages
            .into_iter()
            .map(|page| page.into_iter().map(str::to_string).collect())
            .collect();
        self
    }

    pub fn with_event_pages(mut self, pages: Vec<Vec<RawEvent>>) -> Self {
        self.event_pages = pages;
        self
    }

    /// Split `events` into pages of at most `page_size`
    pub fn with_events(self, events: Vec<RawEvent>, page_size: usize) -> Self {
        let pages = events
            .chunks(page_size.max(1))
            .map(<[RawEvent]>::to_vec)
            .collect();
        self.with_event_pages(pages)
    }

    /// Every `DescribeLogGroups` call fails with `message`
    pub fn failing_groups(mut self, message: &str) -> Self {
        self.group_failure = Some(message.to_string());
        self
    }

    /// The `FilterLogEvents` call for page `page` (zero-based) fails with `message`
    pub fn failing_events_at(mut self, page: usize, message: &str) -> Self {
        self.event_failure = Some((page, message.to_string()));
        self
    }

    pub fn group_calls(&self) -> usize {
        self.group_calls.load(Ordering::SeqCst)
    }

    pub fn event_calls(&self) -> usize {
        self.event_calls.load(Ordering::SeqCst)
    }

    /// Queries received by `filter_log_events`, in call order
    pub fn queries(&self) -> Vec<EventQuery> {
        self.queries.lock().clone()
    }

    fn page_index(token: Option<&str>) -> usize {
        token
            .and_then(|t| t.strip_prefix("token-"))
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }

    fn next_token(index: usize, len: usize) -> Option<String> {
        (index + 1 < len).then(|| format!("token-{}", index + 1))
    }
}

impl LogsProvider for MemoryProvider {
    async fn describe_log_groups(&self, next_token: Option<String>) -> Result<LogGroupPage> {
        self.group_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.group_failure {
            return Err(CloudWatchError::provider("DescribeLogGroups", message.clone()));
        }

        let index = Self::page_index(next_token.as_deref());
        Ok(LogGroupPage {
            names: self.group_pages.get(index).cloned().unwrap_or_default(),
            next_token: Self::next_token(index, self.group_pages.len()),
        })
    }

    async fn filter_log_events(
        &self,
        query: &EventQuery,
        next_token: Option<String>,
    ) -> Result<EventPage> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.clone());

        let index = Self::page_index(next_token.as_deref());
        if let Some((failing, message)) = &self.event_failure {
            if *failing == index {
                return Err(CloudWatchError::provider("FilterLogEvents", message.clone()));
            }
        }

        Ok(EventPage {
            events: self.event_pages.get(index).cloned().unwrap_or_default(),
            next_token: Self::next_token(index, self.event_pages.len()),
        })
    }
}
