use std::sync::Arc;

use futures::{Stream, TryStreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use logcheck_types::{EventPage, RawEvent, TimeWindow};

use crate::error::{CloudWatchError, Result};
use crate::limiter::RateLimiter;
use crate::provider::LogsProvider;

/// A time-bounded, group-scoped event query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventQuery {
    pub group_name: String,

    /// Inclusive start, epoch milliseconds
    pub start_ms: i64,

    /// Exclusive end, epoch milliseconds
    pub end_ms: i64,
}

impl EventQuery {
    pub fn new(group_name: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            group_name: group_name.into(),
            start_ms: window.start_ms,
            end_ms: window.end_ms,
        }
    }
}

/// Paginates `FilterLogEvents` under the events rate limiter
pub struct EventFetcher<P> {
    provider: Arc<P>,
    limiter: Arc<RateLimiter>,
}

impl<P: LogsProvider> EventFetcher<P> {
    pub fn new(provider: Arc<P>, limiter: Arc<RateLimiter>) -> Self {
        Self { provider, limiter }
    }

    /// Start a fresh pagination over `query`
    ///
    /// The sequence can only be restarted from the beginning, by calling
    /// `fetch` again.
    pub fn fetch(&self, query: EventQuery, cancel: CancellationToken) -> EventPages<P> {
        debug!(
            group_name = %query.group_name,
            start_ms = query.start_ms,
            end_ms = query.end_ms,
            "Starting FilterLogEvents"
        );
        EventPages {
            provider: Arc::clone(&self.provider),
            limiter: Arc::clone(&self.limiter),
            query,
            cancel,
            next_token: None,
            finished: false,
            pages: 0,
            events: 0,
        }
    }
}

/// Cursor over the pages of one event query
pub struct EventPages<P> {
    provider: Arc<P>,
    limiter: Arc<RateLimiter>,
    query: EventQuery,
    cancel: CancellationToken,
    next_token: Option<String>,
    finished: bool,
    pages: usize,
    events: usize,
}

impl<P: LogsProvider> EventPages<P> {
    /// Fetch the next page, `Ok(None)` once the query is exhausted
    ///
    /// Checks cancellation, then waits for a rate limiter token, then issues
    /// the call. Any failure ends the pagination.
    pub async fn next_page(&mut self) -> Result<Option<Vec<RawEvent>>> {
        if self.finished {
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            self.finished = true;
            return Err(CloudWatchError::Cancelled);
        }

        let page = match self.acquire_and_call().await {
            Ok(page) => page,
            Err(err) => {
                self.finished = true;
                return Err(err);
            }
        };

        self.pages += 1;
        self.events += page.events.len();
        debug!(page = self.pages, events = page.events.len(), "Processing page");

        self.next_token = page.next_token;
        if self.next_token.is_none() {
            self.finished = true;
            debug!(
                total_events = self.events,
                pages = self.pages,
                "Completed FilterLogEvents"
            );
            if page.events.is_empty() {
                return Ok(None);
            }
        }

        Ok(Some(page.events))
    }

    async fn acquire_and_call(&mut self) -> Result<EventPage> {
        self.limiter.acquire(&self.cancel).await?;
        self.provider
            .filter_log_events(&self.query, self.next_token.take())
            .await
    }

    /// Pages fetched so far
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Events fetched so far
    pub fn events(&self) -> usize {
        self.events
    }

    /// Flatten the pages into a lazy stream of events
    pub fn into_stream(self) -> impl Stream<Item = Result<RawEvent>> {
        stream::try_unfold(self, |mut pages| async move {
            let next = pages.next_page().await?;
            Ok::<_, CloudWatchError>(next.map(|events| {
                let events = events.into_iter().map(Ok::<RawEvent, CloudWatchError>);
                (stream::iter(events), pages)
            }))
        })
        .try_flatten()
    }
}
