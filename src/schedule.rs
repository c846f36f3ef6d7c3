use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use logcheck_cloudwatch::{LogsProvider, TimeWindow};
use logcheck_report::ReportSender;
use logcheck_types::HOUR_MS;

use crate::pipeline::{CheckError, LogCheck, RunSummary};

/// Time from `now` to the next scheduled run: the top of an hour plus the
/// ingestion delay
pub fn until_next_run(now: DateTime<Utc>, ingestion_delay: Duration) -> Duration {
    let delay_ms = ingestion_delay.as_millis() as i64;
    let now_ms = now.timestamp_millis();
    let anchor = now_ms - delay_ms;
    let next_hour = (anchor.div_euclid(HOUR_MS) + 1) * HOUR_MS;
    millis((next_hour + delay_ms - now_ms).max(0))
}

/// Time left before the hour that just ended is fully ingested
pub fn ingestion_wait(now: DateTime<Utc>, ingestion_delay: Duration) -> Duration {
    let since_hour = millis(now.timestamp_millis().rem_euclid(HOUR_MS));
    ingestion_delay.saturating_sub(since_hour)
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or_default())
}

/// Sleep for `duration`; false when cancelled first
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Check the previous hour once, waiting for its ingestion if the hour
/// only just ended
pub async fn run_once<P, S>(
    check: &LogCheck<P, S>,
    ingestion_delay: Duration,
    cancel: &CancellationToken,
) -> Result<RunSummary, CheckError>
where
    P: LogsProvider,
    S: ReportSender + Clone + 'static,
{
    let wait = ingestion_wait(Utc::now(), ingestion_delay);
    if !wait.is_zero() {
        info!(seconds = wait.as_secs(), "Waiting for log ingestion");
        if !sleep_or_cancel(wait, cancel).await {
            return Err(CheckError::Cancelled);
        }
    }
    check.run(TimeWindow::last_full_hour(), cancel).await
}

/// Check every hour until cancelled
///
/// A failed run is logged and the next hour is tried anyway.
pub async fn run_scheduled<P, S>(check: &LogCheck<P, S>, ingestion_delay: Duration, cancel: &CancellationToken)
where
    P: LogsProvider,
    S: ReportSender + Clone + 'static,
{
    loop {
        let wait = until_next_run(Utc::now(), ingestion_delay);
        debug!(seconds = wait.as_secs(), "Next run scheduled");
        if !sleep_or_cancel(wait, cancel).await {
            break;
        }

        let window = TimeWindow::last_full_hour();
        match check.run(window, cancel).await {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => break,
            Err(e) => error!(error = %e, log_group = %check.log_group(), "Run failed"),
        }
    }
    info!("Scheduler stopped");
}
