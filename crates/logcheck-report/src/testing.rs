//! In-memory [`ReportSender`] for tests

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::SendError;
use crate::sender::{MailEnvelope, ReportSender};

#[derive(Debug, Default)]
struct Recorded {
    sent: Vec<String>,
    envelopes: Vec<MailEnvelope>,
    attempts: usize,
    failures_left: usize,
}

/// Records every delivered body; can fail its first calls or hold every
/// call until released
#[derive(Clone, Debug)]
pub struct RecordingSender {
    recorded: Arc<Mutex<Recorded>>,
    gate: watch::Sender<bool>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self {
            recorded: Arc::default(),
            gate: watch::Sender::new(true),
        }
    }

    /// Fails the first `count` sends with a rejection
    pub fn failing_first(count: usize) -> Self {
        let sender = Self::new();
        sender.recorded.lock().failures_left = count;
        sender
    }

    /// Every send waits until [`unblock`](Self::unblock) is called
    pub fn blocked() -> Self {
        let sender = Self::new();
        sender.gate.send_replace(false);
        sender
    }

    pub fn unblock(&self) {
        self.gate.send_replace(true);
    }

    /// Bodies delivered successfully, in order
    pub fn sent(&self) -> Vec<String> {
        self.recorded.lock().sent.clone()
    }

    /// Concatenation of every delivered body
    pub fn report(&self) -> String {
        self.recorded.lock().sent.concat()
    }

    pub fn envelopes(&self) -> Vec<MailEnvelope> {
        self.recorded.lock().envelopes.clone()
    }

    /// Calls made, failed ones included
    pub fn attempts(&self) -> usize {
        self.recorded.lock().attempts
    }
}

impl Default for RecordingSender {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportSender for RecordingSender {
    async fn send(&self, envelope: &MailEnvelope, html_body: &str) -> Result<(), SendError> {
        let mut gate = self.gate.subscribe();
        // Sender half lives in self, so the channel cannot close here
        let _ = gate.wait_for(|open| *open).await;

        let mut recorded = self.recorded.lock();
        recorded.attempts += 1;
        if recorded.failures_left > 0 {
            recorded.failures_left -= 1;
            return Err(SendError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        recorded.sent.push(html_body.to_string());
        recorded.envelopes.push(envelope.clone());
        Ok(())
    }
}
