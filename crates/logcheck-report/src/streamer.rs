use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::ReportError;
use crate::sender::ReportSender;
use crate::writer::{ReportWriter, WriterStats};

/// Bounded channel of formatted report lines feeding a [`ReportWriter`]
/// running on its own task
///
/// The writer finalizes once every sender handle is gone, so dropping the
/// streamer (or calling [`finish`](Self::finish)) always lets the last chunk
/// out, cancelled run or not.
pub struct ReportStreamer {
    tx: mpsc::Sender<String>,
    handle: JoinHandle<Result<WriterStats, ReportError>>,
}

impl ReportStreamer {
    /// Spawn the writer task behind a channel of `capacity` lines
    pub fn spawn<S>(mut writer: ReportWriter<S>, capacity: usize) -> Self
    where
        S: ReportSender + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<String>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if let Err(e) = writer.write_line(&line).await {
                    error!(error = %e, "Report writer failed");
                    return Err(e);
                }
            }
            debug!("Report channel closed");
            writer.finish().await
        });

        Self { tx, handle }
    }

    /// Queue one line, waiting while the writer is behind
    pub async fn send(&self, line: String, cancel: &CancellationToken) -> Result<(), ReportError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ReportError::Cancelled),
            sent = self.tx.send(line) => sent.map_err(|_| ReportError::WriterClosed),
        }
    }

    /// Close the channel and wait for the writer to dispatch what is left
    pub async fn finish(self) -> Result<WriterStats, ReportError> {
        let Self { tx, handle } = self;
        drop(tx);
        handle.await?
    }
}
