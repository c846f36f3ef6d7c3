use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::error::ReportError;
use crate::sender::{MailEnvelope, ReportSender};

/// Chunk size above which a partial report is sent (2 MiB)
pub const DEFAULT_MAX_REPORT_SIZE: usize = 2 * 1024 * 1024;

/// Counters for one report
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub lines_written: usize,
    pub bytes_written: usize,
    pub chunks_dispatched: usize,
    pub dispatch_failures: usize,
}

/// The open chunk: a temporary file and what has been written to it
struct Chunk {
    file: NamedTempFile,
    size: usize,
    lines: usize,
}

/// Accumulates report lines into file-backed chunks and dispatches each
/// chunk once it grows past `max_report_size`
///
/// Dispatch failures are logged and the chunk is dropped; the report goes on.
/// Chunk files are deleted after dispatch, successful or not.
pub struct ReportWriter<S> {
    sender: S,
    envelope: MailEnvelope,
    max_report_size: usize,

    /// Where chunk files are created; the system temp dir when unset
    chunk_dir: Option<PathBuf>,

    /// Opened lazily on the first line after a dispatch
    chunk: Option<Chunk>,

    stats: WriterStats,
}

impl<S: ReportSender> ReportWriter<S> {
    pub fn new(sender: S, envelope: MailEnvelope, max_report_size: usize) -> Self {
        Self {
            sender,
            envelope,
            max_report_size,
            chunk_dir: None,
            chunk: None,
            stats: WriterStats::default(),
        }
    }

    pub fn with_chunk_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.chunk_dir = Some(dir.into());
        self
    }

    /// Append one line, dispatching the chunk if it is now over the limit
    pub async fn write_line(&mut self, line: &str) -> Result<(), ReportError> {
        let mut chunk = match self.chunk.take() {
            Some(chunk) => chunk,
            None => self.open_chunk()?,
        };

        chunk.file.write_all(line.as_bytes())?;
        chunk.size += line.len();
        chunk.lines += 1;
        self.stats.lines_written += 1;
        self.stats.bytes_written += line.len();

        if chunk.size > self.max_report_size {
            debug!(size = chunk.size, max = self.max_report_size, "Report chunk full");
            self.dispatch(chunk).await
        } else {
            self.chunk = Some(chunk);
            Ok(())
        }
    }

    /// Dispatch whatever is left and return the counters
    pub async fn finish(mut self) -> Result<WriterStats, ReportError> {
        if let Some(chunk) = self.chunk.take() {
            self.dispatch(chunk).await?;
        }
        debug!(
            lines = self.stats.lines_written,
            chunks = self.stats.chunks_dispatched,
            failures = self.stats.dispatch_failures,
            "Report complete"
        );
        Ok(self.stats)
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// Size of the open chunk, zero right after a dispatch
    pub fn current_size(&self) -> usize {
        self.chunk.as_ref().map_or(0, |chunk| chunk.size)
    }

    fn open_chunk(&self) -> Result<Chunk, ReportError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("report-").suffix(".html");
        let file = match &self.chunk_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        debug!(path = %file.path().display(), "Create report chunk");
        Ok(Chunk {
            file,
            size: 0,
            lines: 0,
        })
    }

    /// Send a closed chunk if it holds any line, then delete its file
    async fn dispatch(&mut self, mut chunk: Chunk) -> Result<(), ReportError> {
        if chunk.lines > 0 {
            chunk.file.flush()?;
            let body = tokio::fs::read_to_string(chunk.file.path()).await?;

            debug!(lines = chunk.lines, size = chunk.size, "Send report chunk");
            match self.sender.send(&self.envelope, &body).await {
                Ok(()) => self.stats.chunks_dispatched += 1,
                Err(e) => {
                    error!(error = %e, lines = chunk.lines, "Failed to send report chunk");
                    self.stats.dispatch_failures += 1;
                }
            }
        }

        let path = chunk.file.path().to_path_buf();
        if let Err(e) = chunk.file.close() {
            warn!(path = %path.display(), error = %e, "Failed to remove report chunk");
        }
        Ok(())
    }
}
