use thiserror::Error;

/// Errors delivering one report chunk
#[derive(Debug, Error)]
pub enum SendError {
    #[error("mail service not configured: {0}")]
    NotConfigured(&'static str),

    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("cannot build mail: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Errors of the report writer stage
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report chunk i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("report writer stopped before the end of the report")]
    WriterClosed,

    #[error("report streaming cancelled")]
    Cancelled,

    #[error("report writer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ReportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
