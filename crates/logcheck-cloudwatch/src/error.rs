use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while talking to CloudWatch Logs
#[derive(Debug, Error)]
pub enum CloudWatchError {
    /// The run was cancelled while waiting or before issuing a call
    #[error("operation cancelled")]
    Cancelled,

    /// A provider call failed; partial results are not usable
    #[error("{operation} failed: {source}")]
    Provider {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

impl CloudWatchError {
    pub fn provider(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Provider {
            operation,
            source: source.into(),
        }
    }

    /// Cancellation is not a processing failure and should not be reported as one
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, CloudWatchError>;
