//! Bridge Error Types

use thiserror::Error;

use super::reasons;
use super::stream::StreamError;
use crate::saga::SagaOutcome;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// No result within the wait window. The saga may still complete.
    #[error("Timed out waiting for settlement result")]
    Timeout,

    #[error("Failed to publish request: {0}")]
    Publish(#[from] StreamError),

    /// The result listener stopped before answering
    #[error("Result listener closed")]
    Closed,
}

impl BridgeError {
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Timeout => reasons::QUEUE_TIMEOUT,
            BridgeError::Publish(_) => reasons::QUEUE_PUBLISH_ERROR,
            BridgeError::Closed => reasons::QUEUE_CLOSED,
        }
    }

    /// Reported to the caller as a FAILED outcome carrying the code
    pub fn into_outcome(self) -> SagaOutcome {
        SagaOutcome::failed(self.code())
    }
}
