//! Ledger Error Types
//!
//! System failures only. Insufficient balance, unknown accounts and replayed
//! payment ids are reply values, not errors.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    /// Storage unreachable or timed out; the whole operation did not happen
    #[error("Ledger storage unavailable: {0}")]
    Unavailable(String),

    #[error("Ledger database error: {0}")]
    Database(String),

    /// A stored row could not be decoded
    #[error("Corrupt ledger record: {0}")]
    Corrupt(String),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Unavailable(_) => "ledger_unavailable",
            LedgerError::Database(_) => "ledger_error",
            LedgerError::Corrupt(_) => "ledger_corrupt",
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                LedgerError::Unavailable(e.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
                LedgerError::Corrupt(e.to_string())
            }
            other => LedgerError::Database(other.to_string()),
        }
    }
}
