//! Saga outcome
//!
//! Serialised as the result message payload: `{status, reason?, ref?}`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ledger::{PaymentRecord, PaymentStatus, ReservationId};

/// Stable saga failure reasons
///
/// Risk denials report the evaluator's own codes joined by `,`; ledger
/// rejections other than insufficient balance pass through unchanged.
pub mod reasons {
    pub const INSUFFICIENT_FUNDS: &str = "insufficient_funds";
    pub const FX_ERROR: &str = "fx_error";
    pub const CAPTURE_ERROR: &str = "capture_error";
    pub const RISK_UNAVAILABLE: &str = "risk_unavailable";
    pub const LEDGER_UNAVAILABLE: &str = "ledger_unavailable";
    pub const RESERVATION_CANCELED: &str = "reservation_canceled";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SagaStatus {
    Success,
    Failed,
}

impl SagaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Success => "SUCCESS",
            SagaStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one transfer
///
/// `reason` is present iff FAILED, `reference` iff SUCCESS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaOutcome {
    pub status: SagaStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReservationId>,
}

impl SagaOutcome {
    pub fn success(reference: ReservationId) -> Self {
        Self {
            status: SagaStatus::Success,
            reason: None,
            reference: Some(reference),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: SagaStatus::Failed,
            reason: Some(reason.into()),
            reference: None,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == SagaStatus::Success
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Journal form of this outcome for `payment_id`
    pub fn to_record(&self, payment_id: &str) -> PaymentRecord {
        match (self.status, self.reference) {
            (SagaStatus::Success, Some(reference)) => PaymentRecord::success(payment_id, reference),
            _ => PaymentRecord::failed(payment_id, self.reason().unwrap_or_default()),
        }
    }
}

impl From<PaymentRecord> for SagaOutcome {
    fn from(record: PaymentRecord) -> Self {
        Self {
            status: match record.status {
                PaymentStatus::Success => SagaStatus::Success,
                PaymentStatus::Failed => SagaStatus::Failed,
            },
            reason: record.reason,
            reference: record.reservation_id,
        }
    }
}
