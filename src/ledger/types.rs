//! Ledger Types
//!
//! Accounts, reservations and the replies of the reserve/capture/cancel
//! protocol. Business rejections are reply values, never errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::AccountId;
use crate::money::{Currency, MinorAmount};

/// Stable rejection reasons
pub mod reasons {
    pub const INSUFFICIENT_BALANCE: &str = "insufficient_balance";
    pub const ACCOUNT_NOT_FOUND: &str = "account_not_found";
    pub const CURRENCY_MISMATCH: &str = "currency_mismatch";
    pub const RESERVATION_NOT_FOUND: &str = "reservation_not_found";
    pub const ALREADY_CANCELED: &str = "already_canceled";
    pub const ALREADY_CAPTURED: &str = "already_captured";
}

/// Reservation ID - ULID-based, system generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReservationId(ulid::Ulid);

impl ReservationId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReservationId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

impl TryFrom<String> for ReservationId {
    type Error = ulid::DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReservationId> for String {
    fn from(id: ReservationId) -> Self {
        id.to_string()
    }
}

/// Reservation lifecycle
///
/// ```text
/// RESERVED → CAPTURED
///     ↓
/// CANCELED (balance credited back)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservationStatus {
    Reserved,
    Captured,
    Canceled,
}

impl ReservationStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Reserved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "RESERVED",
            ReservationStatus::Captured => "CAPTURED",
            ReservationStatus::Canceled => "CANCELED",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "RESERVED" => Some(ReservationStatus::Reserved),
            "CAPTURED" => Some(ReservationStatus::Captured),
            "CANCELED" => Some(ReservationStatus::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    /// Minor units; reserved funds are already debited
    pub balance: i64,
    pub currency: Currency,
}

impl Account {
    pub fn new(account_id: impl Into<String>, balance: i64, currency: Currency) -> Self {
        Self {
            account_id: account_id.into(),
            balance,
            currency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: ReservationId,
    /// Unique: at most one reservation per transfer
    pub payment_id: String,
    pub account_id: AccountId,
    pub receiver_id: AccountId,
    pub amount: MinorAmount,
    pub currency: Currency,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

/// Final status of a payment as journaled by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(PaymentStatus::Success),
            "FAILED" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

/// Terminal outcome of one payment, written once per payment id
///
/// Business rejections that never touched a balance are journaled here too,
/// so a resubmission observes them after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub reason: Option<String>,
    pub reservation_id: Option<ReservationId>,
    pub recorded_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn success(payment_id: impl Into<String>, reservation_id: ReservationId) -> Self {
        Self {
            payment_id: payment_id.into(),
            status: PaymentStatus::Success,
            reason: None,
            reservation_id: Some(reservation_id),
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(payment_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            status: PaymentStatus::Failed,
            reason: Some(reason.into()),
            reservation_id: None,
            recorded_at: Utc::now(),
        }
    }
}

/// Input of `Reserve`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveRequest {
    pub payment_id: String,
    pub account_id: AccountId,
    /// Credited on capture when held by the same ledger
    pub receiver_id: AccountId,
    pub amount: MinorAmount,
    pub currency: Currency,
}

/// Reply of `Reserve`: `{ok, reservation_id, reason}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveReply {
    /// Balance debited, new RESERVED row
    Reserved { reservation_id: ReservationId },
    /// A reservation for this payment id already existed; nothing mutated
    Replayed {
        reservation_id: ReservationId,
        status: ReservationStatus,
    },
    /// Business rejection; nothing mutated
    Rejected { reason: &'static str },
}

impl ReserveReply {
    #[inline]
    pub fn ok(&self) -> bool {
        !matches!(self, ReserveReply::Rejected { .. })
    }

    pub fn reservation_id(&self) -> Option<ReservationId> {
        match self {
            ReserveReply::Reserved { reservation_id }
            | ReserveReply::Replayed { reservation_id, .. } => Some(*reservation_id),
            ReserveReply::Rejected { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            ReserveReply::Rejected { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Reply of `Capture` / `Cancel`: `{ok, reason}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerReply {
    /// Transition applied now
    Applied,
    /// Target state already reached earlier; reported as success
    AlreadyApplied,
    Rejected { reason: &'static str },
}

impl LedgerReply {
    #[inline]
    pub fn ok(&self) -> bool {
        !matches!(self, LedgerReply::Rejected { .. })
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            LedgerReply::Rejected { reason } => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservation_id_roundtrip_via_string() {
        let id = ReservationId::new();
        let parsed: ReservationId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-ulid".parse::<ReservationId>().is_err());
    }

    #[test]
    fn test_status_db_names() {
        for s in [
            ReservationStatus::Reserved,
            ReservationStatus::Captured,
            ReservationStatus::Canceled,
        ] {
            assert_eq!(ReservationStatus::from_db(s.as_str()), Some(s));
        }
        assert_eq!(ReservationStatus::from_db("PENDING"), None);
        assert!(!ReservationStatus::Reserved.is_terminal());
        assert!(ReservationStatus::Captured.is_terminal());

        for s in [PaymentStatus::Success, PaymentStatus::Failed] {
            assert_eq!(PaymentStatus::from_db(s.as_str()), Some(s));
        }
        assert_eq!(PaymentStatus::from_db("PENDING"), None);
    }

    #[test]
    fn test_payment_record_constructors() {
        let id = ReservationId::new();
        let ok = PaymentRecord::success("K1", id);
        assert_eq!(ok.status, PaymentStatus::Success);
        assert_eq!(ok.reservation_id, Some(id));
        assert!(ok.reason.is_none());

        let failed = PaymentRecord::failed("K2", "same_party");
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert_eq!(failed.reason.as_deref(), Some("same_party"));
        assert!(failed.reservation_id.is_none());
    }

    #[test]
    fn test_reply_accessors() {
        let id = ReservationId::new();
        assert!(ReserveReply::Reserved { reservation_id: id }.ok());
        let replay = ReserveReply::Replayed {
            reservation_id: id,
            status: ReservationStatus::Captured,
        };
        assert!(replay.ok());
        assert_eq!(replay.reservation_id(), Some(id));

        let rejected = ReserveReply::Rejected {
            reason: reasons::INSUFFICIENT_BALANCE,
        };
        assert!(!rejected.ok());
        assert_eq!(rejected.reservation_id(), None);
        assert_eq!(rejected.reason(), Some("insufficient_balance"));

        assert!(LedgerReply::AlreadyApplied.ok());
        assert_eq!(
            LedgerReply::Rejected {
                reason: reasons::RESERVATION_NOT_FOUND
            }
            .reason(),
            Some("reservation_not_found")
        );
    }
}
