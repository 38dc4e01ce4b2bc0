//! Ledger Store
//!
//! Durable account balances and reservations. The only component allowed to
//! mutate a balance.
//!
//! # Reservation protocol
//!
//! ```text
//! Reserve(payment_id) ──▶ RESERVED ──Capture──▶ CAPTURED
//!                             │
//!                             └────Cancel────▶ CANCELED (amount credited back)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Atomic operations**: each of reserve/capture/cancel is one storage transaction
//! 2. **One reservation per payment**: `payment_id` is unique; a retry returns the existing id
//! 3. **Debit at reserve**: the stored balance is the available balance
//! 4. **Idempotent capture**: capturing a CAPTURED reservation reports success
//! 5. **Never deleted**: reservations are the audit trail
//! 6. **One outcome per payment**: the first journaled `PaymentRecord` wins

pub mod error;
pub mod memory;
pub mod postgres;
pub mod types;

use async_trait::async_trait;

pub use error::LedgerError;
pub use memory::InMemoryLedger;
pub use postgres::PgLedger;
pub use types::{
    Account, LedgerReply, PaymentRecord, PaymentStatus, Reservation, ReservationId,
    ReservationStatus, ReserveReply, ReserveRequest, reasons,
};

/// Ledger port used by the saga
///
/// Every method is a single atomic storage transaction. `Err` means the
/// operation did not happen (or its result is unknown); business rejections
/// come back as `Ok` replies.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Check-and-debit, then record a RESERVED reservation keyed by payment id
    async fn reserve(&self, request: &ReserveRequest) -> Result<ReserveReply, LedgerError>;

    /// RESERVED → CAPTURED, crediting the receiver when it is held here
    async fn capture(&self, reservation_id: ReservationId) -> Result<LedgerReply, LedgerError>;

    /// RESERVED → CANCELED, crediting the reserved amount back
    async fn cancel(&self, reservation_id: ReservationId) -> Result<LedgerReply, LedgerError>;

    async fn account(&self, account_id: &str) -> Result<Option<Account>, LedgerError>;

    async fn reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, LedgerError>;

    async fn reservation_for_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<Reservation>, LedgerError>;

    /// Journal a payment's terminal outcome unless one is already stored
    ///
    /// Returns the stored record: `record` itself, or the earlier one.
    async fn record_outcome(&self, record: PaymentRecord) -> Result<PaymentRecord, LedgerError>;

    async fn outcome_for_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<PaymentRecord>, LedgerError>;

    /// Bulk seed: insert or overwrite balance and currency
    async fn upsert_accounts(&self, accounts: Vec<Account>) -> Result<usize, LedgerError>;
}
