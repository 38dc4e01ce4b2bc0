//! Core types used throughout the system
//!
//! Identifiers and the transfer descriptor shared by the risk evaluator,
//! the saga coordinator and the correlation bridge.

use serde::{Deserialize, Serialize};

use crate::money::{Currency, MinorAmount};

/// Account ID - globally unique, immutable after assignment.
pub type AccountId = String;

/// Idempotency key - caller-chosen, doubles as the ledger payment id
/// and as the routing key on both message streams.
pub type IdempotencyKey = String;

/// Transfer request as accepted at the ingress boundary.
///
/// Serialised as the request message payload. The field set is the wire
/// contract of the request stream, so renames must keep the serde names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub idempotency_key: IdempotencyKey,
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub amount_minor: MinorAmount,
    pub currency: Currency,
    /// ISO-8601 transaction date as supplied by the caller
    pub tx_date: String,
}

impl TransferRequest {
    pub fn new(
        idempotency_key: impl Into<String>,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        amount_minor: MinorAmount,
        currency: Currency,
        tx_date: impl Into<String>,
    ) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            amount_minor,
            currency,
            tx_date: tx_date.into(),
        }
    }
}
