//! In-memory ledger backend
//!
//! All state sits behind one mutex, so every operation runs as a serialisable
//! transaction: the check-and-debit and the reservation insert are observed
//! together or not at all. Used for tests and single-process deployments.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::error::LedgerError;
use super::types::{
    Account, LedgerReply, PaymentRecord, Reservation, ReservationId, ReservationStatus,
    ReserveReply, ReserveRequest, reasons,
};
use super::LedgerStore;

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<String, Account>,
    reservations: HashMap<ReservationId, Reservation>,
    /// payment_id → reservation_id (the uniqueness constraint)
    by_payment: HashMap<String, ReservationId>,
    /// payment_id → journaled outcome, first write wins
    payments: HashMap<String, PaymentRecord>,
}

#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let ledger = Self::new();
        if let Ok(mut state) = ledger.state.lock() {
            for account in accounts {
                state.accounts.insert(account.account_id.clone(), account);
            }
        }
        ledger
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, LedgerError> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger state lock poisoned".to_string()))
    }

    /// Number of reservation rows ever written
    pub fn reservation_count(&self) -> Result<usize, LedgerError> {
        Ok(self.lock()?.reservations.len())
    }

    pub fn accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let mut all: Vec<Account> = self.lock()?.accounts.values().cloned().collect();
        all.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        Ok(all)
    }
}

impl LedgerState {
    fn reserve(&mut self, request: &ReserveRequest) -> ReserveReply {
        if let Some(existing) = self
            .by_payment
            .get(&request.payment_id)
            .and_then(|id| self.reservations.get(id))
        {
            if existing.account_id != request.account_id || existing.amount != request.amount {
                warn!(
                    payment_id = %request.payment_id,
                    reservation_id = %existing.reservation_id,
                    "Reserve replay with different account/amount, returning original reservation"
                );
            }
            return ReserveReply::Replayed {
                reservation_id: existing.reservation_id,
                status: existing.status,
            };
        }

        let Some(account) = self.accounts.get_mut(&request.account_id) else {
            return ReserveReply::Rejected {
                reason: reasons::ACCOUNT_NOT_FOUND,
            };
        };
        if account.currency != request.currency {
            return ReserveReply::Rejected {
                reason: reasons::CURRENCY_MISMATCH,
            };
        }
        let amount = request.amount.value();
        if account.balance < amount {
            return ReserveReply::Rejected {
                reason: reasons::INSUFFICIENT_BALANCE,
            };
        }

        account.balance -= amount;
        let reservation = Reservation {
            reservation_id: ReservationId::new(),
            payment_id: request.payment_id.clone(),
            account_id: request.account_id.clone(),
            receiver_id: request.receiver_id.clone(),
            amount: request.amount,
            currency: request.currency,
            status: ReservationStatus::Reserved,
            created_at: Utc::now(),
        };
        let reservation_id = reservation.reservation_id;
        self.by_payment
            .insert(request.payment_id.clone(), reservation_id);
        self.reservations.insert(reservation_id, reservation);
        ReserveReply::Reserved { reservation_id }
    }

    fn capture(&mut self, reservation_id: ReservationId) -> LedgerReply {
        let Some(reservation) = self.reservations.get_mut(&reservation_id) else {
            return LedgerReply::Rejected {
                reason: reasons::RESERVATION_NOT_FOUND,
            };
        };
        match reservation.status {
            ReservationStatus::Captured => return LedgerReply::AlreadyApplied,
            ReservationStatus::Canceled => {
                return LedgerReply::Rejected {
                    reason: reasons::ALREADY_CANCELED,
                };
            }
            ReservationStatus::Reserved => {}
        }

        reservation.status = ReservationStatus::Captured;
        if let Some(receiver) = self.accounts.get_mut(&reservation.receiver_id)
            && receiver.currency == reservation.currency
        {
            receiver.balance += reservation.amount.value();
        }
        LedgerReply::Applied
    }

    fn cancel(&mut self, reservation_id: ReservationId) -> Result<LedgerReply, LedgerError> {
        let Some(reservation) = self.reservations.get_mut(&reservation_id) else {
            return Ok(LedgerReply::Rejected {
                reason: reasons::RESERVATION_NOT_FOUND,
            });
        };
        match reservation.status {
            ReservationStatus::Canceled => return Ok(LedgerReply::AlreadyApplied),
            ReservationStatus::Captured => {
                return Ok(LedgerReply::Rejected {
                    reason: reasons::ALREADY_CAPTURED,
                });
            }
            ReservationStatus::Reserved => {}
        }

        let Some(account) = self.accounts.get_mut(&reservation.account_id) else {
            return Err(LedgerError::Corrupt(format!(
                "reservation {} references missing account {}",
                reservation_id, reservation.account_id
            )));
        };
        account.balance += reservation.amount.value();
        reservation.status = ReservationStatus::Canceled;
        Ok(LedgerReply::Applied)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn reserve(&self, request: &ReserveRequest) -> Result<ReserveReply, LedgerError> {
        let reply = self.lock()?.reserve(request);
        debug!(
            payment_id = %request.payment_id,
            account_id = %request.account_id,
            amount = request.amount.value(),
            reply = ?reply,
            "Ledger reserve"
        );
        Ok(reply)
    }

    async fn capture(&self, reservation_id: ReservationId) -> Result<LedgerReply, LedgerError> {
        let reply = self.lock()?.capture(reservation_id);
        debug!(reservation_id = %reservation_id, reply = ?reply, "Ledger capture");
        Ok(reply)
    }

    async fn cancel(&self, reservation_id: ReservationId) -> Result<LedgerReply, LedgerError> {
        let reply = self.lock()?.cancel(reservation_id)?;
        debug!(reservation_id = %reservation_id, reply = ?reply, "Ledger cancel");
        Ok(reply)
    }

    async fn account(&self, account_id: &str) -> Result<Option<Account>, LedgerError> {
        Ok(self.lock()?.accounts.get(account_id).cloned())
    }

    async fn reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, LedgerError> {
        Ok(self.lock()?.reservations.get(&reservation_id).cloned())
    }

    async fn reservation_for_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<Reservation>, LedgerError> {
        let state = self.lock()?;
        Ok(state
            .by_payment
            .get(payment_id)
            .and_then(|id| state.reservations.get(id))
            .cloned())
    }

    async fn record_outcome(&self, record: PaymentRecord) -> Result<PaymentRecord, LedgerError> {
        let mut state = self.lock()?;
        let stored = state
            .payments
            .entry(record.payment_id.clone())
            .or_insert(record)
            .clone();
        debug!(payment_id = %stored.payment_id, status = stored.status.as_str(), "Outcome journaled");
        Ok(stored)
    }

    async fn outcome_for_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<PaymentRecord>, LedgerError> {
        Ok(self.lock()?.payments.get(payment_id).cloned())
    }

    async fn upsert_accounts(&self, accounts: Vec<Account>) -> Result<usize, LedgerError> {
        let mut state = self.lock()?;
        let count = accounts.len();
        for account in accounts {
            state.accounts.insert(account.account_id.clone(), account);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::{Currency, MinorAmount};
    use std::sync::Arc;

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::with_accounts([
            Account::new("A", 5_000, Currency::Idr),
            Account::new("B", 0, Currency::Idr),
            Account::new("U", 1_000, Currency::Usd),
        ])
    }

    fn reserve_req(payment_id: &str, account: &str, amount: i64) -> ReserveRequest {
        ReserveRequest {
            payment_id: payment_id.to_string(),
            account_id: account.to_string(),
            receiver_id: "B".to_string(),
            amount: MinorAmount::new(amount).unwrap(),
            currency: Currency::Idr,
        }
    }

    async fn balance(ledger: &InMemoryLedger, id: &str) -> i64 {
        ledger.account(id).await.unwrap().unwrap().balance
    }

    #[tokio::test]
    async fn test_reserve_debits_and_records() {
        let l = ledger();
        let reply = l.reserve(&reserve_req("K1", "A", 3_000)).await.unwrap();
        let id = reply.reservation_id().unwrap();
        assert!(matches!(reply, ReserveReply::Reserved { .. }));
        assert_eq!(balance(&l, "A").await, 2_000);

        let r = l.reservation(id).await.unwrap().unwrap();
        assert_eq!(r.status, ReservationStatus::Reserved);
        assert_eq!(r.payment_id, "K1");
        assert_eq!(r.amount.value(), 3_000);
    }

    #[tokio::test]
    async fn test_reserve_insufficient_does_not_mutate() {
        let l = ledger();
        let reply = l.reserve(&reserve_req("K1", "A", 6_000)).await.unwrap();
        assert_eq!(reply.reason(), Some("insufficient_balance"));
        assert_eq!(balance(&l, "A").await, 5_000);
        assert_eq!(l.reservation_count().unwrap(), 0);
        assert!(l.reservation_for_payment("K1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reserve_replay_returns_same_id_without_double_debit() {
        let l = ledger();
        let first = l.reserve(&reserve_req("K1", "A", 1_000)).await.unwrap();
        let second = l.reserve(&reserve_req("K1", "A", 1_000)).await.unwrap();
        assert_eq!(first.reservation_id(), second.reservation_id());
        assert!(matches!(
            second,
            ReserveReply::Replayed {
                status: ReservationStatus::Reserved,
                ..
            }
        ));
        assert_eq!(balance(&l, "A").await, 4_000);
        assert_eq!(l.reservation_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reserve_rejects_unknown_account_and_currency_mismatch() {
        let l = ledger();
        let reply = l.reserve(&reserve_req("K1", "nobody", 10)).await.unwrap();
        assert_eq!(reply.reason(), Some("account_not_found"));

        let reply = l.reserve(&reserve_req("K2", "U", 10)).await.unwrap();
        assert_eq!(reply.reason(), Some("currency_mismatch"));
        assert_eq!(balance(&l, "U").await, 1_000);
    }

    #[tokio::test]
    async fn test_capture_is_idempotent_and_credits_receiver_once() {
        let l = ledger();
        let id = l
            .reserve(&reserve_req("K1", "A", 3_000))
            .await
            .unwrap()
            .reservation_id()
            .unwrap();

        assert_eq!(l.capture(id).await.unwrap(), LedgerReply::Applied);
        assert_eq!(l.capture(id).await.unwrap(), LedgerReply::AlreadyApplied);

        assert_eq!(balance(&l, "A").await, 2_000);
        assert_eq!(balance(&l, "B").await, 3_000);
        let r = l.reservation(id).await.unwrap().unwrap();
        assert_eq!(r.status, ReservationStatus::Captured);
    }

    #[tokio::test]
    async fn test_capture_unknown_or_canceled() {
        let l = ledger();
        let reply = l.capture(ReservationId::new()).await.unwrap();
        assert_eq!(reply.reason(), Some("reservation_not_found"));

        let id = l
            .reserve(&reserve_req("K1", "A", 100))
            .await
            .unwrap()
            .reservation_id()
            .unwrap();
        l.cancel(id).await.unwrap();
        let reply = l.capture(id).await.unwrap();
        assert_eq!(reply.reason(), Some("already_canceled"));
    }

    #[tokio::test]
    async fn test_cancel_restores_balance_exactly() {
        let l = ledger();
        let id = l
            .reserve(&reserve_req("K1", "A", 3_000))
            .await
            .unwrap()
            .reservation_id()
            .unwrap();
        assert_eq!(l.cancel(id).await.unwrap(), LedgerReply::Applied);
        assert_eq!(balance(&l, "A").await, 5_000);
        assert_eq!(l.cancel(id).await.unwrap(), LedgerReply::AlreadyApplied);
        assert_eq!(balance(&l, "A").await, 5_000);

        let r = l.reservation(id).await.unwrap().unwrap();
        assert_eq!(r.status, ReservationStatus::Canceled);
    }

    #[tokio::test]
    async fn test_cancel_after_capture_rejected() {
        let l = ledger();
        let id = l
            .reserve(&reserve_req("K1", "A", 3_000))
            .await
            .unwrap()
            .reservation_id()
            .unwrap();
        l.capture(id).await.unwrap();
        let reply = l.cancel(id).await.unwrap();
        assert_eq!(reply.reason(), Some("already_captured"));
        assert_eq!(balance(&l, "A").await, 2_000);
    }

    #[tokio::test]
    async fn test_concurrent_reserves_same_payment_debit_once() {
        let l = Arc::new(ledger());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let l = l.clone();
            handles.push(tokio::spawn(async move {
                l.reserve(&reserve_req("K-race", "A", 1_000)).await.unwrap()
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap().reservation_id().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(balance(&l, "A").await, 4_000);
        assert_eq!(l.reservation_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_reserves_never_overdraw() {
        let l = Arc::new(ledger());
        let mut handles = Vec::new();
        for i in 0..10 {
            let l = l.clone();
            handles.push(tokio::spawn(async move {
                l.reserve(&reserve_req(&format!("K{i}"), "A", 1_000))
                    .await
                    .unwrap()
            }));
        }
        let mut reserved = 0;
        for h in handles {
            if h.await.unwrap().ok() {
                reserved += 1;
            }
        }
        assert_eq!(reserved, 5);
        assert_eq!(balance(&l, "A").await, 0);
    }

    #[tokio::test]
    async fn test_outcome_journal_first_write_wins() {
        let l = ledger();
        assert!(l.outcome_for_payment("K1").await.unwrap().is_none());

        let first = l
            .record_outcome(PaymentRecord::failed("K1", "random_reject"))
            .await
            .unwrap();
        let second = l
            .record_outcome(PaymentRecord::success("K1", ReservationId::new()))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.reason.as_deref(), Some("random_reject"));
        assert_eq!(l.outcome_for_payment("K1").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_upsert_accounts() {
        let l = InMemoryLedger::new();
        let n = l
            .upsert_accounts(vec![
                Account::new("X", 10, Currency::Sgd),
                Account::new("Y", 20, Currency::Sgd),
            ])
            .await
            .unwrap();
        assert_eq!(n, 2);
        l.upsert_accounts(vec![Account::new("X", 99, Currency::Sgd)])
            .await
            .unwrap();
        assert_eq!(balance(&l, "X").await, 99);
        assert_eq!(l.accounts().unwrap().len(), 2);
    }
}
