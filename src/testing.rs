//! Test doubles for the saga's downstream services
//!
//! Each mock counts its calls and has switches to inject failures or delays.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core_types::TransferRequest;
use crate::fx::{FxError, RateConverter};
use crate::ledger::{
    Account, InMemoryLedger, LedgerError, LedgerReply, LedgerStore, PaymentRecord, Reservation,
    ReservationId, ReserveReply, ReserveRequest,
};
use crate::money::{Currency, MinorAmount};
use crate::risk::{Decision, RiskDecision, RiskEvaluator};

// ============================================================================
// Risk
// ============================================================================

pub struct MockRisk {
    decision: Mutex<RiskDecision>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockRisk {
    pub fn accepting() -> Self {
        Self {
            decision: Mutex::new(RiskDecision {
                score: 0,
                decision: Decision::Accept,
                reasons: vec![],
            }),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_decision(&self, decision: Decision, reasons: &[&str]) {
        *self.decision.lock().unwrap() = RiskDecision {
            score: if decision == Decision::Deny { 100 } else { 0 },
            decision,
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
        };
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RiskEvaluator for MockRisk {
    async fn evaluate(&self, _request: &TransferRequest) -> RiskDecision {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.decision.lock().unwrap().clone()
    }
}

// ============================================================================
// FX
// ============================================================================

/// Multiplies by a fixed factor for every pair unless told to fail
pub struct MockFx {
    factor: i64,
    fail: Mutex<bool>,
    calls: AtomicUsize,
}

impl MockFx {
    pub fn with_factor(factor: i64) -> Self {
        Self {
            factor,
            fail: Mutex::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateConverter for MockFx {
    async fn convert(
        &self,
        amount: MinorAmount,
        from: Currency,
        to: Currency,
    ) -> Result<MinorAmount, FxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(FxError::RateUnavailable { from, to });
        }
        MinorAmount::new(amount.value() * self.factor).map_err(|_| FxError::AmountTooSmall)
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// In-memory ledger with fault injection on each operation
pub struct FaultyLedger {
    inner: InMemoryLedger,
    reserve_calls: AtomicUsize,
    capture_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    fail_reserve: Mutex<bool>,
    /// Commit the reserve, then report an error anyway
    reserve_applies_then_fails: Mutex<bool>,
    /// Commit the reserve, then go down until the outage is cleared
    reserve_applies_then_outage: Mutex<bool>,
    /// Every operation fails
    outage: Mutex<bool>,
    fail_capture: Mutex<bool>,
    /// Apply the capture, then report an error anyway
    capture_applies_then_fails: Mutex<bool>,
    capture_delay: Mutex<Option<Duration>>,
    fail_cancel: Mutex<bool>,
}

impl FaultyLedger {
    pub fn new(inner: InMemoryLedger) -> Self {
        Self {
            inner,
            reserve_calls: AtomicUsize::new(0),
            capture_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            fail_reserve: Mutex::new(false),
            reserve_applies_then_fails: Mutex::new(false),
            reserve_applies_then_outage: Mutex::new(false),
            outage: Mutex::new(false),
            fail_capture: Mutex::new(false),
            capture_applies_then_fails: Mutex::new(false),
            capture_delay: Mutex::new(None),
            fail_cancel: Mutex::new(false),
        }
    }

    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        Self::new(InMemoryLedger::with_accounts(accounts))
    }

    pub fn set_fail_reserve(&self, fail: bool) {
        *self.fail_reserve.lock().unwrap() = fail;
    }

    pub fn set_reserve_applies_then_fails(&self, on: bool) {
        *self.reserve_applies_then_fails.lock().unwrap() = on;
    }

    pub fn set_reserve_applies_then_outage(&self, on: bool) {
        *self.reserve_applies_then_outage.lock().unwrap() = on;
    }

    pub fn set_outage(&self, down: bool) {
        *self.outage.lock().unwrap() = down;
    }

    fn check_outage(&self) -> Result<(), LedgerError> {
        if *self.outage.lock().unwrap() {
            return Err(LedgerError::Unavailable("mock ledger outage".into()));
        }
        Ok(())
    }

    pub fn set_fail_capture(&self, fail: bool) {
        *self.fail_capture.lock().unwrap() = fail;
    }

    pub fn set_capture_applies_then_fails(&self, on: bool) {
        *self.capture_applies_then_fails.lock().unwrap() = on;
    }

    pub fn set_capture_delay(&self, delay: Duration) {
        *self.capture_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_fail_cancel(&self, fail: bool) {
        *self.fail_cancel.lock().unwrap() = fail;
    }

    pub fn reserve_calls(&self) -> usize {
        self.reserve_calls.load(Ordering::SeqCst)
    }

    pub fn capture_calls(&self) -> usize {
        self.capture_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn reservation_count(&self) -> usize {
        self.inner.reservation_count().unwrap()
    }

    pub fn balance(&self, account_id: &str) -> Option<i64> {
        self.inner
            .accounts()
            .unwrap()
            .into_iter()
            .find(|a| a.account_id == account_id)
            .map(|a| a.balance)
    }
}

#[async_trait]
impl LedgerStore for FaultyLedger {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn reserve(&self, request: &ReserveRequest) -> Result<ReserveReply, LedgerError> {
        self.reserve_calls.fetch_add(1, Ordering::SeqCst);
        self.check_outage()?;
        if *self.fail_reserve.lock().unwrap() {
            return Err(LedgerError::Unavailable("mock reserve outage".into()));
        }
        if *self.reserve_applies_then_outage.lock().unwrap() {
            self.inner.reserve(request).await?;
            self.set_outage(true);
            return Err(LedgerError::Unavailable("mock ledger down after reserve".into()));
        }
        if *self.reserve_applies_then_fails.lock().unwrap() {
            self.inner.reserve(request).await?;
            return Err(LedgerError::Unavailable("mock reserve ack lost".into()));
        }
        self.inner.reserve(request).await
    }

    async fn capture(&self, reservation_id: ReservationId) -> Result<LedgerReply, LedgerError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        self.check_outage()?;
        let delay = *self.capture_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.capture_applies_then_fails.lock().unwrap() {
            self.inner.capture(reservation_id).await?;
            return Err(LedgerError::Unavailable("mock capture ack lost".into()));
        }
        if *self.fail_capture.lock().unwrap() {
            return Err(LedgerError::Unavailable("mock capture outage".into()));
        }
        self.inner.capture(reservation_id).await
    }

    async fn cancel(&self, reservation_id: ReservationId) -> Result<LedgerReply, LedgerError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.check_outage()?;
        if *self.fail_cancel.lock().unwrap() {
            return Err(LedgerError::Unavailable("mock cancel outage".into()));
        }
        self.inner.cancel(reservation_id).await
    }

    async fn account(&self, account_id: &str) -> Result<Option<Account>, LedgerError> {
        self.inner.account(account_id).await
    }

    async fn reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, LedgerError> {
        self.inner.reservation(reservation_id).await
    }

    async fn reservation_for_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<Reservation>, LedgerError> {
        self.check_outage()?;
        self.inner.reservation_for_payment(payment_id).await
    }

    async fn record_outcome(&self, record: PaymentRecord) -> Result<PaymentRecord, LedgerError> {
        self.check_outage()?;
        self.inner.record_outcome(record).await
    }

    async fn outcome_for_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<PaymentRecord>, LedgerError> {
        self.check_outage()?;
        self.inner.outcome_for_payment(payment_id).await
    }

    async fn upsert_accounts(&self, accounts: Vec<Account>) -> Result<usize, LedgerError> {
        self.inner.upsert_accounts(accounts).await
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn idr(value: i64) -> MinorAmount {
    MinorAmount::new(value).unwrap()
}

pub fn transfer(key: &str, sender: &str, receiver: &str, amount: i64) -> TransferRequest {
    TransferRequest::new(key, sender, receiver, idr(amount), Currency::Idr, "2026-01-15")
}

/// Sampler that never lands a random rejection
pub struct NeverReject;

impl crate::risk::RejectSampler for NeverReject {
    fn hit(&self, _per_mille: u32) -> bool {
        false
    }
}
