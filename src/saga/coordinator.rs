//! Saga Coordinator
//!
//! Orchestrates one settlement per idempotency key. This is the only place
//! that decides whether a transfer succeeded.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::outcome::{SagaOutcome, reasons};
use super::replay::ReplayCache;
use super::state::SagaState;
use crate::config::SettlementConfig;
use crate::core_types::TransferRequest;
use crate::fx::RateConverter;
use crate::ledger::{
    self, LedgerReply, LedgerStore, Reservation, ReservationId, ReservationStatus, ReserveReply,
    ReserveRequest,
};
use crate::money::{Currency, MinorAmount};
use crate::risk::{Decision, RiskEvaluator};

/// Terminal outcome plus whether a resubmission may be answered from memory
///
/// Transient failures are neither cached nor journaled so that resubmitting
/// retries them.
struct Settled {
    outcome: SagaOutcome,
    replayable: bool,
}

/// What the ledger already holds for a payment before the saga runs
enum Prior {
    Journaled(SagaOutcome),
    /// A reservation exists but no outcome was journaled for it
    Reservation(Reservation),
    Fresh,
    /// The lookup failed; running risk now could strand a held reservation
    Unknown,
}

/// Saga Coordinator - risk, convert, reserve, capture
pub struct SagaCoordinator {
    risk: Arc<dyn RiskEvaluator>,
    fx: Arc<dyn RateConverter>,
    ledger: Arc<dyn LedgerStore>,
    settlement_currency: Currency,
    step_deadline: Duration,
    replay: ReplayCache,
    /// One running saga per key; later arrivals wait and then replay
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl SagaCoordinator {
    pub fn new(
        risk: Arc<dyn RiskEvaluator>,
        fx: Arc<dyn RateConverter>,
        ledger: Arc<dyn LedgerStore>,
        config: &SettlementConfig,
    ) -> Self {
        Self {
            risk,
            fx,
            ledger,
            settlement_currency: config.currency,
            step_deadline: config.step_deadline(),
            replay: ReplayCache::new(config.replay_ttl()),
            in_flight: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    pub fn replay_cache(&self) -> &ReplayCache {
        &self.replay
    }

    pub fn settlement_currency(&self) -> Currency {
        self.settlement_currency
    }

    /// Settle a transfer, producing exactly one terminal outcome
    ///
    /// Safe to call repeatedly and concurrently with the same request: calls
    /// for one key are serialised and later ones observe the first outcome.
    pub async fn settle(&self, request: &TransferRequest) -> SagaOutcome {
        let key = request.idempotency_key.as_str();
        let gate = self
            .in_flight
            .entry(key.to_string())
            .or_default()
            .clone();

        let outcome = {
            let _running = gate.lock().await;
            self.settle_exclusive(request).await
        };

        drop(gate);
        self.in_flight
            .remove_if(key, |_, gate| Arc::strong_count(gate) == 1);
        outcome
    }

    async fn settle_exclusive(&self, request: &TransferRequest) -> SagaOutcome {
        let key = request.idempotency_key.as_str();

        if let Some(outcome) = self.replay.get(key) {
            debug!(key = %key, status = %outcome.status, "Outcome replayed from cache");
            return outcome;
        }

        let settled = match self.prior(key).await {
            Prior::Journaled(outcome) => {
                debug!(key = %key, status = %outcome.status, "Outcome replayed from journal");
                self.replay.insert(key, outcome.clone());
                return outcome;
            }
            Prior::Reservation(reservation) => self.finish_reservation(key, reservation).await,
            Prior::Fresh => self.run(request).await,
            Prior::Unknown => self.fail(key, SagaState::Start, reasons::LEDGER_UNAVAILABLE, false),
        };
        self.conclude(key, settled).await
    }

    /// Journal then cache a terminal outcome; the first journaled one wins
    async fn conclude(&self, key: &str, settled: Settled) -> SagaOutcome {
        if !settled.replayable {
            return settled.outcome;
        }

        let record = settled.outcome.to_record(key);
        let outcome = match self.within(self.ledger.record_outcome(record)).await {
            Some(Ok(stored)) => {
                let stored = SagaOutcome::from(stored);
                if stored != settled.outcome {
                    warn!(
                        key = %key,
                        journaled = ?stored,
                        settled = ?settled.outcome,
                        "Payment already journaled with a different outcome"
                    );
                }
                // Funds that moved are reported as moved
                if settled.outcome.is_success() {
                    settled.outcome
                } else {
                    stored
                }
            }
            Some(Err(e)) => {
                warn!(key = %key, error = %e, "Outcome journal write failed");
                settled.outcome
            }
            None => {
                warn!(key = %key, "Outcome journal write timed out");
                settled.outcome
            }
        };
        self.replay.insert(key, outcome.clone());
        outcome
    }

    async fn prior(&self, key: &str) -> Prior {
        match self.within(self.ledger.outcome_for_payment(key)).await {
            Some(Ok(Some(record))) => return Prior::Journaled(record.into()),
            Some(Ok(None)) => {}
            Some(Err(e)) => {
                warn!(key = %key, error = %e, "Outcome journal lookup failed");
                return Prior::Unknown;
            }
            None => {
                warn!(key = %key, "Outcome journal lookup timed out");
                return Prior::Unknown;
            }
        }

        match self.within(self.ledger.reservation_for_payment(key)).await {
            Some(Ok(Some(reservation))) => Prior::Reservation(reservation),
            Some(Ok(None)) => Prior::Fresh,
            Some(Err(e)) => {
                warn!(key = %key, error = %e, "Reservation lookup failed");
                Prior::Unknown
            }
            None => {
                warn!(key = %key, "Reservation lookup timed out");
                Prior::Unknown
            }
        }
    }

    /// Complete a payment whose reservation outlived an earlier attempt
    ///
    /// Risk accepted before that reservation was made, so it is not asked again.
    async fn finish_reservation(&self, key: &str, reservation: Reservation) -> Settled {
        let reservation_id = reservation.reservation_id;
        match reservation.status {
            ReservationStatus::Captured => self.succeed(key, SagaState::Reserved, reservation_id),
            ReservationStatus::Canceled => {
                self.fail(key, SagaState::Reserved, reasons::RESERVATION_CANCELED, true)
            }
            ReservationStatus::Reserved => {
                info!(
                    key = %key,
                    reservation_id = %reservation_id,
                    "Resuming held reservation at capture"
                );
                self.capture_or_compensate(key, SagaState::Reserved, reservation_id)
                    .await
            }
        }
    }

    async fn run(&self, request: &TransferRequest) -> Settled {
        let key = request.idempotency_key.as_str();
        let mut state = SagaState::Start;

        // === Step 1: Risk ===
        let decision = match self.within(self.risk.evaluate(request)).await {
            Some(decision) => decision,
            None => return self.fail(key, state, reasons::RISK_UNAVAILABLE, false),
        };
        if decision.is_denied() {
            return self.fail(key, state, &decision.reasons.join(","), true);
        }
        if decision.decision == Decision::Review {
            warn!(
                key = %key,
                score = decision.score,
                reasons = ?decision.reasons,
                "Transfer flagged for review, continuing"
            );
        }
        state = self.advance(key, state, SagaState::RiskChecked);

        // === Step 2: Convert ===
        let amount = match self.convert(request).await {
            Ok(amount) => amount,
            Err(reason) => return self.fail(key, state, &reason, false),
        };
        state = self.advance(key, state, SagaState::Converted);

        // === Step 3: Reserve ===
        let reserve = ReserveRequest {
            payment_id: request.idempotency_key.clone(),
            account_id: request.sender_id.clone(),
            receiver_id: request.receiver_id.clone(),
            amount,
            currency: self.settlement_currency,
        };
        let reservation_id = match self.within(self.ledger.reserve(&reserve)).await {
            Some(Ok(ReserveReply::Reserved { reservation_id })) => reservation_id,
            Some(Ok(ReserveReply::Replayed {
                reservation_id,
                status,
            })) => match status {
                ReservationStatus::Reserved => reservation_id,
                ReservationStatus::Captured => {
                    let state = self.advance(key, state, SagaState::Reserved);
                    return self.succeed(key, state, reservation_id);
                }
                ReservationStatus::Canceled => {
                    return self.fail(key, state, reasons::RESERVATION_CANCELED, true);
                }
            },
            Some(Ok(ReserveReply::Rejected { reason })) => {
                return self.fail(key, state, saga_reason(reason), true);
            }
            Some(Err(e)) => {
                warn!(key = %key, error = %e, "Reserve failed, reservation state unknown");
                return self.recover_reserve(key, state, e.code()).await;
            }
            None => {
                warn!(key = %key, "Reserve timed out, reservation state unknown");
                return self
                    .recover_reserve(key, state, reasons::LEDGER_UNAVAILABLE)
                    .await;
            }
        };
        state = self.advance(key, state, SagaState::Reserved);

        // === Step 4: Capture ===
        self.capture_or_compensate(key, state, reservation_id).await
    }

    async fn capture_or_compensate(
        &self,
        key: &str,
        state: SagaState,
        reservation_id: ReservationId,
    ) -> Settled {
        match self.within(self.ledger.capture(reservation_id)).await {
            Some(Ok(reply)) if reply.ok() => return self.succeed(key, state, reservation_id),
            Some(Ok(LedgerReply::Rejected { reason }))
                if reason == ledger::reasons::ALREADY_CANCELED =>
            {
                return self.fail(key, state, reasons::RESERVATION_CANCELED, true);
            }
            Some(Ok(reply)) => {
                warn!(
                    key = %key,
                    reservation_id = %reservation_id,
                    reason = ?reply.reason(),
                    "Capture rejected"
                );
            }
            Some(Err(e)) => {
                warn!(
                    key = %key,
                    reservation_id = %reservation_id,
                    error = %e,
                    "Capture failed"
                );
            }
            None => {
                warn!(key = %key, reservation_id = %reservation_id, "Capture timed out");
            }
        }

        self.compensate(key, state, reservation_id, reasons::CAPTURE_ERROR)
            .await
    }

    /// Reserve gave no definite answer; its debit may have committed anyway
    async fn recover_reserve(&self, key: &str, state: SagaState, reason: &str) -> Settled {
        let detail = match self.within(self.ledger.reservation_for_payment(key)).await {
            Some(Ok(None)) => return self.fail(key, state, reason, false),
            Some(Ok(Some(reservation))) => {
                let reservation_id = reservation.reservation_id;
                let state = self.advance(key, state, SagaState::Reserved);
                return match reservation.status {
                    ReservationStatus::Reserved => {
                        warn!(
                            key = %key,
                            reservation_id = %reservation_id,
                            "Reserve committed despite the failure, canceling"
                        );
                        self.compensate(key, state, reservation_id, reason).await
                    }
                    ReservationStatus::Captured => self.succeed(key, state, reservation_id),
                    ReservationStatus::Canceled => {
                        self.fail(key, state, reasons::RESERVATION_CANCELED, true)
                    }
                };
            }
            Some(Err(e)) => format!("reservation lookup failed: {e}"),
            None => "reservation lookup timed out".to_string(),
        };

        error!(
            key = %key,
            detail = %detail,
            "RECONCILIATION REQUIRED: reserve outcome unknown, funds may be held"
        );
        self.fail(key, state, reason, false)
    }

    /// Express the request amount in the settlement currency
    async fn convert(&self, request: &TransferRequest) -> Result<MinorAmount, String> {
        if request.currency == self.settlement_currency {
            return Ok(request.amount_minor);
        }
        let converted = self
            .within(
                self.fx
                    .convert(request.amount_minor, request.currency, self.settlement_currency),
            )
            .await;
        match converted {
            Some(Ok(amount)) => Ok(amount),
            Some(Err(e)) => {
                warn!(key = %request.idempotency_key, error = %e, "Conversion failed");
                Err(e.code().to_string())
            }
            None => {
                warn!(key = %request.idempotency_key, "Conversion timed out");
                Err(reasons::FX_ERROR.to_string())
            }
        }
    }

    /// Cancel a reservation after a later step failed with `reason`
    async fn compensate(
        &self,
        key: &str,
        state: SagaState,
        reservation_id: ReservationId,
        reason: &str,
    ) -> Settled {
        debug_assert!(state.needs_compensation());

        let detail = match self.within(self.ledger.cancel(reservation_id)).await {
            Some(Ok(LedgerReply::Rejected { reason }))
                if reason == ledger::reasons::ALREADY_CAPTURED =>
            {
                // The failed capture landed after all; funds did move
                warn!(
                    key = %key,
                    reservation_id = %reservation_id,
                    "Capture found applied during compensation"
                );
                return self.succeed(key, state, reservation_id);
            }
            Some(Ok(reply)) if reply.ok() => {
                info!(
                    key = %key,
                    reservation_id = %reservation_id,
                    "Reservation canceled, funds restored"
                );
                return self.fail(key, state, reason, true);
            }
            Some(Ok(reply)) => format!("cancel rejected: {}", reply.reason().unwrap_or("unknown")),
            Some(Err(e)) => format!("cancel failed: {e}"),
            None => "cancel timed out".to_string(),
        };

        error!(
            key = %key,
            reservation_id = %reservation_id,
            detail = %detail,
            "RECONCILIATION REQUIRED: funds reserved but neither captured nor canceled"
        );
        self.fail(key, state, reason, false)
    }

    async fn within<F: Future>(&self, step: F) -> Option<F::Output> {
        tokio::time::timeout(self.step_deadline, step).await.ok()
    }

    fn advance(&self, key: &str, from: SagaState, to: SagaState) -> SagaState {
        debug!(key = %key, from = %from, to = %to, "Saga advanced");
        to
    }

    fn succeed(&self, key: &str, from: SagaState, reservation_id: ReservationId) -> Settled {
        info!(
            key = %key,
            from = %from,
            state = %SagaState::Captured,
            reservation_id = %reservation_id,
            "Transfer settled"
        );
        Settled {
            outcome: SagaOutcome::success(reservation_id),
            replayable: true,
        }
    }

    fn fail(&self, key: &str, from: SagaState, reason: &str, replayable: bool) -> Settled {
        info!(
            key = %key,
            from = %from,
            state = %SagaState::Failed,
            reason = %reason,
            "Transfer failed"
        );
        Settled {
            outcome: SagaOutcome::failed(reason),
            replayable,
        }
    }
}

/// Map a ledger rejection onto the saga's reason vocabulary
fn saga_reason(ledger_reason: &str) -> &str {
    match ledger_reason {
        ledger::reasons::INSUFFICIENT_BALANCE => reasons::INSUFFICIENT_FUNDS,
        other => other,
    }
}
