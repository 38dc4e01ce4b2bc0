//! Caller side of the bridge: submit and wait, plus the shared result listener

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::BridgeError;
use super::ingress::IngressPayment;
use super::reasons;
use super::registry::{Delivery, PendingRegistry, Registration};
use super::stream::{Envelope, StreamConsumer, StreamProducer};
use crate::core_types::TransferRequest;
use crate::saga::SagaOutcome;

pub struct CorrelationBridge {
    requests: Arc<dyn StreamProducer>,
    registry: Arc<PendingRegistry>,
    wait_timeout: Duration,
}

impl CorrelationBridge {
    pub fn new(
        requests: Arc<dyn StreamProducer>,
        registry: Arc<PendingRegistry>,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            requests,
            registry,
            wait_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<PendingRegistry> {
        &self.registry
    }

    /// Validate, publish and wait; every failure becomes a FAILED outcome
    pub async fn submit_payment(&self, payment: IngressPayment) -> SagaOutcome {
        match payment.validate() {
            Ok(request) => self
                .submit(&request)
                .await
                .unwrap_or_else(BridgeError::into_outcome),
            Err(e) => {
                debug!(error = %e, "Payment rejected at ingress");
                SagaOutcome::failed(e.code())
            }
        }
    }

    /// Publish a request and wait for its result up to the wait timeout
    ///
    /// `Err(Timeout)` does not mean the transfer failed: the saga may still
    /// complete, and resubmitting with the same key is safe.
    pub async fn submit(&self, request: &TransferRequest) -> Result<SagaOutcome, BridgeError> {
        let key = request.idempotency_key.as_str();

        // Register before publishing so the result cannot slip past us
        let mut waiter = match self.registry.register(key) {
            Registration::Ready(outcome) => return Ok(outcome),
            Registration::Waiting(waiter) => waiter,
        };

        let published = match Envelope::json(key, request) {
            Ok(envelope) => self.requests.publish(envelope).await,
            Err(e) => Err(e),
        };
        if let Err(e) = published {
            warn!(key = %key, error = %e, "Request publish failed");
            self.registry.abandon(&waiter);
            return Err(BridgeError::Publish(e));
        }

        match tokio::time::timeout(self.wait_timeout, waiter.receiver()).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                self.registry.abandon(&waiter);
                // Delivered between the deadline and the abandon
                if let Ok(outcome) = waiter.receiver().try_recv() {
                    return Ok(outcome);
                }
                info!(
                    key = %key,
                    timeout_ms = self.wait_timeout.as_millis() as u64,
                    "Result wait timed out"
                );
                Err(BridgeError::Timeout)
            }
        }
    }
}

/// Decode a result payload; undecodable results still answer the waiter
fn decode_result(envelope: &Envelope) -> SagaOutcome {
    serde_json::from_slice(&envelope.payload).unwrap_or_else(|e| {
        warn!(key = %envelope.key, error = %e, "Undecodable worker result");
        SagaOutcome::failed(reasons::BAD_WORKER_RESULT)
    })
}

/// Spawn the single consumer of the result stream
///
/// Fulfills waiting slots as results arrive and sweeps expired retained
/// results every `sweep_interval`. Ends when the result stream closes.
pub fn spawn_result_listener<C>(
    mut results: C,
    registry: Arc<PendingRegistry>,
    sweep_interval: Duration,
) -> JoinHandle<()>
where
    C: StreamConsumer + 'static,
{
    tokio::spawn(async move {
        info!("Result listener started");
        let mut sweep = tokio::time::interval(sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                next = results.next() => {
                    let Some(envelope) = next else { break };
                    let outcome = decode_result(&envelope);
                    match registry.fulfill(&envelope.key, outcome) {
                        Delivery::Delivered(n) => {
                            debug!(key = %envelope.key, waiters = n, "Result delivered");
                        }
                        Delivery::Retained => {
                            debug!(key = %envelope.key, "Result unmatched, retained");
                        }
                    }
                }
                _ = sweep.tick() => {
                    let expired = registry.sweep();
                    if expired > 0 {
                        debug!(expired = expired, "Swept unclaimed results");
                    }
                }
            }
        }
        info!("Result stream closed, listener stopped");
    })
}
