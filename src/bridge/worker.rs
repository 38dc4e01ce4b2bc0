//! Settlement Worker
//!
//! Consumes the request stream, runs one saga per message and publishes the
//! outcome under the same key. Every consumed message gets exactly one result.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::reasons;
use super::stream::{Envelope, StreamConsumer, StreamProducer};
use crate::core_types::TransferRequest;
use crate::saga::{SagaCoordinator, SagaOutcome};

pub struct SettlementWorker {
    coordinator: Arc<SagaCoordinator>,
    results: Arc<dyn StreamProducer>,
    max_in_flight: usize,
    /// Period of the replay cache purge
    purge_interval: Duration,
}

impl SettlementWorker {
    pub fn new(
        coordinator: Arc<SagaCoordinator>,
        results: Arc<dyn StreamProducer>,
        max_in_flight: usize,
        purge_interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            results,
            max_in_flight: max_in_flight.max(1),
            purge_interval,
        }
    }

    /// Run until the request stream closes, then drain in-flight sagas
    ///
    /// Returns the number of messages handled.
    pub async fn run<C: StreamConsumer>(self, mut requests: C) -> usize {
        info!(max_in_flight = self.max_in_flight, "Settlement worker started");
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut purge = tokio::time::interval(self.purge_interval);
        purge.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut handled = 0usize;

        loop {
            tokio::select! {
                next = requests.next() => {
                    let Some(envelope) = next else { break };
                    let Ok(permit) = permits.clone().acquire_owned().await else { break };
                    handled += 1;

                    let coordinator = self.coordinator.clone();
                    let results = self.results.clone();
                    tokio::spawn(async move {
                        handle(&coordinator, results.as_ref(), envelope).await;
                        drop(permit);
                    });
                }
                _ = purge.tick() => {
                    self.coordinator.replay_cache().purge_expired();
                }
            }
        }

        // Wait for every spawned saga to publish its result
        if permits.acquire_many(self.max_in_flight as u32).await.is_err() {
            warn!("Worker semaphore closed while draining");
        }
        info!(handled = handled, "Request stream closed, worker stopped");
        handled
    }
}

async fn handle(coordinator: &SagaCoordinator, results: &dyn StreamProducer, envelope: Envelope) {
    let outcome = match decode_request(&envelope) {
        Ok(request) => coordinator.settle(&request).await,
        Err(outcome) => outcome,
    };

    let reply = match Envelope::json(envelope.key.clone(), &outcome) {
        Ok(reply) => reply,
        Err(e) => {
            error!(key = %envelope.key, error = %e, "Failed to encode result");
            return;
        }
    };
    match results.publish(reply).await {
        Ok(()) => debug!(key = %envelope.key, status = %outcome.status, "Result published"),
        // The outcome is durable in the ledger; a resubmission replays it
        Err(e) => error!(key = %envelope.key, error = %e, "Failed to publish result"),
    }
}

fn decode_request(envelope: &Envelope) -> Result<TransferRequest, SagaOutcome> {
    let request: TransferRequest = serde_json::from_slice(&envelope.payload).map_err(|e| {
        warn!(key = %envelope.key, error = %e, "Undecodable request payload");
        SagaOutcome::failed(reasons::BAD_PAYLOAD)
    })?;
    if request.idempotency_key != envelope.key {
        warn!(
            key = %envelope.key,
            payload_key = %request.idempotency_key,
            "Request key does not match routing key"
        );
        return Err(SagaOutcome::failed(reasons::BAD_PAYLOAD));
    }
    Ok(request)
}
