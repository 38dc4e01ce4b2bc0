//! Correlation Bridge
//!
//! Decouples a waiting caller from the saga through two one-directional
//! streams keyed by idempotency key.
//!
//! ```text
//! caller ─submit─▶ [request stream] ─▶ SettlementWorker ─▶ SagaCoordinator
//!   ▲                                        │
//!   │                                        ▼
//! PendingRegistry ◀── ResultListener ◀── [result stream]
//! ```
//!
//! The caller registers its slot *before* publishing. A result that still
//! finds no slot is retained for a grace period so a late waiter can claim it.

pub mod correlation;
pub mod error;
pub mod ingress;
pub mod registry;
pub mod stream;
pub mod worker;

pub use correlation::{CorrelationBridge, spawn_result_listener};
pub use error::BridgeError;
pub use ingress::{IngressError, IngressPayment};
pub use registry::{Delivery, PendingRegistry, Registration, Waiter};
pub use stream::{
    Envelope, MemoryConsumer, MemoryProducer, StreamConsumer, StreamError, StreamProducer,
    memory_stream,
};
pub use worker::SettlementWorker;

/// Reason codes produced at the asynchronous boundary
pub mod reasons {
    pub const BAD_JSON: &str = "bad_json";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const UNSUPPORTED_CURRENCY: &str = "unsupported_currency";
    pub const BAD_PAYLOAD: &str = "bad_payload";
    pub const BAD_WORKER_RESULT: &str = "bad_worker_result";
    pub const QUEUE_TIMEOUT: &str = "queue_timeout";
    pub const QUEUE_PUBLISH_ERROR: &str = "queue_publish_error";
    pub const QUEUE_CLOSED: &str = "queue_closed";
}
