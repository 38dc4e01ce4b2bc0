//! Message streams
//!
//! A stream carries keyed envelopes in publish order. The in-memory
//! implementation is a bounded tokio mpsc channel; a broker-backed stream
//! only has to implement the two traits.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// One message: routing key plus opaque JSON payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Idempotency key of the transfer
    pub key: String,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }

    pub fn json<T: Serialize>(key: impl Into<String>, value: &T) -> Result<Self, StreamError> {
        let payload =
            serde_json::to_vec(value).map_err(|e| StreamError::Encode(e.to_string()))?;
        Ok(Self::new(key, payload))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Stream closed")]
    Closed,

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

#[async_trait]
pub trait StreamProducer: Send + Sync {
    async fn publish(&self, envelope: Envelope) -> Result<(), StreamError>;
}

#[async_trait]
pub trait StreamConsumer: Send {
    /// Next envelope; `None` once every producer is gone
    async fn next(&mut self) -> Option<Envelope>;
}

/// Producer side of an in-memory stream
#[derive(Clone)]
pub struct MemoryProducer {
    tx: mpsc::Sender<Envelope>,
}

#[async_trait]
impl StreamProducer for MemoryProducer {
    async fn publish(&self, envelope: Envelope) -> Result<(), StreamError> {
        self.tx.send(envelope).await.map_err(|_| StreamError::Closed)
    }
}

/// Consumer side of an in-memory stream
pub struct MemoryConsumer {
    rx: mpsc::Receiver<Envelope>,
}

#[async_trait]
impl StreamConsumer for MemoryConsumer {
    async fn next(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// Create a new in-memory stream pair
pub fn memory_stream(capacity: usize) -> (MemoryProducer, MemoryConsumer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MemoryProducer { tx }, MemoryConsumer { rx })
}
