//! Transfer Settlement - idempotent transfer saga
//!
//! Settles a transfer exactly once per idempotency key by coordinating a risk
//! evaluator, a rate converter and a funds ledger.
//!
//! # Modules
//!
//! - [`core_types`] - Identifiers and the transfer descriptor
//! - [`money`] - Supported currencies and minor-unit amounts
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup
//! - [`risk`] - Rule-based risk evaluator
//! - [`fx`] - Rate table and conversion
//! - [`ledger`] - Reserve / capture / cancel over account balances
//! - [`saga`] - Settlement saga coordinator
//! - [`bridge`] - Request/result streams and result correlation

// Core types - must be first!
pub mod core_types;
pub mod money;

pub mod config;
pub mod logging;

// Downstream services
pub mod fx;
pub mod ledger;
pub mod risk;

// Orchestration
pub mod bridge;
pub mod saga;

#[cfg(test)]
pub(crate) mod testing;

// Convenient re-exports at crate root
pub use bridge::{CorrelationBridge, IngressPayment, PendingRegistry, SettlementWorker};
pub use config::AppConfig;
pub use core_types::{AccountId, IdempotencyKey, TransferRequest};
pub use fx::{RateConverter, RateTable};
pub use ledger::{InMemoryLedger, LedgerStore, PgLedger};
pub use money::{Currency, MinorAmount};
pub use risk::{RiskEvaluator, RuleBasedRiskEvaluator};
pub use saga::{SagaCoordinator, SagaOutcome, SagaStatus};
