//! Settlement Saga
//!
//! Drives one transfer through risk → convert → reserve → capture, with
//! `Cancel` as the only compensation.
//!
//! # Flow
//!
//! ```text
//! START ─▶ RISK_CHECKED ─▶ CONVERTED ─▶ RESERVED ─▶ CAPTURED (SUCCESS)
//!   │           │              │            │
//!   └───────────┴──────────────┴────────────┴──▶ FAILED
//!                                           │
//!                                           └─ Cancel before FAILED
//! ```
//!
//! # Idempotency
//!
//! The idempotency key doubles as the ledger payment id. A resubmission is
//! answered from the replay cache or from the ledger's outcome journal
//! before any downstream call is made. A reservation left RESERVED by an
//! earlier attempt resumes at Capture without asking risk again. Reserve and
//! Capture are the final backstop against double debits.

pub mod coordinator;
pub mod outcome;
pub mod replay;
pub mod state;


pub use coordinator::SagaCoordinator;
pub use outcome::{SagaOutcome, SagaStatus, reasons};
pub use replay::ReplayCache;
pub use state::SagaState;
