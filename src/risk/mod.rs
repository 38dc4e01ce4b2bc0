//! Risk Evaluator
//!
//! Pure decision function over a transfer descriptor. Rules run in a fixed
//! order and the first denial wins:
//!
//! ```text
//! bad_input → same_party → below_min → above_max → random_reject → ACCEPT/REVIEW
//! ```
//!
//! The evaluator never touches storage or the network; its decision is
//! advisory input to the saga, which alone decides whether funds move.

pub mod sampler;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::config::RiskConfig;
use crate::core_types::TransferRequest;

pub use sampler::{OsRngSampler, RejectSampler};

/// Highest possible risk score
pub const MAX_SCORE: u8 = 100;

/// Stable reason codes
pub mod reasons {
    pub const BAD_INPUT: &str = "bad_input";
    pub const SAME_PARTY: &str = "same_party";
    pub const BELOW_MIN: &str = "below_min";
    pub const ABOVE_MAX: &str = "above_max";
    pub const RANDOM_REJECT: &str = "random_reject";
    pub const HIGH_VALUE: &str = "high_value";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Accept,
    Review,
    Deny,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accept => "ACCEPT",
            Decision::Review => "REVIEW",
            Decision::Deny => "DENY",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived, never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDecision {
    /// 0..=100
    pub score: u8,
    pub decision: Decision,
    pub reasons: Vec<String>,
}

impl RiskDecision {
    fn deny(reason: &str) -> Self {
        Self {
            score: MAX_SCORE,
            decision: Decision::Deny,
            reasons: vec![reason.to_string()],
        }
    }

    #[inline]
    pub fn is_denied(&self) -> bool {
        self.decision == Decision::Deny
    }
}

/// Remote-callable risk surface
#[async_trait]
pub trait RiskEvaluator: Send + Sync {
    async fn evaluate(&self, request: &TransferRequest) -> RiskDecision;
}

/// Rule-based evaluator driven by [`RiskConfig`]
pub struct RuleBasedRiskEvaluator {
    config: RiskConfig,
    sampler: Arc<dyn RejectSampler>,
}

impl RuleBasedRiskEvaluator {
    /// Evaluator sampling random rejections from OS entropy
    pub fn new(config: RiskConfig) -> Self {
        Self::with_sampler(config, Arc::new(OsRngSampler))
    }

    pub fn with_sampler(config: RiskConfig, sampler: Arc<dyn RejectSampler>) -> Self {
        Self { config, sampler }
    }

    /// Synchronous rule evaluation
    pub fn decide(&self, request: &TransferRequest) -> RiskDecision {
        if request.sender_id.trim().is_empty() || request.receiver_id.trim().is_empty() {
            return RiskDecision::deny(reasons::BAD_INPUT);
        }
        if request.sender_id == request.receiver_id {
            return RiskDecision::deny(reasons::SAME_PARTY);
        }

        let limits = self.config.limits_for(request.currency);
        let amount = request.amount_minor.value();
        if amount < limits.min_amount {
            return RiskDecision::deny(reasons::BELOW_MIN);
        }
        if amount > limits.max_amount {
            return RiskDecision::deny(reasons::ABOVE_MAX);
        }

        if self.sampler.hit(self.config.random_reject_per_mille) {
            return RiskDecision::deny(reasons::RANDOM_REJECT);
        }

        let score = amount_score(amount, limits.max_amount);
        if score >= self.config.review_score {
            RiskDecision {
                score,
                decision: Decision::Review,
                reasons: vec![reasons::HIGH_VALUE.to_string()],
            }
        } else {
            RiskDecision {
                score,
                decision: Decision::Accept,
                reasons: Vec::new(),
            }
        }
    }
}

#[async_trait]
impl RiskEvaluator for RuleBasedRiskEvaluator {
    async fn evaluate(&self, request: &TransferRequest) -> RiskDecision {
        let decision = self.decide(request);
        debug!(
            key = %request.idempotency_key,
            decision = %decision.decision,
            score = decision.score,
            reasons = ?decision.reasons,
            "Risk evaluated"
        );
        decision
    }
}

/// Linear score of `amount` against the configured maximum
fn amount_score(amount: i64, max_amount: i64) -> u8 {
    if max_amount <= 0 {
        return MAX_SCORE;
    }
    let scaled = (amount as i128 * MAX_SCORE as i128) / max_amount as i128;
    scaled.clamp(0, MAX_SCORE as i128) as u8
}
