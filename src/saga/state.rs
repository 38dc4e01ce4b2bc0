//! Saga state definitions

use std::fmt;

/// Per-transfer saga state
///
/// Terminal states: CAPTURED, FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaState {
    Start,

    /// Risk accepted (or flagged for review)
    RiskChecked,

    /// Amount expressed in the settlement currency
    Converted,

    /// Funds debited and held
    /// CRITICAL: must end CAPTURED or be canceled
    Reserved,

    /// Terminal: funds moved
    Captured,

    /// Terminal: no funds moved (or compensated)
    Failed,
}

impl SagaState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Captured | SagaState::Failed)
    }

    /// Failure from this state requires a `Cancel`
    #[inline]
    pub fn needs_compensation(&self) -> bool {
        matches!(self, SagaState::Reserved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Start => "START",
            SagaState::RiskChecked => "RISK_CHECKED",
            SagaState::Converted => "CONVERTED",
            SagaState::Reserved => "RESERVED",
            SagaState::Captured => "CAPTURED",
            SagaState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SagaState::Captured.is_terminal());
        assert!(SagaState::Failed.is_terminal());

        assert!(!SagaState::Start.is_terminal());
        assert!(!SagaState::RiskChecked.is_terminal());
        assert!(!SagaState::Converted.is_terminal());
        assert!(!SagaState::Reserved.is_terminal());
    }

    #[test]
    fn test_only_reserved_needs_compensation() {
        assert!(SagaState::Reserved.needs_compensation());
        assert!(!SagaState::Converted.needs_compensation());
        assert!(!SagaState::Captured.needs_compensation());
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaState::RiskChecked.to_string(), "RISK_CHECKED");
        assert_eq!(SagaState::Captured.to_string(), "CAPTURED");
    }
}
