//! Ingress validation
//!
//! Raw payments are checked before anything is published. Sender and
//! receiver presence is left to the risk rules (`bad_input`).

use serde::Deserialize;
use thiserror::Error;

use super::reasons;
use crate::core_types::TransferRequest;
use crate::money::{Currency, MinorAmount};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngressError {
    #[error("Malformed payment: {0}")]
    BadJson(String),

    #[error("Invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),
}

impl IngressError {
    pub fn code(&self) -> &'static str {
        match self {
            IngressError::BadJson(_) => reasons::BAD_JSON,
            IngressError::InvalidInput(_) => reasons::INVALID_INPUT,
            IngressError::UnsupportedCurrency(_) => reasons::UNSUPPORTED_CURRENCY,
        }
    }
}

/// Payment as submitted by a caller, before validation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngressPayment {
    pub idempotency_key: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub tx_date: String,
}

impl IngressPayment {
    pub fn from_json(line: &str) -> Result<Self, IngressError> {
        serde_json::from_str(line).map_err(|e| IngressError::BadJson(e.to_string()))
    }

    pub fn validate(self) -> Result<TransferRequest, IngressError> {
        let idempotency_key = self.idempotency_key.trim();
        if idempotency_key.is_empty() {
            return Err(IngressError::InvalidInput("idempotency_key is required"));
        }
        if self.tx_date.trim().is_empty() {
            return Err(IngressError::InvalidInput("tx_date is required"));
        }
        let amount = MinorAmount::new(self.amount_minor)
            .map_err(|_| IngressError::InvalidInput("amount_minor must be positive"))?;
        let currency: Currency = self
            .currency
            .parse()
            .map_err(|_| IngressError::UnsupportedCurrency(self.currency.clone()))?;

        Ok(TransferRequest::new(
            idempotency_key,
            self.sender_id.trim(),
            self.receiver_id.trim(),
            amount,
            currency,
            self.tx_date.trim(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment() -> IngressPayment {
        IngressPayment {
            idempotency_key: "K1".into(),
            sender_id: "A".into(),
            receiver_id: "B".into(),
            amount_minor: 3_000,
            currency: " idr ".into(),
            tx_date: "2026-01-15".into(),
        }
    }

    #[test]
    fn test_valid_payment() {
        let req = payment().validate().unwrap();
        assert_eq!(req.idempotency_key, "K1");
        assert_eq!(req.currency, Currency::Idr);
        assert_eq!(req.amount_minor.value(), 3_000);
    }

    #[test]
    fn test_rejections() {
        let mut p = payment();
        p.amount_minor = 0;
        assert_eq!(p.validate().unwrap_err().code(), "invalid_input");

        let mut p = payment();
        p.idempotency_key = "  ".into();
        assert_eq!(p.validate().unwrap_err().code(), "invalid_input");

        let mut p = payment();
        p.tx_date = String::new();
        assert_eq!(p.validate().unwrap_err().code(), "invalid_input");

        let mut p = payment();
        p.currency = "EUR".into();
        assert_eq!(p.validate().unwrap_err().code(), "unsupported_currency");
    }

    #[test]
    fn test_missing_parties_pass_through() {
        let mut p = payment();
        p.sender_id = String::new();
        assert_eq!(p.validate().unwrap().sender_id, "");
    }

    #[test]
    fn test_from_json() {
        let p = IngressPayment::from_json(
            r#"{"idempotency_key":"K1","sender_id":"A","receiver_id":"B","amount_minor":3000,"currency":"IDR","tx_date":"2026-01-15"}"#,
        )
        .unwrap();
        assert!(p.validate().is_ok());
        assert_eq!(
            IngressPayment::from_json("{not json").unwrap_err().code(),
            "bad_json"
        );
    }
}
