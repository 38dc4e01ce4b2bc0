//! Money Types
//!
//! Currencies and integer minor-unit amounts shared by every component.
//!
//! ## Internal Representation
//! - All amounts are `i64` minor units (IDR has no minor digits, USD/SGD have 2)
//! - Decimal math only happens inside the rate converter, and the result is
//!   brought back to minor units immediately

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Money parsing errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Amount must be positive")]
    InvalidAmount,
}

impl MoneyError {
    pub fn code(&self) -> &'static str {
        match self {
            MoneyError::UnsupportedCurrency(_) => "unsupported_currency",
            MoneyError::InvalidAmount => "invalid_input",
        }
    }
}

/// Supported settlement currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    Idr,
    Usd,
    Sgd,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Idr, Currency::Usd, Currency::Sgd];

    /// Number of minor-unit digits (10^n minor units per major unit)
    #[inline]
    pub fn minor_digits(&self) -> u32 {
        match self {
            Currency::Idr => 0,
            Currency::Usd | Currency::Sgd => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Idr => "IDR",
            Currency::Usd => "USD",
            Currency::Sgd => "SGD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IDR" => Ok(Currency::Idr),
            "USD" => Ok(Currency::Usd),
            "SGD" => Ok(Currency::Sgd),
            other => Err(MoneyError::UnsupportedCurrency(other.to_string())),
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.as_str().to_string()
    }
}

/// Positive amount in minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct MinorAmount(i64);

impl MinorAmount {
    pub fn new(value: i64) -> Result<Self, MoneyError> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(MoneyError::InvalidAmount)
        }
    }

    #[inline]
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for MinorAmount {
    type Error = MoneyError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MinorAmount> for i64 {
    fn from(amount: MinorAmount) -> Self {
        amount.0
    }
}

impl fmt::Display for MinorAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_parse_is_lenient_on_case_and_whitespace() {
        assert_eq!(" usd ".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!("IDR".parse::<Currency>().unwrap(), Currency::Idr);
        assert_eq!(
            "EUR".parse::<Currency>(),
            Err(MoneyError::UnsupportedCurrency("EUR".to_string()))
        );
    }

    #[test]
    fn test_currency_serde_uses_iso_code() {
        let json = serde_json::to_string(&Currency::Sgd).unwrap();
        assert_eq!(json, "\"SGD\"");
        let back: Currency = serde_json::from_str("\"sgd\"").unwrap();
        assert_eq!(back, Currency::Sgd);
        assert!(serde_json::from_str::<Currency>("\"JPY\"").is_err());
    }

    #[test]
    fn test_minor_amount_must_be_positive() {
        assert!(MinorAmount::new(1).is_ok());
        assert_eq!(MinorAmount::new(0), Err(MoneyError::InvalidAmount));
        assert_eq!(MinorAmount::new(-5), Err(MoneyError::InvalidAmount));
        assert!(serde_json::from_str::<MinorAmount>("0").is_err());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            MoneyError::UnsupportedCurrency("X".into()).code(),
            "unsupported_currency"
        );
        assert_eq!(MoneyError::InvalidAmount.code(), "invalid_input");
    }
}
