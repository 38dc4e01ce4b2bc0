//! Rate Converter
//!
//! Stateless amount conversion between currencies against a published rate
//! snapshot.
//!
//! ## Rounding
//! One rule everywhere: the converted major-unit value is rounded to the target
//! currency's minor-unit precision with round-half-even
//! (`RoundingStrategy::MidpointNearestEven`). The same snapshot and input
//! always produce the same output.

use async_trait::async_trait;
use rust_decimal::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::RateSeed;
use crate::money::{Currency, MinorAmount};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FxError {
    #[error("No rate published for {from}/{to}")]
    RateUnavailable { from: Currency, to: Currency },

    #[error("Rate must be positive, got {0}")]
    InvalidRate(String),

    #[error("Converted amount rounds to zero")]
    AmountTooSmall,

    #[error("Converted amount overflows")]
    Overflow,
}

impl FxError {
    /// Reason code surfaced by the saga for any conversion failure
    pub fn code(&self) -> &'static str {
        "fx_error"
    }
}

/// One published rate: 1 unit of `base` = `rate` units of `quote`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate {
    pub base: Currency,
    pub quote: Currency,
    pub rate: Decimal,
}

impl Rate {
    pub fn new(base: Currency, quote: Currency, rate: Decimal) -> Result<Self, FxError> {
        if rate <= Decimal::ZERO {
            return Err(FxError::InvalidRate(rate.to_string()));
        }
        Ok(Self { base, quote, rate })
    }
}

impl TryFrom<&RateSeed> for Rate {
    type Error = FxError;

    fn try_from(seed: &RateSeed) -> Result<Self, Self::Error> {
        let rate = Decimal::from_str(seed.rate.trim())
            .map_err(|_| FxError::InvalidRate(seed.rate.clone()))?;
        Rate::new(seed.base, seed.quote, rate)
    }
}

/// Remote-callable conversion surface
#[async_trait]
pub trait RateConverter: Send + Sync {
    async fn convert(
        &self,
        amount: MinorAmount,
        from: Currency,
        to: Currency,
    ) -> Result<MinorAmount, FxError>;
}

type Snapshot = Arc<HashMap<(Currency, Currency), Decimal>>;

/// Rate table keyed by ordered currency pair.
///
/// Updates swap in a new snapshot; a conversion reads exactly one snapshot.
#[derive(Default)]
pub struct RateTable {
    snapshot: RwLock<Snapshot>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seeds(seeds: &[RateSeed]) -> Result<Self, FxError> {
        let table = Self::new();
        let rates = seeds
            .iter()
            .map(Rate::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        table.upsert_rates(rates);
        Ok(table)
    }

    /// Publish or replace the given pairs; other pairs are kept
    pub fn upsert_rates(&self, rates: Vec<Rate>) -> usize {
        let count = rates.len();
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next: HashMap<_, _> = guard.as_ref().clone();
        for r in rates {
            next.insert((r.base, r.quote), r.rate);
        }
        *guard = Arc::new(next);
        info!(count = count, pairs = guard.len(), "FX rates published");
        count
    }

    pub fn rate(&self, from: Currency, to: Currency) -> Option<Decimal> {
        self.current().get(&(from, to)).copied()
    }

    fn current(&self) -> Snapshot {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Synchronous conversion against the current snapshot
    pub fn convert_now(
        &self,
        amount: MinorAmount,
        from: Currency,
        to: Currency,
    ) -> Result<MinorAmount, FxError> {
        if from == to {
            return Ok(amount);
        }
        let rate = self
            .rate(from, to)
            .ok_or(FxError::RateUnavailable { from, to })?;
        convert_minor(amount, from, to, rate)
    }
}

#[async_trait]
impl RateConverter for RateTable {
    async fn convert(
        &self,
        amount: MinorAmount,
        from: Currency,
        to: Currency,
    ) -> Result<MinorAmount, FxError> {
        let converted = self.convert_now(amount, from, to)?;
        debug!(
            from = %from,
            to = %to,
            amount = amount.value(),
            converted = converted.value(),
            "FX converted"
        );
        Ok(converted)
    }
}

/// Convert minor units of `from` into minor units of `to` at `rate`
pub fn convert_minor(
    amount: MinorAmount,
    from: Currency,
    to: Currency,
    rate: Decimal,
) -> Result<MinorAmount, FxError> {
    let major = Decimal::new(amount.value(), from.minor_digits());
    let converted = major.checked_mul(rate).ok_or(FxError::Overflow)?;
    let rounded = converted
        .round_dp_with_strategy(to.minor_digits(), RoundingStrategy::MidpointNearestEven);
    let scale = Decimal::from(10i64.pow(to.minor_digits()));
    let minor = rounded
        .checked_mul(scale)
        .and_then(|m| m.to_i64())
        .ok_or(FxError::Overflow)?;
    MinorAmount::new(minor).map_err(|_| FxError::AmountTooSmall)
}
