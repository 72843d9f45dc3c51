//! Coin amounts and the stake-to-score conversion.
//!
//! Amounts are fixed-point integers (u64 raw units) to avoid floating-point
//! errors. Staked amounts convert to a `u32` score used by the quorum
//! arithmetic: one point of score per coin of stake, times 100.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

use crate::error::TypesError;

/// Raw units per coin.
pub const COIN: u64 = 100;

/// Largest representable money supply, in raw units.
pub const MAX_MONEY: u64 = 21_000_000_000_000 * COIN;

/// A coin amount, stored as raw units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Whole coins, discarding the fractional part.
    pub fn from_coins(coins: u64) -> Self {
        Self(coins * COIN)
    }

    /// Parse a decimal coin amount ("12", "12.5", "12.50") and check it
    /// against the money range. This is the form stake options take in
    /// configuration.
    pub fn from_coin_str(s: &str) -> Result<Self, TypesError> {
        let malformed = || TypesError::InvalidAmount(s.to_string());

        let (whole, frac) = match s.split_once('.') {
            Some((_, "")) => return Err(malformed()),
            Some((whole, frac)) => (whole, frac),
            None => (s, ""),
        };
        if whole.is_empty()
            || frac.len() > 2
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(malformed());
        }

        let coins: u64 = whole.parse().map_err(|_| malformed())?;
        let mut subunits: u64 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| malformed())?
        };
        if frac.len() == 1 {
            subunits *= 10;
        }

        let raw = coins
            .checked_mul(COIN)
            .and_then(|r| r.checked_add(subunits))
            .ok_or_else(|| TypesError::AmountOutOfRange(s.to_string()))?;
        let amount = Self(raw);
        if !amount.is_in_range() {
            return Err(TypesError::AmountOutOfRange(s.to_string()));
        }
        Ok(amount)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Whether the amount is within the protocol money range.
    pub fn is_in_range(&self) -> bool {
        self.0 <= MAX_MONEY
    }

    /// Convert a staked amount to a proof score.
    ///
    /// 100 score per coin, truncating. Saturates at `u32::MAX` so absurd
    /// stakes cannot wrap the quorum arithmetic.
    pub fn to_score(&self) -> u32 {
        let score = (u128::from(self.0) * 100) / u128::from(COIN);
        u32::try_from(score).unwrap_or(u32::MAX)
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / COIN, self.0 % COIN)
    }
}
