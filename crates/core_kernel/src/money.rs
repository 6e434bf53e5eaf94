//! Money types with precise decimal arithmetic
//!
//! The clinic bills in a single currency, so `Money` is a thin wrapper over
//! `rust_decimal::Decimal` that keeps rounding rules in one place and refuses
//! negative values wherever the billing model requires amounts `>= 0`.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use thiserror::Error;

/// Number of decimal places in the billing currency's minor unit
pub const MINOR_UNIT_DP: u32 = 2;

/// Internal precision kept for intermediate results
const INTERNAL_DP: u32 = 4;

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Negative amount not allowed: {0}")]
    Negative(Decimal),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount in the clinic's billing currency
///
/// Amounts are stored with 4 decimal places internally so that prorated
/// prices can be computed before the final rounding to minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Creates a new Money value
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp(INTERNAL_DP))
    }

    /// Creates a Money value, rejecting negative amounts
    ///
    /// Prices, invoice amounts, payments and allocations all go through here.
    pub fn non_negative(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative(amount));
        }
        Ok(Self::new(amount))
    }

    /// Creates Money from an integer amount in minor units (e.g., halalas)
    pub fn from_minor(minor_units: i64) -> Self {
        Self::new(Decimal::new(minor_units, MINOR_UNIT_DP))
    }

    /// Creates a zero amount
    pub const fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the amount
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Returns true if the amount is strictly negative
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Rounds to minor units, half away from zero
    pub fn round_to_minor(&self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(MINOR_UNIT_DP, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Checked addition that reports overflow instead of panicking
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Self::new)
            .ok_or(MoneyError::Overflow)
    }

    /// Checked subtraction that reports overflow instead of panicking
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.0
            .checked_sub(other.0)
            .map(Self::new)
            .ok_or(MoneyError::Overflow)
    }

    /// Multiplies by a scalar
    pub fn multiply(&self, factor: Decimal) -> Result<Self, MoneyError> {
        self.0
            .checked_mul(factor)
            .map(Self::new)
            .ok_or(MoneyError::Overflow)
    }

    /// Divides by a scalar
    pub fn divide(&self, divisor: Decimal) -> Result<Self, MoneyError> {
        if divisor.is_zero() {
            return Err(MoneyError::DivisionByZero);
        }
        self.0
            .checked_div(divisor)
            .map(Self::new)
            .ok_or(MoneyError::Overflow)
    }

    /// Returns the smaller of two amounts
    pub fn min(self, other: Money) -> Money {
        if self <= other { self } else { other }
    }

    /// Returns `self - other`, floored at zero
    pub fn saturating_sub(&self, other: &Money) -> Money {
        if *other >= *self {
            Money::zero()
        } else {
            Self::new(self.0 - other.0)
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.dp$}", self.0, dp = MINOR_UNIT_DP as usize)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.0 - other.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}
