//! # Money Module
//!
//! Provides the `Money` type for balances, prices and top-up amounts.
//!
//! ## Integer Minor Units
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every amount is stored as an integer count of minor units (cents).     │
//! │                                                                         │
//! │    price  150   ──► shown as "1.50 €"                                   │
//! │    balance -200 ──► shown as "-2.00 €"  (within the overdraft floor)    │
//! │                                                                         │
//! │  No fractional units exist anywhere in the ledger.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kasse_core::money::Money;
//!
//! let price = Money::from_cents(200);
//! let total = price.checked_times(2).unwrap();
//! assert_eq!(total.cents(), 400);
//! assert_eq!(total.display_with("€"), "4.00 €");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// Signed: balances may be negative down to the overdraft floor, and ledger
/// deltas are negative for charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a quantity, `None` on overflow.
    ///
    /// ## User Workflow
    /// ```text
    /// Product: Cola 2.00
    /// Quantity: 3
    ///      │
    ///      ▼
    /// checked_times(3) ← THIS FUNCTION
    ///      │
    ///      ▼
    /// Total: 6.00 ──► AdjustBalance(-600)
    /// ```
    #[inline]
    pub const fn checked_times(&self, quantity: i64) -> Option<Self> {
        match self.0.checked_mul(quantity) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Adds two amounts, `None` on overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Formats the amount followed by a currency symbol, e.g. `"1.50 €"`.
    pub fn display_with(&self, symbol: &str) -> String {
        if symbol.is_empty() {
            self.to_string()
        } else {
            format!("{} {}", self, symbol)
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows the amount with two decimals and no currency symbol.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Negation turns a charge into a refund delta and back.
impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl From<i64> for Money {
    fn from(cents: i64) -> Self {
        Money(cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(150).to_string(), "1.50");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-200).to_string(), "-2.00");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_display_with_symbol() {
        assert_eq!(Money::from_cents(1000).display_with("€"), "10.00 €");
        assert_eq!(Money::from_cents(1000).display_with(""), "10.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(1200);

        assert_eq!((a - b).cents(), -200);
        assert_eq!((a + b).cents(), 2200);
        assert_eq!((-b).cents(), -1200);

        let mut c = a;
        c -= b;
        c += Money::from_cents(200);
        assert!(c.is_zero());
    }

    #[test]
    fn test_checked_times() {
        assert_eq!(Money::from_cents(200).checked_times(3), Some(Money::from_cents(600)));
        assert_eq!(Money::from_cents(i64::MAX).checked_times(2), None);
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
    }

    #[test]
    fn test_serializes_as_plain_integer() {
        let json = serde_json::to_string(&Money::from_cents(-250)).unwrap();
        assert_eq!(json, "-250");
        let back: Money = serde_json::from_str("150").unwrap();
        assert_eq!(back.cents(), 150);
    }
}
