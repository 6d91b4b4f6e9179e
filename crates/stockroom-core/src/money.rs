//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  With binary floats:                                                    │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  An order total built from 40 lines drifts away from the sum of the    │
//! │  printed line totals, and pending balances stop reaching exactly 0.    │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    86.24 is stored as 8624. Every derived amount (discount, tax,       │
//! │    line total) is rounded to the cent exactly once, where computed.    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::money::Money;
//! use stockroom_core::quantity::Quantity;
//! use stockroom_core::types::Percent;
//!
//! let price = Money::from_cents(1000);                  // 10.00
//! let subtotal = price.times(Quantity::from_units(3));  // 30.00
//! let discount = subtotal.percent_of(Percent::from_bps(1000)); // 10%
//!
//! assert_eq!(discount.cents(), 300);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::quantity::Quantity;
use crate::types::Percent;

// =============================================================================
// Rounding
// =============================================================================

/// Divides with rounding half away from zero.
///
/// `numerator` is an already scaled product (e.g. cents × basis points), so
/// callers widen to i128 before multiplying.
pub(crate) fn round_div(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in cents.
///
/// ## Design Decisions
/// - **i64 (signed)**: Differences (e.g. a payment being reverted) may be
///   negative while intermediate values are computed
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Serialized as cents**: `8624` on the wire, never `86.24`
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Product.price_cents ──► LineInput.unit_price ──► LineAmounts.total     │
/// │                                                                         │
/// │  OrderTotals.total ──► Order.total_cents ──► Settlement.pending()       │
/// │                                                                         │
/// │  Payment.amount_cents ──► Settlement.apply() ──► derive_status()        │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts, only the major unit should be negative:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
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

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        std::cmp::min(self, other)
    }

    /// Computes `rate` of this amount, rounded half away from zero to the cent.
    ///
    /// ## Implementation
    /// Integer math on basis points: `(cents × bps ± 5000) / 10000`
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::money::Money;
    /// use stockroom_core::types::Percent;
    ///
    /// // 27.00 × 12% = 3.24
    /// let tax = Money::from_cents(2700).percent_of(Percent::from_bps(1200));
    /// assert_eq!(tax.cents(), 324);
    ///
    /// // 10.00 × 8.25% = 0.825 → 0.83
    /// let tax = Money::from_cents(1000).percent_of(Percent::from_bps(825));
    /// assert_eq!(tax.cents(), 83);
    /// ```
    pub fn percent_of(&self, rate: Percent) -> Money {
        let cents = round_div(self.0 as i128 * rate.bps() as i128, 10_000);
        Money(cents as i64)
    }

    /// Multiplies a unit price by a fractional quantity.
    ///
    /// Quantities carry three decimals, so the product is rounded to the
    /// cent: 0.333 × 10.00 = 3.33.
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::money::Money;
    /// use stockroom_core::quantity::Quantity;
    ///
    /// let unit_price = Money::from_cents(1000);
    /// assert_eq!(unit_price.times(Quantity::from_milli(2_500)).cents(), 2500);
    /// assert_eq!(unit_price.times(Quantity::from_milli(333)).cents(), 333);
    /// ```
    pub fn times(&self, quantity: Quantity) -> Money {
        let cents = round_div(
            self.0 as i128 * quantity.milli() as i128,
            Quantity::SCALE as i128,
        );
        Money(cents as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal with two places (`86.24`, `-5.50`). Currency symbols are a
/// presentation concern left to the caller.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

/// Parses `"86.24"`, `"86.2"`, `"86"` or `"-5.50"`. More than two decimals
/// is rejected rather than silently rounded.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (major, minor) = match digits.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (digits, ""),
        };

        if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected a decimal number"));
        }
        if minor.len() > 2 || !minor.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("at most two decimal places"));
        }

        let major: i64 = major.parse().map_err(|_| invalid("amount is too large"))?;
        let minor: i64 = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().map_err(|_| invalid("bad decimals"))? * 10,
            _ => minor.parse().map_err(|_| invalid("bad decimals"))?,
        };

        let cents = major
            .checked_mul(100)
            .and_then(|c| c.checked_add(minor))
            .ok_or_else(|| invalid("amount is too large"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
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

/// Multiplication by a whole count.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, count: i64) -> Self {
        Money(self.0 * count)
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

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(8624).to_string(), "86.24");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_parse() {
        assert_eq!("86.24".parse::<Money>().unwrap().cents(), 8624);
        assert_eq!("86.2".parse::<Money>().unwrap().cents(), 8620);
        assert_eq!("86".parse::<Money>().unwrap().cents(), 8600);
        assert_eq!("-5.50".parse::<Money>().unwrap().cents(), -550);
        assert_eq!(" 0.01 ".parse::<Money>().unwrap().cents(), 1);

        assert!("86.245".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!(".50".parse::<Money>().is_err());
        assert!("1.-5".parse::<Money>().is_err());
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);

        let total: Money = [a, b, b].iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_percent_of_rounds_half_away_from_zero() {
        // 0.825 → 0.83
        assert_eq!(
            Money::from_cents(1000).percent_of(Percent::from_bps(825)).cents(),
            83
        );
        // -0.825 → -0.83
        assert_eq!(
            Money::from_cents(-1000).percent_of(Percent::from_bps(825)).cents(),
            -83
        );
        // 0.824 → 0.82
        assert_eq!(
            Money::from_cents(1000).percent_of(Percent::from_bps(824)).cents(),
            82
        );
    }

    #[test]
    fn test_times_fractional_quantity() {
        let price = Money::from_cents(1999);
        assert_eq!(price.times(Quantity::from_units(3)).cents(), 5997);
        // 1.5 × 19.99 = 29.985 → 29.99
        assert_eq!(price.times(Quantity::from_milli(1_500)).cents(), 2999);
    }

    #[test]
    fn test_zero_and_checks() {
        assert!(Money::zero().is_zero());
        assert!(Money::from_cents(100).is_positive());
        assert!(Money::from_cents(-100).is_negative());
        assert_eq!(Money::from_cents(-100).abs().cents(), 100);
        assert_eq!(Money::from_cents(300).min(Money::from_cents(200)).cents(), 200);
    }

    #[test]
    fn test_serializes_as_cents() {
        let json = serde_json::to_string(&Money::from_cents(8624)).unwrap();
        assert_eq!(json, "8624");
    }
}
