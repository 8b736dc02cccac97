//! Fixed-precision money.
//!
//! Amounts are whole cents in an `i64`; rates are basis points. Fee
//! arithmetic widens to `i128` and rounds half away from zero, so repeated
//! fee calculations never drift the way binary floating point would.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

/// Basis points per whole (100%).
pub const BPS_SCALE: u32 = 10_000;

/// Monetary amount in whole cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cents(pub i64);

impl Cents {
    /// Zero amount.
    pub const ZERO: Self = Self(0);

    /// Build an amount from whole dollars.
    pub const fn from_dollars(dollars: i64) -> Self {
        Self(dollars.saturating_mul(100))
    }

    /// Raw cent value.
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// True when strictly greater than zero.
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Apply a rate expressed in basis points, rounding half away from zero.
    pub fn apply_bps(self, bps: u32) -> Self {
        let product = i128::from(self.0) * i128::from(bps);
        let half = i128::from(BPS_SCALE / 2) * product.signum();
        let scaled = (product + half) / i128::from(BPS_SCALE);
        Self(i64::try_from(scaled).unwrap_or(if scaled < 0 { i64::MIN } else { i64::MAX }))
    }

    /// Integer division used for averages; zero divisor yields zero.
    pub fn div_count(self, count: u64) -> Self {
        if count == 0 {
            return Self::ZERO;
        }
        let divisor = i64::try_from(count).unwrap_or(i64::MAX);
        Self(self.0 / divisor)
    }

    /// Lossy conversion for ratio/score computations only.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_dollars_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl Add for Cents {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Cents {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let digits = (abs / 100).to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        write!(f, "{sign}${grouped}.{:02}", abs % 100)
    }
}
