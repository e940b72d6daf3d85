//! Fixed-point money type.
//!
//! All money amounts and prices in the engine use a 1e-6 (micros)
//! fixed-point representation stored as `i64`. Intermediate products
//! (price × multiplier × quantity, proportional fee shares) are computed in
//! `i128` and only narrowed back once the full product is known.
//!
//! `Micros` wraps the raw `i64` so the type system prevents:
//! - Implicit construction from raw `i64` (no `From<i64>` impl).
//! - Mixing `Micros` with quantities or multipliers in arithmetic.
//!
//! # Rounding
//!
//! Nothing in this module rounds implicitly. [`Micros::round_to_cents`] is the
//! single rounding point and is applied when a position is emitted, never
//! while lots are being matched.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Micros per whole currency unit.
pub const MICROS_SCALE: i64 = 1_000_000;

/// Micros per cent (currency precision of emitted positions).
pub const MICROS_PER_CENT: i64 = 10_000;

// ---------------------------------------------------------------------------
// Micros newtype
// ---------------------------------------------------------------------------

/// A fixed-point monetary amount at 1e-6 scale (micros).
///
/// 1 USD = `Micros(1_000_000)`. Serializes as the raw integer.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Micros(i64);

impl Micros {
    /// Zero monetary amount.
    pub const ZERO: Micros = Micros(0);

    /// Maximum representable value.
    pub const MAX: Micros = Micros(i64::MAX);

    /// Minimum representable value.
    pub const MIN: Micros = Micros(i64::MIN);

    /// Construct a `Micros` from a raw `i64` at 1e-6 scale.
    #[inline]
    pub const fn new(raw: i64) -> Self {
        Micros(raw)
    }

    /// Whole currency units.
    #[inline]
    pub const fn from_dollars(dollars: i64) -> Self {
        Micros(dollars * MICROS_SCALE)
    }

    /// Currency cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Micros(cents * MICROS_PER_CENT)
    }

    /// Extract the underlying raw `i64`.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Saturating addition. Clamps at [`Micros::MAX`] on overflow.
    #[inline]
    pub fn saturating_add(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction. Clamps at [`Micros::MIN`] on underflow.
    #[inline]
    pub fn saturating_sub(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_sub(rhs.0))
    }

    /// Absolute value. `Micros::MIN.abs()` saturates to `Micros::MAX`.
    #[inline]
    pub fn abs(self) -> Micros {
        Micros(self.0.saturating_abs())
    }

    /// Sign as a plain integer: `1`, `0` or `-1`.
    #[inline]
    pub fn signum(self) -> i64 {
        self.0.signum()
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Multiply a per-unit amount by an integer quantity.
    ///
    /// Returns `None` on `i64` overflow. Overflow in a trade value is a
    /// critical error, so there is no implicit clamp.
    #[inline]
    pub fn checked_mul_qty(self, qty: i64) -> Option<Micros> {
        self.0.checked_mul(qty).map(Micros)
    }

    /// `self × num / den`, computed in `i128` and truncated toward zero.
    ///
    /// Used for proportional allocation where the caller hands the final
    /// remainder to the last share, so truncation never loses a micro overall.
    /// Returns `None` when `den == 0` or the result does not fit in `i64`.
    pub fn checked_mul_ratio(self, num: i64, den: i64) -> Option<Micros> {
        if den == 0 {
            return None;
        }
        let v = (self.0 as i128) * (num as i128) / (den as i128);
        i64::try_from(v).ok().map(Micros)
    }

    /// Round to currency precision (cents), half away from zero.
    pub fn round_to_cents(self) -> Micros {
        let half = MICROS_PER_CENT / 2;
        let r = self.0.rem_euclid(MICROS_PER_CENT);
        let floor = self.0 - r;
        let up = if self.0 >= 0 { r >= half } else { r > half };
        if up {
            Micros(floor.saturating_add(MICROS_PER_CENT))
        } else {
            Micros(floor)
        }
    }

    /// Rounded to cents, two decimals: `-3.5` renders as `-3.50`.
    pub fn display_cents(self) -> String {
        let cents = self.round_to_cents().0 / MICROS_PER_CENT;
        let sign = if cents < 0 { "-" } else { "" };
        let cents = cents.unsigned_abs();
        format!("{sign}{}.{:02}", cents / 100, cents % 100)
    }
}

/// Notional value of `qty` contracts at `price` with a contract `multiplier`,
/// kept in `i128` so it can be combined with other wide intermediates.
#[inline]
pub(crate) fn notional_i128(price: Micros, multiplier: i64, qty: i64) -> i128 {
    (price.raw() as i128) * (multiplier as i128) * (qty as i128)
}

/// Narrow a wide intermediate back to `Micros`, clamping at the `i64` range.
#[inline]
pub(crate) fn micros_from_i128_clamp(x: i128) -> Micros {
    if x > i64::MAX as i128 {
        Micros::MAX
    } else if x < i64::MIN as i128 {
        Micros::MIN
    } else {
        Micros(x as i64)
    }
}

// ---------------------------------------------------------------------------
// Arithmetic operators (closed over Micros, saturating at the i64 range)
// ---------------------------------------------------------------------------

impl Add for Micros {
    type Output = Micros;
    #[inline]
    fn add(self, rhs: Micros) -> Micros {
        self.saturating_add(rhs)
    }
}

impl Sub for Micros {
    type Output = Micros;
    #[inline]
    fn sub(self, rhs: Micros) -> Micros {
        self.saturating_sub(rhs)
    }
}

impl Neg for Micros {
    type Output = Micros;
    #[inline]
    fn neg(self) -> Micros {
        Micros(self.0.saturating_neg())
    }
}

impl AddAssign for Micros {
    #[inline]
    fn add_assign(&mut self, rhs: Micros) {
        *self = self.saturating_add(rhs);
    }
}

impl SubAssign for Micros {
    #[inline]
    fn sub_assign(&mut self, rhs: Micros) {
        *self = self.saturating_sub(rhs);
    }
}

impl std::iter::Sum for Micros {
    fn sum<I: Iterator<Item = Micros>>(iter: I) -> Micros {
        iter.fold(Micros::ZERO, |acc, m| acc + m)
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl std::fmt::Display for Micros {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dollars = self.0 / MICROS_SCALE;
        let frac = (self.0 % MICROS_SCALE).abs();
        // |value| < $1 and negative: dollars truncates to 0 and loses the sign.
        if self.0 < 0 && dollars == 0 {
            write!(f, "-{dollars}.{frac:06}")
        } else {
            write!(f, "{dollars}.{frac:06}")
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
