//! Extended-range non-negative reals for noise bookkeeping.
//!
//! Noise variances routinely exceed `f64::MAX` once special primes are added
//! (a 400-bit modulus squared is already past 2^800), so the value is kept as
//! its natural logarithm. Zero is represented by `-inf`.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign};
use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::ToPrimitive;

use crate::error::{HeError, Result};

#[derive(Clone, Copy, Debug)]
pub struct XDouble {
    ln: f64,
}

impl XDouble {
    pub const ZERO: XDouble = XDouble { ln: f64::NEG_INFINITY };
    pub const ONE: XDouble = XDouble { ln: 0.0 };

    /// Negative inputs are clamped to zero.
    pub fn from_f64(v: f64) -> Self {
        if v > 0.0 {
            Self { ln: v.ln() }
        } else {
            Self::ZERO
        }
    }

    /// e^x without overflow.
    pub fn exp(x: f64) -> Self {
        Self { ln: x }
    }

    pub fn from_biguint(v: &BigUint) -> Self {
        let bits = v.bits();
        if bits == 0 {
            return Self::ZERO;
        }
        if bits <= 1000 {
            return Self::from_f64(v.to_f64().unwrap_or(f64::INFINITY));
        }
        let shift = bits - 64;
        let top = (v >> shift).to_f64().unwrap_or(f64::MAX);
        Self { ln: top.ln() + shift as f64 * std::f64::consts::LN_2 }
    }

    /// Natural logarithm; `-inf` for zero.
    pub fn ln(self) -> f64 {
        self.ln
    }

    pub fn is_zero(self) -> bool {
        self.ln == f64::NEG_INFINITY
    }

    /// Lossy conversion; saturates to `inf`.
    pub fn to_f64(self) -> f64 {
        self.ln.exp()
    }

    pub fn powi(self, e: i32) -> Self {
        if self.is_zero() {
            return if e == 0 { Self::ONE } else { Self::ZERO };
        }
        Self { ln: self.ln * e as f64 }
    }
}

impl Default for XDouble {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for XDouble {
    type Output = XDouble;
    fn add(self, rhs: XDouble) -> XDouble {
        if self.is_zero() {
            return rhs;
        }
        if rhs.is_zero() {
            return self;
        }
        let (hi, lo) = if self.ln >= rhs.ln { (self.ln, rhs.ln) } else { (rhs.ln, self.ln) };
        XDouble { ln: hi + (lo - hi).exp().ln_1p() }
    }
}

impl AddAssign for XDouble {
    fn add_assign(&mut self, rhs: XDouble) {
        *self = *self + rhs;
    }
}

impl Mul for XDouble {
    type Output = XDouble;
    fn mul(self, rhs: XDouble) -> XDouble {
        if self.is_zero() || rhs.is_zero() {
            return XDouble::ZERO;
        }
        XDouble { ln: self.ln + rhs.ln }
    }
}

impl Mul<f64> for XDouble {
    type Output = XDouble;
    fn mul(self, rhs: f64) -> XDouble {
        self * XDouble::from_f64(rhs)
    }
}

impl MulAssign for XDouble {
    fn mul_assign(&mut self, rhs: XDouble) {
        *self = *self * rhs;
    }
}

impl MulAssign<f64> for XDouble {
    fn mul_assign(&mut self, rhs: f64) {
        *self = *self * rhs;
    }
}

impl Div for XDouble {
    type Output = XDouble;
    fn div(self, rhs: XDouble) -> XDouble {
        if self.is_zero() {
            return XDouble::ZERO;
        }
        XDouble { ln: self.ln - rhs.ln }
    }
}

impl Div<f64> for XDouble {
    type Output = XDouble;
    fn div(self, rhs: f64) -> XDouble {
        self / XDouble::from_f64(rhs)
    }
}

impl DivAssign for XDouble {
    fn div_assign(&mut self, rhs: XDouble) {
        *self = *self / rhs;
    }
}

impl DivAssign<f64> for XDouble {
    fn div_assign(&mut self, rhs: f64) {
        *self = *self / rhs;
    }
}

impl PartialEq for XDouble {
    fn eq(&self, other: &Self) -> bool {
        self.ln == other.ln
    }
}

impl PartialOrd for XDouble {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.ln.partial_cmp(&other.ln)
    }
}

/// Printed as `<mantissa>e<decimal exponent>`, which also covers values
/// outside the `f64` range.
impl fmt::Display for XDouble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        let log10 = self.ln / std::f64::consts::LN_10;
        let mut exponent = log10.floor();
        let mut mantissa = 10f64.powf(log10 - exponent);
        if mantissa >= 10.0 {
            mantissa /= 10.0;
            exponent += 1.0;
        }
        write!(f, "{mantissa:.15}e{}", exponent as i64)
    }
}

impl FromStr for XDouble {
    type Err = HeError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || HeError::Parse(format!("bad noise value `{s}`"));
        let (mantissa, exponent) = match s.rfind(|c: char| c == 'e' || c == 'E') {
            Some(pos) => (&s[..pos], s[pos + 1..].parse::<i64>().map_err(|_| bad())?),
            None => (s, 0),
        };
        let mantissa: f64 = mantissa.parse().map_err(|_| bad())?;
        if !mantissa.is_finite() || mantissa < 0.0 {
            return Err(bad());
        }
        if mantissa == 0.0 {
            return Ok(XDouble::ZERO);
        }
        Ok(XDouble { ln: mantissa.ln() + exponent as f64 * std::f64::consts::LN_10 })
    }
}
