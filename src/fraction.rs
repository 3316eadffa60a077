//! Fraction type with cycle-related operations for pattern timing.
//!
//! Time in quaver is measured in cycles and is always an exact rational
//! number. The numerator and denominator are arbitrary-precision integers
//! kept in lowest terms, so deeply nested `fast`/`slow` chains and
//! polyrhythms never drift and never overflow.

use crate::timespan::TimeSpan;
use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{FromPrimitive, One, Signed, ToPrimitive, Zero};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Largest denominator produced when approximating a float.
const MAX_FLOAT_DENOMINATOR: i64 = 1_000_000;

/// A point in time or a duration, measured in cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fraction(BigRational);

impl Fraction {
    /// Create a new fraction from numerator and denominator.
    ///
    /// Panics if `denom` is zero.
    pub fn new(numer: i64, denom: i64) -> Self {
        Fraction(BigRational::new(BigInt::from(numer), BigInt::from(denom)))
    }

    /// Create a fraction from an integer.
    pub fn from_integer(n: i64) -> Self {
        Fraction(BigRational::from_integer(BigInt::from(n)))
    }

    /// Create a fraction from a big integer.
    pub fn from_bigint(n: BigInt) -> Self {
        Fraction(BigRational::from_integer(n))
    }

    /// Parse a plain decimal literal (`3`, `-0.25`, `1.125`) exactly.
    ///
    /// Returns `None` for anything that is not `-?digits(.digits)?`.
    pub fn parse_decimal(text: &str) -> Option<Self> {
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if body.contains('.') && (frac_part.is_empty() || !frac_part.bytes().all(|b| b.is_ascii_digit())) {
            return None;
        }

        let digits = format!("{}{}", int_part, frac_part);
        let numer: BigInt = digits.parse().ok()?;
        let denom = num_traits::pow(BigInt::from(10), frac_part.len());
        let value = BigRational::new(numer, denom);
        Some(Fraction(if negative { -value } else { value }))
    }

    /// Returns the start of the cycle containing this time (floor to integer).
    /// Known as "sam", the start of the measure.
    pub fn sam(&self) -> Self {
        Fraction(self.0.floor())
    }

    /// Returns the start of the next cycle.
    pub fn next_sam(&self) -> Self {
        self.sam() + Fraction::one()
    }

    /// Returns the position within the current cycle (fractional part).
    pub fn cycle_pos(&self) -> Self {
        self - &self.sam()
    }

    /// Returns the whole cycle containing this time.
    pub fn whole_cycle(&self) -> TimeSpan {
        TimeSpan::new(self.sam(), self.next_sam())
    }

    /// The integer index of the cycle containing this time.
    pub fn cycle(&self) -> BigInt {
        self.0.floor().to_integer()
    }

    /// The cycle index reduced modulo `n` with floor semantics, so cycle -1
    /// maps to `n - 1`. Returns 0 when `n` is 0.
    pub fn cycle_mod(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.cycle()
            .mod_floor(&BigInt::from(n))
            .to_usize()
            .unwrap_or(0)
    }

    /// Floor to integer.
    pub fn floor(&self) -> Self {
        Fraction(self.0.floor())
    }

    /// Ceiling to integer.
    pub fn ceil(&self) -> Self {
        Fraction(self.0.ceil())
    }

    /// Convert to f64 for wall-clock calculations.
    pub fn to_f64(&self) -> f64 {
        match (self.0.numer().to_f64(), self.0.denom().to_f64()) {
            (Some(n), Some(d)) => n / d,
            _ => f64::NAN,
        }
    }

    /// The value as an `i64` if it is an integer that fits.
    pub fn to_i64(&self) -> Option<i64> {
        if self.0.is_integer() {
            self.0.to_integer().to_i64()
        } else {
            None
        }
    }

    /// Get the numerator.
    pub fn numer(&self) -> &BigInt {
        self.0.numer()
    }

    /// Get the denominator.
    pub fn denom(&self) -> &BigInt {
        self.0.denom()
    }

    /// Returns the underlying rational number.
    pub fn as_rational(&self) -> &BigRational {
        &self.0
    }

    /// Zero fraction.
    pub fn zero() -> Self {
        Fraction(BigRational::zero())
    }

    /// One (a whole cycle).
    pub fn one() -> Self {
        Fraction(BigRational::one())
    }

    /// Check if this fraction is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// True for times before zero.
    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// True for times after zero.
    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    /// True on a cycle boundary.
    pub fn is_integer(&self) -> bool {
        self.0.is_integer()
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        Fraction(self.0.abs())
    }

    /// Little-endian 64-bit words of the numerator and denominator, with the
    /// sign folded in. Used to hash exact times.
    pub(crate) fn words(&self) -> (u64, Vec<u64>, Vec<u64>) {
        let (sign, numer) = self.0.numer().to_u64_digits();
        let (_, denom) = self.0.denom().to_u64_digits();
        let sign = match sign {
            Sign::Minus => 1,
            Sign::NoSign => 0,
            Sign::Plus => 2,
        };
        (sign, numer, denom)
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Fraction::zero()
    }
}

impl From<i64> for Fraction {
    fn from(n: i64) -> Self {
        Fraction::from_integer(n)
    }
}

impl From<i32> for Fraction {
    fn from(n: i32) -> Self {
        Fraction::from_integer(n as i64)
    }
}

impl From<f64> for Fraction {
    /// Approximate a float with the continued-fraction convergent whose
    /// denominator stays within `MAX_FLOAT_DENOMINATOR`. Decimal inputs such
    /// as `0.25` or `0.333` come back exact. NaN and infinities become zero.
    fn from(f: f64) -> Self {
        if f.is_nan() || f.is_infinite() {
            return Fraction::zero();
        }

        let negative = f < 0.0;
        let f_abs = f.abs();
        let int_part = BigInt::from_f64(f_abs.floor()).unwrap_or_default();
        let frac = f_abs - f_abs.floor();

        // Convergents h/k of the continued fraction of `frac`, seeded with
        // h(-1)/k(-1) = 1/0 and h(-2)/k(-2) = 0/1.
        let (mut h_prev, mut k_prev): (i64, i64) = (0, 1);
        let (mut h, mut k): (i64, i64) = (1, 0);
        let mut r = frac;

        let frac_value = if frac > 1e-12 {
            for _ in 0..64 {
                let a = r.floor();
                let a_int = a as i64;
                let h_next = a_int.saturating_mul(h).saturating_add(h_prev);
                let k_next = a_int.saturating_mul(k).saturating_add(k_prev);
                if k_next > MAX_FLOAT_DENOMINATOR {
                    break;
                }
                h_prev = h;
                k_prev = k;
                h = h_next;
                k = k_next;

                let rem = r - a;
                if rem < 1e-12 {
                    break;
                }
                r = 1.0 / rem;
            }
            BigRational::new(BigInt::from(h), BigInt::from(k))
        } else {
            BigRational::zero()
        };

        let value = BigRational::from_integer(int_part) + frac_value;
        Fraction(if negative { -value } else { value })
    }
}

impl From<BigRational> for Fraction {
    fn from(r: BigRational) -> Self {
        Fraction(r)
    }
}

macro_rules! forward_binop {
    ($imp:ident, $method:ident) => {
        impl $imp<Fraction> for Fraction {
            type Output = Fraction;

            fn $method(self, other: Fraction) -> Fraction {
                Fraction($imp::$method(self.0, other.0))
            }
        }

        impl<'a> $imp<&'a Fraction> for Fraction {
            type Output = Fraction;

            fn $method(self, other: &'a Fraction) -> Fraction {
                Fraction($imp::$method(self.0, &other.0))
            }
        }

        impl<'a> $imp<Fraction> for &'a Fraction {
            type Output = Fraction;

            fn $method(self, other: Fraction) -> Fraction {
                Fraction($imp::$method(&self.0, other.0))
            }
        }

        impl<'a, 'b> $imp<&'b Fraction> for &'a Fraction {
            type Output = Fraction;

            fn $method(self, other: &'b Fraction) -> Fraction {
                Fraction($imp::$method(&self.0, &other.0))
            }
        }
    };
}

forward_binop!(Add, add);
forward_binop!(Sub, sub);
forward_binop!(Mul, mul);
forward_binop!(Div, div);

impl Neg for Fraction {
    type Output = Self;

    fn neg(self) -> Self {
        Fraction(-self.0)
    }
}

impl Neg for &Fraction {
    type Output = Fraction;

    fn neg(self) -> Fraction {
        Fraction(-&self.0)
    }
}

impl std::fmt::Display for Fraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_integer() {
            write!(f, "{}", self.0.numer())
        } else {
            write!(f, "{}/{}", self.0.numer(), self.0.denom())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sam() {
        assert_eq!(Fraction::new(0, 1).sam(), Fraction::new(0, 1));
        assert_eq!(Fraction::new(1, 2).sam(), Fraction::new(0, 1));
        assert_eq!(Fraction::new(3, 2).sam(), Fraction::new(1, 1));
        assert_eq!(Fraction::new(5, 2).sam(), Fraction::new(2, 1));
        assert_eq!(Fraction::new(-1, 2).sam(), Fraction::new(-1, 1));
    }

    #[test]
    fn test_next_sam() {
        assert_eq!(Fraction::new(0, 1).next_sam(), Fraction::new(1, 1));
        assert_eq!(Fraction::new(1, 2).next_sam(), Fraction::new(1, 1));
        assert_eq!(Fraction::new(3, 2).next_sam(), Fraction::new(2, 1));
    }

    #[test]
    fn test_cycle_pos() {
        assert_eq!(Fraction::new(0, 1).cycle_pos(), Fraction::new(0, 1));
        assert_eq!(Fraction::new(1, 2).cycle_pos(), Fraction::new(1, 2));
        assert_eq!(Fraction::new(3, 2).cycle_pos(), Fraction::new(1, 2));
        assert_eq!(Fraction::new(7, 4).cycle_pos(), Fraction::new(3, 4));
        assert_eq!(Fraction::new(-1, 4).cycle_pos(), Fraction::new(3, 4));
    }

    #[test]
    fn test_arithmetic() {
        let a = Fraction::new(1, 2);
        let b = Fraction::new(1, 3);
        assert_eq!(&a + &b, Fraction::new(5, 6));
        assert_eq!(&a - &b, Fraction::new(1, 6));
        assert_eq!(&a * &b, Fraction::new(1, 6));
        assert_eq!(a / b, Fraction::new(3, 2));
    }

    #[test]
    fn test_lowest_terms() {
        assert_eq!(Fraction::new(2, 4), Fraction::new(1, 2));
        assert_eq!(Fraction::new(3, -6), Fraction::new(-1, 2));
        assert_eq!(Fraction::new(2, 4).denom(), &BigInt::from(2));
    }

    #[test]
    fn test_no_overflow_in_deep_nesting() {
        let third = Fraction::new(1, 3);
        let mut t = Fraction::one();
        for _ in 0..80 {
            t = t * &third;
        }
        for _ in 0..80 {
            t = t / &third;
        }
        assert_eq!(t, Fraction::one());
    }

    #[test]
    fn test_cycle_mod_floor() {
        assert_eq!(Fraction::new(5, 2).cycle_mod(2), 0);
        assert_eq!(Fraction::new(7, 2).cycle_mod(2), 1);
        assert_eq!(Fraction::new(-1, 2).cycle_mod(3), 2);
        assert_eq!(Fraction::one().cycle_mod(0), 0);
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(Fraction::parse_decimal("3"), Some(Fraction::from_integer(3)));
        assert_eq!(Fraction::parse_decimal("0.25"), Some(Fraction::new(1, 4)));
        assert_eq!(Fraction::parse_decimal("-1.5"), Some(Fraction::new(-3, 2)));
        assert_eq!(Fraction::parse_decimal("0.333"), Some(Fraction::new(333, 1000)));
        assert_eq!(Fraction::parse_decimal("1."), None);
        assert_eq!(Fraction::parse_decimal(".5"), None);
        assert_eq!(Fraction::parse_decimal("1.2.3"), None);
        assert_eq!(Fraction::parse_decimal("x"), None);
    }

    #[test]
    fn test_from_f64() {
        assert_eq!(Fraction::from(0.5), Fraction::new(1, 2));
        assert_eq!(Fraction::from(0.1), Fraction::new(1, 10));
        assert_eq!(Fraction::from(0.333), Fraction::new(333, 1000));
        assert_eq!(Fraction::from(-2.75), Fraction::new(-11, 4));
        assert_eq!(Fraction::from(3.0), Fraction::from_integer(3));
        assert_eq!(Fraction::from(f64::NAN), Fraction::zero());
        assert_eq!(Fraction::from(1.5), Fraction::new(3, 2));
        assert_eq!(Fraction::from(2.0 / 3.0), Fraction::new(2, 3));
        assert_eq!(Fraction::from(0.0), Fraction::zero());
    }

    #[test]
    fn test_from_f64_large_magnitude() {
        let big = Fraction::from(1e20);
        assert_eq!(big.to_string(), "100000000000000000000");
        assert!(Fraction::from(-1e20).is_negative());
    }

    #[test]
    fn test_display() {
        assert_eq!(Fraction::new(3, 4).to_string(), "3/4");
        assert_eq!(Fraction::from_integer(2).to_string(), "2");
    }
}
