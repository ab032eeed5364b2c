//! Extended integers and intervals over exact big integers.
//!
//! Octagon bounds and coefficient ranges never overflow: every finite value is a
//! [`BigInt`], and the two infinities are explicit variants.

use std::cmp::{max, min};
use std::fmt;
use std::ops::Neg;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, Zero};

/// Bound of an interval: -∞, finite value, or +∞.
///
/// The derived order places `NegInf < Finite(_) < PosInf`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bound {
    NegInf,
    Finite(BigInt),
    PosInf,
}

impl Bound {
    pub fn zero() -> Self {
        Bound::Finite(BigInt::zero())
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, Bound::Finite(_))
    }

    pub fn is_infinite(&self) -> bool {
        !self.is_finite()
    }

    pub fn as_finite(&self) -> Option<&BigInt> {
        match self {
            Bound::Finite(n) => Some(n),
            _ => None,
        }
    }

    /// Sum of two bounds.
    ///
    /// `-∞ + +∞` is undefined; callers computing upper bounds get `+∞`, which is the
    /// sound answer for every use in this crate (upper bounds of DBM entries).
    pub fn add(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a + b),
            (Bound::NegInf, Bound::PosInf) | (Bound::PosInf, Bound::NegInf) => Bound::PosInf,
            (Bound::NegInf, _) | (_, Bound::NegInf) => Bound::NegInf,
            (Bound::PosInf, _) | (_, Bound::PosInf) => Bound::PosInf,
        }
    }

    /// Sum used for lower bounds: `-∞ + +∞` yields `-∞`.
    pub fn add_lower(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::NegInf, Bound::PosInf) | (Bound::PosInf, Bound::NegInf) => Bound::NegInf,
            _ => self.add(other),
        }
    }

    pub fn sub(&self, other: &Bound) -> Bound {
        self.add(&other.clone().neg())
    }

    pub fn mul(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a * b),
            (Bound::Finite(z), _) | (_, Bound::Finite(z)) if z.is_zero() => Bound::zero(),
            (Bound::Finite(a), inf) | (inf, Bound::Finite(a)) => {
                if a.is_negative() {
                    inf.clone().neg()
                } else {
                    inf.clone()
                }
            }
            (Bound::NegInf, Bound::NegInf) | (Bound::PosInf, Bound::PosInf) => Bound::PosInf,
            _ => Bound::NegInf,
        }
    }

    pub fn mul_scalar(&self, k: &BigInt) -> Bound {
        self.mul(&Bound::Finite(k.clone()))
    }

    /// `floor(self / 2)`, used when halving upper bounds of integer variables.
    pub fn half_floor(&self) -> Bound {
        match self {
            Bound::Finite(n) => Bound::Finite(n.div_floor(&BigInt::from(2))),
            other => other.clone(),
        }
    }

    /// `ceil(self / 2)`, the sound halving of an upper bound over the reals.
    pub fn half_ceil(&self) -> Bound {
        match self {
            Bound::Finite(n) => Bound::Finite(-((-n).div_floor(&BigInt::from(2)))),
            other => other.clone(),
        }
    }

    /// Rounds an upper bound down to the nearest even value.
    pub fn floor_even(&self) -> Bound {
        match self {
            Bound::Finite(n) => Bound::Finite(n.div_floor(&BigInt::from(2)) * 2),
            other => other.clone(),
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Bound::NegInf => true,
            Bound::Finite(n) => n.is_negative(),
            Bound::PosInf => false,
        }
    }
}

impl Neg for Bound {
    type Output = Bound;

    fn neg(self) -> Bound {
        match self {
            Bound::NegInf => Bound::PosInf,
            Bound::Finite(n) => Bound::Finite(-n),
            Bound::PosInf => Bound::NegInf,
        }
    }
}

impl From<i64> for Bound {
    fn from(value: i64) -> Self {
        Bound::Finite(BigInt::from(value))
    }
}

impl From<BigInt> for Bound {
    fn from(value: BigInt) -> Self {
        Bound::Finite(value)
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::NegInf => write!(f, "-∞"),
            Bound::Finite(n) => write!(f, "{}", n),
            Bound::PosInf => write!(f, "+∞"),
        }
    }
}

/// Interval: [low, high].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    pub low: Bound,
    pub high: Bound,
}

impl Interval {
    pub fn new(low: Bound, high: Bound) -> Self {
        if low > high {
            Self::bottom()
        } else {
            Self { low, high }
        }
    }

    pub fn constant(value: impl Into<BigInt>) -> Self {
        let value = value.into();
        Self {
            low: Bound::Finite(value.clone()),
            high: Bound::Finite(value),
        }
    }

    pub fn range(low: impl Into<BigInt>, high: impl Into<BigInt>) -> Self {
        Self::new(Bound::Finite(low.into()), Bound::Finite(high.into()))
    }

    pub fn zero() -> Self {
        Self::constant(0)
    }

    pub fn top() -> Self {
        Self {
            low: Bound::NegInf,
            high: Bound::PosInf,
        }
    }

    pub fn bottom() -> Self {
        Self {
            low: Bound::PosInf,
            high: Bound::NegInf,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.low > self.high
    }

    pub fn is_top(&self) -> bool {
        self.low == Bound::NegInf && self.high == Bound::PosInf
    }

    /// The single value of a singleton interval.
    pub fn as_constant(&self) -> Option<&BigInt> {
        match (&self.low, &self.high) {
            (Bound::Finite(l), Bound::Finite(h)) if l == h => Some(l),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_constant().is_some_and(|c| c.is_zero())
    }

    pub fn contains(&self, value: &BigInt) -> bool {
        let value = Bound::Finite(value.clone());
        self.low <= value && value <= self.high
    }

    pub fn contains_zero(&self) -> bool {
        self.contains(&BigInt::zero())
    }

    pub fn is_within(&self, other: &Interval) -> bool {
        self.is_empty() || (other.low <= self.low && self.high <= other.high)
    }

    pub fn join(&self, other: &Interval) -> Interval {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        Interval {
            low: min(self.low.clone(), other.low.clone()),
            high: max(self.high.clone(), other.high.clone()),
        }
    }

    pub fn meet(&self, other: &Interval) -> Interval {
        Interval::new(
            max(self.low.clone(), other.low.clone()),
            min(self.high.clone(), other.high.clone()),
        )
    }

    pub fn add(&self, other: &Interval) -> Interval {
        if self.is_empty() || other.is_empty() {
            return Interval::bottom();
        }
        Interval::new(self.low.add_lower(&other.low), self.high.add(&other.high))
    }

    pub fn neg(&self) -> Interval {
        if self.is_empty() {
            return Interval::bottom();
        }
        Interval::new(self.high.clone().neg(), self.low.clone().neg())
    }

    pub fn sub(&self, other: &Interval) -> Interval {
        self.add(&other.neg())
    }

    pub fn mul(&self, other: &Interval) -> Interval {
        if self.is_empty() || other.is_empty() {
            return Interval::bottom();
        }
        let corners = [
            self.low.mul(&other.low),
            self.low.mul(&other.high),
            self.high.mul(&other.low),
            self.high.mul(&other.high),
        ];
        let low = corners.iter().min().cloned().unwrap_or(Bound::NegInf);
        let high = corners.iter().max().cloned().unwrap_or(Bound::PosInf);
        Interval::new(low, high)
    }

    pub fn mul_scalar(&self, k: &BigInt) -> Interval {
        self.mul(&Interval::constant(k.clone()))
    }

    /// Truncating division (C semantics) by an interval that excludes zero.
    ///
    /// Returns `None` when the divisor may be zero.
    pub fn div(&self, other: &Interval) -> Option<Interval> {
        if other.contains_zero() {
            return None;
        }
        if self.is_empty() || other.is_empty() {
            return Some(Interval::bottom());
        }
        let corners = [
            div_trunc(&self.low, &other.low),
            div_trunc(&self.low, &other.high),
            div_trunc(&self.high, &other.low),
            div_trunc(&self.high, &other.high),
        ];
        let low = corners.iter().min().cloned().unwrap_or(Bound::NegInf);
        let high = corners.iter().max().cloned().unwrap_or(Bound::PosInf);
        Some(Interval::new(low, high))
    }

    /// Rounds both ends outward to the enclosing integers.
    pub fn from_f64(low: f64, high: f64) -> Interval {
        Interval::new(bound_from_f64(low.floor()), bound_from_f64(high.ceil()))
    }
}

fn bound_from_f64(value: f64) -> Bound {
    if value.is_nan() {
        return Bound::PosInf;
    }
    if value == f64::INFINITY {
        return Bound::PosInf;
    }
    if value == f64::NEG_INFINITY {
        return Bound::NegInf;
    }
    // Exact for every integral double: go through the decimal representation.
    match format!("{:.0}", value).parse::<BigInt>() {
        Ok(n) => Bound::Finite(n),
        Err(_) => {
            if value < 0.0 {
                Bound::NegInf
            } else {
                Bound::PosInf
            }
        }
    }
}

fn div_trunc(a: &Bound, b: &Bound) -> Bound {
    match (a, b) {
        (Bound::Finite(x), Bound::Finite(y)) => Bound::Finite(x / y),
        (Bound::Finite(_), _) => Bound::zero(),
        (inf, Bound::Finite(y)) => {
            if y.is_negative() {
                inf.clone().neg()
            } else {
                inf.clone()
            }
        }
        (Bound::PosInf, Bound::PosInf) | (Bound::NegInf, Bound::NegInf) => Bound::PosInf,
        _ => Bound::NegInf,
    }
}

/// Truncating remainder of two constants (C semantics), `None` on a zero divisor.
pub fn rem_trunc(a: &BigInt, b: &BigInt) -> Option<BigInt> {
    if b.is_zero() {
        None
    } else {
        Some(a % b)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "⊥")
        } else {
            write!(f, "[{}, {}]", self.low, self.high)
        }
    }
}
