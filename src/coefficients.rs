//! Linear forms over the variables of an octagon state.
//!
//! A [`Coefficients`] value describes `c_0·x_0 + … + c_{n-1}·x_{n-1} + c_n` against a
//! state with `n` variables: the last entry is the constant term. There are three
//! shapes:
//!
//! - [`Coefficients::Simple`]: every `c_i` is an exact integer;
//! - [`Coefficients::Interval`]: every `c_i` is an interval `[l, h]`, either end possibly infinite;
//! - [`Coefficients::Empty`]: the expression could not be expressed as a linear form.
//!
//! Mixing simple and interval operands always yields an interval result, and any
//! operation involving `Empty` yields `Empty`.
//!
//! Comparison operators are three-valued: they produce the constant `1` or `0` only
//! when both operands are constant and the answer is the same for every value in
//! their ranges, and `Empty` otherwise.

use std::fmt;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};

use crate::bound::{rem_trunc, Bound, Interval};

/// Exact linear form; `values.len() == size + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SimpleCoefficients {
    values: Vec<BigInt>,
}

impl SimpleCoefficients {
    pub fn new(values: Vec<BigInt>) -> Self {
        assert!(!values.is_empty(), "coefficients need a constant slot");
        SimpleCoefficients { values }
    }

    pub fn size(&self) -> usize {
        self.values.len() - 1
    }

    pub fn values(&self) -> &[BigInt] {
        &self.values
    }

    pub fn constant(&self) -> &BigInt {
        &self.values[self.size()]
    }

    fn to_interval(&self) -> IntervalCoefficients {
        IntervalCoefficients {
            values: self.values.iter().map(|v| Interval::constant(v.clone())).collect(),
        }
    }
}

/// Linear form with interval coefficients; `values.len() == size + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntervalCoefficients {
    values: Vec<Interval>,
}

impl IntervalCoefficients {
    pub fn new(values: Vec<Interval>) -> Self {
        assert!(!values.is_empty(), "coefficients need a constant slot");
        IntervalCoefficients { values }
    }

    pub fn size(&self) -> usize {
        self.values.len() - 1
    }

    pub fn values(&self) -> &[Interval] {
        &self.values
    }

    pub fn constant(&self) -> &Interval {
        &self.values[self.size()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Coefficients {
    Simple(SimpleCoefficients),
    Interval(IntervalCoefficients),
    /// "Cannot compute": the expression has no linear form.
    Empty,
}

impl Coefficients {
    /// The constant `value` over `size` variables.
    pub fn constant(size: usize, value: impl Into<BigInt>) -> Self {
        let mut values = vec![BigInt::zero(); size + 1];
        values[size] = value.into();
        Coefficients::Simple(SimpleCoefficients { values })
    }

    /// A constant known only to lie in `range`.
    pub fn interval(size: usize, range: Interval) -> Self {
        let mut values = vec![Interval::zero(); size + 1];
        values[size] = range;
        Coefficients::Interval(IntervalCoefficients { values })
    }

    /// The single variable at slot `index`.
    pub fn variable(size: usize, index: usize) -> Self {
        assert!(index < size, "variable slot {} out of {}", index, size);
        let mut values = vec![BigInt::zero(); size + 1];
        values[index] = BigInt::one();
        Coefficients::Simple(SimpleCoefficients { values })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Coefficients::Empty)
    }

    /// Number of variables, `None` for `Empty`.
    pub fn size(&self) -> Option<usize> {
        match self {
            Coefficients::Simple(c) => Some(c.size()),
            Coefficients::Interval(c) => Some(c.size()),
            Coefficients::Empty => None,
        }
    }

    /// `true` iff every variable coefficient is zero.
    pub fn has_only_constant_value(&self) -> bool {
        match self {
            Coefficients::Simple(c) => c.values[..c.size()].iter().all(Zero::is_zero),
            Coefficients::Interval(c) => c.values[..c.size()].iter().all(Interval::is_zero),
            Coefficients::Empty => false,
        }
    }

    /// Range of the constant term.
    pub fn constant_range(&self) -> Option<Interval> {
        match self {
            Coefficients::Simple(c) => Some(Interval::constant(c.constant().clone())),
            Coefficients::Interval(c) => Some(c.constant().clone()),
            Coefficients::Empty => None,
        }
    }

    /// The exact value of a constant-only, singleton form.
    pub fn as_constant(&self) -> Option<BigInt> {
        if !self.has_only_constant_value() {
            return None;
        }
        self.constant_range()?.as_constant().cloned()
    }

    /// Every entry as an interval, the constant last.
    pub fn to_intervals(&self) -> Option<Vec<Interval>> {
        match self {
            Coefficients::Simple(c) => Some(c.to_interval().values),
            Coefficients::Interval(c) => Some(c.values.clone()),
            Coefficients::Empty => None,
        }
    }

    fn check_size(&self, other: &Coefficients) {
        if let (Some(a), Some(b)) = (self.size(), other.size()) {
            assert_eq!(a, b, "different size of coefficients");
        }
    }

    fn zip_intervals<F>(&self, other: &Coefficients, f: F) -> Coefficients
    where
        F: Fn(&Interval, &Interval) -> Interval,
    {
        match (self.to_intervals(), other.to_intervals()) {
            (Some(a), Some(b)) => Coefficients::Interval(IntervalCoefficients {
                values: a.iter().zip(&b).map(|(x, y)| f(x, y)).collect(),
            }),
            _ => Coefficients::Empty,
        }
    }

    fn map_intervals<F>(&self, f: F) -> Coefficients
    where
        F: Fn(&Interval) -> Interval,
    {
        match self.to_intervals() {
            Some(values) => Coefficients::Interval(IntervalCoefficients {
                values: values.iter().map(f).collect(),
            }),
            None => Coefficients::Empty,
        }
    }

    pub fn add(&self, other: &Coefficients) -> Coefficients {
        self.check_size(other);
        match (self, other) {
            (Coefficients::Simple(a), Coefficients::Simple(b)) => Coefficients::Simple(SimpleCoefficients {
                values: a.values.iter().zip(&b.values).map(|(x, y)| x + y).collect(),
            }),
            _ => self.zip_intervals(other, Interval::add),
        }
    }

    pub fn sub(&self, other: &Coefficients) -> Coefficients {
        self.check_size(other);
        match (self, other) {
            (Coefficients::Simple(a), Coefficients::Simple(b)) => Coefficients::Simple(SimpleCoefficients {
                values: a.values.iter().zip(&b.values).map(|(x, y)| x - y).collect(),
            }),
            _ => self.zip_intervals(other, Interval::sub),
        }
    }

    pub fn neg(&self) -> Coefficients {
        self.mul_scalar(&BigInt::from(-1))
    }

    pub fn mul_scalar(&self, k: &BigInt) -> Coefficients {
        match self {
            Coefficients::Simple(a) => Coefficients::Simple(SimpleCoefficients {
                values: a.values.iter().map(|x| x * k).collect(),
            }),
            _ => self.map_intervals(|x| x.mul_scalar(k)),
        }
    }

    /// Product of two forms; linear only when one side is constant.
    pub fn mul(&self, other: &Coefficients) -> Coefficients {
        self.check_size(other);
        if self.is_empty() || other.is_empty() {
            return Coefficients::Empty;
        }
        if let Some(k) = other.as_constant() {
            return self.mul_scalar(&k);
        }
        if let Some(k) = self.as_constant() {
            return other.mul_scalar(&k);
        }
        if other.has_only_constant_value() {
            let Some(range) = other.constant_range() else {
                return Coefficients::Empty;
            };
            return self.map_intervals(|x| x.mul(&range));
        }
        if self.has_only_constant_value() {
            return other.mul(self);
        }
        Coefficients::Empty
    }

    /// Truncating division by a constant.
    ///
    /// Exact when every entry is divisible by `k`. When only the variable entries are,
    /// the rounding of the constant is absorbed into an interval.
    pub fn div_scalar(&self, k: &BigInt) -> Coefficients {
        if k.is_zero() {
            return Coefficients::Empty;
        }
        match self {
            Coefficients::Simple(a) => {
                let size = a.size();
                if a.values[..size].iter().all(|x| x.is_multiple_of(k)) {
                    if a.constant().is_multiple_of(k) || self.has_only_constant_value() {
                        return Coefficients::Simple(SimpleCoefficients {
                            values: a.values.iter().map(|x| x / k).collect(),
                        });
                    }
                    let c = a.constant();
                    let range = Interval::range(c.div_floor(k), -(-c).div_floor(k));
                    let mut values: Vec<Interval> =
                        a.values[..size].iter().map(|x| Interval::constant(x / k)).collect();
                    values.push(range);
                    return Coefficients::Interval(IntervalCoefficients { values });
                }
                Coefficients::Empty
            }
            Coefficients::Interval(_) if self.has_only_constant_value() => {
                match self.constant_range().and_then(|c| c.div(&Interval::constant(k.clone()))) {
                    Some(range) => self.with_constant(range),
                    None => Coefficients::Empty,
                }
            }
            _ => Coefficients::Empty,
        }
    }

    /// Division by another form; only defined for constant divisors.
    pub fn div(&self, other: &Coefficients) -> Coefficients {
        self.check_size(other);
        if self.is_empty() || other.is_empty() {
            return Coefficients::Empty;
        }
        if let Some(k) = other.as_constant() {
            return self.div_scalar(&k);
        }
        if self.has_only_constant_value() && other.has_only_constant_value() {
            let (Some(a), Some(b)) = (self.constant_range(), other.constant_range()) else {
                return Coefficients::Empty;
            };
            return match a.div(&b) {
                Some(range) => self.with_constant(range),
                None => Coefficients::Empty,
            };
        }
        Coefficients::Empty
    }

    /// Truncating remainder of two exact constants.
    pub fn modulo(&self, other: &Coefficients) -> Coefficients {
        self.constant_op(other, |a, b| rem_trunc(a, b))
    }

    pub fn bin_and(&self, other: &Coefficients) -> Coefficients {
        self.constant_op(other, |a, b| Some(a & b))
    }

    pub fn bin_or(&self, other: &Coefficients) -> Coefficients {
        self.constant_op(other, |a, b| Some(a | b))
    }

    pub fn bin_xor(&self, other: &Coefficients) -> Coefficients {
        self.constant_op(other, |a, b| Some(a ^ b))
    }

    pub fn shift_left(&self, other: &Coefficients) -> Coefficients {
        self.constant_op(other, |a, b| {
            let shift = b.to_u32().filter(|&s| s < 128)?;
            Some(a << shift)
        })
    }

    pub fn shift_right(&self, other: &Coefficients) -> Coefficients {
        self.constant_op(other, |a, b| {
            let shift = b.to_u32().filter(|&s| s < 128)?;
            Some(a >> shift)
        })
    }

    fn constant_op<F>(&self, other: &Coefficients, f: F) -> Coefficients
    where
        F: Fn(&BigInt, &BigInt) -> Option<BigInt>,
    {
        self.check_size(other);
        match (self.as_constant(), other.as_constant(), self.size()) {
            (Some(a), Some(b), Some(size)) => match f(&a, &b) {
                Some(value) => Coefficients::constant(size, value),
                None => Coefficients::Empty,
            },
            _ => Coefficients::Empty,
        }
    }

    fn with_constant(&self, range: Interval) -> Coefficients {
        match self.size() {
            Some(size) => match range.as_constant() {
                Some(c) => Coefficients::constant(size, c.clone()),
                None => Coefficients::interval(size, range),
            },
            None => Coefficients::Empty,
        }
    }

    fn truth(&self, value: Option<bool>) -> Coefficients {
        match (value, self.size()) {
            (Some(v), Some(size)) => Coefficients::constant(size, if v { 1 } else { 0 }),
            _ => Coefficients::Empty,
        }
    }

    fn compare<F>(&self, other: &Coefficients, decide: F) -> Coefficients
    where
        F: Fn(&Interval, &Interval) -> Option<bool>,
    {
        self.check_size(other);
        if !self.has_only_constant_value() || !other.has_only_constant_value() {
            return Coefficients::Empty;
        }
        match (self.constant_range(), other.constant_range()) {
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => self.truth(decide(&a, &b)),
            _ => Coefficients::Empty,
        }
    }

    /// Logical negation of a constant: `1` for zero, `0` for a range excluding zero.
    pub fn not(&self) -> Coefficients {
        if !self.has_only_constant_value() {
            return Coefficients::Empty;
        }
        let Some(range) = self.constant_range() else {
            return Coefficients::Empty;
        };
        if range.is_zero() {
            self.truth(Some(true))
        } else if !range.contains_zero() {
            self.truth(Some(false))
        } else {
            Coefficients::Empty
        }
    }

    pub fn smaller(&self, other: &Coefficients) -> Coefficients {
        self.compare(other, |a, b| {
            if a.high < b.low {
                Some(true)
            } else if a.low >= b.high {
                Some(false)
            } else {
                None
            }
        })
    }

    pub fn smaller_eq(&self, other: &Coefficients) -> Coefficients {
        self.compare(other, |a, b| {
            if a.high <= b.low {
                Some(true)
            } else if a.low > b.high {
                Some(false)
            } else {
                None
            }
        })
    }

    pub fn greater(&self, other: &Coefficients) -> Coefficients {
        other.smaller(self)
    }

    pub fn greater_eq(&self, other: &Coefficients) -> Coefficients {
        other.smaller_eq(self)
    }

    pub fn eq(&self, other: &Coefficients) -> Coefficients {
        self.compare(other, |a, b| match (a.as_constant(), b.as_constant()) {
            (Some(x), Some(y)) if x == y => Some(true),
            _ if a.meet(b).is_empty() => Some(false),
            _ => None,
        })
    }

    pub fn ineq(&self, other: &Coefficients) -> Coefficients {
        match self.eq(other) {
            Coefficients::Empty => Coefficients::Empty,
            equal => equal.not(),
        }
    }

    /// Resizes a constant-only form to `size` variables.
    ///
    /// # Panics
    ///
    /// Panics if the form has a non-zero variable coefficient.
    pub fn fit_to_size(&self, size: usize) -> Coefficients {
        match self {
            Coefficients::Empty => Coefficients::Empty,
            _ => {
                assert!(
                    self.has_only_constant_value(),
                    "changing size is only possible for constant-only coefficients"
                );
                match self {
                    Coefficients::Simple(c) => Coefficients::constant(size, c.constant().clone()),
                    Coefficients::Interval(c) => Coefficients::interval(size, c.constant().clone()),
                    Coefficients::Empty => Coefficients::Empty,
                }
            }
        }
    }

    /// Grows the form to `size` variables; new variables are appended with coefficient zero.
    ///
    /// # Panics
    ///
    /// Panics if `size` is smaller than the current size.
    pub fn expand_to_size(&self, size: usize) -> Coefficients {
        match self {
            Coefficients::Simple(c) => {
                assert!(size >= c.size(), "cannot shrink coefficients from {} to {}", c.size(), size);
                let mut values = c.values[..c.size()].to_vec();
                values.resize(size, BigInt::zero());
                values.push(c.constant().clone());
                Coefficients::Simple(SimpleCoefficients { values })
            }
            Coefficients::Interval(c) => {
                assert!(size >= c.size(), "cannot shrink coefficients from {} to {}", c.size(), size);
                let mut values = c.values[..c.size()].to_vec();
                values.resize(size, Interval::zero());
                values.push(c.constant().clone());
                Coefficients::Interval(IntervalCoefficients { values })
            }
            Coefficients::Empty => Coefficients::Empty,
        }
    }

    /// Slots with a non-zero coefficient.
    pub fn variables(&self) -> Vec<usize> {
        match self {
            Coefficients::Simple(c) => (0..c.size()).filter(|&i| !c.values[i].is_zero()).collect(),
            Coefficients::Interval(c) => (0..c.size()).filter(|&i| !c.values[i].is_zero()).collect(),
            Coefficients::Empty => Vec::new(),
        }
    }
}

impl fmt::Display for Coefficients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = match self {
            Coefficients::Simple(c) => c.values.iter().map(|v| v.to_string()).collect(),
            Coefficients::Interval(c) => c.values.iter().map(|v| v.to_string()).collect(),
            Coefficients::Empty => return write!(f, "<cannot compute>"),
        };
        write!(f, "[{}]", entries.join(", "))
    }
}

/// Unbounded constant, used when nothing is known about a value.
pub fn unknown(size: usize) -> Coefficients {
    Coefficients::interval(size, Interval::new(Bound::NegInf, Bound::PosInf))
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn c(size: usize, value: i64) -> Coefficients {
        Coefficients::constant(size, value)
    }

    fn is_true(coefficients: &Coefficients) -> bool {
        coefficients.as_constant().is_some_and(|c| c.is_one())
    }

    fn is_false(coefficients: &Coefficients) -> bool {
        coefficients.as_constant().is_some_and(|c| c.is_zero())
    }

    #[test]
    fn test_add_sub_simple() {
        let x = Coefficients::variable(2, 0);
        let y = Coefficients::variable(2, 1);
        let sum = x.add(&y).add(&c(2, 3));
        assert_eq!(sum, Coefficients::Simple(SimpleCoefficients::new(vec![1.into(), 1.into(), 3.into()])));
        let diff = sum.sub(&y);
        assert_eq!(diff, Coefficients::Simple(SimpleCoefficients::new(vec![1.into(), 0.into(), 3.into()])));
    }

    #[test]
    fn test_mixed_operands_widen_to_interval() {
        let x = Coefficients::variable(1, 0);
        let r = Coefficients::interval(1, Interval::range(0, 4));
        let sum = x.add(&r);
        assert!(matches!(sum, Coefficients::Interval(_)));
        assert_eq!(sum.constant_range(), Some(Interval::range(0, 4)));
        assert_eq!(sum.variables(), vec![0]);
    }

    #[test]
    fn test_mul() {
        let x = Coefficients::variable(2, 0);
        let y = Coefficients::variable(2, 1);
        assert!(x.mul(&y).is_empty());
        let three_x = x.mul(&c(2, 3));
        assert_eq!(three_x, Coefficients::Simple(SimpleCoefficients::new(vec![3.into(), 0.into(), 0.into()])));
        assert_eq!(c(2, 3).mul(&c(2, -2)).as_constant(), Some(BigInt::from(-6)));
    }

    #[test]
    fn test_div() {
        assert!(c(1, 7).div(&c(1, 0)).is_empty());
        assert_eq!(c(1, 7).div(&c(1, 2)).as_constant(), Some(BigInt::from(3)));
        assert_eq!(c(1, -7).div(&c(1, 2)).as_constant(), Some(BigInt::from(-3)));

        let x = Coefficients::variable(1, 0);
        let two_x_plus_four = x.mul_scalar(&BigInt::from(2)).add(&c(1, 4));
        let half = two_x_plus_four.div(&c(1, 2));
        assert_eq!(half, x.add(&c(1, 2)));

        let two_x_plus_one = x.mul_scalar(&BigInt::from(2)).add(&c(1, 1));
        let rounded = two_x_plus_one.div(&c(1, 2));
        assert_eq!(rounded.constant_range(), Some(Interval::range(0, 1)));

        assert!(x.div(&c(1, 2)).is_empty());
        assert!(x.div(&x).is_empty());
    }

    #[test]
    fn test_constant_bit_operations() {
        assert_eq!(c(0, 6).bin_and(&c(0, 3)).as_constant(), Some(BigInt::from(2)));
        assert_eq!(c(0, 6).bin_or(&c(0, 3)).as_constant(), Some(BigInt::from(7)));
        assert_eq!(c(0, 6).bin_xor(&c(0, 3)).as_constant(), Some(BigInt::from(5)));
        assert_eq!(c(0, 1).shift_left(&c(0, 4)).as_constant(), Some(BigInt::from(16)));
        assert_eq!(c(0, -7).modulo(&c(0, 3)).as_constant(), Some(BigInt::from(-1)));
        assert!(c(0, 1).modulo(&c(0, 0)).is_empty());
    }

    #[test]
    fn test_comparisons_on_constants() {
        assert!(is_true(&c(0, 3).smaller(&c(0, 4))));
        assert!(is_false(&c(0, 4).smaller(&c(0, 4))));
        assert!(is_true(&c(0, 4).smaller_eq(&c(0, 4))));
        assert!(is_true(&c(0, 5).greater(&c(0, 4))));
        assert!(is_true(&c(0, 4).greater_eq(&c(0, 4))));
        assert!(is_true(&c(0, 4).eq(&c(0, 4))));
        assert!(is_true(&c(0, 4).ineq(&c(0, 5))));
        assert!(is_false(&c(0, 4).ineq(&c(0, 4))));
    }

    #[test]
    fn test_comparisons_on_ranges() {
        let low = Coefficients::interval(0, Interval::range(0, 3));
        let high = Coefficients::interval(0, Interval::range(5, 9));
        assert!(is_true(&low.smaller(&high)));
        assert!(is_false(&low.greater(&high)));
        assert!(is_false(&low.eq(&high)));

        let overlapping = Coefficients::interval(0, Interval::range(2, 6));
        assert!(low.smaller(&overlapping).is_empty());
        assert!(low.eq(&overlapping).is_empty());
    }

    #[test]
    fn test_comparisons_on_unbounded_ranges() {
        let top = unknown(0);
        assert!(top.smaller(&top).is_empty());
        assert!(top.smaller_eq(&top).is_empty());
        assert!(top.eq(&top).is_empty());
        assert!(top.ineq(&top).is_empty());
    }

    #[test]
    fn test_comparisons_with_variables_are_undecided() {
        let x = Coefficients::variable(1, 0);
        assert!(x.smaller(&c(1, 4)).is_empty());
        assert!(x.eq(&x).is_empty());
    }

    #[test]
    fn test_not() {
        assert!(is_true(&c(0, 0).not()));
        assert!(is_false(&c(0, 7).not()));
        assert!(is_false(&Coefficients::interval(0, Interval::range(1, 5)).not()));
        assert!(Coefficients::interval(0, Interval::range(-1, 1)).not().is_empty());
    }

    #[test]
    fn test_resize() {
        let k = c(2, 9);
        assert_eq!(k.fit_to_size(4).expand_to_size(4), k.fit_to_size(4));
        assert_eq!(k.fit_to_size(0).size(), Some(0));

        let x = Coefficients::variable(2, 1).add(&c(2, 1));
        let grown = x.expand_to_size(3);
        assert_eq!(grown.size(), Some(3));
        assert_eq!(grown.variables(), vec![1]);
        assert_eq!(grown.constant_range(), Some(Interval::constant(1)));
    }

    #[test]
    #[should_panic]
    fn test_fit_to_size_rejects_variables() {
        Coefficients::variable(2, 0).fit_to_size(3);
    }

    #[test]
    #[should_panic]
    fn test_size_mismatch_panics() {
        c(1, 1).add(&c(2, 1));
    }

    #[test]
    fn test_empty_short_circuits() {
        let e = Coefficients::Empty;
        assert!(e.add(&c(1, 1)).is_empty());
        assert!(c(1, 1).mul(&e).is_empty());
        assert!(e.smaller(&c(1, 1)).is_empty());
        assert!(e.not().is_empty());
    }
}
