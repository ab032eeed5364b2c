//! Octagons as closed difference-bound matrices.
//!
//! An octagon over `n` variables is stored as a `2n × 2n` matrix `m` over the nodes
//! `v_{2i} = +x_i` and `v_{2i+1} = -x_i`. The entry `m[a][b]` is an upper bound of
//! `v_a - v_b`, so every octagonal constraint `±x_i ± x_j ≤ c` lands in one entry and
//! its coherent twin `m[bar b][bar a]`.
//!
//! # Closure
//!
//! Every public mutator leaves the matrix in *tightly closed* form:
//!
//! 1. Floyd–Warshall shortest paths over all `2n` nodes;
//! 2. integer tightening of unary entries `m[2i][2i+1]` for integer variables
//!    (a bound on `2x` is rounded down to the nearest even value);
//! 3. strengthening `m[a][b] ≤ ⌈(m[a][bar a] + m[bar b][b]) / 2⌉`.
//!
//! A closed matrix is empty iff some diagonal entry went negative; the octagon then
//! turns into bottom and stays there.
//!
//! # Example
//!
//! ```rust
//! use octagon_rs::octagon::{Constraint, Octagon, Term};
//! use octagon_rs::types::VarIndex;
//!
//! let x = VarIndex::new(0);
//! let y = VarIndex::new(1);
//! let mut oct = Octagon::universe(2);
//!
//! // x - y <= 3 and y <= 10
//! oct.add_constraint(&Constraint::binary(Term::pos(x), Term::neg(y), 3));
//! oct.add_constraint(&Constraint::unary(Term::pos(y), 10));
//!
//! // closure derives x <= 13
//! assert_eq!(oct.bounds(x).high, 13.into());
//! ```

use std::fmt;

use log::trace;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};

use crate::bound::{Bound, Interval};
use crate::types::{bar, NumericKind, VarIndex};

/// Signed occurrence of a variable: `+x` or `-x`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Term {
    pub var: VarIndex,
    pub positive: bool,
}

impl Term {
    pub fn pos(var: VarIndex) -> Self {
        Term { var, positive: true }
    }

    pub fn neg(var: VarIndex) -> Self {
        Term { var, positive: false }
    }

    /// DBM node of this term.
    pub fn node(self) -> usize {
        self.var.node(self.positive)
    }

    fn from_node(node: usize) -> Self {
        Term {
            var: VarIndex::new(node / 2),
            positive: node % 2 == 0,
        }
    }
}

/// Octagonal constraint `first + second ≤ bound` (or `first ≤ bound` when unary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub first: Term,
    pub second: Option<Term>,
    pub bound: BigInt,
}

impl Constraint {
    pub fn unary(term: Term, bound: impl Into<BigInt>) -> Self {
        Constraint {
            first: term,
            second: None,
            bound: bound.into(),
        }
    }

    pub fn binary(first: Term, second: Term, bound: impl Into<BigInt>) -> Self {
        Constraint {
            first,
            second: Some(second),
            bound: bound.into(),
        }
    }

    /// Renders the constraint with the given variable names.
    pub fn render<F>(&self, name: F) -> String
    where
        F: Fn(VarIndex) -> String,
    {
        match self.second {
            None if self.first.positive => format!("{} <= {}", name(self.first.var), self.bound),
            None => format!("{} >= {}", name(self.first.var), -&self.bound),
            Some(second) => {
                let sign = if self.first.positive { "" } else { "-" };
                let op = if second.positive { "+" } else { "-" };
                format!(
                    "{}{} {} {} <= {}",
                    sign,
                    name(self.first.var),
                    op,
                    name(second.var),
                    self.bound
                )
            }
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(|v| v.to_string()))
    }
}

/// Tightly closed octagon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Octagon {
    kinds: Vec<NumericKind>,
    matrix: Vec<Bound>,
    empty: bool,
}

impl Octagon {
    /// Unconstrained octagon over `n` integer variables.
    pub fn universe(n: usize) -> Self {
        Self::with_kinds(vec![NumericKind::Int; n])
    }

    /// Unconstrained octagon over variables of the given kinds.
    pub fn with_kinds(kinds: Vec<NumericKind>) -> Self {
        let width = 2 * kinds.len();
        let mut matrix = vec![Bound::PosInf; width * width];
        for a in 0..width {
            matrix[a * width + a] = Bound::zero();
        }
        Octagon {
            kinds,
            matrix,
            empty: false,
        }
    }

    /// Empty octagon over variables of the given kinds.
    pub fn bottom(kinds: Vec<NumericKind>) -> Self {
        let mut oct = Self::with_kinds(kinds);
        oct.empty = true;
        oct
    }

    /// Number of variables.
    pub fn dimension(&self) -> usize {
        self.kinds.len()
    }

    pub fn kind(&self, var: VarIndex) -> NumericKind {
        self.kinds[var.index()]
    }

    pub fn kinds(&self) -> &[NumericKind] {
        &self.kinds
    }

    fn width(&self) -> usize {
        2 * self.kinds.len()
    }

    /// Upper bound of `v_a - v_b`.
    pub fn get(&self, a: usize, b: usize) -> &Bound {
        &self.matrix[a * self.width() + b]
    }

    fn set_empty(&mut self) {
        trace!("octagon became empty");
        self.empty = true;
    }

    /// Lowers `m[a][b]` (and its coherent twin) to `value` if that is tighter.
    fn tighten(&mut self, a: usize, b: usize, value: &Bound) {
        let width = self.width();
        for (i, j) in [(a, b), (bar(b), bar(a))] {
            let entry = &mut self.matrix[i * width + j];
            if *value < *entry {
                *entry = value.clone();
            }
        }
    }

    /// Re-establishes tight closure, detecting emptiness.
    pub fn close(&mut self) {
        if self.empty {
            return;
        }
        let width = self.width();
        let m = &mut self.matrix;

        for k in 0..width {
            for i in 0..width {
                let ik = m[i * width + k].clone();
                if ik == Bound::PosInf {
                    continue;
                }
                for j in 0..width {
                    let candidate = ik.add(&m[k * width + j]);
                    if candidate < m[i * width + j] {
                        m[i * width + j] = candidate;
                    }
                }
            }
        }
        if (0..width).any(|a| m[a * width + a].is_negative()) {
            trace!("negative cycle after shortest paths");
            self.empty = true;
            return;
        }

        for (i, kind) in self.kinds.iter().enumerate() {
            if !kind.is_int() {
                continue;
            }
            let (p, n) = (2 * i, 2 * i + 1);
            m[p * width + n] = m[p * width + n].floor_even();
            m[n * width + p] = m[n * width + p].floor_even();
            if m[p * width + n].add(&m[n * width + p]).is_negative() {
                trace!("integer tightening emptied v{}", i);
                self.empty = true;
                return;
            }
        }

        let unary: Vec<Bound> = (0..width).map(|a| m[a * width + bar(a)].clone()).collect();
        for a in 0..width {
            if unary[a] == Bound::PosInf {
                continue;
            }
            for b in 0..width {
                let candidate = unary[a].add(&unary[bar(b)]).half_ceil();
                if candidate < m[a * width + b] {
                    m[a * width + b] = candidate;
                }
            }
        }

        for a in 0..width {
            if m[a * width + a].is_negative() {
                trace!("negative cycle after strengthening");
                self.empty = true;
                return;
            }
            m[a * width + a] = Bound::zero();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// `true` iff no constraint is recorded at all.
    pub fn is_universe(&self) -> bool {
        if self.empty {
            return false;
        }
        let width = self.width();
        (0..width).all(|a| (0..width).all(|b| a == b || *self.get(a, b) == Bound::PosInf))
    }

    /// Builds a new octagon whose `k`-th variable is the `sources[k]` variable of `self`,
    /// or a fresh unconstrained one for `None`.
    ///
    /// The sub-matrix of a closed matrix is closed, so no re-closure is needed.
    pub fn reshape(&self, sources: &[(Option<VarIndex>, NumericKind)]) -> Octagon {
        let kinds = sources.iter().map(|&(_, kind)| kind).collect();
        if self.empty {
            return Octagon::bottom(kinds);
        }
        let mut out = Octagon::with_kinds(kinds);
        let old_width = self.width();
        let new_width = out.width();
        for (i, &(src_i, _)) in sources.iter().enumerate() {
            let Some(src_i) = src_i else { continue };
            for (j, &(src_j, _)) in sources.iter().enumerate() {
                let Some(src_j) = src_j else { continue };
                for di in 0..2 {
                    for dj in 0..2 {
                        let value = &self.matrix[(src_i.pos() + di) * old_width + src_j.pos() + dj];
                        out.matrix[(2 * i + di) * new_width + 2 * j + dj] = value.clone();
                    }
                }
            }
        }
        out
    }

    /// Restricts the octagon to `keep`, in that order.
    pub fn restrict(&self, keep: &[VarIndex]) -> Octagon {
        let sources: Vec<_> = keep.iter().map(|&v| (Some(v), self.kind(v))).collect();
        self.reshape(&sources)
    }

    /// Appends a fresh unconstrained variable and returns its slot.
    pub fn add_dimension(&mut self, kind: NumericKind) -> VarIndex {
        let mut sources: Vec<_> = (0..self.dimension())
            .map(|i| (Some(VarIndex::new(i)), self.kinds[i]))
            .collect();
        sources.push((None, kind));
        *self = self.reshape(&sources);
        VarIndex::new(self.dimension() - 1)
    }

    /// Removes `var`, keeping every relation it implied between the remaining variables.
    ///
    /// Slots above `var` shift down by one.
    pub fn remove_dimension(&mut self, var: VarIndex) {
        assert!(var.index() < self.dimension(), "no dimension {}", var);
        let keep: Vec<_> = (0..self.dimension())
            .filter(|&i| i != var.index())
            .map(VarIndex::new)
            .collect();
        *self = self.restrict(&keep);
    }

    /// Drops every constraint mentioning `var`.
    pub fn forget(&mut self, var: VarIndex) {
        if self.empty {
            return;
        }
        let width = self.width();
        for node in [var.pos(), var.neg()] {
            for other in 0..width {
                if other != node {
                    self.matrix[node * width + other] = Bound::PosInf;
                    self.matrix[other * width + node] = Bound::PosInf;
                }
            }
        }
    }

    fn constrain(&mut self, constraint: &Constraint) {
        let a = constraint.first.node();
        match constraint.second {
            None => self.tighten(a, bar(a), &Bound::Finite(&constraint.bound * 2)),
            Some(second) => self.tighten(a, bar(second.node()), &Bound::Finite(constraint.bound.clone())),
        }
    }

    /// Intersects with a single constraint.
    pub fn add_constraint(&mut self, constraint: &Constraint) {
        self.add_constraints(std::slice::from_ref(constraint));
    }

    /// Intersects with a conjunction of constraints, closing once.
    pub fn add_constraints(&mut self, constraints: &[Constraint]) {
        if self.empty {
            return;
        }
        for c in constraints {
            trace!("add_constraint({})", c);
            self.constrain(c);
        }
        self.close();
    }

    /// Range of a single variable.
    pub fn bounds(&self, var: VarIndex) -> Interval {
        if self.empty {
            return Interval::bottom();
        }
        let half = |b: &Bound| {
            if self.kind(var).is_int() {
                b.half_floor()
            } else {
                b.half_ceil()
            }
        };
        let high = half(self.get(var.pos(), var.neg()));
        let low = -half(self.get(var.neg(), var.pos()));
        Interval::new(low, high)
    }

    /// Range of `Σ form[i]·x_i + form[n]` over the bounding box of the octagon.
    pub fn evaluate(&self, form: &[Interval]) -> Interval {
        self.evaluate_without(form, None)
    }

    fn evaluate_without(&self, form: &[Interval], skip: Option<usize>) -> Interval {
        let n = self.dimension();
        assert_eq!(form.len(), n + 1, "linear form of size {} over {} variables", form.len(), n);
        if self.empty {
            return Interval::bottom();
        }
        let mut total = form[n].clone();
        for (i, coefficient) in form[..n].iter().enumerate() {
            if Some(i) == skip || coefficient.is_zero() {
                continue;
            }
            total = total.add(&coefficient.mul(&self.bounds(VarIndex::new(i))));
        }
        total
    }

    /// Assigns `var := Σ form[i]·x_i + form[n]`, where each coefficient is an interval.
    ///
    /// The result goes through a fresh dimension `t`: constrain `t` by the form, forget
    /// `var`, equate `var` with `t`, then project `t` away.
    pub fn assign_interval(&mut self, var: VarIndex, form: &[Interval]) {
        let n = self.dimension();
        assert_eq!(form.len(), n + 1, "linear form of size {} over {} variables", form.len(), n);
        if self.empty {
            return;
        }
        if form.iter().any(Interval::is_empty) {
            self.set_empty();
            return;
        }

        let total = self.evaluate(form);
        let one = BigInt::from(1);
        // unit terms: t - c·x_i ranges over the rest of the form
        let relational: Vec<(VarIndex, bool, Interval)> = form[..n]
            .iter()
            .enumerate()
            .filter_map(|(i, coefficient)| {
                let c = coefficient.as_constant()?;
                (c.abs() == one).then(|| (VarIndex::new(i), c.is_positive(), self.evaluate_without(form, Some(i))))
            })
            .collect();

        let t = self.add_dimension(self.kind(var));
        let mut constraints = Vec::new();
        if let Bound::Finite(high) = &total.high {
            constraints.push(Constraint::unary(Term::pos(t), high.clone()));
        }
        if let Bound::Finite(low) = &total.low {
            constraints.push(Constraint::unary(Term::neg(t), -low));
        }
        for (x, positive, rest) in relational {
            // positive: t - x ∈ rest, negative: t + x ∈ rest
            let (up, down) = if positive {
                (Term::neg(x), Term::pos(x))
            } else {
                (Term::pos(x), Term::neg(x))
            };
            if let Bound::Finite(high) = &rest.high {
                constraints.push(Constraint::binary(Term::pos(t), up, high.clone()));
            }
            if let Bound::Finite(low) = &rest.low {
                constraints.push(Constraint::binary(Term::neg(t), down, -low));
            }
        }
        self.add_constraints(&constraints);

        self.forget(var);
        self.add_constraints(&[
            Constraint::binary(Term::pos(var), Term::neg(t), 0),
            Constraint::binary(Term::neg(var), Term::pos(t), 0),
        ]);
        self.remove_dimension(t);
    }

    /// Assigns `var := Σ form[i]·x_i + form[n]` with exact coefficients.
    pub fn assign_exact(&mut self, var: VarIndex, form: &[BigInt]) {
        let intervals: Vec<Interval> = form.iter().map(|c| Interval::constant(c.clone())).collect();
        self.assign_interval(var, &intervals);
    }

    /// `self ⊑ other`: every constraint of `other` is implied by `self`.
    pub fn is_included_in(&self, other: &Octagon) -> bool {
        assert_eq!(self.dimension(), other.dimension(), "comparing octagons of different dimension");
        if self.empty {
            return true;
        }
        if other.empty {
            return false;
        }
        self.matrix.iter().zip(&other.matrix).all(|(a, b)| a <= b)
    }

    pub fn is_equal(&self, other: &Octagon) -> bool {
        self.is_included_in(other) && other.is_included_in(self)
    }

    /// Checks whether the concrete point satisfies every constraint.
    pub fn contains(&self, point: &[BigInt]) -> bool {
        assert_eq!(point.len(), self.dimension(), "point of wrong dimension");
        let vars: Vec<usize> = (0..self.dimension()).collect();
        self.contains_partial(&vars, point)
    }

    /// Like [`Octagon::contains`], but only for the variables listed in `vars`.
    ///
    /// On a closed matrix this decides membership in the projection onto `vars`.
    pub fn contains_partial(&self, vars: &[usize], values: &[BigInt]) -> bool {
        if self.empty {
            return false;
        }
        let node_value = |k: usize, node: usize| -> BigInt {
            if node % 2 == 0 {
                values[k].clone()
            } else {
                -values[k].clone()
            }
        };
        for (ka, &va) in vars.iter().enumerate() {
            for (kb, &vb) in vars.iter().enumerate() {
                for da in 0..2 {
                    for db in 0..2 {
                        let (a, b) = (2 * va + da, 2 * vb + db);
                        let diff = Bound::Finite(node_value(ka, a) - node_value(kb, b));
                        if diff > *self.get(a, b) {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Union hull: pointwise maximum.
    pub fn join(&self, other: &Octagon) -> Octagon {
        assert_eq!(self.dimension(), other.dimension(), "joining octagons of different dimension");
        if self.empty {
            return other.clone();
        }
        if other.empty {
            return self.clone();
        }
        let matrix = self
            .matrix
            .iter()
            .zip(&other.matrix)
            .map(|(a, b)| a.clone().max(b.clone()))
            .collect();
        Octagon {
            kinds: self.kinds.clone(),
            matrix,
            empty: false,
        }
    }

    /// Intersection: pointwise minimum, re-closed.
    pub fn meet(&self, other: &Octagon) -> Octagon {
        assert_eq!(self.dimension(), other.dimension(), "meeting octagons of different dimension");
        if self.empty || other.empty {
            return Octagon::bottom(self.kinds.clone());
        }
        let matrix = self
            .matrix
            .iter()
            .zip(&other.matrix)
            .map(|(a, b)| a.clone().min(b.clone()))
            .collect();
        let mut out = Octagon {
            kinds: self.kinds.clone(),
            matrix,
            empty: false,
        };
        out.close();
        out
    }

    /// Standard widening: bounds that grew are dropped.
    pub fn widen(&self, other: &Octagon) -> Octagon {
        assert_eq!(self.dimension(), other.dimension(), "widening octagons of different dimension");
        if self.empty {
            return other.clone();
        }
        if other.empty {
            return self.clone();
        }
        let matrix = self
            .matrix
            .iter()
            .zip(&other.matrix)
            .map(|(a, b)| if b <= a { a.clone() } else { Bound::PosInf })
            .collect();
        let mut out = Octagon {
            kinds: self.kinds.clone(),
            matrix,
            empty: false,
        };
        out.close();
        out
    }

    /// Standard narrowing: only infinite bounds are refined.
    pub fn narrow(&self, other: &Octagon) -> Octagon {
        assert_eq!(self.dimension(), other.dimension(), "narrowing octagons of different dimension");
        if self.empty || other.empty {
            return Octagon::bottom(self.kinds.clone());
        }
        let matrix = self
            .matrix
            .iter()
            .zip(&other.matrix)
            .map(|(a, b)| if *a == Bound::PosInf { b.clone() } else { a.clone() })
            .collect();
        let mut out = Octagon {
            kinds: self.kinds.clone(),
            matrix,
            empty: false,
        };
        out.close();
        out
    }

    /// Non-trivial constraints, each coherent pair listed once.
    pub fn constraints(&self) -> Vec<Constraint> {
        let mut result = Vec::new();
        if self.empty {
            return result;
        }
        let width = self.width();
        for a in 0..width {
            for b in 0..width {
                if a == b || (a, b) > (bar(b), bar(a)) {
                    continue;
                }
                let Bound::Finite(c) = self.get(a, b) else { continue };
                let first = Term::from_node(a);
                if b == bar(a) {
                    let half = if self.kind(first.var).is_int() {
                        Bound::Finite(c.clone()).half_floor()
                    } else {
                        Bound::Finite(c.clone()).half_ceil()
                    };
                    if let Bound::Finite(h) = half {
                        result.push(Constraint::unary(first, h));
                    }
                } else {
                    result.push(Constraint::binary(first, Term::from_node(bar(b)), c.clone()));
                }
            }
        }
        result
    }

    pub fn nb_constraints(&self) -> usize {
        self.constraints().len()
    }

    /// Renders the constraints with the given variable names.
    pub fn render<F>(&self, name: F) -> String
    where
        F: Fn(VarIndex) -> String,
    {
        if self.empty {
            return "⊥".to_string();
        }
        let constraints = self.constraints();
        if constraints.is_empty() {
            return "⊤".to_string();
        }
        constraints.iter().map(|c| c.render(&name)).collect::<Vec<_>>().join(" ∧ ")
    }
}

impl fmt::Display for Octagon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(|v| v.to_string()))
    }
}
