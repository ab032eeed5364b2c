//! Octagon abstract states: a closed octagon plus the variable-to-slot map.
//!
//! [`OctagonState`] is an immutable value. Every mutator returns a new state and
//! leaves the receiver untouched; the matrix sits behind an [`Arc`] and is only
//! copied when a mutation actually happens.
//!
//! Variables are identified by qualified names (`function::name` for locals, `name`
//! for globals) and own dense slots `0..n` in declaration order. Removing a variable
//! shifts every later slot down by one.
//!
//! # Example
//!
//! ```rust
//! use octagon_rs::coefficients::Coefficients;
//! use octagon_rs::state::{OctagonState, Operand, Relation};
//! use octagon_rs::types::NumericKind;
//!
//! let state = OctagonState::new()
//!     .declare_variable("main::x", NumericKind::Int)
//!     .declare_variable("main::y", NumericKind::Int);
//!
//! // y := x + 2
//! let rhs = Coefficients::variable(2, 0).add(&Coefficients::constant(2, 2));
//! let state = state.make_assignment("main::y", &rhs);
//!
//! assert_eq!(
//!     state.decide(&Operand::var("main::y"), Relation::Gt, &Operand::var("main::x")),
//!     Some(true)
//! );
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use num_bigint::BigInt;
use num_traits::One;

use crate::bound::{Bound, Interval};
use crate::coefficients::Coefficients;
use crate::octagon::{Constraint, Octagon, Term};
use crate::types::{is_local_of, is_temporary_of, NumericKind, VarIndex};

/// A tracked variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: String,
    pub kind: NumericKind,
}

/// Comparison between two linear forms.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Relation {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Relation {
    pub fn negate(self) -> Self {
        match self {
            Relation::Eq => Relation::Ne,
            Relation::Ne => Relation::Eq,
            Relation::Lt => Relation::Ge,
            Relation::Le => Relation::Gt,
            Relation::Gt => Relation::Le,
            Relation::Ge => Relation::Lt,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Relation::Eq => "==",
            Relation::Ne => "!=",
            Relation::Lt => "<",
            Relation::Le => "<=",
            Relation::Gt => ">",
            Relation::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Operand of a query: a variable or a constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Var(String),
    Const(BigInt),
}

impl Operand {
    pub fn var(name: &str) -> Self {
        Operand::Var(name.to_string())
    }

    pub fn constant(value: impl Into<BigInt>) -> Self {
        Operand::Const(value.into())
    }
}

#[derive(Debug, Clone)]
pub struct OctagonState {
    octagon: Arc<Octagon>,
    variables: Vec<Variable>,
    indices: HashMap<String, VarIndex>,
    loop_head: bool,
}

impl Default for OctagonState {
    fn default() -> Self {
        Self::new()
    }
}

impl OctagonState {
    /// The universe state over no variables.
    pub fn new() -> Self {
        OctagonState {
            octagon: Arc::new(Octagon::universe(0)),
            variables: Vec::new(),
            indices: HashMap::new(),
            loop_head: false,
        }
    }

    /// The unsatisfiable state over no variables.
    pub fn bottom() -> Self {
        OctagonState {
            octagon: Arc::new(Octagon::bottom(Vec::new())),
            ..Self::new()
        }
    }

    pub(crate) fn from_parts(variables: Vec<Variable>, octagon: Octagon, loop_head: bool) -> Self {
        assert_eq!(variables.len(), octagon.dimension(), "variable map out of sync with the octagon");
        let indices = variables
            .iter()
            .enumerate()
            .map(|(i, v)| (v.name.clone(), VarIndex::new(i)))
            .collect();
        OctagonState {
            octagon: Arc::new(octagon),
            variables,
            indices,
            loop_head,
        }
    }

    pub fn octagon(&self) -> &Octagon {
        &self.octagon
    }

    /// Number of tracked variables.
    pub fn size(&self) -> usize {
        self.variables.len()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.name.as_str())
    }

    pub fn contains_variable(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub fn index_of(&self, name: &str) -> Option<VarIndex> {
        self.indices.get(name).copied()
    }

    pub fn kind_of(&self, name: &str) -> Option<NumericKind> {
        self.index_of(name).map(|i| self.variables[i.index()].kind)
    }

    /// `true` iff the state has no concrete point.
    pub fn is_empty(&self) -> bool {
        self.octagon.is_empty()
    }

    /// Whether the state was produced by an edge entering a loop head.
    pub fn is_loop_head(&self) -> bool {
        self.loop_head
    }

    pub fn with_loop_head(&self, loop_head: bool) -> Self {
        OctagonState {
            loop_head,
            ..self.clone()
        }
    }

    fn slot(&self, name: &str) -> VarIndex {
        match self.indices.get(name) {
            Some(&index) => index,
            None => panic!("variable `{}` is not tracked", name),
        }
    }

    fn with_octagon(&self, octagon: Octagon) -> Self {
        OctagonState {
            octagon: Arc::new(octagon),
            ..self.clone()
        }
    }

    fn mutate<F: FnOnce(&mut Octagon)>(&self, f: F) -> Self {
        let mut next = self.clone();
        f(Arc::make_mut(&mut next.octagon));
        next
    }

    /// Adds an unconstrained variable. Declaring a known name returns the state unchanged.
    pub fn declare_variable(&self, name: &str, kind: NumericKind) -> Self {
        debug!("declare_variable(name = {}, kind = {})", name, kind);
        if self.contains_variable(name) {
            return self.clone();
        }
        let mut next = self.mutate(|oct| {
            oct.add_dimension(kind);
        });
        let index = VarIndex::new(next.variables.len());
        next.variables.push(Variable {
            name: name.to_string(),
            kind,
        });
        next.indices.insert(name.to_string(), index);
        next
    }

    /// Drops every constraint on `name`.
    pub fn forget(&self, name: &str) -> Self {
        debug!("forget(name = {})", name);
        let var = self.slot(name);
        self.mutate(|oct| oct.forget(var))
    }

    /// `name := rhs`, forgetting the old value first. `Empty` forgets `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not tracked or `rhs` was built for a different number of variables.
    pub fn make_assignment(&self, name: &str, rhs: &Coefficients) -> Self {
        debug!("make_assignment(name = {}, rhs = {})", name, rhs);
        let var = self.slot(name);
        if let Some(size) = rhs.size() {
            assert_eq!(size, self.size(), "coefficients of size {} for {} variables", size, self.size());
        }
        match rhs {
            Coefficients::Simple(c) => self.mutate(|oct| oct.assign_exact(var, c.values())),
            Coefficients::Interval(c) => self.mutate(|oct| oct.assign_interval(var, c.values())),
            Coefficients::Empty => self.forget(name),
        }
    }

    /// Intersects with `form ≤ 0` (or `form < 0` when `strict`).
    ///
    /// Interval coefficients are read existentially: a point is kept if some choice of
    /// coefficients satisfies the constraint. Strict inequalities over float variables
    /// are weakened to non-strict ones.
    fn constrain(&self, form: &[Interval], strict: bool) -> Self {
        if self.is_empty() {
            return self.clone();
        }
        let n = self.size();
        assert_eq!(form.len(), n + 1, "linear form of size {} for {} variables", form.len() - 1, n);

        let mut form = form.to_vec();
        let vars: Vec<usize> = (0..n).filter(|&i| !form[i].is_zero()).collect();
        if strict && vars.iter().all(|&i| self.variables[i].kind.is_int()) {
            form[n] = form[n].add(&Interval::constant(1));
        }

        let oct = &self.octagon;
        if oct.evaluate(&form).low > Bound::zero() {
            debug!("constraint is infeasible on the bounding box");
            return self.with_octagon(Octagon::bottom(oct.kinds().to_vec()));
        }

        // lower bound of the form without the terms in `skip`
        let rest_low = |skip: &[usize]| -> Bound {
            let mut partial = form.clone();
            for &i in skip {
                partial[i] = Interval::zero();
            }
            oct.evaluate(&partial).low
        };

        let one = BigInt::one();
        let unit: Vec<Term> = vars
            .iter()
            .filter_map(|&i| {
                let c = form[i].as_constant()?;
                let var = VarIndex::new(i);
                if *c == one {
                    Some(Term::pos(var))
                } else if *c == -&one {
                    Some(Term::neg(var))
                } else {
                    None
                }
            })
            .collect();

        let mut constraints = Vec::new();
        for (k, &t) in unit.iter().enumerate() {
            if let Bound::Finite(low) = rest_low(&[t.var.index()]) {
                constraints.push(Constraint::unary(t, -low));
            }
            for &u in &unit[k + 1..] {
                if let Bound::Finite(low) = rest_low(&[t.var.index(), u.var.index()]) {
                    constraints.push(Constraint::binary(t, u, -low));
                }
            }
        }
        if constraints.is_empty() {
            return self.clone();
        }
        self.mutate(|oct| oct.add_constraints(&constraints))
    }

    /// Intersects with `lhs relation rhs`, returning the non-empty results.
    ///
    /// `≠` splits into a `<` and a `>` branch. An `Empty` operand leaves the state unchanged.
    pub fn add_relation(&self, lhs: &Coefficients, relation: Relation, rhs: &Coefficients) -> Vec<Self> {
        debug!("add_relation({} {} {})", lhs, relation, rhs);
        let diff = lhs.sub(rhs);
        let Some(d) = diff.to_intervals() else {
            return if self.is_empty() { Vec::new() } else { vec![self.clone()] };
        };
        let neg: Vec<Interval> = d.iter().map(Interval::neg).collect();
        let results = match relation {
            Relation::Le => vec![self.constrain(&d, false)],
            Relation::Lt => vec![self.constrain(&d, true)],
            Relation::Ge => vec![self.constrain(&neg, false)],
            Relation::Gt => vec![self.constrain(&neg, true)],
            Relation::Eq => vec![self.constrain(&d, false).constrain(&neg, false)],
            Relation::Ne => vec![self.constrain(&d, true), self.constrain(&neg, true)],
        };
        results.into_iter().filter(|s| !s.is_empty()).collect()
    }

    fn single(&self, name: &str, relation: Relation, rhs: &Coefficients) -> Self {
        let lhs = Coefficients::variable(self.size(), self.slot(name).index());
        let mut results = self.add_relation(&lhs, relation, rhs);
        match results.pop() {
            Some(state) => state,
            None => self.with_octagon(Octagon::bottom(self.octagon.kinds().to_vec())),
        }
    }

    /// `name == rhs`; the result may be empty.
    pub fn add_eq_constraint(&self, name: &str, rhs: &Coefficients) -> Self {
        self.single(name, Relation::Eq, rhs)
    }

    /// `name != rhs`: at most two non-empty states, one with `name < rhs`, one with `name > rhs`.
    pub fn add_ineq_constraint(&self, name: &str, rhs: &Coefficients) -> Vec<Self> {
        let lhs = Coefficients::variable(self.size(), self.slot(name).index());
        self.add_relation(&lhs, Relation::Ne, rhs)
    }

    pub fn add_greater_constraint(&self, name: &str, rhs: &Coefficients) -> Self {
        self.single(name, Relation::Gt, rhs)
    }

    pub fn add_greater_eq_constraint(&self, name: &str, rhs: &Coefficients) -> Self {
        self.single(name, Relation::Ge, rhs)
    }

    pub fn add_smaller_constraint(&self, name: &str, rhs: &Coefficients) -> Self {
        self.single(name, Relation::Lt, rhs)
    }

    pub fn add_smaller_eq_constraint(&self, name: &str, rhs: &Coefficients) -> Self {
        self.single(name, Relation::Le, rhs)
    }

    fn remove_where<F: Fn(&str) -> bool>(&self, remove: F) -> Self {
        let keep: Vec<VarIndex> = (0..self.size())
            .filter(|&i| !remove(&self.variables[i].name))
            .map(VarIndex::new)
            .collect();
        if keep.len() == self.size() {
            return self.clone();
        }
        let variables = keep.iter().map(|&i| self.variables[i.index()].clone()).collect();
        Self::from_parts(variables, self.octagon.restrict(&keep), self.loop_head)
    }

    /// Eliminates `name`, keeping the relations it implied between the other variables.
    ///
    /// Only drops true constraints, never adds false ones.
    pub fn project_out(&self, name: &str) -> Self {
        debug!("project_out(name = {})", name);
        self.remove_where(|n| n == name)
    }

    /// Eliminates the temporaries of `function`, i.e. its locals whose name starts with `prefix`.
    pub fn remove_temp_vars(&self, function: &str, prefix: &str) -> Self {
        self.remove_where(|n| is_temporary_of(n, function, prefix))
    }

    /// Eliminates every local of `function`.
    pub fn remove_local_vars(&self, function: &str) -> Self {
        debug!("remove_local_vars(function = {})", function);
        self.remove_where(|n| is_local_of(n, function))
    }

    /// Range of a tracked variable; unknown names are unbounded.
    pub fn bounds(&self, name: &str) -> Interval {
        match self.index_of(name) {
            Some(var) => self.octagon.bounds(var),
            None if self.is_empty() => Interval::bottom(),
            None => Interval::top(),
        }
    }

    /// Range of a linear form over this state; `Empty` is unbounded.
    pub fn evaluate(&self, coefficients: &Coefficients) -> Interval {
        match coefficients.to_intervals() {
            Some(form) => self.octagon.evaluate(&form),
            None => Interval::top(),
        }
    }

    fn operand(&self, operand: &Operand) -> Option<Coefficients> {
        match operand {
            Operand::Var(name) => Some(Coefficients::variable(self.size(), self.index_of(name)?.index())),
            Operand::Const(c) => Some(Coefficients::constant(self.size(), c.clone())),
        }
    }

    /// Three-valued entailment of `lhs relation rhs`.
    ///
    /// `Some(true)` if every point satisfies it, `Some(false)` if none does, `None` otherwise
    /// (including unknown variables and the empty state).
    pub fn decide(&self, lhs: &Operand, relation: Relation, rhs: &Operand) -> Option<bool> {
        let lhs = self.operand(lhs)?;
        let rhs = self.operand(rhs)?;
        self.decide_forms(&lhs, relation, &rhs)
    }

    /// Like [`OctagonState::decide`], over arbitrary linear forms.
    pub fn decide_forms(&self, lhs: &Coefficients, relation: Relation, rhs: &Coefficients) -> Option<bool> {
        if self.is_empty() || lhs.is_empty() || rhs.is_empty() {
            return None;
        }
        if self.add_relation(lhs, relation, rhs).is_empty() {
            return Some(false);
        }
        if self.add_relation(lhs, relation.negate(), rhs).is_empty() {
            return Some(true);
        }
        None
    }

    /// Whether the assignment `point` (by name) satisfies the state.
    ///
    /// Tracked variables missing from `point` are existentially quantified.
    pub fn contains_point(&self, point: &HashMap<String, BigInt>) -> bool {
        let (vars, values): (Vec<usize>, Vec<BigInt>) = point
            .iter()
            .filter_map(|(name, value)| Some((self.index_of(name)?.index(), value.clone())))
            .unzip();
        self.octagon.contains_partial(&vars, &values)
    }

    /// The octagon re-laid out over `variables`: kept variables keep their relations,
    /// unknown ones come in unconstrained.
    pub(crate) fn aligned_to(&self, variables: &[Variable]) -> Octagon {
        let sources: Vec<_> = variables.iter().map(|v| (self.index_of(&v.name), v.kind)).collect();
        self.octagon.reshape(&sources)
    }
}

impl PartialEq for OctagonState {
    fn eq(&self, other: &Self) -> bool {
        self.variables == other.variables && self.octagon.is_equal(&other.octagon)
    }
}

impl fmt::Display for OctagonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.variable_names().collect();
        let body = self.octagon.render(|v| self.variables[v.index()].name.clone());
        write!(f, "{{{}}} [octagon]: {}", names.join(", "), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn int_state(names: &[&str]) -> OctagonState {
        names
            .iter()
            .fold(OctagonState::new(), |s, name| s.declare_variable(name, NumericKind::Int))
    }

    fn constant(state: &OctagonState, value: i64) -> Coefficients {
        Coefficients::constant(state.size(), value)
    }

    #[test]
    fn test_declare_variable() {
        let s = int_state(&["main::x", "main::y"]);
        assert_eq!(s.size(), 2);
        assert_eq!(s.index_of("main::y"), Some(VarIndex::new(1)));
        assert_eq!(s.kind_of("main::x"), Some(NumericKind::Int));

        let again = s.declare_variable("main::x", NumericKind::Int);
        assert_eq!(again.size(), 2);
    }

    #[test]
    fn test_immutability() {
        let s = int_state(&["main::x"]);
        let t = s.make_assignment("main::x", &constant(&s, 4));
        assert!(s.bounds("main::x").is_top());
        assert_eq!(t.bounds("main::x"), Interval::constant(4));
    }

    #[test]
    fn test_emptiness() {
        let s = int_state(&["main::x"]);
        let s = s.add_smaller_constraint("main::x", &constant(&s, 5));
        assert!(!s.is_empty());
        let s = s.add_greater_constraint("main::x", &constant(&s, 5));
        assert!(s.is_empty());
    }

    #[test]
    fn test_ineq_branches() {
        let s = int_state(&["main::x"]);
        let s = s
            .add_greater_eq_constraint("main::x", &constant(&s, 0))
            .add_smaller_eq_constraint("main::x", &constant(&s, 5));
        let branches = s.add_ineq_constraint("main::x", &constant(&s, 3));
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].bounds("main::x"), Interval::range(0, 2));
        assert_eq!(branches[1].bounds("main::x"), Interval::range(4, 5));
    }

    #[test]
    fn test_ineq_on_singleton_is_infeasible() {
        let s = int_state(&["main::x"]);
        let s = s.add_eq_constraint("main::x", &constant(&s, 3));
        assert!(s.add_ineq_constraint("main::x", &constant(&s, 3)).is_empty());
    }

    #[test]
    fn test_assignment_forgets_old_relation() {
        let s = int_state(&["main::x", "main::y"]);
        let y = Coefficients::variable(2, 1);
        let s = s.make_assignment("main::x", &y);
        let x = Operand::var("main::x");
        let y = Operand::var("main::y");
        assert_eq!(s.decide(&x, Relation::Eq, &y), Some(true));

        let s = s.make_assignment("main::x", &constant(&s, 7));
        assert_eq!(s.decide(&x, Relation::Eq, &y), None);
        assert_eq!(s.decide(&x, Relation::Eq, &Operand::constant(7)), Some(true));
    }

    #[test]
    fn test_relational_entailment() {
        let s = int_state(&["main::x", "main::y"]);
        let x = Coefficients::variable(2, 0);
        let y = Coefficients::variable(2, 1);
        let s = s.add_relation(&x.sub(&y), Relation::Le, &constant(&s, 3)).remove(0);
        let y_plus_3 = y.add(&constant(&s, 3));
        assert_eq!(s.decide_forms(&x, Relation::Le, &y_plus_3), Some(true));
        assert_eq!(s.decide_forms(&x, Relation::Gt, &y_plus_3), Some(false));
        assert_eq!(s.decide_forms(&x, Relation::Lt, &y), None);
    }

    #[test]
    fn test_interval_assignment_and_evaluate() {
        let s = int_state(&["main::x"]);
        let s = s.make_assignment("main::x", &Coefficients::interval(1, Interval::range(0, 10)));
        assert_eq!(s.bounds("main::x"), Interval::range(0, 10));
        let twice_plus_one = Coefficients::variable(1, 0)
            .mul_scalar(&BigInt::from(2))
            .add(&constant(&s, 1));
        assert_eq!(s.evaluate(&twice_plus_one), Interval::range(1, 21));
    }

    #[test]
    fn test_non_unit_coefficients_use_bounds() {
        let s = int_state(&["main::x", "main::y"]);
        let s = s
            .add_smaller_eq_constraint("main::y", &constant(&s, 4))
            .add_greater_eq_constraint("main::y", &constant(&s, 0));
        // x + 2*y <= 10 bounds x by 10 - 2*0
        let x = Coefficients::variable(2, 0);
        let two_y = Coefficients::variable(2, 1).mul_scalar(&BigInt::from(2));
        let s = s.add_relation(&x.add(&two_y), Relation::Le, &constant(&s, 10)).remove(0);
        assert_eq!(s.bounds("main::x").high, Bound::from(10));
    }

    #[test]
    fn test_strict_float_constraints_are_weakened() {
        let s = OctagonState::new().declare_variable("main::f", NumericKind::Float);
        let s = s.add_smaller_constraint("main::f", &constant(&s, 1));
        assert_eq!(s.bounds("main::f").high, Bound::from(1));
        let s = s.add_greater_constraint("main::f", &constant(&s, 1));
        assert!(!s.is_empty());
    }

    #[test]
    fn test_remove_local_and_temp_vars() {
        let s = int_state(&["g", "main::x", "f::a", "f::__oct_tmp_0", "main::__oct_tmp_1"]);
        let t = s.remove_temp_vars("f", "__oct_tmp_");
        assert_eq!(t.variable_names().collect::<Vec<_>>(), vec!["g", "main::x", "f::a", "main::__oct_tmp_1"]);
        let u = t.remove_local_vars("f");
        assert_eq!(u.variable_names().collect::<Vec<_>>(), vec!["g", "main::x", "main::__oct_tmp_1"]);
        assert_eq!(u.index_of("main::__oct_tmp_1"), Some(VarIndex::new(2)));
    }

    #[test]
    fn test_project_out_keeps_implied_relations() {
        let s = int_state(&["main::x", "main::t", "main::y"]);
        let x = Coefficients::variable(3, 0);
        let t = Coefficients::variable(3, 1);
        let y = Coefficients::variable(3, 2);
        let s = s.add_relation(&x, Relation::Le, &t).remove(0);
        let s = s.add_relation(&t, Relation::Le, &y).remove(0);
        let s = s.project_out("main::t");
        assert!(!s.contains_variable("main::t"));
        assert_eq!(
            s.decide(&Operand::var("main::x"), Relation::Le, &Operand::var("main::y")),
            Some(true)
        );
    }

    #[test]
    fn test_contains_point() {
        let s = int_state(&["main::x", "main::y"]);
        let s = s.make_assignment("main::y", &Coefficients::variable(2, 0).add(&constant(&s, 1)));
        let mut point = HashMap::new();
        point.insert("main::x".to_string(), BigInt::from(3));
        point.insert("main::y".to_string(), BigInt::from(4));
        assert!(s.contains_point(&point));
        point.insert("main::y".to_string(), BigInt::from(5));
        assert!(!s.contains_point(&point));
    }

    #[test]
    fn test_loop_head_marker() {
        let s = OctagonState::new();
        assert!(!s.is_loop_head());
        assert!(s.with_loop_head(true).is_loop_head());
    }

    #[test]
    fn test_display() {
        let s = int_state(&["main::x"]);
        let s = s.add_smaller_eq_constraint("main::x", &constant(&s, 2));
        assert_eq!(s.to_string(), "{main::x} [octagon]: main::x <= 2");
    }
}
