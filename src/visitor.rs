//! Linearization of expressions into [`Coefficients`].
//!
//! [`CoefficientVisitor`] maps an expression to a list of `(coefficients, state)` branches.
//! Most expressions yield one branch over the input state; relational sub-expressions and
//! negations go through temporaries and may split the state by the sign of a difference.
//!
//! Anything the octagon cannot express (pointers, fields, arrays, untracked variables,
//! floats when float tracking is off) yields [`Coefficients::Empty`] and leaves the state
//! untouched.

use std::cell::Cell;

use log::trace;

use crate::bound::Interval;
use crate::cfa::{
    BinaryOp, CType, CfaEdge, Expression, ExpressionVisitor, FunctionCallExpression, IdExpression, Literal,
    UnaryOp,
};
use crate::coefficients::{unknown, Coefficients};
use crate::error::TransferError;
use crate::machine::MachineModel;
use crate::options::OctagonOptions;
use crate::precision::OctagonPrecision;
use crate::state::{OctagonState, Relation};
use crate::types::{qualified_name, NumericKind};

/// Result of evaluating an expression: one linear form per resulting state.
pub type Branches = Vec<(Coefficients, OctagonState)>;

const NONDET_PREFIX: &str = "__VERIFIER_nondet_";
const THREAD_CREATE: &str = "pthread_create";

/// Numeric kind a value of type `ty` is tracked with, if any.
pub fn numeric_kind(ty: &CType, track_floats: bool) -> Option<NumericKind> {
    let simple = ty.as_simple()?;
    if !simple.basic.is_floating() {
        Some(NumericKind::Int)
    } else if track_floats {
        Some(NumericKind::Float)
    } else {
        None
    }
}

/// Replaces a value by the full range of `ty` when it may not fit.
///
/// Non-integer types are returned as they are.
pub fn fit_to_type(coefficients: &Coefficients, state: &OctagonState, ty: &CType, machine: MachineModel) -> Coefficients {
    let Some(simple) = ty.as_simple().filter(|s| !s.basic.is_floating()) else {
        return coefficients.clone();
    };
    if coefficients.is_empty() {
        return Coefficients::Empty;
    }
    let range = machine.range(simple);
    if state.evaluate(coefficients).is_within(&range) {
        coefficients.clone()
    } else {
        trace!("value {} may overflow {}", coefficients, ty);
        Coefficients::interval(state.size(), range)
    }
}

/// Allocator of temporary variable names, scoped to one analysis run.
#[derive(Debug, Default)]
pub struct TempAllocator {
    counter: Cell<usize>,
    prefix: String,
}

impl TempAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        TempAllocator {
            counter: Cell::new(0),
            prefix: prefix.into(),
        }
    }

    /// Fresh qualified name of a temporary local to `function`.
    pub fn next(&self, function: &str) -> String {
        let id = self.counter.get();
        self.counter.set(id + 1);
        qualified_name(function, &format!("{}{}", self.prefix, id), false)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn allocated(&self) -> usize {
        self.counter.get()
    }

    pub fn reset(&self) {
        self.counter.set(0);
    }
}

pub struct CoefficientVisitor<'a> {
    state: OctagonState,
    function: &'a str,
    precision: &'a dyn OctagonPrecision,
    options: &'a OctagonOptions,
    temps: &'a TempAllocator,
    edge: &'a CfaEdge,
}

impl<'a> CoefficientVisitor<'a> {
    pub fn new(
        state: OctagonState,
        function: &'a str,
        precision: &'a dyn OctagonPrecision,
        options: &'a OctagonOptions,
        temps: &'a TempAllocator,
        edge: &'a CfaEdge,
    ) -> Self {
        CoefficientVisitor {
            state,
            function,
            precision,
            options,
            temps,
            edge,
        }
    }

    /// Evaluates `expression` in the visitor's state.
    pub fn evaluate(&mut self, expression: &Expression) -> Result<Branches, TransferError> {
        expression.accept(self)
    }

    fn evaluate_in(&self, state: OctagonState, expression: &Expression) -> Result<Branches, TransferError> {
        CoefficientVisitor { state, ..*self }.evaluate(expression)
    }

    fn single(&self, coefficients: Coefficients) -> Result<Branches, TransferError> {
        Ok(vec![(coefficients, self.state.clone())])
    }

    fn empty(&self) -> Result<Branches, TransferError> {
        self.single(Coefficients::Empty)
    }

    /// Evaluates `operand` and maps every non-empty branch through `f`.
    fn map_operand<F>(&self, operand: &Expression, f: F) -> Result<Branches, TransferError>
    where
        F: Fn(Coefficients, OctagonState) -> Branches,
    {
        let mut result = Vec::new();
        for (c, s) in self.evaluate_in(self.state.clone(), operand)? {
            if c.is_empty() {
                result.push((c, s));
            } else {
                result.extend(f(c, s));
            }
        }
        Ok(result)
    }

    /// Stores `value` in a fresh temporary and returns the state and its slot.
    fn through_temporary(&self, value: &Coefficients, state: &OctagonState, kind: NumericKind) -> (OctagonState, usize) {
        let temp = self.temps.next(self.function);
        let state = state.declare_variable(&temp, kind);
        let value = value.expand_to_size(state.size());
        let state = state.make_assignment(&temp, &value);
        let slot = state.size() - 1;
        (state, slot)
    }

    /// Splits `state` by the sign of `left - right` and yields the truth value of `op` on each side.
    fn compare(
        &self,
        op: BinaryOp,
        left: &Coefficients,
        right: &Coefficients,
        state: &OctagonState,
        kind: NumericKind,
    ) -> Branches {
        let decided = match op {
            BinaryOp::Lt => left.smaller(right),
            BinaryOp::Le => left.smaller_eq(right),
            BinaryOp::Gt => left.greater(right),
            BinaryOp::Ge => left.greater_eq(right),
            BinaryOp::Eq => left.eq(right),
            _ => left.ineq(right),
        };
        if !decided.is_empty() {
            return vec![(decided, state.clone())];
        }

        let (state, slot) = self.through_temporary(&left.sub(right), state, kind);
        let temp = Coefficients::variable(state.size(), slot);
        let zero = Coefficients::constant(state.size(), 0);
        let mut result = Vec::new();
        for (relation, sign) in [(Relation::Lt, -1), (Relation::Eq, 0), (Relation::Gt, 1)] {
            let holds = match op {
                BinaryOp::Lt => sign < 0,
                BinaryOp::Le => sign <= 0,
                BinaryOp::Gt => sign > 0,
                BinaryOp::Ge => sign >= 0,
                BinaryOp::Eq => sign == 0,
                _ => sign != 0,
            };
            for branch in state.add_relation(&temp, relation, &zero) {
                result.push((Coefficients::constant(branch.size(), holds as i64), branch));
            }
        }
        result
    }

    /// `left op right` in `state`. Arithmetic results are fitted to `ty`, the type of the operation.
    fn combine(
        &self,
        op: BinaryOp,
        left: &Coefficients,
        right: &Coefficients,
        state: &OctagonState,
        ty: &CType,
        float: bool,
    ) -> Branches {
        let value = match op {
            BinaryOp::Add => left.add(right),
            BinaryOp::Sub => left.sub(right),
            BinaryOp::Mul => left.mul(right),
            BinaryOp::Div if float => Coefficients::Empty,
            BinaryOp::Div => left.div(right),
            _ if float && !op.is_relational() => Coefficients::Empty,
            BinaryOp::Mod => left.modulo(right),
            BinaryOp::ShiftLeft => left.shift_left(right),
            BinaryOp::ShiftRight => left.shift_right(right),
            BinaryOp::BinaryAnd => left.bin_and(right),
            BinaryOp::BinaryOr => left.bin_or(right),
            BinaryOp::BinaryXor => left.bin_xor(right),
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let kind = if float { NumericKind::Float } else { NumericKind::Int };
                return self.compare(op, left, right, state, kind);
            }
        };
        vec![(fit_to_type(&value, state, ty, self.options.machine_model), state.clone())]
    }

    fn nondet(&self, call: &FunctionCallExpression) -> Coefficients {
        let size = self.state.size();
        let machine = self.options.machine_model;
        match &call.function[NONDET_PREFIX.len()..] {
            "uint" => Coefficients::interval(size, Interval::range(0, machine.unsigned_int_max())),
            "bool" => Coefficients::interval(size, Interval::range(0, 1)),
            _ => match call.ty.as_simple() {
                Some(simple) if !simple.basic.is_floating() => Coefficients::interval(size, machine.range(simple)),
                Some(_) if self.options.track_float_variables => unknown(size),
                _ => Coefficients::Empty,
            },
        }
    }
}

impl ExpressionVisitor for CoefficientVisitor<'_> {
    type Output = Result<Branches, TransferError>;

    fn visit_id(&mut self, id: &IdExpression) -> Self::Output {
        let name = qualified_name(self.function, &id.name, id.is_global);
        if numeric_kind(&id.ty, self.options.track_float_variables).is_none() || !self.precision.is_tracked(&name) {
            return self.empty();
        }
        match self.state.index_of(&name) {
            Some(index) => self.single(Coefficients::variable(self.state.size(), index.index())),
            None => self.empty(),
        }
    }

    fn visit_field_reference(&mut self, _owner: &Expression, _field: &str, _ty: &CType) -> Self::Output {
        self.empty()
    }

    fn visit_array_subscript(&mut self, _array: &Expression, _subscript: &Expression, _ty: &CType) -> Self::Output {
        self.empty()
    }

    fn visit_unary(&mut self, op: UnaryOp, operand: &Expression, ty: &CType) -> Self::Output {
        let kind = numeric_kind(ty, true).unwrap_or(NumericKind::Int);
        let machine = self.options.machine_model;
        match op {
            UnaryOp::Minus => self.map_operand(operand, |c, s| {
                let negated = fit_to_type(&c.neg(), &s, ty, machine);
                if negated.has_only_constant_value() {
                    return vec![(negated, s)];
                }
                let (s, slot) = self.through_temporary(&negated, &s, kind);
                vec![(Coefficients::variable(s.size(), slot), s)]
            }),
            UnaryOp::Tilde => {
                if ty.is_floating() {
                    return self.empty();
                }
                self.map_operand(operand, |c, s| {
                    let one = Coefficients::constant(s.size(), 1);
                    // ~c == -c - 1 in two's complement
                    vec![(fit_to_type(&c.neg().sub(&one), &s, ty, machine), s)]
                })
            }
            UnaryOp::Not => self.map_operand(operand, |c, s| {
                let zero = Coefficients::constant(s.size(), 0);
                self.compare(BinaryOp::Eq, &c, &zero, &s, kind)
            }),
            UnaryOp::SizeOf => match self.options.machine_model.size_of(&operand.ty()) {
                Some(size) => self.single(Coefficients::constant(self.state.size(), size)),
                None => self.empty(),
            },
            UnaryOp::Amper | UnaryOp::Star => self.empty(),
        }
    }

    fn visit_binary(&mut self, op: BinaryOp, left: &Expression, right: &Expression, ty: &CType) -> Self::Output {
        let track_floats = self.options.track_float_variables;
        let float = ty.is_floating() || left.ty().is_floating() || right.ty().is_floating();
        if float && !track_floats {
            return self.empty();
        }
        if numeric_kind(&left.ty(), track_floats).is_none() || numeric_kind(&right.ty(), track_floats).is_none() {
            return self.empty();
        }

        let mut result = Vec::new();
        for (lc, ls) in self.evaluate_in(self.state.clone(), left)? {
            if lc.is_empty() {
                result.push((lc, ls));
                continue;
            }
            for (rc, rs) in self.evaluate_in(ls, right)? {
                if rc.is_empty() {
                    result.push((rc, rs));
                    continue;
                }
                let lc = lc.expand_to_size(rs.size());
                result.extend(self.combine(op, &lc, &rc, &rs, ty, float));
            }
        }
        Ok(result)
    }

    fn visit_literal(&mut self, literal: &Literal) -> Self::Output {
        let size = self.state.size();
        match literal {
            Literal::Integer(v) => self.single(Coefficients::constant(size, v.clone())),
            Literal::Char(c) => self.single(Coefficients::constant(size, *c as u32)),
            Literal::Float(v) if self.options.track_float_variables => {
                self.single(Coefficients::interval(size, Interval::from_f64(*v, *v)))
            }
            Literal::Float(_) | Literal::String(_) => self.empty(),
        }
    }

    fn visit_cast(&mut self, operand: &Expression, ty: &CType) -> Self::Output {
        if numeric_kind(ty, self.options.track_float_variables).is_none() {
            return self.empty();
        }
        let machine = self.options.machine_model;
        self.map_operand(operand, |c, s| vec![(fit_to_type(&c, &s, ty, machine), s)])
    }

    fn visit_function_call(&mut self, call: &FunctionCallExpression) -> Self::Output {
        if call.function == THREAD_CREATE {
            return Err(TransferError::UnsupportedFunction {
                function: call.function.clone(),
                reason: format!("threads are not supported ({})", self.edge),
            });
        }
        if call.function.starts_with(NONDET_PREFIX) {
            return self.single(self.nondet(call));
        }
        self.empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::bound::Bound;
    use crate::cfa::{BasicType, CfaBuilder, EdgeKind};
    use crate::precision::{FullPrecision, RefineablePrecision};

    fn state_with(names: &[&str]) -> OctagonState {
        names
            .iter()
            .fold(OctagonState::new(), |s, n| s.declare_variable(n, NumericKind::Int))
    }

    fn eval(state: &OctagonState, options: &OctagonOptions, expression: &Expression) -> Branches {
        let temps = TempAllocator::new(options.temp_var_prefix.clone());
        let edge = CfaBuilder::detached_edge("main", EdgeKind::Blank);
        CoefficientVisitor::new(state.clone(), "main", &FullPrecision, options, &temps, &edge)
            .evaluate(expression)
            .unwrap()
    }

    #[test]
    fn test_linear_expression() {
        let options = OctagonOptions::default();
        let small = Coefficients::interval(2, Interval::range(0, 10));
        let state = state_with(&["main::x", "main::y"])
            .make_assignment("main::x", &small)
            .make_assignment("main::y", &small);
        // 2*x - y + 3
        let e = Expression::binary(
            BinaryOp::Add,
            Expression::binary(
                BinaryOp::Sub,
                Expression::binary(BinaryOp::Mul, Expression::int(2), Expression::var("x")),
                Expression::var("y"),
            ),
            Expression::int(3),
        );
        let branches = eval(&state, &options, &e);
        assert_eq!(branches.len(), 1);
        let (c, _) = &branches[0];
        assert_eq!(c.to_string(), "[2, -1, 3]");
    }

    #[test]
    fn test_unknown_shapes_are_empty() {
        let options = OctagonOptions::default();
        let state = state_with(&["main::x"]);
        let pointer = Expression::id("p", CType::Pointer(Box::new(CType::int())), false);
        let field = Expression::FieldReference {
            owner: Box::new(Expression::var("s")),
            field: "f".to_string(),
            is_pointer: false,
            ty: CType::int(),
        };
        for e in [
            pointer,
            field,
            Expression::var("undeclared"),
            Expression::float(1.5),
            Expression::binary(BinaryOp::Mul, Expression::var("x"), Expression::var("x")),
            Expression::unary(UnaryOp::Star, Expression::var("x")),
        ] {
            let branches = eval(&state, &options, &e);
            assert_eq!(branches.len(), 1);
            assert!(branches[0].0.is_empty(), "{} should not be computable", e);
        }
    }

    #[test]
    fn test_untracked_variable_is_empty() {
        let options = OctagonOptions::default();
        let state = state_with(&["main::x"]);
        let temps = TempAllocator::new("__oct_tmp_");
        let edge = CfaBuilder::detached_edge("main", EdgeKind::Blank);
        let precision = RefineablePrecision::new(["main::y"]);
        let branches = CoefficientVisitor::new(state, "main", &precision, &options, &temps, &edge)
            .evaluate(&Expression::var("x"))
            .unwrap();
        assert!(branches[0].0.is_empty());
    }

    #[test]
    fn test_relational_branches_by_sign() {
        let options = OctagonOptions::default();
        let state = state_with(&["main::x"]);
        let e = Expression::binary(BinaryOp::Lt, Expression::var("x"), Expression::int(3));
        let branches = eval(&state, &options, &e);
        assert_eq!(branches.len(), 3);

        let truths: Vec<_> = branches.iter().map(|(c, _)| c.as_constant().unwrap()).collect();
        assert_eq!(truths, vec![1.into(), 0.into(), 0.into()]);
        assert_eq!(branches[0].1.bounds("main::x").high, Bound::from(2));
        assert_eq!(branches[1].1.bounds("main::x"), Interval::constant(3));
        assert_eq!(branches[2].1.bounds("main::x").low, Bound::from(4));
    }

    #[test]
    fn test_decided_comparison_keeps_state() {
        let options = OctagonOptions::default();
        let state = state_with(&["main::x"]);
        let e = Expression::binary(BinaryOp::Ge, Expression::int(4), Expression::int(3));
        let branches = eval(&state, &options, &e);
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].0.as_constant(), Some(1.into()));
        assert_eq!(branches[0].1.size(), 1);
    }

    #[test]
    fn test_unary_minus_through_temporary() {
        let options = OctagonOptions::default();
        let state = state_with(&["main::x"]);
        let state = state.make_assignment("main::x", &Coefficients::constant(1, 4));
        let branches = eval(&state, &options, &Expression::unary(UnaryOp::Minus, Expression::var("x")));
        let (c, s) = &branches[0];
        assert_eq!(s.size(), 2);
        assert_eq!(s.evaluate(c), Interval::constant(-4));

        let branches = eval(&state, &options, &Expression::unary(UnaryOp::Minus, Expression::int(4)));
        assert_eq!(branches[0].0.as_constant(), Some((-4).into()));
    }

    #[test]
    fn test_logical_not() {
        let options = OctagonOptions::default();
        let state = state_with(&["main::x"]);
        let branches = eval(&state, &options, &Expression::unary(UnaryOp::Not, Expression::var("x")));
        // x < 0, x == 0, x > 0
        assert_eq!(branches.len(), 3);
        assert_eq!(branches[1].0.as_constant(), Some(1.into()));
        assert_eq!(branches[1].1.bounds("main::x"), Interval::constant(0));
    }

    #[test]
    fn test_nondet_builtins() {
        let options = OctagonOptions::default();
        let state = OctagonState::new();
        let uint = Expression::call("__VERIFIER_nondet_uint", vec![], CType::unsigned_int());
        let branches = eval(&state, &options, &uint);
        assert_eq!(branches[0].0.constant_range(), Some(Interval::range(0, 4294967295u64)));

        let bool_ = Expression::call("__VERIFIER_nondet_bool", vec![], CType::simple(BasicType::Bool, false));
        assert_eq!(eval(&state, &options, &bool_)[0].0.constant_range(), Some(Interval::range(0, 1)));

        let char_ = Expression::call("__VERIFIER_nondet_char", vec![], CType::simple(BasicType::Char, true));
        assert_eq!(eval(&state, &options, &char_)[0].0.constant_range(), Some(Interval::range(-128, 127)));

        let other = Expression::call("rand", vec![], CType::int());
        assert!(eval(&state, &options, &other)[0].0.is_empty());
    }

    #[test]
    fn test_thread_creation_is_fatal() {
        let options = OctagonOptions::default();
        let temps = TempAllocator::new("__oct_tmp_");
        let edge = CfaBuilder::detached_edge("main", EdgeKind::Blank);
        let call = Expression::call("pthread_create", vec![], CType::int());
        let result = CoefficientVisitor::new(OctagonState::new(), "main", &FullPrecision, &options, &temps, &edge)
            .evaluate(&call);
        assert!(matches!(result, Err(TransferError::UnsupportedFunction { .. })));
    }

    #[test]
    fn test_cast_applies_type_range() {
        let options = OctagonOptions::default();
        let state = state_with(&["main::x"]);
        let to_char = Expression::cast(Expression::var("x"), CType::simple(BasicType::Char, false));
        let branches = eval(&state, &options, &to_char);
        assert_eq!(branches[0].1.evaluate(&branches[0].0), Interval::range(0, 255));
    }

    fn unsigned_var(name: &str) -> Expression {
        Expression::id(name, CType::unsigned_int(), false)
    }

    fn uint_max_state() -> OctagonState {
        state_with(&["main::u"]).make_assignment("main::u", &Coefficients::constant(1, u32::MAX))
    }

    #[test]
    fn test_unsigned_arithmetic_wraps() {
        let options = OctagonOptions::default();
        let state = uint_max_state();
        let sum = Expression::binary(BinaryOp::Add, unsigned_var("u"), Expression::int(1));
        let branches = eval(&state, &options, &sum);
        assert_eq!(branches.len(), 1);
        let (c, s) = &branches[0];
        assert_eq!(s.evaluate(c), Interval::range(0, u32::MAX));

        // (u + 1) - 1 stays within the type after the inner wrap
        let nested = Expression::binary(BinaryOp::Sub, sum, Expression::int(1));
        let (c, s) = &eval(&state, &options, &nested)[0];
        assert!(s.evaluate(c).contains(&0.into()));
    }

    #[test]
    fn test_in_range_arithmetic_stays_exact() {
        let options = OctagonOptions::default();
        let state = state_with(&["main::u"]).make_assignment("main::u", &Coefficients::constant(1, 7));
        let sum = Expression::binary(BinaryOp::Add, unsigned_var("u"), Expression::int(1));
        let (c, s) = &eval(&state, &options, &sum)[0];
        assert_eq!(c.to_string(), "[1, 1]");
        assert_eq!(s.evaluate(c), Interval::constant(8));
    }

    #[test]
    fn test_comparison_sees_wrapped_value() {
        let options = OctagonOptions::default();
        let state = uint_max_state();
        // (u + 1 > 5) is 0 in C
        let cmp = Expression::binary(
            BinaryOp::Gt,
            Expression::binary(BinaryOp::Add, unsigned_var("u"), Expression::int(1)),
            Expression::int(5),
        );
        let truths: Vec<_> = eval(&state, &options, &cmp)
            .iter()
            .filter_map(|(c, _)| c.as_constant())
            .collect();
        assert!(truths.contains(&0.into()));
    }

    #[test]
    fn test_unsigned_negation_and_complement_wrap() {
        let options = OctagonOptions::default();
        let state = state_with(&["main::u"]).make_assignment("main::u", &Coefficients::constant(1, 1));
        for op in [UnaryOp::Minus, UnaryOp::Tilde] {
            let (c, s) = &eval(&state, &options, &Expression::unary(op, unsigned_var("u")))[0];
            assert_eq!(s.evaluate(c), Interval::range(0, u32::MAX), "{:?}", op);
        }
    }

    #[test]
    fn test_floats_follow_tracking_option() {
        let off = OctagonOptions::default();
        let on = OctagonOptions::default().with_track_float_variables(true);
        let state = OctagonState::new();
        assert!(eval(&state, &off, &Expression::float(1.5))[0].0.is_empty());
        let branches = eval(&state, &on, &Expression::float(1.5));
        assert_eq!(branches[0].0.constant_range(), Some(Interval::range(1, 2)));
    }

    #[test]
    fn test_temp_allocator() {
        let temps = TempAllocator::new("__oct_tmp_");
        assert_eq!(temps.next("main"), "main::__oct_tmp_0");
        assert_eq!(temps.next("f"), "f::__oct_tmp_1");
        assert_eq!(temps.allocated(), 2);
        temps.reset();
        assert_eq!(temps.next("main"), "main::__oct_tmp_0");
    }

    #[test]
    fn test_numeric_kind() {
        assert_eq!(numeric_kind(&CType::int(), false), Some(NumericKind::Int));
        assert_eq!(numeric_kind(&CType::double(), false), None);
        assert_eq!(numeric_kind(&CType::double(), true), Some(NumericKind::Float));
        assert_eq!(numeric_kind(&CType::Void, true), None);
    }
}
