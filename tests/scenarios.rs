//! End-to-end scenarios for states and the transfer relation.
//!
//! Each test drives the public API the way an analysis would: build states or CFA edges,
//! step through them, and query the result.

use std::collections::HashMap;

use num_bigint::BigInt;
use octagon_rs::bound::{Bound, Interval};
use octagon_rs::cfa::{BinaryOp, CType, CfaBuilder, Declaration, EdgeKind, Expression, Parameter};
use octagon_rs::coefficients::Coefficients;
use octagon_rs::octagon::{Constraint, Octagon, Term};
use octagon_rs::options::OctagonOptions;
use octagon_rs::precision::FullPrecision;
use octagon_rs::state::{OctagonState, Operand, Relation};
use octagon_rs::transfer::OctagonTransferRelation;
use octagon_rs::types::{NumericKind, VarIndex};

fn int_state(names: &[&str]) -> OctagonState {
    names
        .iter()
        .fold(OctagonState::new(), |s, n| s.declare_variable(n, NumericKind::Int))
}

fn constant(state: &OctagonState, value: i64) -> Coefficients {
    Coefficients::constant(state.size(), value)
}

fn point(values: &[(&str, i64)]) -> HashMap<String, BigInt> {
    values.iter().map(|(n, v)| (n.to_string(), BigInt::from(*v))).collect()
}

fn step(transfer: &OctagonTransferRelation, state: &OctagonState, function: &str, kind: EdgeKind) -> Vec<OctagonState> {
    let edge = CfaBuilder::detached_edge(function, kind);
    transfer.get_abstract_successors(state, &FullPrecision, &edge).unwrap()
}

fn declare(name: &str, init: Option<Expression>) -> EdgeKind {
    EdgeKind::Declaration(Declaration::variable(name, CType::int(), false, init))
}

// ─── State Scenarios ───────────────────────────────────────────────────────────

#[test]
fn contradictory_bounds_are_empty() {
    let s = int_state(&["main::x"]);
    let s = s.add_smaller_constraint("main::x", &constant(&s, 5));
    assert!(!s.is_empty());
    let s = s.add_greater_constraint("main::x", &constant(&s, 5));
    assert!(s.is_empty());
}

#[test]
fn not_equal_splits_around_the_value() {
    let s = int_state(&["main::x"]);
    let s = s
        .add_greater_eq_constraint("main::x", &constant(&s, 0))
        .add_smaller_eq_constraint("main::x", &constant(&s, 5));
    let branches = s.add_ineq_constraint("main::x", &constant(&s, 3));
    assert_eq!(branches.len(), 2);
    assert!(branches.iter().all(|b| !b.is_empty()));

    for v in 0..=5 {
        let p = point(&[("main::x", v)]);
        let covered = branches.iter().any(|b| b.contains_point(&p));
        assert_eq!(covered, v != 3, "x = {}", v);
    }
}

#[test]
fn assignment_forgets_previous_relation() {
    let s = int_state(&["main::x", "main::y"]);
    let s = s.make_assignment("main::x", &Coefficients::variable(2, 1));
    let x = Operand::var("main::x");
    let y = Operand::var("main::y");
    assert_eq!(s.decide(&x, Relation::Eq, &y), Some(true));

    let s = s.make_assignment("main::x", &constant(&s, 7));
    assert_eq!(s.decide(&x, Relation::Eq, &y), None);
}

#[test]
fn relational_bound_is_implied() {
    let s = int_state(&["main::x", "main::y"]);
    let x = Coefficients::variable(2, 0);
    let y = Coefficients::variable(2, 1);
    let s = s.add_relation(&x.sub(&y), Relation::Le, &constant(&s, 3)).remove(0);
    assert_eq!(s.decide_forms(&x, Relation::Le, &y.add(&constant(&s, 3))), Some(true));
}

#[test]
fn constant_coefficients_resize() {
    let c = Coefficients::constant(2, 7);
    for n in 2..6 {
        let resized = c.fit_to_size(n).expand_to_size(n);
        assert_eq!(resized, Coefficients::constant(n, 7));
        assert_eq!(c.expand_to_size(n).fit_to_size(2), c);
    }
    assert_eq!(c.fit_to_size(2).expand_to_size(2), c);
}

#[test]
fn closure_is_idempotent() {
    let x = VarIndex::new;
    let mut octagon = Octagon::universe(3);
    octagon.add_constraints(&[
        Constraint::binary(Term::pos(x(0)), Term::neg(x(1)), 2),
        Constraint::binary(Term::pos(x(1)), Term::pos(x(2)), 5),
        Constraint::unary(Term::neg(x(2)), 1),
        Constraint::unary(Term::pos(x(0)), 9),
    ]);
    let mut again = octagon.clone();
    again.close();
    assert_eq!(again, octagon);
    assert_eq!(octagon.bounds(x(1)).high, Bound::Finite(BigInt::from(6)));
}

// ─── Transfer Scenarios ────────────────────────────────────────────────────────

#[test]
fn straight_line_assumptions() {
    let transfer = OctagonTransferRelation::new(OctagonOptions::default());
    let s = OctagonState::new();
    let s = step(&transfer, &s, "main", declare("x", Some(Expression::int(5)))).remove(0);
    let y = Expression::binary(BinaryOp::Add, Expression::var("x"), Expression::int(2));
    let s = step(&transfer, &s, "main", declare("y", Some(y))).remove(0);

    let gt = |c: i64| EdgeKind::Assume {
        expression: Expression::binary(BinaryOp::Gt, Expression::var("y"), Expression::int(c)),
        truth: true,
    };
    let after6 = step(&transfer, &s, "main", gt(6));
    assert_eq!(after6.len(), 1);
    assert!(!after6[0].is_empty());
    assert!(step(&transfer, &s, "main", gt(7)).is_empty());
}

#[test]
fn call_and_return_leave_no_callee_locals() {
    let transfer = OctagonTransferRelation::new(OctagonOptions::default());
    let s = OctagonState::new();
    let s = step(&transfer, &s, "main", declare("a", Some(Expression::int(2)))).remove(0);
    let s = step(&transfer, &s, "main", declare("r", None)).remove(0);
    let before: Vec<String> = s.variable_names().map(String::from).collect();

    let call = EdgeKind::FunctionCall {
        callee: "twice".to_string(),
        arguments: vec![Expression::var("a")],
        parameters: vec![Parameter::new("n", CType::int())],
        return_type: CType::int(),
    };
    let s = step(&transfer, &s, "main", call).remove(0);
    let local = EdgeKind::Declaration(Declaration::variable(
        "k",
        CType::int(),
        false,
        Some(Expression::binary(BinaryOp::Add, Expression::var("n"), Expression::var("n"))),
    ));
    let s = step(&transfer, &s, "twice", local).remove(0);
    let s = step(&transfer, &s, "twice", EdgeKind::Return(Some(Expression::var("k")))).remove(0);
    let back = EdgeKind::FunctionReturn {
        callee: "twice".to_string(),
        lhs: Some(Expression::var("r")),
        return_type: CType::int(),
    };
    let s = step(&transfer, &s, "main", back).remove(0);

    let after: Vec<String> = s.variable_names().map(String::from).collect();
    assert_eq!(before, after);
    assert!(after.iter().all(|n| !n.starts_with("twice::")));
    assert_eq!(s.bounds("main::r"), Interval::constant(4));
}
