//! Lattice structure over octagon states.
//!
//! States over different variable sets are compared by name: a variable missing from a
//! state is unconstrained in it. Join and widening keep only the variables both sides
//! track, meet keeps all of them.

use std::fmt::Debug;

use log::trace;

use crate::state::{OctagonState, Variable};

/// Lattice operations the analysis driver needs from a state domain.
///
/// For [`OctagonState`] elements, every binary operation first aligns both operands to a
/// common variable list by name, so `le`, `join` and friends are well defined between states
/// built along different paths. Bottom is any empty state regardless of its variables; top
/// is the state with no variables at all.
pub trait AbstractDomain: Clone + Debug + Sized {
    type Element: Clone + Debug + PartialEq;

    /// The infeasible element.
    fn bottom(&self) -> Self::Element;

    /// The unconstrained element.
    fn top(&self) -> Self::Element;

    fn is_bottom(&self, elem: &Self::Element) -> bool;

    fn is_top(&self, elem: &Self::Element) -> bool;

    /// `elem1 ⊑ elem2`: every point of `elem1` is a point of `elem2`.
    fn le(&self, elem1: &Self::Element, elem2: &Self::Element) -> bool;

    fn join(&self, elem1: &Self::Element, elem2: &Self::Element) -> Self::Element;

    fn meet(&self, elem1: &Self::Element, elem2: &Self::Element) -> Self::Element;

    /// Upper bound of both arguments that stabilizes any increasing chain in finitely many steps.
    fn widen(&self, elem1: &Self::Element, elem2: &Self::Element) -> Self::Element;

    /// Refines `elem1` using `elem2` without giving up termination. Falls back to `meet`.
    fn narrow(&self, elem1: &Self::Element, elem2: &Self::Element) -> Self::Element {
        self.meet(elem1, elem2)
    }

    /// Mutual inclusion. Two octagon states over differently ordered variables can be equal.
    fn eq(&self, elem1: &Self::Element, elem2: &Self::Element) -> bool {
        self.le(elem1, elem2) && self.le(elem2, elem1)
    }

    fn join_many<I>(&self, elems: I) -> Self::Element
    where
        I: IntoIterator<Item = Self::Element>,
    {
        elems.into_iter().fold(self.bottom(), |acc, e| self.join(&acc, &e))
    }
}

/// Octagon lattice with the merge and stop operators of the analysis driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OctagonDomain {
    widen_at_loop_heads: bool,
}

impl Default for OctagonDomain {
    fn default() -> Self {
        OctagonDomain::new(true)
    }
}

impl OctagonDomain {
    pub fn new(widen_at_loop_heads: bool) -> Self {
        OctagonDomain { widen_at_loop_heads }
    }

    /// Combines a new state with the one already reached at the same location.
    ///
    /// Widens when the new state enters a loop head (and widening is enabled), joins otherwise.
    pub fn merge(&self, new: &OctagonState, reached: &OctagonState) -> OctagonState {
        let merged = if self.widen_at_loop_heads && new.is_loop_head() {
            trace!("widening at loop head");
            self.widen(reached, new)
        } else {
            self.join(reached, new)
        };
        merged.with_loop_head(new.is_loop_head())
    }

    /// Whether `state` is covered by one of the `reached` states.
    pub fn stop<'a, I>(&self, state: &OctagonState, reached: I) -> bool
    where
        I: IntoIterator<Item = &'a OctagonState>,
    {
        state.is_empty() || reached.into_iter().any(|r| self.le(state, r))
    }
}

fn common_variables(a: &OctagonState, b: &OctagonState) -> Vec<Variable> {
    a.variables()
        .iter()
        .filter(|v| b.contains_variable(&v.name))
        .cloned()
        .collect()
}

fn all_variables(a: &OctagonState, b: &OctagonState) -> Vec<Variable> {
    let mut variables = a.variables().to_vec();
    variables.extend(b.variables().iter().filter(|v| !a.contains_variable(&v.name)).cloned());
    variables
}

impl AbstractDomain for OctagonDomain {
    type Element = OctagonState;

    fn bottom(&self) -> OctagonState {
        OctagonState::bottom()
    }

    fn top(&self) -> OctagonState {
        OctagonState::new()
    }

    fn is_bottom(&self, elem: &OctagonState) -> bool {
        elem.is_empty()
    }

    fn is_top(&self, elem: &OctagonState) -> bool {
        !elem.is_empty() && elem.octagon().is_universe()
    }

    fn le(&self, elem1: &OctagonState, elem2: &OctagonState) -> bool {
        if elem1.is_empty() {
            return true;
        }
        if elem2.is_empty() {
            return false;
        }
        elem1.aligned_to(elem2.variables()).is_included_in(elem2.octagon())
    }

    fn join(&self, elem1: &OctagonState, elem2: &OctagonState) -> OctagonState {
        if elem1.is_empty() {
            return elem2.clone();
        }
        if elem2.is_empty() {
            return elem1.clone();
        }
        let variables = common_variables(elem1, elem2);
        let octagon = elem1.aligned_to(&variables).join(&elem2.aligned_to(&variables));
        OctagonState::from_parts(variables, octagon, false)
    }

    fn meet(&self, elem1: &OctagonState, elem2: &OctagonState) -> OctagonState {
        if elem1.is_empty() {
            return elem1.clone();
        }
        if elem2.is_empty() {
            return elem2.clone();
        }
        let variables = all_variables(elem1, elem2);
        let octagon = elem1.aligned_to(&variables).meet(&elem2.aligned_to(&variables));
        OctagonState::from_parts(variables, octagon, false)
    }

    fn widen(&self, elem1: &OctagonState, elem2: &OctagonState) -> OctagonState {
        if elem1.is_empty() {
            return elem2.clone();
        }
        if elem2.is_empty() {
            return elem1.clone();
        }
        let variables = common_variables(elem1, elem2);
        let octagon = elem1.aligned_to(&variables).widen(&elem2.aligned_to(&variables));
        OctagonState::from_parts(variables, octagon, false)
    }

    fn narrow(&self, elem1: &OctagonState, elem2: &OctagonState) -> OctagonState {
        if elem1.is_empty() || elem2.is_empty() {
            return self.meet(elem1, elem2);
        }
        let variables = all_variables(elem1, elem2);
        let octagon = elem1.aligned_to(&variables).narrow(&elem2.aligned_to(&variables));
        OctagonState::from_parts(variables, octagon, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::bound::{Bound, Interval};
    use crate::coefficients::Coefficients;
    use crate::types::NumericKind;

    /// Checks, over all pairs of `samples`, the identities the fixpoint loop relies on:
    /// bottom and top are neutral, join and meet bound both arguments in either order,
    /// and widening never drops what the older state covers.
    fn check_lattice_laws(domain: &OctagonDomain, samples: &[OctagonState]) {
        let same = |x: &OctagonState, y: &OctagonState| AbstractDomain::eq(domain, x, y);
        for a in samples {
            assert!(domain.le(a, a), "{} is not below itself", a);
            assert!(same(a, &domain.join(a, &domain.bottom())), "join with bottom changed {}", a);
            assert!(same(a, &domain.meet(a, &domain.top())), "meet with top changed {}", a);
        }

        for a in samples {
            for b in samples {
                let (ab, ba) = (domain.join(a, b), domain.join(b, a));
                assert!(same(&ab, &ba), "join of {} and {} depends on order", a, b);
                assert!(domain.le(a, &ab) && domain.le(b, &ab), "join of {} and {} is too small", a, b);

                let (ab, ba) = (domain.meet(a, b), domain.meet(b, a));
                assert!(same(&ab, &ba), "meet of {} and {} depends on order", a, b);
                assert!(domain.le(&ab, a) && domain.le(&ab, b), "meet of {} and {} is too large", a, b);

                assert!(domain.le(a, &domain.widen(a, b)), "widening {} by {} lost points", a, b);
            }
        }
    }

    fn xy() -> OctagonState {
        OctagonState::new()
            .declare_variable("main::x", NumericKind::Int)
            .declare_variable("main::y", NumericKind::Int)
    }

    fn with_x(state: &OctagonState, value: i64) -> OctagonState {
        state.make_assignment("main::x", &Coefficients::constant(state.size(), value))
    }

    fn samples() -> Vec<OctagonState> {
        let s = xy();
        let x_le_y = s
            .add_relation(
                &Coefficients::variable(2, 0),
                crate::state::Relation::Le,
                &Coefficients::variable(2, 1),
            )
            .remove(0);
        let z = OctagonState::new()
            .declare_variable("main::y", NumericKind::Int)
            .declare_variable("main::z", NumericKind::Int);
        let z = z.make_assignment("main::z", &Coefficients::constant(2, 3));
        vec![
            OctagonState::bottom(),
            s.clone(),
            with_x(&s, 0),
            with_x(&s, 10),
            x_le_y,
            z,
        ]
    }

    #[test]
    fn test_lattice_laws() {
        check_lattice_laws(&OctagonDomain::default(), &samples());
    }

    #[test]
    fn test_join_over_common_variables() {
        let domain = OctagonDomain::default();
        let a = with_x(&xy(), 0);
        let b = with_x(&xy(), 10).project_out("main::y");
        let joined = domain.join(&a, &b);
        assert_eq!(joined.size(), 1);
        assert_eq!(joined.bounds("main::x"), Interval::range(0, 10));
    }

    #[test]
    fn test_meet_over_all_variables() {
        let domain = OctagonDomain::default();
        let a = OctagonState::new().declare_variable("a", NumericKind::Int);
        let a = a.make_assignment("a", &Coefficients::constant(1, 1));
        let b = OctagonState::new().declare_variable("b", NumericKind::Int);
        let b = b.make_assignment("b", &Coefficients::constant(1, 2));
        let met = domain.meet(&a, &b);
        assert_eq!(met.size(), 2);
        assert_eq!(met.bounds("a"), Interval::constant(1));
        assert_eq!(met.bounds("b"), Interval::constant(2));
    }

    #[test]
    fn test_le_treats_missing_variables_as_unconstrained() {
        let domain = OctagonDomain::default();
        let a = with_x(&xy(), 1);
        let b = with_x(&xy(), 1).project_out("main::y");
        assert!(domain.le(&a, &b));
        assert!(domain.le(&b, &a) == a.bounds("main::y").is_top());
    }

    #[test]
    fn test_merge_widens_at_loop_heads() {
        let domain = OctagonDomain::default();
        let reached = with_x(&xy(), 0).with_loop_head(true);
        let new = domain.join(&reached, &with_x(&xy(), 1)).with_loop_head(true);

        let merged = domain.merge(&new, &reached);
        assert_eq!(merged.bounds("main::x").low, Bound::from(0));
        assert_eq!(merged.bounds("main::x").high, Bound::PosInf);
        assert!(merged.is_loop_head());

        let joining = OctagonDomain::new(false).merge(&new, &reached);
        assert_eq!(joining.bounds("main::x"), Interval::range(0, 1));
    }

    #[test]
    fn test_stop() {
        let domain = OctagonDomain::default();
        let wide = domain.join(&with_x(&xy(), 0), &with_x(&xy(), 5));
        assert!(domain.stop(&with_x(&xy(), 3), [&wide]));
        assert!(!domain.stop(&with_x(&xy(), 7), [&wide]));
        assert!(domain.stop(&OctagonState::bottom(), std::iter::empty()));
    }

    #[test]
    fn test_join_many() {
        let domain = OctagonDomain::default();
        let joined = domain.join_many([with_x(&xy(), 2), with_x(&xy(), -2), with_x(&xy(), 0)]);
        assert_eq!(joined.bounds("main::x"), Interval::range(-2, 2));
    }
}
