//! Property tests: abstract states never lose a concrete point that satisfies what was assumed.

use std::collections::HashMap;

use num_bigint::BigInt;
use octagon_rs::coefficients::Coefficients;
use octagon_rs::state::{OctagonState, Relation};
use octagon_rs::types::NumericKind;
use proptest::prelude::*;

const NAMES: [&str; 3] = ["main::a", "main::b", "main::c"];

/// `x[lhs] REL x[rhs] + k`, or `x[lhs] REL k` when both sides name the same variable.
#[derive(Debug, Clone)]
struct Atom {
    lhs: usize,
    rhs: usize,
    relation: Relation,
    k: i64,
}

impl Atom {
    fn holds(&self, p: &[i64; 3]) -> bool {
        let l = p[self.lhs];
        let r = if self.lhs == self.rhs { self.k } else { p[self.rhs] + self.k };
        match self.relation {
            Relation::Eq => l == r,
            Relation::Ne => l != r,
            Relation::Lt => l < r,
            Relation::Le => l <= r,
            Relation::Gt => l > r,
            Relation::Ge => l >= r,
        }
    }

    fn apply(&self, state: &OctagonState) -> Vec<OctagonState> {
        let n = state.size();
        let lhs = Coefficients::variable(n, self.lhs);
        let k = Coefficients::constant(n, self.k);
        let rhs = if self.lhs == self.rhs { k } else { Coefficients::variable(n, self.rhs).add(&k) };
        state.add_relation(&lhs, self.relation, &rhs)
    }
}

fn relation() -> impl Strategy<Value = Relation> {
    prop_oneof![
        Just(Relation::Eq),
        Just(Relation::Ne),
        Just(Relation::Lt),
        Just(Relation::Le),
        Just(Relation::Gt),
        Just(Relation::Ge),
    ]
}

fn atom() -> impl Strategy<Value = Atom> {
    (0usize..3, 0usize..3, relation(), -6i64..=6).prop_map(|(lhs, rhs, relation, k)| Atom { lhs, rhs, relation, k })
}

fn start() -> OctagonState {
    NAMES
        .iter()
        .fold(OctagonState::new(), |s, n| s.declare_variable(n, NumericKind::Int))
}

fn as_map(p: &[i64; 3]) -> HashMap<String, BigInt> {
    NAMES.iter().zip(p).map(|(n, v)| (n.to_string(), BigInt::from(*v))).collect()
}

/// All branches reachable after applying the atoms in order.
fn constrain(atoms: &[Atom]) -> Vec<OctagonState> {
    atoms
        .iter()
        .fold(vec![start()], |states, a| states.iter().flat_map(|s| a.apply(s)).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn satisfying_points_are_contained(
        atoms in prop::collection::vec(atom(), 0..5),
        p in prop::array::uniform3(-8i64..=8),
    ) {
        prop_assume!(atoms.iter().all(|a| a.holds(&p)));
        let states = constrain(&atoms);
        let point = as_map(&p);
        prop_assert!(states.iter().any(|s| s.contains_point(&point)));
    }

    #[test]
    fn projection_keeps_contained_points(
        atoms in prop::collection::vec(atom(), 0..5),
        p in prop::array::uniform3(-8i64..=8),
        dropped in 0usize..3,
    ) {
        let point = as_map(&p);
        for s in constrain(&atoms).iter().filter(|s| s.contains_point(&point)) {
            let projected = s.project_out(NAMES[dropped]);
            let mut rest = point.clone();
            rest.remove(NAMES[dropped]);
            prop_assert!(projected.contains_point(&rest));
        }
    }

    #[test]
    fn assignment_keeps_the_image_point(
        atoms in prop::collection::vec(atom(), 0..4),
        p in prop::array::uniform3(-8i64..=8),
        target in 0usize..3,
        scale in prop::array::uniform3(-2i64..=2),
        offset in -5i64..=5,
    ) {
        let point = as_map(&p);
        let n = NAMES.len();
        let rhs = (0..n).fold(Coefficients::constant(n, offset), |acc, i| {
            acc.add(&Coefficients::variable(n, i).mul(&Coefficients::constant(n, scale[i])))
        });
        let mut image = p;
        image[target] = (0..n).map(|i| scale[i] * p[i]).sum::<i64>() + offset;
        let image = as_map(&image);

        for s in constrain(&atoms).iter().filter(|s| s.contains_point(&point)) {
            let after = s.make_assignment(NAMES[target], &rhs);
            prop_assert!(after.contains_point(&image));
        }
    }
}
