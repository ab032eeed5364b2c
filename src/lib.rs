//! # octagon-rs: Octagon Abstract Domain in Rust
//!
//! **`octagon-rs`** is a numeric abstract-interpretation engine built on the **octagon domain**.
//! It computes sound over-approximations of the integer and float values a C-like program can
//! produce, and uses them to prove error locations unreachable or to refute error paths.
//!
//! ## What is an Octagon?
//!
//! An octagon is a conjunction of constraints of the form `±x ± y ≤ c` over program variables.
//! It is stored as a difference-bound matrix over the doubled variable set `{+x, -x}` and kept
//! in **strongly closed** form, so every implied bound is explicit. Octagons capture relations
//! like `x - y ≤ 3` that interval analysis cannot express, at cubic cost in the number of variables.
//!
//! ## Key Features
//!
//! - **Immutable States**: [`OctagonState`][crate::state::OctagonState] is a value. Every mutator returns a new state and shares the matrix until it changes.
//! - **Linear Forms**: Expressions are linearized into [`Coefficients`][crate::coefficients::Coefficients], with an explicit "cannot compute" variant instead of guessing.
//! - **Branching Transfer**: One edge maps one state to zero or more states, so `≠` and relational sub-expressions split precisely.
//! - **Exact Arithmetic**: Bounds are arbitrary-precision integers; there is no overflow inside the domain.
//!
//! ## Basic Usage
//!
//! ```rust
//! use octagon_rs::cfa::{BinaryOp, CType, CfaBuilder, Declaration, EdgeKind, Expression};
//! use octagon_rs::precision::FullPrecision;
//! use octagon_rs::state::OctagonState;
//! use octagon_rs::transfer::OctagonTransferRelation;
//! use octagon_rs::options::OctagonOptions;
//!
//! let transfer = OctagonTransferRelation::new(OctagonOptions::default());
//!
//! // int x = 5;
//! let decl = CfaBuilder::detached_edge(
//!     "main",
//!     EdgeKind::Declaration(Declaration::variable("x", CType::int(), false, Some(Expression::int(5)))),
//! );
//! let states = transfer.get_abstract_successors(&OctagonState::new(), &FullPrecision, &decl).unwrap();
//!
//! // assume(x > 7) is infeasible
//! let cond = CfaBuilder::detached_edge(
//!     "main",
//!     EdgeKind::Assume {
//!         expression: Expression::binary(BinaryOp::Gt, Expression::var("x"), Expression::int(7)),
//!         truth: true,
//!     },
//! );
//! let next = transfer.get_abstract_successors(&states[0], &FullPrecision, &cond).unwrap();
//! assert!(next.is_empty());
//! ```
//!
//! ## Core Components
//!
//! - **[`octagon`]**: The difference-bound matrix, closure, and the lattice operations.
//! - **[`state`]**: Named variables on top of an octagon; assignments, constraints, and queries.
//! - **[`coefficients`]**: Linear forms with exact or interval coefficients.
//! - **[`visitor`]** and **[`transfer`]**: From CFA edges to abstract successors.
//! - **[`analysis`]** and **[`feasibility`]**: A worklist driver and an error-path checker.

pub mod analysis;
pub mod bound;
pub mod cfa;
pub mod coefficients;
pub mod domain;
pub mod error;
pub mod feasibility;
pub mod machine;
pub mod octagon;
pub mod options;
pub mod precision;
pub mod state;
pub mod transfer;
pub mod types;
pub mod visitor;
