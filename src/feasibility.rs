//! Feasibility of error paths under the octagon abstraction.
//!
//! A path is a sequence of CFA edges. It is infeasible when some edge leaves no
//! abstract successor. For infeasible paths, [`FeasibilityChecker::precision_increment`]
//! names the variables a refined precision has to track to rule the path out again.

use std::collections::BTreeSet;

use log::{debug, info};

use crate::analysis::ShutdownNotifier;
use crate::cfa::{CfaEdge, Declaration, EdgeKind, Expression, Statement};
use crate::error::TransferError;
use crate::options::OctagonOptions;
use crate::precision::{FullPrecision, OctagonPrecision, RefineablePrecision};
use crate::state::OctagonState;
use crate::transfer::OctagonTransferRelation;
use crate::types::qualified_name;

#[derive(Debug, Clone)]
pub struct FeasibilityResult {
    /// Whether every edge of the path has a successor. Interrupted checks report `true`.
    pub feasible: bool,
    pub interrupted: bool,
    /// Number of leading edges that still have successors.
    pub prefix_len: usize,
    /// States after the feasible prefix.
    pub states: Vec<OctagonState>,
}

impl FeasibilityResult {
    /// The longest prefix of `path` that still has successors.
    pub fn prefix<'p>(&self, path: &'p [CfaEdge]) -> &'p [CfaEdge] {
        &path[..self.prefix_len.min(path.len())]
    }

    /// The edge without successors, if the path is infeasible.
    pub fn failing_edge<'p>(&self, path: &'p [CfaEdge]) -> Option<&'p CfaEdge> {
        if self.feasible {
            None
        } else {
            path.get(self.prefix_len)
        }
    }
}

#[derive(Debug)]
pub struct FeasibilityChecker {
    transfer: OctagonTransferRelation,
    shutdown: ShutdownNotifier,
}

impl FeasibilityChecker {
    pub fn new(options: OctagonOptions) -> Self {
        FeasibilityChecker {
            transfer: OctagonTransferRelation::new(options),
            shutdown: ShutdownNotifier::new(),
        }
    }

    pub fn with_shutdown_notifier(mut self, shutdown: ShutdownNotifier) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Replays `path` from `initial`, tracking every variable.
    pub fn check(&self, path: &[CfaEdge], initial: &OctagonState) -> Result<FeasibilityResult, TransferError> {
        self.transfer.reset_temporaries();
        let mut states = vec![initial.clone()];
        for (i, edge) in path.iter().enumerate() {
            if self.shutdown.should_shutdown() {
                info!("Feasibility check interrupted after {} edge(s)", i);
                return Ok(FeasibilityResult {
                    feasible: true,
                    interrupted: true,
                    prefix_len: i,
                    states,
                });
            }
            let mut next = Vec::new();
            for state in &states {
                next.extend(self.transfer.get_abstract_successors(state, &FullPrecision, edge)?);
            }
            if next.is_empty() {
                debug!("Path is infeasible at edge {} ({})", i, edge);
                return Ok(FeasibilityResult {
                    feasible: false,
                    interrupted: false,
                    prefix_len: i,
                    states,
                });
            }
            states = next;
        }
        Ok(FeasibilityResult {
            feasible: true,
            interrupted: false,
            prefix_len: path.len(),
            states,
        })
    }

    /// Untracked variables that the infeasibility of `path` depends on.
    ///
    /// Starts from the variables of the failing edge and walks the path backwards,
    /// adding the variables of every assumption and definition that involves a variable
    /// already collected.
    pub fn precision_increment(
        &self,
        path: &[CfaEdge],
        result: &FeasibilityResult,
        precision: &RefineablePrecision,
    ) -> BTreeSet<String> {
        let Some(failing) = result.failing_edge(path) else {
            return BTreeSet::new();
        };
        let mut relevant = BTreeSet::new();
        collect_ids(failing, &mut relevant);
        for edge in result.prefix(path).iter().rev() {
            self.collect_dependencies(edge, &mut relevant);
        }
        relevant.into_iter().filter(|name| !precision.is_tracked(name)).collect()
    }

    fn collect_dependencies(&self, edge: &CfaEdge, relevant: &mut BTreeSet<String>) {
        let function = edge.function();
        let retval = |f: &str| qualified_name(f, &self.transfer.options().return_var_name, false);
        match &edge.kind {
            EdgeKind::Assume { expression, .. } => {
                let ids = ids_of(expression, function);
                if ids.iter().any(|id| relevant.contains(id)) {
                    relevant.extend(ids);
                }
            }
            EdgeKind::Declaration(Declaration::Variable(v)) => {
                let name = qualified_name(function, &v.name, v.is_global);
                match &v.initializer {
                    Some(init) if relevant.contains(&name) => relevant.extend(ids_of(init, function)),
                    _ => {}
                }
            }
            EdgeKind::Statement(Statement::ExpressionAssignment {
                lhs: Expression::Id(id),
                rhs,
            }) => {
                if relevant.contains(&qualified_name(function, &id.name, id.is_global)) {
                    relevant.extend(ids_of(rhs, function));
                }
            }
            EdgeKind::Return(Some(expression)) => {
                if relevant.contains(&retval(function)) {
                    relevant.extend(ids_of(expression, function));
                }
            }
            EdgeKind::FunctionCall {
                callee,
                arguments,
                parameters,
                ..
            } => {
                for (parameter, argument) in parameters.iter().zip(arguments) {
                    if relevant.contains(&qualified_name(callee, &parameter.name, false)) {
                        relevant.extend(ids_of(argument, function));
                    }
                }
            }
            EdgeKind::FunctionReturn {
                callee,
                lhs: Some(Expression::Id(id)),
                ..
            } => {
                if relevant.contains(&qualified_name(&edge.successor.function, &id.name, id.is_global)) {
                    relevant.insert(retval(callee));
                }
            }
            EdgeKind::Multi(edges) => {
                for inner in edges.iter().rev() {
                    self.collect_dependencies(inner, relevant);
                }
            }
            _ => {}
        }
    }
}

fn ids_of(expression: &Expression, function: &str) -> Vec<String> {
    let mut ids = Vec::new();
    expression.for_each_id(&mut |id| ids.push(qualified_name(function, &id.name, id.is_global)));
    ids
}

/// Variables read by the payload of `edge`.
fn collect_ids(edge: &CfaEdge, out: &mut BTreeSet<String>) {
    let function = edge.function();
    match &edge.kind {
        EdgeKind::Assume { expression, .. } | EdgeKind::Return(Some(expression)) => {
            out.extend(ids_of(expression, function));
        }
        EdgeKind::Statement(Statement::ExpressionAssignment { rhs, .. }) => out.extend(ids_of(rhs, function)),
        EdgeKind::Declaration(Declaration::Variable(v)) => {
            if let Some(init) = &v.initializer {
                out.extend(ids_of(init, function));
            }
        }
        EdgeKind::FunctionCall { arguments, .. } => {
            for argument in arguments {
                out.extend(ids_of(argument, function));
            }
        }
        EdgeKind::Multi(edges) => {
            for inner in edges {
                collect_ids(inner, out);
            }
        }
        _ => {}
    }
}
