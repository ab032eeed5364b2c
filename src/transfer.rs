//! Transfer relation: abstract successors of an octagon state along one CFA edge.
//!
//! Every edge maps one state to zero or more states. An empty result means the edge is
//! infeasible from the given state. Expressions the octagon cannot express never fail:
//! assumptions over them keep the state, assignments from them forget the target.

use std::any::Any;

use log::{debug, trace};
use num_traits::Zero;

use crate::cfa::{
    BinaryOp, CType, CfaEdge, Declaration, EdgeKind, Expression, FunctionCallExpression, Literal, Parameter, Statement,
    UnaryOp,
};
use crate::coefficients::Coefficients;
use crate::error::TransferError;
use crate::options::OctagonOptions;
use crate::precision::OctagonPrecision;
use crate::state::{OctagonState, Relation};
use crate::types::{is_local_of, qualified_name};
use crate::visitor::{fit_to_type, numeric_kind, Branches, CoefficientVisitor, TempAllocator};

const THREAD_CREATE: &str = "pthread_create";

fn relation_of(op: BinaryOp) -> Option<Relation> {
    match op {
        BinaryOp::Eq => Some(Relation::Eq),
        BinaryOp::Ne => Some(Relation::Ne),
        BinaryOp::Lt => Some(Relation::Lt),
        BinaryOp::Le => Some(Relation::Le),
        BinaryOp::Gt => Some(Relation::Gt),
        BinaryOp::Ge => Some(Relation::Ge),
        _ => None,
    }
}

#[derive(Debug)]
pub struct OctagonTransferRelation {
    options: OctagonOptions,
    temps: TempAllocator,
}

impl OctagonTransferRelation {
    pub fn new(options: OctagonOptions) -> Self {
        let temps = TempAllocator::new(options.temp_var_prefix.clone());
        OctagonTransferRelation { options, temps }
    }

    pub fn options(&self) -> &OctagonOptions {
        &self.options
    }

    /// Restarts temporary numbering; call between analysis runs.
    pub fn reset_temporaries(&self) {
        self.temps.reset();
    }

    /// Abstract successors of `state` along `edge`.
    ///
    /// The result never contains an empty state. Temporaries introduced while evaluating the
    /// edge are projected out, and every successor carries the loop-head marker of the edge's
    /// target.
    pub fn get_abstract_successors(
        &self,
        state: &OctagonState,
        precision: &dyn OctagonPrecision,
        edge: &CfaEdge,
    ) -> Result<Vec<OctagonState>, TransferError> {
        debug!("get_abstract_successors(edge = {})", edge);
        if state.is_empty() {
            return Ok(Vec::new());
        }
        let prefix = self.temps.prefix();
        let successors = self
            .successors_of(state, precision, edge)?
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.remove_temp_vars(&edge.predecessor.function, prefix)
                    .remove_temp_vars(&edge.successor.function, prefix)
                    .with_loop_head(edge.successor.is_loop_start)
            })
            .collect::<Vec<_>>();
        trace!("{} successor(s) along {}", successors.len(), edge);
        Ok(successors)
    }

    /// Cross-analysis refinement hook. `others` holds the states of the analyses running
    /// alongside this one. The octagon domain takes nothing from them and returns `state`
    /// unchanged.
    pub fn strengthen(
        &self,
        state: &OctagonState,
        _others: &[&dyn Any],
        _edge: &CfaEdge,
        _precision: &dyn OctagonPrecision,
    ) -> Vec<OctagonState> {
        vec![state.clone()]
    }

    fn successors_of(
        &self,
        state: &OctagonState,
        precision: &dyn OctagonPrecision,
        edge: &CfaEdge,
    ) -> Result<Vec<OctagonState>, TransferError> {
        match &edge.kind {
            EdgeKind::Blank => Ok(vec![state.clone()]),
            EdgeKind::Assume { expression, truth } => self.handle_assumption(state, precision, edge, expression, *truth),
            EdgeKind::Declaration(declaration) => self.handle_declaration(state, precision, edge, declaration),
            EdgeKind::Statement(statement) => self.handle_statement(state, precision, edge, statement),
            EdgeKind::Return(expression) => self.handle_return(state, precision, edge, expression.as_ref()),
            EdgeKind::FunctionCall {
                callee,
                arguments,
                parameters,
                return_type,
            } => self.handle_function_call(state, precision, edge, callee, arguments, parameters, return_type),
            EdgeKind::FunctionReturn {
                callee,
                lhs,
                return_type,
            } => self.handle_function_return(state, precision, edge, callee, lhs.as_ref(), return_type),
            EdgeKind::CallToReturn => Err(TransferError::UnrecognizedEdge { edge: edge.to_string() }),
            EdgeKind::Multi(edges) => {
                let mut states = vec![state.clone()];
                for inner in edges {
                    let mut next = Vec::new();
                    for s in &states {
                        next.extend(self.successors_of(s, precision, inner)?.into_iter().filter(|s| !s.is_empty()));
                    }
                    if next.is_empty() {
                        return Ok(next);
                    }
                    states = next;
                }
                Ok(states)
            }
        }
    }

    fn visitor<'a>(
        &'a self,
        state: &OctagonState,
        function: &'a str,
        precision: &'a dyn OctagonPrecision,
        edge: &'a CfaEdge,
    ) -> CoefficientVisitor<'a> {
        CoefficientVisitor::new(state.clone(), function, precision, &self.options, &self.temps, edge)
    }

    fn evaluate(
        &self,
        state: &OctagonState,
        function: &str,
        precision: &dyn OctagonPrecision,
        edge: &CfaEdge,
        expression: &Expression,
    ) -> Result<Branches, TransferError> {
        self.visitor(state, function, precision, edge).evaluate(expression)
    }

    fn handle_assumption(
        &self,
        state: &OctagonState,
        precision: &dyn OctagonPrecision,
        edge: &CfaEdge,
        expression: &Expression,
        truth: bool,
    ) -> Result<Vec<OctagonState>, TransferError> {
        let keep_if = |holds: bool| if holds { vec![state.clone()] } else { Vec::new() };
        match expression {
            Expression::Literal(Literal::Integer(v)) => Ok(keep_if(!v.is_zero() == truth)),
            Expression::Literal(Literal::Char(c)) => Ok(keep_if((*c != '\0') == truth)),
            Expression::Literal(Literal::Float(v)) => Ok(keep_if((*v != 0.0) == truth)),
            Expression::Literal(Literal::String(_)) => Ok(keep_if(truth)),
            Expression::Unary {
                op: UnaryOp::Not,
                operand,
                ..
            } => self.handle_assumption(state, precision, edge, operand, !truth),
            Expression::FunctionCall(call) => Err(TransferError::UnrecognizedCode {
                message: format!("function call `{}` used as a condition", call.function),
                edge: edge.to_string(),
            }),
            Expression::Binary { op, left, right, .. } if op.is_relational() => {
                let Some(relation) = relation_of(*op) else {
                    return Err(TransferError::UnrecognizedCode {
                        message: format!("operator `{}` in a condition", op),
                        edge: edge.to_string(),
                    });
                };
                let relation = if truth { relation } else { relation.negate() };
                let function = edge.function();
                let mut result = Vec::new();
                for (lc, ls) in self.evaluate(state, function, precision, edge, left)? {
                    if lc.is_empty() {
                        result.push(ls);
                        continue;
                    }
                    for (rc, rs) in self.evaluate(&ls, function, precision, edge, right)? {
                        if rc.is_empty() {
                            result.push(rs);
                            continue;
                        }
                        let lc = lc.expand_to_size(rs.size());
                        result.extend(rs.add_relation(&lc, relation, &rc));
                    }
                }
                Ok(result)
            }
            _ => {
                // `e` holds iff `e != 0`
                let relation = if truth { Relation::Ne } else { Relation::Eq };
                let mut result = Vec::new();
                for (c, s) in self.evaluate(state, edge.function(), precision, edge, expression)? {
                    if c.is_empty() {
                        result.push(s);
                    } else {
                        let zero = Coefficients::constant(s.size(), 0);
                        result.extend(s.add_relation(&c, relation, &zero));
                    }
                }
                Ok(result)
            }
        }
    }

    /// `name := expression`, evaluated in `function`, with the value clamped to `ty`.
    #[allow(clippy::too_many_arguments)]
    fn assign_expression(
        &self,
        state: &OctagonState,
        precision: &dyn OctagonPrecision,
        edge: &CfaEdge,
        function: &str,
        name: &str,
        ty: &CType,
        expression: &Expression,
    ) -> Result<Vec<OctagonState>, TransferError> {
        let machine = self.options.machine_model;
        Ok(self
            .evaluate(state, function, precision, edge, expression)?
            .into_iter()
            .map(|(c, s)| {
                let c = fit_to_type(&c, &s, ty, machine);
                s.make_assignment(name, &c)
            })
            .collect())
    }

    /// `state` with `name` declared, or `None` when the variable is not tracked.
    fn tracked_target(
        &self,
        state: &OctagonState,
        precision: &dyn OctagonPrecision,
        name: &str,
        ty: &CType,
    ) -> Option<OctagonState> {
        let kind = numeric_kind(ty, self.options.track_float_variables);
        match kind {
            Some(kind) if precision.is_tracked(name) => Some(state.declare_variable(name, kind)),
            _ => {
                assert!(
                    !state.contains_variable(name),
                    "untracked variable `{}` found in the octagon state",
                    name
                );
                None
            }
        }
    }

    fn handle_declaration(
        &self,
        state: &OctagonState,
        precision: &dyn OctagonPrecision,
        edge: &CfaEdge,
        declaration: &Declaration,
    ) -> Result<Vec<OctagonState>, TransferError> {
        let Declaration::Variable(variable) = declaration else {
            return Ok(vec![state.clone()]);
        };
        let function = edge.function();
        let name = qualified_name(function, &variable.name, variable.is_global);
        let Some(kind) = numeric_kind(&variable.ty, self.options.track_float_variables) else {
            return Ok(vec![state.clone()]);
        };
        if !precision.is_tracked(&name) {
            return Ok(vec![state.clone()]);
        }

        // re-declaration inside a loop body starts from an unknown value
        let state = if state.contains_variable(&name) {
            state.forget(&name)
        } else {
            state.declare_variable(&name, kind)
        };

        match &variable.initializer {
            Some(init) => self.assign_expression(&state, precision, edge, function, &name, &variable.ty, init),
            None if variable.is_global => {
                let zero = Coefficients::constant(state.size(), 0);
                Ok(vec![state.make_assignment(&name, &zero)])
            }
            None => Ok(vec![state]),
        }
    }

    fn handle_statement(
        &self,
        state: &OctagonState,
        precision: &dyn OctagonPrecision,
        edge: &CfaEdge,
        statement: &Statement,
    ) -> Result<Vec<OctagonState>, TransferError> {
        match statement {
            Statement::ExpressionAssignment { lhs, rhs } => self.handle_assignment(state, precision, edge, lhs, rhs),
            Statement::FunctionCallAssignment { lhs, call } => {
                let rhs = Expression::FunctionCall(call.clone());
                self.handle_assignment(state, precision, edge, lhs, &rhs)
            }
            Statement::FunctionCall(call) => {
                self.check_supported(call, edge)?;
                Ok(vec![state.clone()])
            }
            Statement::Expression(_) => Ok(vec![state.clone()]),
        }
    }

    fn check_supported(&self, call: &FunctionCallExpression, edge: &CfaEdge) -> Result<(), TransferError> {
        if call.function == THREAD_CREATE {
            return Err(TransferError::UnsupportedFunction {
                function: call.function.clone(),
                reason: format!("threads are not supported ({})", edge),
            });
        }
        Ok(())
    }

    fn handle_assignment(
        &self,
        state: &OctagonState,
        precision: &dyn OctagonPrecision,
        edge: &CfaEdge,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<Vec<OctagonState>, TransferError> {
        if let Expression::FunctionCall(call) = rhs {
            self.check_supported(call, edge)?;
        }
        let Expression::Id(id) = lhs else {
            // writes through pointers, fields and arrays do not touch tracked scalars
            return Ok(vec![state.clone()]);
        };
        let function = edge.function();
        let name = qualified_name(function, &id.name, id.is_global);
        match self.tracked_target(state, precision, &name, &id.ty) {
            Some(state) => self.assign_expression(&state, precision, edge, function, &name, &id.ty, rhs),
            None => Ok(vec![state.clone()]),
        }
    }

    fn handle_return(
        &self,
        state: &OctagonState,
        precision: &dyn OctagonPrecision,
        edge: &CfaEdge,
        expression: Option<&Expression>,
    ) -> Result<Vec<OctagonState>, TransferError> {
        let function = edge.function();
        let Some(expression) = expression else {
            return Ok(vec![state.clone()]);
        };
        if function == self.options.entry_function {
            return Ok(vec![state.clone()]);
        }
        let name = qualified_name(function, &self.options.return_var_name, false);
        if !state.contains_variable(&name) {
            return Ok(vec![state.clone()]);
        }
        self.assign_expression(state, precision, edge, function, &name, &expression.ty(), expression)
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_function_call(
        &self,
        state: &OctagonState,
        precision: &dyn OctagonPrecision,
        edge: &CfaEdge,
        callee: &str,
        arguments: &[Expression],
        parameters: &[Parameter],
        return_type: &CType,
    ) -> Result<Vec<OctagonState>, TransferError> {
        if state.variable_names().any(|n| is_local_of(n, callee)) {
            return Err(TransferError::UnsupportedFunction {
                function: callee.to_string(),
                reason: "recursive calls are not supported".to_string(),
            });
        }
        if arguments.len() != parameters.len() {
            return Err(TransferError::UnrecognizedCode {
                message: format!(
                    "{} argument(s) passed to `{}` which takes {}",
                    arguments.len(),
                    callee,
                    parameters.len()
                ),
                edge: edge.to_string(),
            });
        }

        let caller = edge.function();
        let track_floats = self.options.track_float_variables;
        let mut states = vec![state.clone()];
        for (parameter, argument) in parameters.iter().zip(arguments) {
            let name = qualified_name(callee, &parameter.name, false);
            let Some(kind) = numeric_kind(&parameter.ty, track_floats) else {
                continue;
            };
            if !precision.is_tracked(&name) {
                continue;
            }
            let mut next = Vec::new();
            for s in &states {
                let s = s.declare_variable(&name, kind);
                next.extend(self.assign_expression(&s, precision, edge, caller, &name, &parameter.ty, argument)?);
            }
            states = next;
        }

        let retval = qualified_name(callee, &self.options.return_var_name, false);
        if let Some(kind) = numeric_kind(return_type, track_floats) {
            if precision.is_tracked(&retval) {
                states = states.iter().map(|s| s.declare_variable(&retval, kind)).collect();
            }
        }
        Ok(states)
    }

    fn handle_function_return(
        &self,
        state: &OctagonState,
        precision: &dyn OctagonPrecision,
        edge: &CfaEdge,
        callee: &str,
        lhs: Option<&Expression>,
        return_type: &CType,
    ) -> Result<Vec<OctagonState>, TransferError> {
        let caller = &edge.successor.function;
        let retval = qualified_name(callee, &self.options.return_var_name, false);
        let machine = self.options.machine_model;

        let state = match lhs {
            Some(Expression::Id(id)) => {
                let name = qualified_name(caller, &id.name, id.is_global);
                match self.tracked_target(state, precision, &name, &id.ty) {
                    Some(s) => match s.index_of(&retval) {
                        Some(slot) => {
                            // converted to the return type first, then to the type of `lhs`
                            let value = Coefficients::variable(s.size(), slot.index());
                            let value = fit_to_type(&value, &s, return_type, machine);
                            let value = fit_to_type(&value, &s, &id.ty, machine);
                            s.make_assignment(&name, &value)
                        }
                        None => s.forget(&name),
                    },
                    None => state.clone(),
                }
            }
            _ => state.clone(),
        };
        Ok(vec![state.remove_local_vars(callee)])
    }
}
