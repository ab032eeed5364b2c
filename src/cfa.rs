//! Control-flow automata: the read-only program model the analysis consumes.
//!
//! A [`Cfa`] is a graph of [`CfaNode`]s connected by [`CfaEdge`]s. Each edge carries a
//! syntactic payload ([`EdgeKind`]) built from [`Expression`]s, [`Statement`]s and
//! [`Declaration`]s over a small C-like type system ([`CType`]).
//!
//! The model is intentionally thin: no parsing and no type checking happen here.
//! Frontends (or tests) build automata directly with [`CfaBuilder`].
//!
//! # Example
//!
//! ```rust
//! use octagon_rs::cfa::{CType, CfaBuilder, EdgeKind, Expression, Declaration};
//!
//! let mut builder = CfaBuilder::new();
//! let entry = builder.node("main");
//! let exit = builder.node("main");
//! builder.edge(
//!     entry,
//!     exit,
//!     EdgeKind::Declaration(Declaration::variable("x", CType::int(), false, Some(Expression::int(5)))),
//! );
//! let cfa = builder.build(entry);
//! assert_eq!(cfa.leaving_edges(entry).count(), 1);
//! ```

use std::fmt;

use num_bigint::BigInt;

/// Basic arithmetic types of the C-like language.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BasicType {
    Bool,
    Char,
    Short,
    Int,
    Long,
    LongLong,
    Float,
    Double,
    LongDouble,
}

impl BasicType {
    pub fn is_floating(self) -> bool {
        matches!(self, BasicType::Float | BasicType::Double | BasicType::LongDouble)
    }
}

/// Arithmetic type with signedness.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SimpleType {
    pub basic: BasicType,
    pub signed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CType {
    Simple(SimpleType),
    Pointer(Box<CType>),
    Array(Box<CType>, Option<usize>),
    /// Struct or union, by tag.
    Composite(String),
    Void,
}

impl CType {
    pub fn simple(basic: BasicType, signed: bool) -> Self {
        CType::Simple(SimpleType { basic, signed })
    }

    pub fn int() -> Self {
        CType::simple(BasicType::Int, true)
    }

    pub fn unsigned_int() -> Self {
        CType::simple(BasicType::Int, false)
    }

    pub fn double() -> Self {
        CType::simple(BasicType::Double, true)
    }

    pub fn as_simple(&self) -> Option<SimpleType> {
        match self {
            CType::Simple(s) => Some(*s),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.as_simple().is_some_and(|s| !s.basic.is_floating())
    }

    pub fn is_floating(&self) -> bool {
        self.as_simple().is_some_and(|s| s.basic.is_floating())
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CType::Simple(s) => {
                if !s.signed {
                    write!(f, "unsigned ")?;
                }
                write!(f, "{:?}", s.basic)
            }
            CType::Pointer(inner) => write!(f, "{}*", inner),
            CType::Array(inner, Some(n)) => write!(f, "{}[{}]", inner, n),
            CType::Array(inner, None) => write!(f, "{}[]", inner),
            CType::Composite(tag) => write!(f, "struct {}", tag),
            CType::Void => write!(f, "void"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Minus,
    Not,
    Tilde,
    Amper,
    Star,
    SizeOf,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    ShiftLeft,
    ShiftRight,
    BinaryAnd,
    BinaryOr,
    BinaryXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::BinaryAnd => "&",
            BinaryOp::BinaryOr => "|",
            BinaryOp::BinaryXor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(BigInt),
    Float(f64),
    Char(char),
    String(String),
}

/// Reference to a declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct IdExpression {
    pub name: String,
    pub is_global: bool,
    pub ty: CType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallExpression {
    pub function: String,
    pub arguments: Vec<Expression>,
    /// Declared return type of the callee.
    pub ty: CType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Id(IdExpression),
    FieldReference {
        owner: Box<Expression>,
        field: String,
        is_pointer: bool,
        ty: CType,
    },
    ArraySubscript {
        array: Box<Expression>,
        subscript: Box<Expression>,
        ty: CType,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
        ty: CType,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
        ty: CType,
    },
    Literal(Literal),
    Cast {
        operand: Box<Expression>,
        ty: CType,
    },
    FunctionCall(FunctionCallExpression),
}

/// Visitor dispatch over expression shapes.
pub trait ExpressionVisitor {
    type Output;

    fn visit_id(&mut self, id: &IdExpression) -> Self::Output;
    fn visit_field_reference(&mut self, owner: &Expression, field: &str, ty: &CType) -> Self::Output;
    fn visit_array_subscript(&mut self, array: &Expression, subscript: &Expression, ty: &CType) -> Self::Output;
    fn visit_unary(&mut self, op: UnaryOp, operand: &Expression, ty: &CType) -> Self::Output;
    fn visit_binary(&mut self, op: BinaryOp, left: &Expression, right: &Expression, ty: &CType) -> Self::Output;
    fn visit_literal(&mut self, literal: &Literal) -> Self::Output;
    fn visit_cast(&mut self, operand: &Expression, ty: &CType) -> Self::Output;
    fn visit_function_call(&mut self, call: &FunctionCallExpression) -> Self::Output;
}

impl Expression {
    pub fn accept<V: ExpressionVisitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Expression::Id(id) => visitor.visit_id(id),
            Expression::FieldReference { owner, field, ty, .. } => visitor.visit_field_reference(owner, field, ty),
            Expression::ArraySubscript { array, subscript, ty } => visitor.visit_array_subscript(array, subscript, ty),
            Expression::Unary { op, operand, ty } => visitor.visit_unary(*op, operand, ty),
            Expression::Binary { op, left, right, ty } => visitor.visit_binary(*op, left, right, ty),
            Expression::Literal(literal) => visitor.visit_literal(literal),
            Expression::Cast { operand, ty } => visitor.visit_cast(operand, ty),
            Expression::FunctionCall(call) => visitor.visit_function_call(call),
        }
    }

    pub fn ty(&self) -> CType {
        match self {
            Expression::Id(id) => id.ty.clone(),
            Expression::FieldReference { ty, .. }
            | Expression::ArraySubscript { ty, .. }
            | Expression::Unary { ty, .. }
            | Expression::Binary { ty, .. }
            | Expression::Cast { ty, .. } => ty.clone(),
            Expression::Literal(Literal::Integer(_)) => CType::int(),
            Expression::Literal(Literal::Float(_)) => CType::double(),
            Expression::Literal(Literal::Char(_)) => CType::simple(BasicType::Char, true),
            Expression::Literal(Literal::String(_)) => {
                CType::Pointer(Box::new(CType::simple(BasicType::Char, true)))
            }
            Expression::FunctionCall(call) => call.ty.clone(),
        }
    }

    pub fn int(value: impl Into<BigInt>) -> Self {
        Expression::Literal(Literal::Integer(value.into()))
    }

    pub fn float(value: f64) -> Self {
        Expression::Literal(Literal::Float(value))
    }

    /// Local variable of type `int`.
    pub fn var(name: &str) -> Self {
        Expression::id(name, CType::int(), false)
    }

    pub fn id(name: &str, ty: CType, is_global: bool) -> Self {
        Expression::Id(IdExpression {
            name: name.to_string(),
            is_global,
            ty,
        })
    }

    /// Binary expression typed after the left operand (or `int` for relations).
    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        let ty = if op.is_relational() { CType::int() } else { left.ty() };
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty,
        }
    }

    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        let ty = match op {
            UnaryOp::Not => CType::int(),
            UnaryOp::Amper => CType::Pointer(Box::new(operand.ty())),
            UnaryOp::SizeOf => CType::simple(BasicType::Long, false),
            UnaryOp::Star => match operand.ty() {
                CType::Pointer(inner) | CType::Array(inner, _) => *inner,
                other => other,
            },
            UnaryOp::Minus | UnaryOp::Tilde => operand.ty(),
        };
        Expression::Unary {
            op,
            operand: Box::new(operand),
            ty,
        }
    }

    pub fn cast(operand: Expression, ty: CType) -> Self {
        Expression::Cast {
            operand: Box::new(operand),
            ty,
        }
    }

    pub fn call(function: &str, arguments: Vec<Expression>, ty: CType) -> Self {
        Expression::FunctionCall(FunctionCallExpression {
            function: function.to_string(),
            arguments,
            ty,
        })
    }

    /// Calls `f` on every identifier in the expression.
    pub fn for_each_id<F: FnMut(&IdExpression)>(&self, f: &mut F) {
        match self {
            Expression::Id(id) => f(id),
            Expression::FieldReference { owner, .. } => owner.for_each_id(f),
            Expression::ArraySubscript { array, subscript, .. } => {
                array.for_each_id(f);
                subscript.for_each_id(f);
            }
            Expression::Unary { operand, .. } | Expression::Cast { operand, .. } => operand.for_each_id(f),
            Expression::Binary { left, right, .. } => {
                left.for_each_id(f);
                right.for_each_id(f);
            }
            Expression::Literal(_) => {}
            Expression::FunctionCall(call) => call.arguments.iter().for_each(|a| a.for_each_id(f)),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Id(id) => write!(f, "{}", id.name),
            Expression::FieldReference {
                owner,
                field,
                is_pointer,
                ..
            } => write!(f, "{}{}{}", owner, if *is_pointer { "->" } else { "." }, field),
            Expression::ArraySubscript { array, subscript, .. } => write!(f, "{}[{}]", array, subscript),
            Expression::Unary { op, operand, .. } => {
                let s = match op {
                    UnaryOp::Minus => "-",
                    UnaryOp::Not => "!",
                    UnaryOp::Tilde => "~",
                    UnaryOp::Amper => "&",
                    UnaryOp::Star => "*",
                    UnaryOp::SizeOf => "sizeof ",
                };
                write!(f, "{}{}", s, operand)
            }
            Expression::Binary { op, left, right, .. } => write!(f, "({} {} {})", left, op, right),
            Expression::Literal(Literal::Integer(v)) => write!(f, "{}", v),
            Expression::Literal(Literal::Float(v)) => write!(f, "{}", v),
            Expression::Literal(Literal::Char(c)) => write!(f, "{:?}", c),
            Expression::Literal(Literal::String(s)) => write!(f, "{:?}", s),
            Expression::Cast { operand, ty } => write!(f, "({}) {}", ty, operand),
            Expression::FunctionCall(call) => {
                let args: Vec<String> = call.arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", call.function, args.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `lhs = rhs;`
    ExpressionAssignment { lhs: Expression, rhs: Expression },
    /// `lhs = f(args);` where `f` has no body in the automaton.
    FunctionCallAssignment { lhs: Expression, call: FunctionCallExpression },
    /// `f(args);` where `f` has no body in the automaton.
    FunctionCall(FunctionCallExpression),
    /// Expression evaluated for side effects only.
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub name: String,
    pub ty: CType,
    pub is_global: bool,
    pub initializer: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Variable(VariableDeclaration),
    Function { name: String },
    Type { name: String },
}

impl Declaration {
    pub fn variable(name: &str, ty: CType, is_global: bool, initializer: Option<Expression>) -> Self {
        Declaration::Variable(VariableDeclaration {
            name: name.to_string(),
            ty,
            is_global,
            initializer,
        })
    }
}

/// Formal parameter of a function.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: CType,
}

impl Parameter {
    pub fn new(name: &str, ty: CType) -> Self {
        Parameter {
            name: name.to_string(),
            ty,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CfaNode {
    pub id: NodeId,
    pub function: String,
    pub is_loop_start: bool,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EdgeKind {
    Blank,
    /// Branch condition, taken when `expression` evaluates to `truth`.
    Assume { expression: Expression, truth: bool },
    Declaration(Declaration),
    Statement(Statement),
    /// `return e;` inside a function body.
    Return(Option<Expression>),
    /// Call into a function with a body.
    FunctionCall {
        callee: String,
        arguments: Vec<Expression>,
        parameters: Vec<Parameter>,
        return_type: CType,
    },
    /// Back from `callee` to the caller, assigning the result to `lhs` if any.
    ///
    /// `return_type` is the declared return type of `callee`.
    FunctionReturn {
        callee: String,
        lhs: Option<Expression>,
        return_type: CType,
    },
    /// Summary edge bypassing a call.
    CallToReturn,
    /// Sequence of elementary edges.
    Multi(Vec<CfaEdge>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CfaEdge {
    pub predecessor: CfaNode,
    pub successor: CfaNode,
    pub line: u32,
    pub kind: EdgeKind,
}

impl CfaEdge {
    /// Function the edge's payload is evaluated in.
    pub fn function(&self) -> &str {
        &self.predecessor.function
    }
}

impl fmt::Display for CfaEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} (line {}): ", self.predecessor.id, self.successor.id, self.line)?;
        match &self.kind {
            EdgeKind::Blank => write!(f, "skip"),
            EdgeKind::Assume { expression, truth } => {
                if *truth {
                    write!(f, "[{}]", expression)
                } else {
                    write!(f, "[!{}]", expression)
                }
            }
            EdgeKind::Declaration(Declaration::Variable(v)) => match &v.initializer {
                Some(init) => write!(f, "{} {} = {};", v.ty, v.name, init),
                None => write!(f, "{} {};", v.ty, v.name),
            },
            EdgeKind::Declaration(Declaration::Function { name }) => write!(f, "declare function {}", name),
            EdgeKind::Declaration(Declaration::Type { name }) => write!(f, "declare type {}", name),
            EdgeKind::Statement(Statement::ExpressionAssignment { lhs, rhs }) => write!(f, "{} = {};", lhs, rhs),
            EdgeKind::Statement(Statement::FunctionCallAssignment { lhs, call }) => {
                write!(f, "{} = {};", lhs, Expression::FunctionCall(call.clone()))
            }
            EdgeKind::Statement(Statement::FunctionCall(call)) => {
                write!(f, "{};", Expression::FunctionCall(call.clone()))
            }
            EdgeKind::Statement(Statement::Expression(e)) => write!(f, "{};", e),
            EdgeKind::Return(Some(e)) => write!(f, "return {};", e),
            EdgeKind::Return(None) => write!(f, "return;"),
            EdgeKind::FunctionCall { callee, .. } => write!(f, "call {}", callee),
            EdgeKind::FunctionReturn { callee, .. } => write!(f, "return from {}", callee),
            EdgeKind::CallToReturn => write!(f, "call-to-return summary"),
            EdgeKind::Multi(edges) => write!(f, "multi edge of {} steps", edges.len()),
        }
    }
}

/// Control-flow automaton.
#[derive(Debug, Clone)]
pub struct Cfa {
    nodes: Vec<CfaNode>,
    edges: Vec<CfaEdge>,
    leaving: Vec<Vec<usize>>,
    entry: NodeId,
}

impl Cfa {
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn node(&self, id: NodeId) -> &CfaNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CfaNode> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &CfaEdge> {
        self.edges.iter()
    }

    pub fn leaving_edges(&self, id: NodeId) -> impl Iterator<Item = &CfaEdge> {
        self.leaving[id.0].iter().map(move |&e| &self.edges[e])
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
}

struct PendingEdge {
    from: NodeId,
    to: NodeId,
    line: u32,
    kinds: Vec<EdgeKind>,
}

/// Incremental construction of a [`Cfa`].
#[derive(Default)]
pub struct CfaBuilder {
    nodes: Vec<CfaNode>,
    edges: Vec<PendingEdge>,
    line: u32,
}

impl CfaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&mut self, function: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(CfaNode {
            id,
            function: function.to_string(),
            is_loop_start: false,
            is_error: false,
        });
        id
    }

    pub fn loop_start(&mut self, function: &str) -> NodeId {
        let id = self.node(function);
        self.nodes[id.0].is_loop_start = true;
        id
    }

    pub fn error_node(&mut self, function: &str) -> NodeId {
        let id = self.node(function);
        self.nodes[id.0].is_error = true;
        id
    }

    pub fn edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> &mut Self {
        self.line += 1;
        self.edges.push(PendingEdge {
            from,
            to,
            line: self.line,
            kinds: vec![kind],
        });
        self
    }

    /// Bundles several elementary steps into one multi edge.
    pub fn multi_edge(&mut self, from: NodeId, to: NodeId, kinds: Vec<EdgeKind>) -> &mut Self {
        self.line += 1;
        self.edges.push(PendingEdge {
            from,
            to,
            line: self.line,
            kinds,
        });
        self
    }

    /// Finishes the automaton; node flags are frozen into the edges.
    pub fn build(self, entry: NodeId) -> Cfa {
        let mut leaving = vec![Vec::new(); self.nodes.len()];
        let mut edges = Vec::with_capacity(self.edges.len());
        for pending in self.edges {
            let predecessor = self.nodes[pending.from.0].clone();
            let successor = self.nodes[pending.to.0].clone();
            let mut kinds = pending.kinds;
            let kind = if kinds.len() == 1 {
                kinds.remove(0)
            } else {
                EdgeKind::Multi(
                    kinds
                        .into_iter()
                        .map(|kind| CfaEdge {
                            predecessor: predecessor.clone(),
                            successor: successor.clone(),
                            line: pending.line,
                            kind,
                        })
                        .collect(),
                )
            };
            leaving[pending.from.0].push(edges.len());
            edges.push(CfaEdge {
                predecessor,
                successor,
                line: pending.line,
                kind,
            });
        }
        Cfa {
            nodes: self.nodes,
            edges,
            leaving,
            entry,
        }
    }

    /// Edge that is not registered in any automaton; handy for path checks and tests.
    pub fn detached_edge(function: &str, kind: EdgeKind) -> CfaEdge {
        let node = CfaNode {
            id: NodeId(0),
            function: function.to_string(),
            is_loop_start: false,
            is_error: false,
        };
        CfaEdge {
            predecessor: node.clone(),
            successor: node,
            line: 0,
            kind,
        }
    }
}
