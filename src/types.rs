///! Type-safe wrappers for octagon variable slots and numeric kinds.
///!
///! This module provides newtype wrappers that enforce compile-time distinction
///! between octagon slots and DBM node indices, preventing common mistakes in
///! matrix manipulation code.
use std::fmt;

/// Separator between a function name and a local variable name.
pub const SCOPE_SEPARATOR: &str = "::";

/// An octagon variable slot (0-indexed).
///
/// Slots are dense and contiguous: a state tracking `n` variables uses slots `0..n`.
/// Each slot owns two DBM nodes, see [`VarIndex::pos`] and [`VarIndex::neg`].
///
/// # Invariants
///
/// - Slots are stable for the lifetime of a state lineage, except when a variable
///   is removed: all slots above the removed one shift down by one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VarIndex(usize);

impl VarIndex {
    /// Creates a new slot with the given index.
    pub fn new(index: usize) -> Self {
        VarIndex(index)
    }

    /// Returns the raw slot index as a `usize`.
    pub fn index(self) -> usize {
        self.0
    }

    /// DBM node standing for `+x`.
    pub fn pos(self) -> usize {
        2 * self.0
    }

    /// DBM node standing for `-x`.
    pub fn neg(self) -> usize {
        2 * self.0 + 1
    }

    /// DBM node standing for `sign * x`.
    pub fn node(self, positive: bool) -> usize {
        if positive {
            self.pos()
        } else {
            self.neg()
        }
    }
}

impl fmt::Display for VarIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<VarIndex> for usize {
    fn from(var: VarIndex) -> Self {
        var.0
    }
}

impl From<usize> for VarIndex {
    fn from(index: usize) -> Self {
        VarIndex(index)
    }
}

/// Returns the node standing for the negation of node `a`.
///
/// Nodes come in pairs `2i` (`+x_i`) and `2i+1` (`-x_i`).
pub fn bar(a: usize) -> usize {
    a ^ 1
}

/// Declared numeric kind of a tracked variable.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NumericKind {
    Int,
    Float,
}

impl NumericKind {
    pub fn is_int(self) -> bool {
        matches!(self, NumericKind::Int)
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericKind::Int => write!(f, "int"),
            NumericKind::Float => write!(f, "float"),
        }
    }
}

/// Builds the qualified name of a variable: `function::name` for locals, `name` for globals.
pub fn qualified_name(function: &str, name: &str, is_global: bool) -> String {
    if is_global {
        name.to_string()
    } else {
        format!("{}{}{}", function, SCOPE_SEPARATOR, name)
    }
}

/// Checks whether `qualified` is a local of `function`.
pub fn is_local_of(qualified: &str, function: &str) -> bool {
    qualified
        .strip_prefix(function)
        .is_some_and(|rest| rest.starts_with(SCOPE_SEPARATOR))
}

/// Checks whether `qualified` is a local of `function` whose name starts with `prefix`.
pub fn is_temporary_of(qualified: &str, function: &str, prefix: &str) -> bool {
    qualified
        .strip_prefix(function)
        .and_then(|rest| rest.strip_prefix(SCOPE_SEPARATOR))
        .is_some_and(|name| name.starts_with(prefix))
}
