//! Which variables the analysis tracks.

use std::collections::BTreeSet;
use std::fmt::Debug;

/// Per-variable tracking predicate over qualified names (`function::name` or `global`).
pub trait OctagonPrecision: Debug {
    fn is_tracked(&self, qualified_name: &str) -> bool;
}

/// Tracks every variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullPrecision;

impl OctagonPrecision for FullPrecision {
    fn is_tracked(&self, _qualified_name: &str) -> bool {
        true
    }
}

/// Tracks an explicit set of variables, grown by refinement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefineablePrecision {
    tracked: BTreeSet<String>,
}

impl RefineablePrecision {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RefineablePrecision {
            tracked: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tracked(&self) -> &BTreeSet<String> {
        &self.tracked
    }

    /// Precision tracking everything this one does plus `increment`.
    pub fn join(&self, increment: &BTreeSet<String>) -> Self {
        RefineablePrecision {
            tracked: self.tracked.union(increment).cloned().collect(),
        }
    }
}

impl OctagonPrecision for RefineablePrecision {
    fn is_tracked(&self, qualified_name: &str) -> bool {
        self.tracked.contains(qualified_name)
    }
}
