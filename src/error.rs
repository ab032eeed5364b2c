//! Fatal analysis errors.
//!
//! Imprecision and infeasibility are not errors: they show up as
//! [`Coefficients::Empty`](crate::coefficients::Coefficients::Empty), an unchanged
//! state, or an empty successor list. The variants here abort the analysis run.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// A recognized construct the analysis cannot handle soundly.
    #[error("unsupported function `{function}`: {reason}")]
    UnsupportedFunction { function: String, reason: String },

    /// An operator or expression shape the transfer relation does not know.
    #[error("unrecognized code at {edge}: {message}")]
    UnrecognizedCode { message: String, edge: String },

    /// An edge kind this analysis never expects to see.
    #[error("unrecognized edge {edge}")]
    UnrecognizedEdge { edge: String },
}
