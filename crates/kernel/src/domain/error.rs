//! Evaluation-error taxonomy.
//!
//! Evaluation errors are values, not panics: the evaluator returns them,
//! the authorizer attaches the owning policy and surfaces them in the
//! diagnostics. A policy that errors never fires.

use crate::domain::ext::ExtensionParseError;
use crate::domain::policy::{PolicyId, Position};
use thiserror::Error;

/// An error raised while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("wrong number of arguments to `{function}`: expected {expected}, got {got}")]
    Arity {
        function: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("type error: {lhs} and {rhs} are not comparable")]
    NotComparable {
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("record or entity does not have attribute `{attribute}`")]
    AttributeDoesNotExist { attribute: String },

    #[error("entity does not have tag `{tag}`")]
    TagDoesNotExist { tag: String },

    #[error("entity `{uid}` does not exist")]
    EntityDoesNotExist { uid: String },

    #[error("arithmetic overflow in `{operation}`")]
    Overflow { operation: &'static str },

    #[error(transparent)]
    ExtensionParse(#[from] ExtensionParseError),

    #[error("invalid pattern: {reason}")]
    InvalidPattern { reason: String },
}

impl EvaluationError {
    pub fn type_error(expected: &'static str, got: &'static str) -> Self {
        Self::TypeError { expected, got }
    }

    pub fn overflow(operation: &'static str) -> Self {
        Self::Overflow { operation }
    }
}

/// An evaluation error attributed to the policy it occurred in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("policy `{policy_id}` @ {position}: {error}")]
pub struct PolicyError {
    pub policy_id: PolicyId,
    pub position: Position,
    pub error: EvaluationError,
}

impl PolicyError {
    pub fn new(policy_id: PolicyId, position: Position, error: EvaluationError) -> Self {
        Self {
            policy_id,
            position,
            error,
        }
    }
}
