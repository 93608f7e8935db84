//! Policy representation for the Baimen authorization engine.
//!
//! The AST (policies, templates, scopes, expressions), its Cedar-text and
//! JSON renderings, the snapshot-based `PolicySet` with its scope index,
//! and the `TemplateSet` lifecycle.

pub mod ast;
pub mod json;
pub mod set;
pub mod template_set;
pub mod text;

// Re-export the AST surface for ergonomic use
pub use ast::{
    ActionScope, Annotations, BinaryOp, Condition, ConditionKind, Effect, Expr, ExtFn, LinkedFrom,
    Pattern, PatternElem, PatternError, Policy, PrincipalScope, ResourceScope, SlotId, Template,
    TemplateError, Var,
};

pub use json::PolicyJsonError;
pub use set::{PolicyIter, PolicySet};
pub use template_set::{LinkRecord, TemplateSet};
