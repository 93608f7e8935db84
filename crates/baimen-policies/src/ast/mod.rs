//! The policy abstract syntax tree.
//!
//! The engine consumes policies as already-built ASTs; a parser produces
//! them and the `Display` impls render them back to Cedar text.

pub mod expr;
pub mod pattern;
pub mod policy;
pub mod scope;
pub mod template;

pub use expr::{BinaryOp, Expr, ExtFn, Var};
pub use pattern::{Pattern, PatternElem, PatternError};
pub use policy::{Annotations, Condition, ConditionKind, Effect, LinkedFrom, Policy};
pub use scope::{ActionScope, PrincipalScope, ResourceScope, SlotId};
pub use template::{Template, TemplateError};
