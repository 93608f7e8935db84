//! Scope constraints: the principal/action/resource heads of a policy.
//!
//! The three axes have different shapes (the action axis has no `is`
//! forms but allows a literal set), so each is its own sealed sum type
//! instead of one enum with runtime checks.

use kernel::EntityUid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A template slot: `?principal` or `?resource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotId {
    Principal,
    Resource,
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Principal => write!(f, "?principal"),
            Self::Resource => write!(f, "?resource"),
        }
    }
}

/// Constraint on the request principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalScope {
    /// `principal` — any principal.
    All,
    /// `principal == E`
    Eq(EntityUid),
    /// `principal in E`
    In(EntityUid),
    /// `principal is T`
    Is(String),
    /// `principal is T in E`
    IsIn(String, EntityUid),
    /// `principal == ?principal` (template form)
    Slot(SlotId),
    /// `principal is T in ?principal` (template form)
    IsSlot(String, SlotId),
}

/// Constraint on the request action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionScope {
    /// `action` — any action.
    All,
    /// `action == E`
    Eq(EntityUid),
    /// `action in E`
    In(EntityUid),
    /// `action in [E1, E2, …]`
    InSet(Vec<EntityUid>),
}

/// Constraint on the request resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceScope {
    All,
    Eq(EntityUid),
    In(EntityUid),
    Is(String),
    IsIn(String, EntityUid),
    Slot(SlotId),
    IsSlot(String, SlotId),
}

impl PrincipalScope {
    /// The slot this scope references, for template slot discovery.
    pub fn slot(&self) -> Option<SlotId> {
        match self {
            Self::Slot(s) | Self::IsSlot(_, s) => Some(*s),
            _ => None,
        }
    }
}

impl ResourceScope {
    pub fn slot(&self) -> Option<SlotId> {
        match self {
            Self::Slot(s) | Self::IsSlot(_, s) => Some(*s),
            _ => None,
        }
    }
}
