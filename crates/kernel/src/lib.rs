//! Shared kernel of the Baimen authorization engine.
//!
//! Holds the domain value objects every other crate builds on: entity
//! UIDs, dynamic values with their extension families, entities and the
//! immutable entity store, the ancestry cache, and the evaluation-error
//! taxonomy. Nothing here knows about policies beyond their identifiers.

pub mod domain;
pub mod json;

// Re-export domain symbols for ergonomic use
pub use domain::{
    AncestryCache, Datetime, Decimal, Duration, Entity, EntityStore, EntityUid, EvaluationError,
    Extension, ExtensionParseError, IpAddr, ParseUidError, PolicyError, PolicyId, Position, Value,
    VARIABLE_ENTITY_TYPE,
};

pub use json::EntityJsonError;
