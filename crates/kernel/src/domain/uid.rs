use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Entity type name reserved for partial-evaluation variables.
///
/// A UID of this type is a marker, not a real entity: the partial evaluator
/// recognises it by identity and keeps the surrounding expression as a
/// residual instead of reducing it. Plain evaluation treats it like any
/// other entity reference.
pub const VARIABLE_ENTITY_TYPE: &str = "__variable__";

/// Unique identifier of an entity: a (type, id) pair.
///
/// Equality is structural. The display form is the Cedar surface form,
/// `Type::"id"`, with `"` and `\` escaped inside the id.
///
/// # Examples
///
/// ```
/// use kernel::EntityUid;
///
/// let alice = EntityUid::new("User", "alice");
/// assert_eq!(alice.to_string(), "User::\"alice\"");
/// assert_eq!(alice, "User::\"alice\"".parse().unwrap());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityUid {
    #[serde(rename = "type")]
    entity_type: String,
    id: String,
}

impl EntityUid {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Builds the marker UID that stands for an unknown input named `name`.
    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(VARIABLE_ENTITY_TYPE, name)
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// True when this UID is a partial-evaluation variable marker.
    pub fn is_variable(&self) -> bool {
        self.entity_type == VARIABLE_ENTITY_TYPE
    }

    /// The variable name carried by a marker UID, if this is one.
    pub fn variable_name(&self) -> Option<&str> {
        if self.is_variable() { Some(&self.id) } else { None }
    }
}

impl fmt::Display for EntityUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::\"", self.entity_type)?;
        for c in self.id.chars() {
            match c {
                '"' => write!(f, "\\\"")?,
                '\\' => write!(f, "\\\\")?,
                c => write!(f, "{}", c)?,
            }
        }
        write!(f, "\"")
    }
}

/// Error produced when a string is not a `Type::"id"` UID form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid entity UID `{input}`: expected `Type::\"id\"`")]
pub struct ParseUidError {
    pub input: String,
}

impl FromStr for EntityUid {
    type Err = ParseUidError;

    /// Parses the `Type::"id"` surface form. The type segment may itself be
    /// namespaced (`MyApp::User`); the id is the quoted tail.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseUidError { input: s.to_string() };

        let sep = s.rfind("::\"").ok_or_else(err)?;
        let entity_type = &s[..sep];
        let quoted = &s[sep + 2..];
        if entity_type.is_empty() || !quoted.ends_with('"') || quoted.len() < 2 {
            return Err(err());
        }

        let mut id = String::new();
        let mut chars = quoted[1..quoted.len() - 1].chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some('"') => id.push('"'),
                    Some('\\') => id.push('\\'),
                    _ => return Err(err()),
                },
                '"' => return Err(err()),
                c => id.push(c),
            }
        }
        Ok(Self::new(entity_type, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_cedar_surface_form() {
        let uid = EntityUid::new("User", "alice");
        assert_eq!(uid.to_string(), "User::\"alice\"");
    }

    #[test]
    fn display_escapes_quotes_and_backslashes() {
        let uid = EntityUid::new("Doc", "a\"b\\c");
        assert_eq!(uid.to_string(), "Doc::\"a\\\"b\\\\c\"");
    }

    #[test]
    fn parse_and_display_roundtrip() {
        for raw in ["User::\"alice\"", "MyApp::User::\"bob\"", "Doc::\"a\\\"b\""] {
            let uid: EntityUid = raw.parse().unwrap();
            assert_eq!(uid.to_string(), raw);
        }
    }

    #[test]
    fn parse_keeps_namespaced_type_intact() {
        let uid: EntityUid = "MyApp::Sub::User::\"x\"".parse().unwrap();
        assert_eq!(uid.entity_type(), "MyApp::Sub::User");
        assert_eq!(uid.id(), "x");
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for raw in ["", "User", "User::alice", "User::\"alice", "::\"x\""] {
            assert!(raw.parse::<EntityUid>().is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(EntityUid::new("User", "a"), EntityUid::new("User", "a"));
        assert_ne!(EntityUid::new("User", "a"), EntityUid::new("Group", "a"));
        assert_ne!(EntityUid::new("User", "a"), EntityUid::new("User", "b"));
    }

    #[test]
    fn variable_marker_is_recognised() {
        let var = EntityUid::variable("principal");
        assert!(var.is_variable());
        assert_eq!(var.variable_name(), Some("principal"));
        assert!(!EntityUid::new("User", "alice").is_variable());
    }

    #[test]
    fn serde_uses_the_wire_field_names() {
        let uid = EntityUid::new("User", "alice");
        let json = serde_json::to_value(&uid).unwrap();
        assert_eq!(json, serde_json::json!({"type": "User", "id": "alice"}));
        let back: EntityUid = serde_json::from_value(json).unwrap();
        assert_eq!(back, uid);
    }
}
