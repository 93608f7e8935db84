//! JSON codec for values, entities, and entity stores.
//!
//! Entity references serialize as `{"__entity": {"type", "id"}}` and
//! extension values as `{"__extn": {"fn", "arg"}}`. Parsing also accepts
//! the unwrapped shorthands: an object with exactly the keys `type`/`id`
//! is an entity reference, one with exactly `fn`/`arg` is an extension
//! value. Any other object is a record.

use crate::domain::entity::Entity;
use crate::domain::ext::{Datetime, Decimal, Duration, Extension, ExtensionParseError, IpAddr};
use crate::domain::store::EntityStore;
use crate::domain::uid::EntityUid;
use crate::domain::value::Value;
use serde_json::{Map, Value as Json, json};
use thiserror::Error;

/// Error produced while decoding value or entity JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityJsonError {
    #[error("invalid entity JSON: {reason}")]
    Invalid { reason: String },

    #[error(transparent)]
    Extension(#[from] ExtensionParseError),
}

impl EntityJsonError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::Long(n) => json!(n),
        Value::String(s) => Json::String(s.clone()),
        Value::EntityRef(uid) => json!({ "__entity": uid_to_json(uid) }),
        Value::Set(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Record(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
        Value::Ext(ext) => json!({
            "__extn": { "fn": ext.constructor_name(), "arg": ext.literal() }
        }),
    }
}

pub fn value_from_json(json: &Json) -> Result<Value, EntityJsonError> {
    match json {
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Long)
            .ok_or_else(|| EntityJsonError::invalid(format!("number {n} is not a 64-bit integer"))),
        Json::String(s) => Ok(Value::String(s.clone())),
        Json::Array(items) => Ok(Value::set(
            items
                .iter()
                .map(value_from_json)
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Json::Object(map) => object_from_json(map),
        Json::Null => Err(EntityJsonError::invalid("null is not a value")),
    }
}

fn object_from_json(map: &Map<String, Json>) -> Result<Value, EntityJsonError> {
    if map.len() == 1 {
        if let Some(inner) = map.get("__entity") {
            return Ok(Value::EntityRef(uid_from_json(inner)?));
        }
        if let Some(inner) = map.get("__extn") {
            let Json::Object(inner) = inner else {
                return Err(EntityJsonError::invalid("__extn must hold an object"));
            };
            return ext_from_object(inner).map(Value::Ext);
        }
    }

    // Unwrapped shorthands.
    if map.len() == 2 && map.contains_key("type") && map.contains_key("id") {
        if let (Some(Json::String(_)), Some(Json::String(_))) = (map.get("type"), map.get("id")) {
            return Ok(Value::EntityRef(uid_from_json(&Json::Object(map.clone()))?));
        }
    }
    if map.len() == 2 && map.contains_key("fn") && map.contains_key("arg") {
        if let (Some(Json::String(_)), Some(Json::String(_))) = (map.get("fn"), map.get("arg")) {
            return ext_from_object(map).map(Value::Ext);
        }
    }

    let mut entries = Vec::with_capacity(map.len());
    for (k, v) in map {
        entries.push((k.clone(), value_from_json(v)?));
    }
    Ok(Value::record(entries))
}

fn ext_from_object(map: &Map<String, Json>) -> Result<Extension, EntityJsonError> {
    let name = map
        .get("fn")
        .and_then(Json::as_str)
        .ok_or_else(|| EntityJsonError::invalid("extension object needs a `fn` string"))?;
    let arg = map
        .get("arg")
        .and_then(Json::as_str)
        .ok_or_else(|| EntityJsonError::invalid("extension object needs an `arg` string"))?;
    match name {
        "decimal" => Ok(Decimal::parse(arg)?.into()),
        "ip" => Ok(IpAddr::parse(arg)?.into()),
        "datetime" => Ok(Datetime::parse(arg)?.into()),
        "duration" => Ok(Duration::parse(arg)?.into()),
        other => Err(EntityJsonError::invalid(format!(
            "unknown extension constructor `{other}`"
        ))),
    }
}

pub fn uid_to_json(uid: &EntityUid) -> Json {
    json!({ "type": uid.entity_type(), "id": uid.id() })
}

pub fn uid_from_json(json: &Json) -> Result<EntityUid, EntityJsonError> {
    let obj = json
        .as_object()
        .ok_or_else(|| EntityJsonError::invalid("entity UID must be an object"))?;
    let entity_type = obj
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| EntityJsonError::invalid("entity UID needs a `type` string"))?;
    let id = obj
        .get("id")
        .and_then(Json::as_str)
        .ok_or_else(|| EntityJsonError::invalid("entity UID needs an `id` string"))?;
    Ok(EntityUid::new(entity_type, id))
}

pub fn entity_to_json(entity: &Entity) -> Json {
    let mut parents: Vec<&EntityUid> = entity.parents().iter().collect();
    parents.sort();

    let mut obj = Map::new();
    obj.insert("uid".into(), uid_to_json(entity.uid()));
    obj.insert(
        "parents".into(),
        Json::Array(parents.into_iter().map(uid_to_json).collect()),
    );
    obj.insert(
        "attrs".into(),
        Json::Object(
            entity
                .attributes()
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    );
    if !entity.tags().is_empty() {
        obj.insert(
            "tags".into(),
            Json::Object(
                entity
                    .tags()
                    .iter()
                    .map(|(k, v)| (k.clone(), value_to_json(v)))
                    .collect(),
            ),
        );
    }
    Json::Object(obj)
}

pub fn entity_from_json(json: &Json) -> Result<Entity, EntityJsonError> {
    let obj = json
        .as_object()
        .ok_or_else(|| EntityJsonError::invalid("entity must be an object"))?;
    let uid = uid_from_json(
        obj.get("uid")
            .ok_or_else(|| EntityJsonError::invalid("entity needs a `uid`"))?,
    )?;

    let mut entity = Entity::new(uid);

    if let Some(parents) = obj.get("parents") {
        let parents = parents
            .as_array()
            .ok_or_else(|| EntityJsonError::invalid("`parents` must be an array"))?;
        entity = entity.with_parents(
            parents
                .iter()
                .map(uid_from_json)
                .collect::<Result<Vec<_>, _>>()?,
        );
    }

    for (field, is_tags) in [("attrs", false), ("tags", true)] {
        let Some(values) = obj.get(field) else { continue };
        let values = values
            .as_object()
            .ok_or_else(|| EntityJsonError::invalid(format!("`{field}` must be an object")))?;
        for (k, v) in values {
            let v = value_from_json(v)?;
            entity = if is_tags {
                entity.with_tag(k.clone(), v)
            } else {
                entity.with_attribute(k.clone(), v)
            };
        }
    }

    Ok(entity)
}

/// Serializes a whole store as a JSON array of entities, sorted by UID for
/// a stable output.
pub fn entities_to_json(store: &EntityStore) -> Json {
    let mut entities: Vec<&Entity> = store.all().collect();
    entities.sort_by(|a, b| a.uid().cmp(b.uid()));
    Json::Array(entities.into_iter().map(entity_to_json).collect())
}

pub fn entities_from_json(json: &Json) -> Result<EntityStore, EntityJsonError> {
    let items = json
        .as_array()
        .ok_or_else(|| EntityJsonError::invalid("entities must be an array"))?;
    Ok(EntityStore::from_entities(
        items
            .iter()
            .map(entity_from_json)
            .collect::<Result<Vec<_>, _>>()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_map_to_plain_json() {
        assert_eq!(value_to_json(&Value::bool(true)), json!(true));
        assert_eq!(value_to_json(&Value::long(7)), json!(7));
        assert_eq!(value_to_json(&Value::string("hi")), json!("hi"));
        assert_eq!(value_from_json(&json!(-3)).unwrap(), Value::long(-3));
    }

    #[test]
    fn entity_refs_use_the_wrapped_form_on_output() {
        let v = Value::entity(EntityUid::new("User", "alice"));
        assert_eq!(
            value_to_json(&v),
            json!({"__entity": {"type": "User", "id": "alice"}})
        );
        assert_eq!(value_from_json(&value_to_json(&v)).unwrap(), v);
    }

    #[test]
    fn entity_ref_shorthand_is_accepted() {
        let parsed = value_from_json(&json!({"type": "User", "id": "alice"})).unwrap();
        assert_eq!(parsed, Value::entity(EntityUid::new("User", "alice")));
    }

    #[test]
    fn extension_values_roundtrip() {
        for (name, arg) in [
            ("decimal", "3.14"),
            ("ip", "10.0.0.0/8"),
            ("datetime", "2024-08-01"),
            ("duration", "1h30m"),
        ] {
            let wrapped = json!({"__extn": {"fn": name, "arg": arg}});
            let v = value_from_json(&wrapped).unwrap();
            assert_eq!(value_to_json(&v), wrapped, "canonical form of {name}");
            let shorthand = json!({"fn": name, "arg": arg});
            assert_eq!(value_from_json(&shorthand).unwrap(), v);
        }
    }

    #[test]
    fn malformed_extension_literals_are_rejected() {
        let bad = json!({"__extn": {"fn": "decimal", "arg": "abc"}});
        assert!(matches!(
            value_from_json(&bad),
            Err(EntityJsonError::Extension(_))
        ));
        let unknown = json!({"__extn": {"fn": "complex", "arg": "1+2i"}});
        assert!(matches!(
            value_from_json(&unknown),
            Err(EntityJsonError::Invalid { .. })
        ));
    }

    #[test]
    fn ordinary_objects_are_records() {
        let parsed = value_from_json(&json!({"a": 1, "b": [true, false]})).unwrap();
        assert_eq!(
            parsed,
            Value::record([
                ("a".to_string(), Value::long(1)),
                (
                    "b".to_string(),
                    Value::set(vec![Value::bool(true), Value::bool(false)])
                ),
            ])
        );
        // Three keys, so not a shorthand even though `type`/`id` appear.
        let rec = value_from_json(&json!({"type": "x", "id": "y", "z": 1})).unwrap();
        assert!(rec.is_record());
    }

    #[test]
    fn floats_and_nulls_are_rejected() {
        assert!(value_from_json(&json!(1.5)).is_err());
        assert!(value_from_json(&json!(null)).is_err());
    }

    #[test]
    fn entity_roundtrip() {
        let entity = Entity::new(EntityUid::new("User", "alice"))
            .with_attribute("age", 30i64)
            .with_parent(EntityUid::new("Group", "admins"))
            .with_tag("clearance", "secret");
        let json = entity_to_json(&entity);
        assert_eq!(entity_from_json(&json).unwrap(), entity);
    }

    #[test]
    fn store_roundtrip_and_missing_fields() {
        let store = EntityStore::from_entities([
            Entity::new(EntityUid::new("User", "a")),
            Entity::new(EntityUid::new("User", "b")).with_parent(EntityUid::new("Group", "g")),
        ]);
        let back = entities_from_json(&entities_to_json(&store)).unwrap();
        assert_eq!(back, store);

        // attrs/parents/tags may all be omitted.
        let minimal = entity_from_json(&json!({"uid": {"type": "User", "id": "x"}})).unwrap();
        assert_eq!(minimal, Entity::new(EntityUid::new("User", "x")));
    }
}
