//! Structural JSON codec for policies and templates.
//!
//! The JSON form maps one-for-one onto the AST: scopes are `{"op": …}`
//! objects, expressions are single-key objects keyed by the operator
//! (`{"==": {"left": …, "right": …}}`), values reuse the entity JSON
//! forms from the kernel codec.

use crate::ast::expr::{BinaryOp, Expr, ExtFn, Var};
use crate::ast::pattern::{Pattern, PatternError};
use crate::ast::policy::{Annotations, Condition, ConditionKind, Effect, Policy};
use crate::ast::scope::{ActionScope, PrincipalScope, ResourceScope, SlotId};
use crate::ast::template::Template;
use kernel::json::{uid_from_json, uid_to_json, value_from_json, value_to_json};
use kernel::{EntityJsonError, EntityUid, PolicyId};
use serde_json::{Map, Value as Json, json};
use thiserror::Error;

/// Error produced while decoding policy JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyJsonError {
    #[error("invalid policy JSON: {reason}")]
    Invalid { reason: String },

    #[error(transparent)]
    Value(#[from] EntityJsonError),

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

impl PolicyJsonError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

pub fn expr_to_json(expr: &Expr) -> Json {
    match expr {
        Expr::Value(v) => json!({ "Value": value_to_json(v) }),
        Expr::Var(v) => json!({ "Var": v.name() }),
        Expr::Unknown(name) => json!({ "Unknown": name }),
        Expr::Error(msg) => json!({ "Error": msg }),
        Expr::And(a, b) => json!({ "&&": { "left": expr_to_json(a), "right": expr_to_json(b) } }),
        Expr::Or(a, b) => json!({ "||": { "left": expr_to_json(a), "right": expr_to_json(b) } }),
        Expr::Not(e) => json!({ "!": { "arg": expr_to_json(e) } }),
        Expr::Neg(e) => json!({ "neg": { "arg": expr_to_json(e) } }),
        Expr::Binary { op, left, right } => json!({
            op.symbol(): { "left": expr_to_json(left), "right": expr_to_json(right) }
        }),
        Expr::If {
            guard,
            then_branch,
            else_branch,
        } => json!({ "if-then-else": {
            "if": expr_to_json(guard),
            "then": expr_to_json(then_branch),
            "else": expr_to_json(else_branch),
        } }),
        Expr::GetAttr { expr, attr } => {
            json!({ ".": { "left": expr_to_json(expr), "attr": attr } })
        }
        Expr::HasAttr { expr, attr } => {
            json!({ "has": { "left": expr_to_json(expr), "attr": attr } })
        }
        Expr::GetTag { expr, tag } => {
            json!({ "getTag": { "left": expr_to_json(expr), "right": expr_to_json(tag) } })
        }
        Expr::HasTag { expr, tag } => {
            json!({ "hasTag": { "left": expr_to_json(expr), "right": expr_to_json(tag) } })
        }
        Expr::Like { expr, pattern } => {
            json!({ "like": { "left": expr_to_json(expr), "pattern": pattern.to_string() } })
        }
        Expr::Is { expr, entity_type } => {
            json!({ "is": { "left": expr_to_json(expr), "entity_type": entity_type } })
        }
        Expr::Set(elems) => json!({ "Set": elems.iter().map(expr_to_json).collect::<Vec<_>>() }),
        Expr::Record(entries) => json!({ "Record": entries
            .iter()
            .map(|(k, v)| (k.clone(), expr_to_json(v)))
            .collect::<Map<String, Json>>() }),
        Expr::ExtCall { function, args } => json!({
            function.name(): args.iter().map(expr_to_json).collect::<Vec<_>>()
        }),
        Expr::IsEmpty(e) => json!({ "isEmpty": { "arg": expr_to_json(e) } }),
    }
}

pub fn expr_from_json(json: &Json) -> Result<Expr, PolicyJsonError> {
    let obj = json
        .as_object()
        .ok_or_else(|| PolicyJsonError::invalid("expression must be an object"))?;
    if obj.len() != 1 {
        return Err(PolicyJsonError::invalid(
            "expression object must have exactly one key",
        ));
    }
    let (key, body) = obj.iter().next().expect("length checked");

    let binary = |op: BinaryOp| -> Result<Expr, PolicyJsonError> {
        Ok(Expr::binary(op, field_expr(body, "left")?, field_expr(body, "right")?))
    };

    match key.as_str() {
        "Value" => Ok(Expr::Value(value_from_json(body)?)),
        "Var" => {
            let name = body
                .as_str()
                .ok_or_else(|| PolicyJsonError::invalid("Var must hold a string"))?;
            let var = match name {
                "principal" => Var::Principal,
                "action" => Var::Action,
                "resource" => Var::Resource,
                "context" => Var::Context,
                other => return Err(PolicyJsonError::invalid(format!("unknown variable `{other}`"))),
            };
            Ok(Expr::Var(var))
        }
        "Unknown" => Ok(Expr::Unknown(
            body.as_str()
                .ok_or_else(|| PolicyJsonError::invalid("Unknown must hold a string"))?
                .to_string(),
        )),
        "Error" => Ok(Expr::Error(
            body.as_str()
                .ok_or_else(|| PolicyJsonError::invalid("Error must hold a string"))?
                .to_string(),
        )),
        "&&" => Ok(Expr::and(field_expr(body, "left")?, field_expr(body, "right")?)),
        "||" => Ok(Expr::or(field_expr(body, "left")?, field_expr(body, "right")?)),
        "!" => Ok(Expr::not(field_expr(body, "arg")?)),
        "neg" => Ok(Expr::neg(field_expr(body, "arg")?)),
        "==" => binary(BinaryOp::Eq),
        "!=" => binary(BinaryOp::NotEq),
        "<" => binary(BinaryOp::Less),
        "<=" => binary(BinaryOp::LessEq),
        ">" => binary(BinaryOp::Greater),
        ">=" => binary(BinaryOp::GreaterEq),
        "+" => binary(BinaryOp::Add),
        "-" => binary(BinaryOp::Sub),
        "*" => binary(BinaryOp::Mul),
        "in" => binary(BinaryOp::In),
        "contains" => binary(BinaryOp::Contains),
        "containsAll" => binary(BinaryOp::ContainsAll),
        "containsAny" => binary(BinaryOp::ContainsAny),
        "if-then-else" => Ok(Expr::ite(
            field_expr(body, "if")?,
            field_expr(body, "then")?,
            field_expr(body, "else")?,
        )),
        "." => Ok(Expr::get_attr(field_expr(body, "left")?, field_str(body, "attr")?)),
        "has" => Ok(Expr::has_attr(field_expr(body, "left")?, field_str(body, "attr")?)),
        "getTag" => Ok(Expr::get_tag(field_expr(body, "left")?, field_expr(body, "right")?)),
        "hasTag" => Ok(Expr::has_tag(field_expr(body, "left")?, field_expr(body, "right")?)),
        "like" => Ok(Expr::like(
            field_expr(body, "left")?,
            Pattern::parse(&field_str(body, "pattern")?)?,
        )),
        "is" => Ok(Expr::is_type(
            field_expr(body, "left")?,
            field_str(body, "entity_type")?,
        )),
        "Set" => {
            let items = body
                .as_array()
                .ok_or_else(|| PolicyJsonError::invalid("Set must hold an array"))?;
            Ok(Expr::set(
                items.iter().map(expr_from_json).collect::<Result<_, _>>()?,
            ))
        }
        "Record" => {
            let entries = body
                .as_object()
                .ok_or_else(|| PolicyJsonError::invalid("Record must hold an object"))?;
            Ok(Expr::record(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), expr_from_json(v)?)))
                    .collect::<Result<_, PolicyJsonError>>()?,
            ))
        }
        "isEmpty" => Ok(Expr::is_empty(field_expr(body, "arg")?)),
        other => {
            let Some(function) = ExtFn::from_name(other) else {
                return Err(PolicyJsonError::invalid(format!("unknown operator `{other}`")));
            };
            let args = body
                .as_array()
                .ok_or_else(|| PolicyJsonError::invalid("extension call must hold an array"))?;
            Ok(Expr::ext_call(
                function,
                args.iter().map(expr_from_json).collect::<Result<_, _>>()?,
            ))
        }
    }
}

fn field_expr(body: &Json, field: &str) -> Result<Expr, PolicyJsonError> {
    expr_from_json(
        body.get(field)
            .ok_or_else(|| PolicyJsonError::invalid(format!("missing field `{field}`")))?,
    )
}

fn field_str(body: &Json, field: &str) -> Result<String, PolicyJsonError> {
    body.get(field)
        .and_then(Json::as_str)
        .map(str::to_string)
        .ok_or_else(|| PolicyJsonError::invalid(format!("missing string field `{field}`")))
}

// ---------------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------------

fn slot_to_json(slot: SlotId) -> Json {
    Json::String(slot.to_string())
}

fn slot_from_json(json: &Json) -> Result<SlotId, PolicyJsonError> {
    match json.as_str() {
        Some("?principal") => Ok(SlotId::Principal),
        Some("?resource") => Ok(SlotId::Resource),
        _ => Err(PolicyJsonError::invalid(
            "slot must be \"?principal\" or \"?resource\"",
        )),
    }
}

fn principal_scope_to_json(scope: &PrincipalScope) -> Json {
    match scope {
        PrincipalScope::All => json!({ "op": "All" }),
        PrincipalScope::Eq(uid) => json!({ "op": "==", "entity": uid_to_json(uid) }),
        PrincipalScope::In(uid) => json!({ "op": "in", "entity": uid_to_json(uid) }),
        PrincipalScope::Is(ty) => json!({ "op": "is", "entity_type": ty }),
        PrincipalScope::IsIn(ty, uid) => {
            json!({ "op": "is", "entity_type": ty, "in": { "entity": uid_to_json(uid) } })
        }
        PrincipalScope::Slot(slot) => json!({ "op": "==", "slot": slot_to_json(*slot) }),
        PrincipalScope::IsSlot(ty, slot) => {
            json!({ "op": "is", "entity_type": ty, "in": { "slot": slot_to_json(*slot) } })
        }
    }
}

// The principal and resource axes share one JSON shape.
struct HeadScopeJson {
    eq_uid: Option<EntityUid>,
    in_uid: Option<EntityUid>,
    is_type: Option<String>,
    slot: Option<SlotId>,
    all: bool,
}

fn head_scope_from_json(json: &Json, axis: &str) -> Result<HeadScopeJson, PolicyJsonError> {
    let obj = json
        .as_object()
        .ok_or_else(|| PolicyJsonError::invalid(format!("{axis} scope must be an object")))?;
    let op = obj
        .get("op")
        .and_then(Json::as_str)
        .ok_or_else(|| PolicyJsonError::invalid(format!("{axis} scope needs an `op`")))?;

    let mut out = HeadScopeJson {
        eq_uid: None,
        in_uid: None,
        is_type: None,
        slot: None,
        all: false,
    };
    match op {
        "All" => out.all = true,
        "==" => {
            if let Some(slot) = obj.get("slot") {
                out.slot = Some(slot_from_json(slot)?);
            } else if let Some(entity) = obj.get("entity") {
                out.eq_uid = Some(uid_from_json(entity)?);
            } else {
                return Err(PolicyJsonError::invalid(format!(
                    "{axis} `==` scope needs an `entity` or a `slot`"
                )));
            }
        }
        "in" => {
            if let Some(entity) = obj.get("entity") {
                out.in_uid = Some(uid_from_json(entity)?);
            } else {
                return Err(PolicyJsonError::invalid(format!(
                    "{axis} `in` scope needs an `entity`"
                )));
            }
        }
        "is" => {
            out.is_type = Some(
                obj.get("entity_type")
                    .and_then(Json::as_str)
                    .ok_or_else(|| {
                        PolicyJsonError::invalid(format!("{axis} `is` scope needs an `entity_type`"))
                    })?
                    .to_string(),
            );
            if let Some(inner) = obj.get("in") {
                if let Some(slot) = inner.get("slot") {
                    out.slot = Some(slot_from_json(slot)?);
                } else if let Some(entity) = inner.get("entity") {
                    out.in_uid = Some(uid_from_json(entity)?);
                } else {
                    return Err(PolicyJsonError::invalid(format!(
                        "{axis} `is … in` scope needs an `entity` or a `slot`"
                    )));
                }
            }
        }
        other => {
            return Err(PolicyJsonError::invalid(format!(
                "unknown {axis} scope op `{other}`"
            )));
        }
    }
    Ok(out)
}

fn principal_scope_from_json(json: &Json) -> Result<PrincipalScope, PolicyJsonError> {
    let head = head_scope_from_json(json, "principal")?;
    Ok(match head {
        HeadScopeJson { all: true, .. } => PrincipalScope::All,
        HeadScopeJson {
            is_type: Some(ty),
            slot: Some(slot),
            ..
        } => PrincipalScope::IsSlot(ty, slot),
        HeadScopeJson {
            is_type: Some(ty),
            in_uid: Some(uid),
            ..
        } => PrincipalScope::IsIn(ty, uid),
        HeadScopeJson {
            is_type: Some(ty), ..
        } => PrincipalScope::Is(ty),
        HeadScopeJson {
            slot: Some(slot), ..
        } => PrincipalScope::Slot(slot),
        HeadScopeJson {
            eq_uid: Some(uid), ..
        } => PrincipalScope::Eq(uid),
        HeadScopeJson {
            in_uid: Some(uid), ..
        } => PrincipalScope::In(uid),
        _ => return Err(PolicyJsonError::invalid("unrecognised principal scope")),
    })
}

fn resource_scope_to_json(scope: &ResourceScope) -> Json {
    match scope {
        ResourceScope::All => json!({ "op": "All" }),
        ResourceScope::Eq(uid) => json!({ "op": "==", "entity": uid_to_json(uid) }),
        ResourceScope::In(uid) => json!({ "op": "in", "entity": uid_to_json(uid) }),
        ResourceScope::Is(ty) => json!({ "op": "is", "entity_type": ty }),
        ResourceScope::IsIn(ty, uid) => {
            json!({ "op": "is", "entity_type": ty, "in": { "entity": uid_to_json(uid) } })
        }
        ResourceScope::Slot(slot) => json!({ "op": "==", "slot": slot_to_json(*slot) }),
        ResourceScope::IsSlot(ty, slot) => {
            json!({ "op": "is", "entity_type": ty, "in": { "slot": slot_to_json(*slot) } })
        }
    }
}

fn resource_scope_from_json(json: &Json) -> Result<ResourceScope, PolicyJsonError> {
    let head = head_scope_from_json(json, "resource")?;
    Ok(match head {
        HeadScopeJson { all: true, .. } => ResourceScope::All,
        HeadScopeJson {
            is_type: Some(ty),
            slot: Some(slot),
            ..
        } => ResourceScope::IsSlot(ty, slot),
        HeadScopeJson {
            is_type: Some(ty),
            in_uid: Some(uid),
            ..
        } => ResourceScope::IsIn(ty, uid),
        HeadScopeJson {
            is_type: Some(ty), ..
        } => ResourceScope::Is(ty),
        HeadScopeJson {
            slot: Some(slot), ..
        } => ResourceScope::Slot(slot),
        HeadScopeJson {
            eq_uid: Some(uid), ..
        } => ResourceScope::Eq(uid),
        HeadScopeJson {
            in_uid: Some(uid), ..
        } => ResourceScope::In(uid),
        _ => return Err(PolicyJsonError::invalid("unrecognised resource scope")),
    })
}

fn action_scope_to_json(scope: &ActionScope) -> Json {
    match scope {
        ActionScope::All => json!({ "op": "All" }),
        ActionScope::Eq(uid) => json!({ "op": "==", "entity": uid_to_json(uid) }),
        ActionScope::In(uid) => json!({ "op": "in", "entity": uid_to_json(uid) }),
        ActionScope::InSet(uids) => {
            json!({ "op": "in", "entities": uids.iter().map(uid_to_json).collect::<Vec<_>>() })
        }
    }
}

fn action_scope_from_json(json: &Json) -> Result<ActionScope, PolicyJsonError> {
    let obj = json
        .as_object()
        .ok_or_else(|| PolicyJsonError::invalid("action scope must be an object"))?;
    let op = obj
        .get("op")
        .and_then(Json::as_str)
        .ok_or_else(|| PolicyJsonError::invalid("action scope needs an `op`"))?;
    match op {
        "All" => Ok(ActionScope::All),
        "==" => Ok(ActionScope::Eq(uid_from_json(obj.get("entity").ok_or_else(
            || PolicyJsonError::invalid("action `==` scope needs an `entity`"),
        )?)?)),
        "in" => {
            if let Some(list) = obj.get("entities") {
                let list = list
                    .as_array()
                    .ok_or_else(|| PolicyJsonError::invalid("`entities` must be an array"))?;
                Ok(ActionScope::InSet(
                    list.iter().map(uid_from_json).collect::<Result<_, _>>()?,
                ))
            } else if let Some(entity) = obj.get("entity") {
                Ok(ActionScope::In(uid_from_json(entity)?))
            } else {
                return Err(PolicyJsonError::invalid(
                    "action `in` scope needs an `entity` or `entities`",
                ));
            }
        }
        other => Err(PolicyJsonError::invalid(format!(
            "unknown action scope op `{other}`"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Policies, templates, policy sets
// ---------------------------------------------------------------------------

fn effect_from_json(json: &Json) -> Result<Effect, PolicyJsonError> {
    match json.as_str() {
        Some("permit") => Ok(Effect::Permit),
        Some("forbid") => Ok(Effect::Forbid),
        _ => Err(PolicyJsonError::invalid(
            "effect must be \"permit\" or \"forbid\"",
        )),
    }
}

fn conditions_to_json(conditions: &[Condition]) -> Json {
    Json::Array(
        conditions
            .iter()
            .map(|c| {
                json!({
                    "kind": match c.kind {
                        ConditionKind::When => "when",
                        ConditionKind::Unless => "unless",
                    },
                    "body": expr_to_json(&c.body),
                })
            })
            .collect(),
    )
}

fn conditions_from_json(json: &Json) -> Result<Vec<Condition>, PolicyJsonError> {
    let items = json
        .as_array()
        .ok_or_else(|| PolicyJsonError::invalid("`conditions` must be an array"))?;
    items
        .iter()
        .map(|item| {
            let kind = match item.get("kind").and_then(Json::as_str) {
                Some("when") => ConditionKind::When,
                Some("unless") => ConditionKind::Unless,
                _ => {
                    return Err(PolicyJsonError::invalid(
                        "condition kind must be \"when\" or \"unless\"",
                    ));
                }
            };
            let body = expr_from_json(
                item.get("body")
                    .ok_or_else(|| PolicyJsonError::invalid("condition needs a `body`"))?,
            )?;
            Ok(Condition { kind, body })
        })
        .collect()
}

fn annotations_to_json(annotations: &Annotations) -> Json {
    Json::Object(
        annotations
            .iter()
            .map(|(n, v)| (n.to_string(), Json::String(v.to_string())))
            .collect(),
    )
}

fn annotations_from_json(json: &Json) -> Result<Annotations, PolicyJsonError> {
    let obj = json
        .as_object()
        .ok_or_else(|| PolicyJsonError::invalid("`annotations` must be an object"))?;
    obj.iter()
        .map(|(n, v)| {
            v.as_str()
                .map(|v| (n.clone(), v.to_string()))
                .ok_or_else(|| PolicyJsonError::invalid("annotation values must be strings"))
        })
        .collect()
}

pub fn policy_to_json(policy: &Policy) -> Json {
    let mut obj = Map::new();
    obj.insert(
        "effect".into(),
        Json::String(policy.effect().to_string()),
    );
    obj.insert("principal".into(), principal_scope_to_json(policy.principal()));
    obj.insert("action".into(), action_scope_to_json(policy.action()));
    obj.insert("resource".into(), resource_scope_to_json(policy.resource()));
    obj.insert("conditions".into(), conditions_to_json(policy.conditions()));
    if !policy.annotations().is_empty() {
        obj.insert("annotations".into(), annotations_to_json(policy.annotations()));
    }
    if let Some(linked) = policy.linked_from() {
        obj.insert(
            "template_id".into(),
            Json::String(linked.template_id.to_string()),
        );
    }
    Json::Object(obj)
}

pub fn policy_from_json(json: &Json) -> Result<Policy, PolicyJsonError> {
    let obj = json
        .as_object()
        .ok_or_else(|| PolicyJsonError::invalid("policy must be an object"))?;
    let effect = effect_from_json(
        obj.get("effect")
            .ok_or_else(|| PolicyJsonError::invalid("policy needs an `effect`"))?,
    )?;
    let principal = principal_scope_from_json(
        obj.get("principal")
            .ok_or_else(|| PolicyJsonError::invalid("policy needs a `principal` scope"))?,
    )?;
    let action = action_scope_from_json(
        obj.get("action")
            .ok_or_else(|| PolicyJsonError::invalid("policy needs an `action` scope"))?,
    )?;
    let resource = resource_scope_from_json(
        obj.get("resource")
            .ok_or_else(|| PolicyJsonError::invalid("policy needs a `resource` scope"))?,
    )?;
    let conditions = match obj.get("conditions") {
        Some(c) => conditions_from_json(c)?,
        None => Vec::new(),
    };

    let mut policy = Policy::new(effect, principal, action, resource, conditions);
    if let Some(a) = obj.get("annotations") {
        policy = policy.with_annotations(annotations_from_json(a)?);
    }
    if let Some(t) = obj.get("template_id") {
        let id = t
            .as_str()
            .ok_or_else(|| PolicyJsonError::invalid("`template_id` must be a string"))?;
        policy = policy.with_linked_from(PolicyId::new(id));
    }
    Ok(policy)
}

pub fn template_to_json(template: &Template) -> Json {
    let mut obj = Map::new();
    obj.insert("effect".into(), Json::String(template.effect().to_string()));
    obj.insert(
        "principal".into(),
        principal_scope_to_json(template.principal()),
    );
    obj.insert("action".into(), action_scope_to_json(template.action()));
    obj.insert(
        "resource".into(),
        resource_scope_to_json(template.resource()),
    );
    obj.insert("conditions".into(), conditions_to_json(template.conditions()));
    if !template.annotations().is_empty() {
        obj.insert(
            "annotations".into(),
            annotations_to_json(template.annotations()),
        );
    }
    Json::Object(obj)
}

pub fn template_from_json(id: PolicyId, json: &Json) -> Result<Template, PolicyJsonError> {
    let obj = json
        .as_object()
        .ok_or_else(|| PolicyJsonError::invalid("template must be an object"))?;
    let effect = effect_from_json(
        obj.get("effect")
            .ok_or_else(|| PolicyJsonError::invalid("template needs an `effect`"))?,
    )?;
    let principal = principal_scope_from_json(
        obj.get("principal")
            .ok_or_else(|| PolicyJsonError::invalid("template needs a `principal` scope"))?,
    )?;
    let action = action_scope_from_json(
        obj.get("action")
            .ok_or_else(|| PolicyJsonError::invalid("template needs an `action` scope"))?,
    )?;
    let resource = resource_scope_from_json(
        obj.get("resource")
            .ok_or_else(|| PolicyJsonError::invalid("template needs a `resource` scope"))?,
    )?;
    let conditions = match obj.get("conditions") {
        Some(c) => conditions_from_json(c)?,
        None => Vec::new(),
    };

    let mut template = Template::new(id, effect, principal, action, resource, conditions);
    if let Some(a) = obj.get("annotations") {
        template = template.with_annotations(annotations_from_json(a)?);
    }
    Ok(template)
}
