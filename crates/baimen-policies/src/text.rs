//! Rendering of policies, templates and expressions back to Cedar text.

use crate::ast::expr::{BinaryOp, Expr};
use crate::ast::policy::{Annotations, Condition, Policy};
use crate::ast::scope::{ActionScope, PrincipalScope, ResourceScope};
use crate::ast::template::Template;
use kernel::EntityUid;
use std::fmt;

// Precedence levels, loosest binding first. An operand is parenthesized
// when its own level is below what its position requires.
const PREC_IF: u8 = 1;
const PREC_OR: u8 = 2;
const PREC_AND: u8 = 3;
const PREC_REL: u8 = 4;
const PREC_ADD: u8 = 5;
const PREC_MUL: u8 = 6;
const PREC_UNARY: u8 = 7;
const PREC_POSTFIX: u8 = 8;
const PREC_PRIMARY: u8 = 9;

fn write_expr(f: &mut fmt::Formatter<'_>, e: &Expr, min: u8) -> fmt::Result {
    let prec = expr_prec(e);
    if prec < min {
        write!(f, "(")?;
    }
    match e {
        Expr::Value(v) => write!(f, "{}", v)?,
        Expr::Var(v) => write!(f, "{}", v)?,
        Expr::Unknown(name) => write!(f, "unknown(\"{}\")", name)?,
        Expr::Error(msg) => write!(f, "error(\"{}\")", msg)?,
        Expr::And(a, b) => {
            write_expr(f, a, PREC_AND)?;
            write!(f, " && ")?;
            write_expr(f, b, PREC_AND)?;
        }
        Expr::Or(a, b) => {
            write_expr(f, a, PREC_OR)?;
            write!(f, " || ")?;
            write_expr(f, b, PREC_OR)?;
        }
        Expr::Not(inner) => {
            write!(f, "!")?;
            write_expr(f, inner, PREC_UNARY)?;
        }
        Expr::Neg(inner) => {
            write!(f, "-")?;
            write_expr(f, inner, PREC_UNARY)?;
        }
        Expr::Binary { op, left, right } if op.is_method_call() => {
            write_expr(f, left, PREC_POSTFIX)?;
            write!(f, ".{}(", op.symbol())?;
            write_expr(f, right, 0)?;
            write!(f, ")")?;
        }
        Expr::Binary { op, left, right } => {
            let (lhs_min, rhs_min) = match op {
                BinaryOp::Add | BinaryOp::Sub => (PREC_ADD, PREC_MUL),
                BinaryOp::Mul => (PREC_MUL, PREC_UNARY),
                // Relational operators do not chain.
                _ => (PREC_ADD, PREC_ADD),
            };
            write_expr(f, left, lhs_min)?;
            write!(f, " {} ", op.symbol())?;
            write_expr(f, right, rhs_min)?;
        }
        Expr::If {
            guard,
            then_branch,
            else_branch,
        } => {
            write!(f, "if ")?;
            write_expr(f, guard, PREC_OR)?;
            write!(f, " then ")?;
            write_expr(f, then_branch, PREC_OR)?;
            write!(f, " else ")?;
            write_expr(f, else_branch, PREC_OR)?;
        }
        Expr::GetAttr { expr, attr } => {
            write_expr(f, expr, PREC_POSTFIX)?;
            if is_ident(attr) {
                write!(f, ".{}", attr)?;
            } else {
                write!(f, "[\"{}\"]", attr)?;
            }
        }
        Expr::HasAttr { expr, attr } => {
            write_expr(f, expr, PREC_ADD)?;
            if is_ident(attr) {
                write!(f, " has {}", attr)?;
            } else {
                write!(f, " has \"{}\"", attr)?;
            }
        }
        Expr::GetTag { expr, tag } => {
            write_expr(f, expr, PREC_POSTFIX)?;
            write!(f, ".getTag(")?;
            write_expr(f, tag, 0)?;
            write!(f, ")")?;
        }
        Expr::HasTag { expr, tag } => {
            write_expr(f, expr, PREC_POSTFIX)?;
            write!(f, ".hasTag(")?;
            write_expr(f, tag, 0)?;
            write!(f, ")")?;
        }
        Expr::Like { expr, pattern } => {
            write_expr(f, expr, PREC_ADD)?;
            write!(f, " like \"{}\"", pattern)?;
        }
        Expr::Is { expr, entity_type } => {
            write_expr(f, expr, PREC_ADD)?;
            write!(f, " is {}", entity_type)?;
        }
        Expr::Set(elems) => {
            write!(f, "[")?;
            for (i, e) in elems.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_expr(f, e, 0)?;
            }
            write!(f, "]")?;
        }
        Expr::Record(entries) => {
            write!(f, "{{")?;
            for (i, (k, v)) in entries.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "\"{}\": ", k)?;
                write_expr(f, v, 0)?;
            }
            write!(f, "}}")?;
        }
        Expr::ExtCall { function, args } => {
            if function.is_constructor() {
                write!(f, "{}(", function.name())?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_expr(f, a, 0)?;
                }
                write!(f, ")")?;
            } else if let Some((recv, rest)) = args.split_first() {
                write_expr(f, recv, PREC_POSTFIX)?;
                write!(f, ".{}(", function.name())?;
                for (i, a) in rest.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_expr(f, a, 0)?;
                }
                write!(f, ")")?;
            } else {
                // A receiverless method call is malformed; render it as a
                // bare call rather than panicking in a formatter.
                write!(f, "{}()", function.name())?;
            }
        }
        Expr::IsEmpty(inner) => {
            write_expr(f, inner, PREC_POSTFIX)?;
            write!(f, ".isEmpty()")?;
        }
    }
    if prec < min {
        write!(f, ")")?;
    }
    Ok(())
}

fn expr_prec(e: &Expr) -> u8 {
    match e {
        Expr::Value(_) | Expr::Var(_) | Expr::Unknown(_) | Expr::Error(_) | Expr::Set(_)
        | Expr::Record(_) => PREC_PRIMARY,
        Expr::If { .. } => PREC_IF,
        Expr::Or(..) => PREC_OR,
        Expr::And(..) => PREC_AND,
        Expr::Not(_) | Expr::Neg(_) => PREC_UNARY,
        Expr::Binary { op, .. } if op.is_method_call() => PREC_POSTFIX,
        Expr::Binary { op, .. } => match op {
            BinaryOp::Add | BinaryOp::Sub => PREC_ADD,
            BinaryOp::Mul => PREC_MUL,
            _ => PREC_REL,
        },
        Expr::HasAttr { .. } | Expr::Like { .. } | Expr::Is { .. } => PREC_REL,
        Expr::GetAttr { .. }
        | Expr::GetTag { .. }
        | Expr::HasTag { .. }
        | Expr::ExtCall { .. }
        | Expr::IsEmpty(_) => PREC_POSTFIX,
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self, 0)
    }
}

impl fmt::Display for PrincipalScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_head_scope(f, "principal", &HeadScope::from(self))
    }
}

impl fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_head_scope(f, "resource", &HeadScope::from(self))
    }
}

impl fmt::Display for ActionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionScope::All => write!(f, "action"),
            ActionScope::Eq(uid) => write!(f, "action == {}", uid),
            ActionScope::In(uid) => write!(f, "action in {}", uid),
            ActionScope::InSet(uids) => {
                write!(f, "action in [")?;
                for (i, uid) in uids.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", uid)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// The principal and resource axes share one rendering.
enum HeadScope<'a> {
    All,
    Eq(&'a EntityUid),
    In(&'a EntityUid),
    Is(&'a str),
    IsIn(&'a str, &'a EntityUid),
    Slot(crate::ast::scope::SlotId),
    IsSlot(&'a str, crate::ast::scope::SlotId),
}

impl<'a> From<&'a PrincipalScope> for HeadScope<'a> {
    fn from(s: &'a PrincipalScope) -> Self {
        match s {
            PrincipalScope::All => Self::All,
            PrincipalScope::Eq(u) => Self::Eq(u),
            PrincipalScope::In(u) => Self::In(u),
            PrincipalScope::Is(t) => Self::Is(t),
            PrincipalScope::IsIn(t, u) => Self::IsIn(t, u),
            PrincipalScope::Slot(s) => Self::Slot(*s),
            PrincipalScope::IsSlot(t, s) => Self::IsSlot(t, *s),
        }
    }
}

impl<'a> From<&'a ResourceScope> for HeadScope<'a> {
    fn from(s: &'a ResourceScope) -> Self {
        match s {
            ResourceScope::All => Self::All,
            ResourceScope::Eq(u) => Self::Eq(u),
            ResourceScope::In(u) => Self::In(u),
            ResourceScope::Is(t) => Self::Is(t),
            ResourceScope::IsIn(t, u) => Self::IsIn(t, u),
            ResourceScope::Slot(s) => Self::Slot(*s),
            ResourceScope::IsSlot(t, s) => Self::IsSlot(t, *s),
        }
    }
}

fn write_head_scope(f: &mut fmt::Formatter<'_>, axis: &str, scope: &HeadScope<'_>) -> fmt::Result {
    match scope {
        HeadScope::All => write!(f, "{}", axis),
        HeadScope::Eq(uid) => write!(f, "{} == {}", axis, uid),
        HeadScope::In(uid) => write!(f, "{} in {}", axis, uid),
        HeadScope::Is(ty) => write!(f, "{} is {}", axis, ty),
        HeadScope::IsIn(ty, uid) => write!(f, "{} is {} in {}", axis, ty, uid),
        HeadScope::Slot(slot) => write!(f, "{} == {}", axis, slot),
        HeadScope::IsSlot(ty, slot) => write!(f, "{} is {} in {}", axis, ty, slot),
    }
}

fn write_rule(
    f: &mut fmt::Formatter<'_>,
    annotations: &Annotations,
    head: fmt::Arguments<'_>,
    conditions: &[Condition],
) -> fmt::Result {
    for (name, value) in annotations.iter() {
        writeln!(f, "@{}(\"{}\")", name, value)?;
    }
    write!(f, "{}", head)?;
    for c in conditions {
        write!(f, "\n{} {{ {} }}", c.kind, c.body)?;
    }
    write!(f, ";")
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_rule(
            f,
            self.annotations(),
            format_args!(
                "{}({}, {}, {})",
                self.effect(),
                self.principal(),
                self.action(),
                self.resource()
            ),
            self.conditions(),
        )
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_rule(
            f,
            self.annotations(),
            format_args!(
                "{}({}, {}, {})",
                self.effect(),
                self.principal(),
                self.action(),
                self.resource()
            ),
            self.conditions(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::{ExtFn, Var};
    use crate::ast::pattern::Pattern;
    use crate::ast::policy::Effect;
    use crate::ast::scope::SlotId;
    use kernel::Value;

    #[test]
    fn scope_only_policy_renders_on_one_line() {
        let p = Policy::new(
            Effect::Permit,
            PrincipalScope::Eq(EntityUid::new("User", "alice")),
            ActionScope::Eq(EntityUid::new("Action", "read")),
            ResourceScope::All,
            Vec::new(),
        );
        assert_eq!(
            p.to_string(),
            "permit(principal == User::\"alice\", action == Action::\"read\", resource);"
        );
    }

    #[test]
    fn conditions_render_in_declared_order() {
        let p = Policy::new(
            Effect::Forbid,
            PrincipalScope::All,
            ActionScope::All,
            ResourceScope::Is("Doc".into()),
            vec![
                Condition::when(Expr::val(true)),
                Condition::unless(Expr::val(false)),
            ],
        );
        assert_eq!(
            p.to_string(),
            "forbid(principal, action, resource is Doc);\nwhen { true }\nunless { false };"
        );
    }

    #[test]
    fn annotations_render_before_the_head() {
        let mut a = Annotations::new();
        a.insert("id", "p1");
        let p = Policy::permit_all().with_annotations(a);
        assert_eq!(p.to_string(), "@id(\"p1\")\npermit(principal, action, resource);");
    }

    #[test]
    fn operator_precedence_inserts_parentheses() {
        // 1 + 2 * 3 needs no parens; (1 + 2) * 3 does.
        let flat = Expr::add(
            Expr::val(1i64),
            Expr::binary(BinaryOp::Mul, Expr::val(2i64), Expr::val(3i64)),
        );
        assert_eq!(flat.to_string(), "1 + 2 * 3");

        let grouped = Expr::binary(
            BinaryOp::Mul,
            Expr::add(Expr::val(1i64), Expr::val(2i64)),
            Expr::val(3i64),
        );
        assert_eq!(grouped.to_string(), "(1 + 2) * 3");

        let bool_mix = Expr::or(
            Expr::and(Expr::val(true), Expr::val(false)),
            Expr::val(true),
        );
        assert_eq!(bool_mix.to_string(), "true && false || true");

        let and_of_or = Expr::and(
            Expr::or(Expr::val(true), Expr::val(false)),
            Expr::val(true),
        );
        assert_eq!(and_of_or.to_string(), "(true || false) && true");
    }

    #[test]
    fn relational_operands_parenthesize_nested_comparisons() {
        let e = Expr::eq(
            Expr::less(Expr::val(1i64), Expr::val(2i64)),
            Expr::val(true),
        );
        assert_eq!(e.to_string(), "(1 < 2) == true");
    }

    #[test]
    fn postfix_forms_render_as_method_calls() {
        let e = Expr::contains(
            Expr::get_attr(Expr::var(Var::Context), "allowed"),
            Expr::var(Var::Action),
        );
        assert_eq!(e.to_string(), "context.allowed.contains(action)");

        let tag = Expr::has_tag(Expr::var(Var::Resource), Expr::val("env"));
        assert_eq!(tag.to_string(), "resource.hasTag(\"env\")");

        let empty = Expr::is_empty(Expr::var(Var::Context));
        assert_eq!(empty.to_string(), "context.isEmpty()");
    }

    #[test]
    fn awkward_attribute_names_use_index_syntax() {
        let e = Expr::get_attr(Expr::var(Var::Context), "the key");
        assert_eq!(e.to_string(), "context[\"the key\"]");
    }

    #[test]
    fn like_and_is_and_if_render() {
        let like = Expr::like(
            Expr::get_attr(Expr::var(Var::Resource), "name"),
            Pattern::parse("*.txt").unwrap(),
        );
        assert_eq!(like.to_string(), "resource.name like \"*.txt\"");

        let is = Expr::is_type(Expr::var(Var::Principal), "User");
        assert_eq!(is.to_string(), "principal is User");

        let ite = Expr::and(
            Expr::ite(Expr::val(true), Expr::val(1i64), Expr::val(2i64)),
            Expr::val(false),
        );
        assert_eq!(ite.to_string(), "(if true then 1 else 2) && false");
    }

    #[test]
    fn extension_calls_render_constructor_and_method_forms() {
        let ctor = Expr::ext_call(ExtFn::Ip, vec![Expr::val("10.0.0.1")]);
        assert_eq!(ctor.to_string(), "ip(\"10.0.0.1\")");

        let method = Expr::ext_call(
            ExtFn::IsInRange,
            vec![
                Expr::ext_call(ExtFn::Ip, vec![Expr::val("10.0.0.1")]),
                Expr::ext_call(ExtFn::Ip, vec![Expr::val("10.0.0.0/8")]),
            ],
        );
        assert_eq!(
            method.to_string(),
            "ip(\"10.0.0.1\").isInRange(ip(\"10.0.0.0/8\"))"
        );
    }

    #[test]
    fn template_renders_its_slots() {
        let t = Template::new(
            kernel::PolicyId::new("t0"),
            Effect::Permit,
            PrincipalScope::Slot(SlotId::Principal),
            ActionScope::All,
            ResourceScope::IsSlot("Doc".into(), SlotId::Resource),
            Vec::new(),
        );
        assert_eq!(
            t.to_string(),
            "permit(principal == ?principal, action, resource is Doc in ?resource);"
        );
    }

    #[test]
    fn value_literals_render_inside_expressions() {
        let e = Expr::eq(
            Expr::var(Var::Principal),
            Expr::val(Value::entity(EntityUid::new("User", "alice"))),
        );
        assert_eq!(e.to_string(), "principal == User::\"alice\"");
    }
}
