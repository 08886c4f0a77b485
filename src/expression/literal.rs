use super::{SlotMap, Value};
use std::fmt;

/// A single operand of a condition: either a literal or a reference to a slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Literal(Value),
    Slot(String),
}

impl Term {
    /// Resolves the operand against the slot map. A missing slot is `None` (absent),
    /// which is distinct from a slot explicitly set to `Value::Null`.
    pub fn resolve(&self, slots: &SlotMap) -> Option<Value> {
        match self {
            Term::Literal(value) => Some(value.clone()),
            Term::Slot(name) => slots.get(name).cloned(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Literal(Value::Str(s)) => write!(f, "'{}'", s),
            Term::Literal(value) => write!(f, "{}", value),
            Term::Slot(name) => write!(f, "${}", name),
        }
    }
}

/// Parses one token into a `Term`.
///
/// Resolution order: quoted string, strict number, boolean keyword, null keyword,
/// and finally a slot reference. Anything that is not unambiguously a literal is
/// treated as a slot name, so `-`, `--5` and `5-3` are slot lookups.
pub fn parse_literal(token: &str) -> Term {
    let token = token.trim();

    if let Some(inner) = unquote(token) {
        return Term::Literal(Value::Str(inner.to_string()));
    }
    if let Some(number) = parse_number(token) {
        return Term::Literal(number);
    }
    if token.eq_ignore_ascii_case("true") {
        return Term::Literal(Value::Bool(true));
    }
    if token.eq_ignore_ascii_case("false") {
        return Term::Literal(Value::Bool(false));
    }
    if token.eq_ignore_ascii_case("none") || token.eq_ignore_ascii_case("null") {
        return Term::Literal(Value::Null);
    }
    Term::Slot(token.to_string())
}

/// Strict numeric parse: an optional single sign followed only by digits and at
/// most one decimal point.
pub(crate) fn parse_number(token: &str) -> Option<Value> {
    let digits = token.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(token);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    if !digits.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    match digits.matches('.').count() {
        0 => token.parse::<i64>().ok().map(Value::Int),
        1 => token.parse::<f64>().ok().map(Value::Float),
        _ => None,
    }
}

fn unquote(token: &str) -> Option<&str> {
    let mut chars = token.chars();
    let first = chars.next()?;
    if (first == '\'' || first == '"') && token.len() >= 2 && token.ends_with(first) {
        Some(&token[1..token.len() - 1])
    } else {
        None
    }
}
