use super::literal::{Term, parse_number};
use super::{SlotMap, Value};
use crate::error::EvaluationError;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }

    fn is_equality(&self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
        }
    }
}

/// A parsed condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Term(Term),
    Compare { op: CompareOp, left: Term, right: Term },
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    /// Evaluates the tree against a slot map.
    ///
    /// Comparisons involving an absent slot are `false`; only a genuine type clash
    /// under an ordering operator is an error.
    pub fn evaluate(&self, slots: &SlotMap) -> Result<bool, EvaluationError> {
        match self {
            Condition::Term(term) => Ok(term.resolve(slots).is_some_and(|v| v.is_truthy())),
            Condition::Compare { op, left, right } => {
                match (left.resolve(slots), right.resolve(slots)) {
                    (Some(l), Some(r)) => compare(*op, &l, &r),
                    _ => Ok(false),
                }
            }
            Condition::Not(inner) => Ok(!inner.evaluate(slots)?),
            Condition::And(l, r) => Ok(l.evaluate(slots)? && r.evaluate(slots)?),
            Condition::Or(l, r) => Ok(l.evaluate(slots)? || r.evaluate(slots)?),
        }
    }

    /// Collects the slot names the condition reads.
    pub fn slot_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Term(Term::Slot(name)) => out.push(name),
            Condition::Term(_) => {}
            Condition::Compare { left, right, .. } => {
                for term in [left, right] {
                    if let Term::Slot(name) = term {
                        out.push(name);
                    }
                }
            }
            Condition::Not(inner) => inner.slot_refs(out),
            Condition::And(l, r) | Condition::Or(l, r) => {
                l.slot_refs(out);
                r.slot_refs(out);
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Term(term) => write!(f, "{}", term),
            Condition::Compare { op, left, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            Condition::Not(inner) => write!(f, "NOT ({})", inner),
            Condition::And(l, r) => write!(f, "({} AND {})", l, r),
            Condition::Or(l, r) => write!(f, "({} OR {})", l, r),
        }
    }
}

fn as_bool_keyword(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, EvaluationError> {
    let ordering = match (left, right) {
        (Value::Int(l), Value::Int(r)) => Some(l.cmp(r)),
        (l, r) if l.is_numeric() && r.is_numeric() => {
            numeric_ordering(l, r)
        }
        (Value::Str(s), n) | (n, Value::Str(s)) if n.is_numeric() => {
            match parse_number(s.trim()) {
                // Keep the operand order for the ordering result.
                Some(coerced) if matches!(left, Value::Str(_)) => numeric_ordering(&coerced, n),
                Some(coerced) => numeric_ordering(n, &coerced),
                None => None,
            }
        }
        (Value::Str(l), Value::Str(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) if op.is_equality() => Some(l.cmp(r)),
        (Value::Str(s), Value::Bool(b)) | (Value::Bool(b), Value::Str(s)) if op.is_equality() => {
            as_bool_keyword(s).map(|parsed| parsed.cmp(b))
        }
        (Value::Null, Value::Null) if op.is_equality() => Some(Ordering::Equal),
        _ => None,
    };

    match ordering {
        Some(ordering) => Ok(op.holds(ordering)),
        None if op.is_equality() => Ok(op == CompareOp::Ne),
        None if left.is_numeric() && right.is_numeric() => Ok(false), // NaN
        None => Err(EvaluationError::Incomparable {
            operator: op.symbol(),
            left: left.clone(),
            right: right.clone(),
        }),
    }
}

fn numeric_ordering(left: &Value, right: &Value) -> Option<Ordering> {
    left.as_f64()?.partial_cmp(&right.as_f64()?)
}
