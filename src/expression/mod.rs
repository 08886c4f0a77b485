//! Condition expressions used by branch and loop steps and by slot validators.
//!
//! Conditions are small boolean expressions over slot values:
//!
//! ```text
//! amount > 100 and currency == 'EUR'
//! not (confirmed)
//! ```
//!
//! Operands are parsed with [`parse_literal`]. Anything that is not unambiguously a
//! literal is a slot reference, and a slot that has not been filled compares as
//! `false` instead of raising an error.

use crate::error::EvaluationError;
use std::fmt;

mod condition;
mod literal;
mod parser;
mod value;

pub use condition::{CompareOp, Condition};
pub use literal::{Term, parse_literal};
pub use parser::parse_condition;
pub use value::{SlotMap, Value};

/// Parses and evaluates `condition` against `slots` in one call.
pub fn evaluate(condition: &str, slots: &SlotMap) -> Result<bool, EvaluationError> {
    parse_condition(condition)?.evaluate(slots)
}

/// A condition parsed ahead of time, together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    source: String,
    condition: Condition,
}

impl Predicate {
    pub fn parse(source: &str) -> Result<Self, EvaluationError> {
        Ok(Self {
            source: source.trim().to_string(),
            condition: parse_condition(source)?,
        })
    }

    pub fn evaluate(&self, slots: &SlotMap) -> Result<bool, EvaluationError> {
        let outcome = self.condition.evaluate(slots)?;
        tracing::trace!(condition = %self.source, outcome, "evaluated condition");
        Ok(outcome)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}
