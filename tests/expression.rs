//! Tests for literal parsing and condition evaluation.
mod common;
use common::slots;
use proptest::prelude::*;
use taiwa::expression::{Predicate, Term, parse_condition};
use taiwa::prelude::*;

#[cfg(test)]
mod literal_tests {
    use super::*;

    #[test]
    #[allow(clippy::approx_constant)]
    fn numbers_are_parsed_strictly() {
        assert_eq!(parse_literal("42"), Term::Literal(Value::Int(42)));
        assert_eq!(parse_literal("3.14"), Term::Literal(Value::Float(3.14)));
        assert_eq!(parse_literal("-5"), Term::Literal(Value::Int(-5)));
    }

    #[test]
    fn ambiguous_tokens_are_slot_references() {
        assert_eq!(parse_literal("-"), Term::Slot("-".to_string()));
        assert_eq!(parse_literal("--5"), Term::Slot("--5".to_string()));
        assert_eq!(parse_literal("5-3"), Term::Slot("5-3".to_string()));
        assert_eq!(parse_literal("amount"), Term::Slot("amount".to_string()));
    }

    #[test]
    fn keywords_and_quoted_strings() {
        assert_eq!(parse_literal("true"), Term::Literal(Value::Bool(true)));
        assert_eq!(parse_literal("FALSE"), Term::Literal(Value::Bool(false)));
        assert_eq!(parse_literal("None"), Term::Literal(Value::Null));
        assert_eq!(parse_literal("null"), Term::Literal(Value::Null));
        assert_eq!(
            parse_literal("'EUR'"),
            Term::Literal(Value::Str("EUR".to_string()))
        );
        assert_eq!(
            parse_literal("\"42\""),
            Term::Literal(Value::Str("42".to_string()))
        );
    }
}

#[cfg(test)]
mod evaluation_tests {
    use super::*;

    #[test]
    fn missing_slots_compare_false_instead_of_failing() {
        let empty = SlotMap::new();
        for condition in ["amount > 100", "amount < 100", "amount == 5", "name == 'x'", "flag"] {
            assert_eq!(evaluate(condition, &empty), Ok(false), "{}", condition);
        }
        // The negation of a failed lookup holds.
        assert_eq!(evaluate("not amount > 100", &empty), Ok(true));
    }

    #[test]
    fn comparisons_against_slots() {
        let slots = slots(&[
            ("amount", Value::Int(150)),
            ("currency", Value::from("EUR")),
            ("vip", Value::Bool(true)),
        ]);
        assert_eq!(evaluate("amount > 100", &slots), Ok(true));
        assert_eq!(evaluate("amount >= 150 and currency == 'EUR'", &slots), Ok(true));
        assert_eq!(evaluate("amount < 100 or currency != 'EUR'", &slots), Ok(false));
        assert_eq!(evaluate("vip and not (amount < 10)", &slots), Ok(true));
        assert_eq!(evaluate("vip == true", &slots), Ok(true));
    }

    #[test]
    fn numeric_text_is_compared_as_a_number() {
        let slots = slots(&[("amount", Value::from("250"))]);
        assert_eq!(evaluate("amount > 100", &slots), Ok(true));
        assert_eq!(evaluate("amount == 250.0", &slots), Ok(true));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let slots = slots(&[("a", Value::Bool(true)), ("b", Value::Bool(false))]);
        // a or (b and b)
        assert_eq!(evaluate("a or b and b", &slots), Ok(true));
        assert_eq!(evaluate("(a or b) and b", &slots), Ok(false));
    }

    #[test]
    fn ordering_unrelated_kinds_is_an_error() {
        let slots = slots(&[("flag", Value::Bool(true))]);
        let err = evaluate("flag > 3", &slots).unwrap_err();
        assert!(matches!(err, EvaluationError::Incomparable { operator: ">", .. }));
    }

    #[test]
    fn malformed_conditions_are_rejected() {
        assert_eq!(parse_condition(""), Err(EvaluationError::Empty));
        assert!(matches!(
            parse_condition("amount = 3"),
            Err(EvaluationError::UnexpectedCharacter { character: '=', .. })
        ));
        assert!(matches!(
            parse_condition("name == 'open"),
            Err(EvaluationError::UnterminatedString { .. })
        ));
        assert!(matches!(
            parse_condition("(a and b"),
            Err(EvaluationError::UnexpectedEnd { .. })
        ));
        assert!(matches!(
            parse_condition("a b"),
            Err(EvaluationError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn predicates_keep_their_source() {
        let predicate = Predicate::parse("  amount > 0 ").unwrap();
        assert_eq!(predicate.source(), "amount > 0");
        assert_eq!(predicate.evaluate(&slots(&[("amount", Value::Int(1))])), Ok(true));
    }

    #[test]
    fn whole_floats_display_without_a_fraction() {
        assert_eq!(Value::Float(50.0).to_string(), "50");
        assert_eq!(Value::Float(-3.0).to_string(), "-3");
        assert_eq!(Value::Float(12.5).to_string(), "12.5");
        assert_eq!(Value::Float(1e20).to_string(), "100000000000000000000");
        assert_eq!(Value::Float(f64::INFINITY).to_string(), "inf");
    }

    #[test]
    fn free_text_is_inferred() {
        assert_eq!(Value::infer(" 50 "), Value::Int(50));
        assert_eq!(Value::infer("12.5"), Value::Float(12.5));
        assert_eq!(Value::infer("True"), Value::Bool(true));
        assert_eq!(Value::infer("Ana"), Value::from("Ana"));
        assert_eq!(Value::infer("5-3"), Value::from("5-3"));
    }
}

proptest! {
    #[test]
    fn integers_parse_to_themselves(n in any::<i64>()) {
        prop_assert_eq!(parse_literal(&n.to_string()), Term::Literal(Value::Int(n)));
    }

    #[test]
    fn absent_slots_never_error(
        name in "[a-z][a-z_]{0,8}",
        op in prop::sample::select(vec!["==", "!=", ">", ">=", "<", "<="]),
        literal in prop_oneof![
            any::<i32>().prop_map(|n| n.to_string()),
            "[a-z]{1,6}".prop_map(|s| format!("'{}'", s)),
            Just("true".to_string()),
        ],
    ) {
        prop_assume!(!["and", "or", "not", "true", "false", "none", "null"].contains(&name.as_str()));
        let condition = format!("{} {} {}", name, op, literal);
        prop_assert_eq!(evaluate(&condition, &SlotMap::new()), Ok(false));
    }

    #[test]
    fn integer_comparisons_match_rust(a in -1000i64..1000, b in -1000i64..1000) {
        let slots = slots(&[("a", Value::Int(a))]);
        prop_assert_eq!(evaluate(&format!("a > {}", b), &slots), Ok(a > b));
        prop_assert_eq!(evaluate(&format!("a <= {}", b), &slots), Ok(a <= b));
        prop_assert_eq!(evaluate(&format!("a != {}", b), &slots), Ok(a != b));
    }
}
