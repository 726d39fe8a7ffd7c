//! Mapper/decision branch evaluation (spec §4.7 step 3): a condition
//! compares an upstream node's output against a literal, producing the
//! branch label (`"true"`/`"false"`) used to pick the outgoing edge whose
//! `source_handle` matches.

use crate::model::EdgeCondition;
use serde_json::Value;

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Evaluates `actual op expected`, returning the branch label to follow.
pub fn evaluate(op: EdgeCondition, actual: &Value, expected: &str) -> bool {
    match op {
        EdgeCondition::Contains => stringify(actual).contains(expected),
        EdgeCondition::Equals => stringify(actual) == expected,
        EdgeCondition::Regex => regex::Regex::new(expected).map(|re| re.is_match(&stringify(actual))).unwrap_or(false),
        EdgeCondition::Greater => match (actual.as_f64(), expected.parse::<f64>()) {
            (Some(a), Ok(e)) => a > e,
            _ => false,
        },
        EdgeCondition::Less => match (actual.as_f64(), expected.parse::<f64>()) {
            (Some(a), Ok(e)) => a < e,
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn contains_matches_substring() {
        assert!(evaluate(EdgeCondition::Contains, &json!("hello world"), "world"));
        assert!(!evaluate(EdgeCondition::Contains, &json!("hello world"), "xyz"));
    }

    #[test]
    fn equals_compares_stringified_value() {
        assert!(evaluate(EdgeCondition::Equals, &json!("ok"), "ok"));
        assert!(evaluate(EdgeCondition::Equals, &json!(5), "5"));
    }

    #[test]
    fn regex_matches_pattern() {
        assert!(evaluate(EdgeCondition::Regex, &json!("order-123"), r"^order-\d+$"));
    }

    #[test]
    fn greater_and_less_compare_numerically() {
        assert!(evaluate(EdgeCondition::Greater, &json!(10), "5"));
        assert!(!evaluate(EdgeCondition::Greater, &json!(3), "5"));
        assert!(evaluate(EdgeCondition::Less, &json!(3), "5"));
    }
}
