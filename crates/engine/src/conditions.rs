//! # Condition Evaluation
//!
//! Pure rule matching over field values. A condition responds to a trigger signature
//! (element type, element key, trigger name) and is satisfied when every one of its rules
//! passes.
//!
//! ## Comparison semantics
//!
//! - Scalar field values compare loosely: two values are equal when they are the same JSON
//!   value or when their textual renderings match, so an integer field holding `18`
//!   satisfies a rule authored with `"18"`.
//! - Array field values turn `equal` into membership and `not_equal` into its negation.
//! - Unsupported operators never pass.
//!
//! ```rust
//! use serde_json::json;
//! use stepform_engine::conditions::satisfies;
//! use stepform_engine::fields::FieldValues;
//! use stepform_types::{Comparison, Rule};
//!
//! let mut values = FieldValues::new();
//! values.insert("tags".into(), json!(["a", "b"]));
//! let rules = vec![Rule { key: "tags".into(), value: json!("b"), comparison: Comparison::Equal }];
//! assert!(satisfies(&rules, &values));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stepform_types::{Comparison, Condition, Rule};
use stepform_util::value_to_text;
use tracing::warn;

use crate::fields::FieldValues;

/// Identifies the user action that fired: which element, and what happened to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSignature {
    pub element_type: String,
    /// Keys the element is known by; a condition matches when its key is among them.
    pub element_keys: Vec<String>,
    pub trigger: String,
}

impl TriggerSignature {
    pub fn new(element_type: impl Into<String>, element_key: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            element_type: element_type.into(),
            element_keys: vec![element_key.into()],
            trigger: trigger.into(),
        }
    }

    /// Click on a button element.
    pub fn button_click(element_key: impl Into<String>) -> Self {
        Self::new("button", element_key, "click")
    }
}

/// True when `condition` responds to the trigger described by `signature`.
pub fn matches(condition: &Condition, signature: &TriggerSignature) -> bool {
    condition.element_type == signature.element_type
        && signature.element_keys.iter().any(|key| key == &condition.element_key)
        && condition.trigger == signature.trigger
}

/// True when every rule passes against `values`. An empty rule list is satisfied.
pub fn satisfies(rules: &[Rule], values: &FieldValues) -> bool {
    rules.iter().all(|rule| rule_passes(rule, values))
}

/// Evaluates a single rule.
pub fn rule_passes(rule: &Rule, values: &FieldValues) -> bool {
    let field_value = values.get(&rule.key).unwrap_or(&Value::Null);
    match (rule.comparison, field_value) {
        (Comparison::Equal, Value::Array(items)) => items.iter().any(|item| loosely_equal(item, &rule.value)),
        (Comparison::NotEqual, Value::Array(items)) => !items.iter().any(|item| loosely_equal(item, &rule.value)),
        (Comparison::Equal, scalar) => loosely_equal(scalar, &rule.value),
        (Comparison::NotEqual, scalar) => !loosely_equal(scalar, &rule.value),
        (Comparison::Unsupported, _) => {
            warn!(field = %rule.key, "unsupported comparison operator; rule fails");
            false
        }
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    left == right || value_to_text(left) == value_to_text(right)
}
