//! Branching conditions attached to a step.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A rule set evaluated on a specific trigger that selects the next step.
///
/// Conditions are stored in authoring order; the first satisfied condition wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// Kind of element that fires the trigger (for example `button` or `text`).
    #[serde(default)]
    pub element_type: String,
    /// Key of the element that fires the trigger.
    #[serde(default)]
    pub element_key: String,
    /// Name of the user action (for example `click`).
    #[serde(default)]
    pub trigger: String,
    /// Rules that must all pass.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Target step when the condition is selected.
    #[serde(default)]
    pub next_step_key: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A single comparison between a field value and a literal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    /// Field key whose current value is compared.
    pub key: String,
    /// Literal the field value is compared against.
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub comparison: Comparison,
}

/// Comparison operators understood by the condition evaluator.
///
/// Operators the engine does not implement deserialize to [`Comparison::Unsupported`],
/// which never passes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    #[default]
    Equal,
    NotEqual,
    #[serde(other)]
    Unsupported,
}
