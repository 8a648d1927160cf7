//! Next-step selection and the rewindable navigation history.
//!
//! The history is a `(sequence, index)` pair. `sequence` lists the steps entered after the
//! origin, in order, and `index` counts how many of them are currently "behind" the user:
//! the current step is `sequence[index - 1]`, or the origin when `index` is zero. Entries
//! at or beyond `index` are forward history left over from going back.

use serde::{Deserialize, Serialize};
use stepform_types::Condition;
use tracing::debug;

use crate::conditions::{TriggerSignature, matches, satisfies};
use crate::error::NavigationError;
use crate::fields::FieldValues;

/// Visited-step history for one form session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationState {
    origin: String,
    sequence: Vec<String>,
    index: usize,
}

impl NavigationState {
    /// Starts an empty history rooted at `origin`.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            sequence: Vec::new(),
            index: 0,
        }
    }

    /// Rebuilds a history from raw parts. `index` is clamped to the sequence length.
    pub fn from_parts(origin: impl Into<String>, sequence: Vec<String>, index: usize) -> Self {
        let index = index.min(sequence.len());
        Self {
            origin: origin.into(),
            sequence,
            index,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn sequence(&self) -> &[String] {
        &self.sequence
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Key of the step the user is on.
    pub fn current_step_key(&self) -> &str {
        match self.index.checked_sub(1).and_then(|position| self.sequence.get(position)) {
            Some(key) => key,
            None => &self.origin,
        }
    }

    /// Records a move to `next_key`.
    ///
    /// Re-entering the step recorded right after the current position only advances the
    /// index. Any other step truncates the forward history before being appended.
    pub fn advance(&mut self, next_key: &str) {
        if self.sequence.get(self.index).map(String::as_str) == Some(next_key) {
            self.index += 1;
        } else {
            self.sequence.truncate(self.index);
            self.sequence.push(next_key.to_string());
            self.index = self.sequence.len();
        }
    }

    /// Moves one entry back and returns the key of the step now current.
    pub fn back(&mut self) -> Result<&str, NavigationError> {
        if self.index == 0 {
            return Err(NavigationError::AtStart);
        }
        self.index -= 1;
        Ok(self.current_step_key())
    }

    /// Jumps directly to a step without a condition, as when a session resumes mid-form.
    pub fn resume_at(&mut self, step_key: &str) {
        if step_key != self.origin {
            self.advance(step_key);
        }
    }
}

/// Result of evaluating a trigger against a step's conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextStep {
    /// Target of the first matching, satisfied condition.
    pub new_step_key: Option<String>,
    /// History after the move; unchanged when no condition qualified.
    pub history: NavigationState,
}

/// Returns the first condition, in declared order, that responds to `signature` and whose
/// rules all pass.
pub fn select_condition<'a>(conditions: &'a [Condition], signature: &TriggerSignature, values: &FieldValues) -> Option<&'a Condition> {
    conditions
        .iter()
        .filter(|condition| matches(condition, signature))
        .find(|condition| satisfies(&condition.rules, values))
}

/// Picks the next step for `signature` and computes the resulting history.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use stepform_engine::conditions::TriggerSignature;
/// use stepform_engine::fields::FieldValues;
/// use stepform_engine::navigation::{NavigationState, next_step_key};
/// use stepform_types::{Comparison, Condition, Rule};
///
/// let conditions = vec![Condition {
///     element_type: "button".into(),
///     element_key: "btn1".into(),
///     trigger: "click".into(),
///     rules: vec![Rule { key: "age".into(), value: json!("18"), comparison: Comparison::Equal }],
///     next_step_key: "S2".into(),
///     ..Default::default()
/// }];
/// let mut values = FieldValues::new();
/// values.insert("age".into(), json!("18"));
///
/// let next = next_step_key(&conditions, &TriggerSignature::button_click("btn1"), &values, &NavigationState::new("S1"));
/// assert_eq!(next.new_step_key.as_deref(), Some("S2"));
/// assert_eq!(next.history.index(), 1);
/// ```
pub fn next_step_key(conditions: &[Condition], signature: &TriggerSignature, values: &FieldValues, history: &NavigationState) -> NextStep {
    let mut history = history.clone();
    let new_step_key = select_condition(conditions, signature, values).map(|condition| condition.next_step_key.clone());
    match &new_step_key {
        Some(key) => {
            history.advance(key);
            debug!(next_step = %key, index = history.index, "condition selected");
        }
        None => debug!(trigger = %signature.trigger, element_type = %signature.element_type, "no condition matched"),
    }
    NextStep { new_step_key, history }
}

/// Like [`next_step_key`] but reports a missing match as an error.
pub fn require_next_step(
    conditions: &[Condition],
    signature: &TriggerSignature,
    values: &FieldValues,
    history: &NavigationState,
) -> Result<(String, NavigationState), NavigationError> {
    let next = next_step_key(conditions, signature, values, history);
    next.new_step_key
        .map(|key| (key, next.history))
        .ok_or_else(|| NavigationError::NoMatchingCondition {
            element_type: signature.element_type.clone(),
            element_keys: signature.element_keys.clone(),
            trigger: signature.trigger.clone(),
        })
}
