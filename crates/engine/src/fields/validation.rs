//! Per-field validation.
//!
//! Every check reduces to a single human-readable message. The required check runs
//! first; type-specific checks only apply to non-empty values.

use serde_json::Value;
use stepform_types::{Servar, ServarType};

use crate::error::ValidationError;

pub const REQUIRED_MESSAGE: &str = "This is a required field";

/// Validate a candidate value for `servar`, returning the first failure.
pub fn field_error(value: &Value, servar: &Servar) -> Option<ValidationError> {
    if is_empty_value(value, &servar.kind) {
        return servar.required.then(|| ValidationError::new(REQUIRED_MESSAGE));
    }

    match &servar.kind {
        ServarType::TextField | ServarType::TextArea => length_error(value, servar),
        ServarType::IntegerField => integer_error(value),
        ServarType::PinInput => pin_error(value, servar.max_length),
        ServarType::HexColor => hex_color_error(value),
        _ => None,
    }
}

/// True when the value counts as "not provided" for its field type.
pub fn is_empty_value(value: &Value, kind: &ServarType) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Bool(checked) => matches!(kind, ServarType::Checkbox) && !checked,
        _ => false,
    }
}

fn length_error(value: &Value, servar: &Servar) -> Option<ValidationError> {
    let Value::String(text) = value else {
        return None;
    };
    let length = text.chars().count();
    if let Some(min_length) = servar.min_length
        && length < min_length
    {
        return Some(ValidationError::new(format!("Must be at least {min_length} characters")));
    }
    if let Some(max_length) = servar.max_length
        && length > max_length
    {
        return Some(ValidationError::new(format!("Must be at most {max_length} characters")));
    }
    None
}

fn integer_error(value: &Value) -> Option<ValidationError> {
    let is_integer = match value {
        Value::Number(number) => number.is_i64() || number.is_u64(),
        Value::String(text) => text.trim().parse::<i64>().is_ok(),
        _ => false,
    };
    (!is_integer).then(|| ValidationError::new("Must be a whole number"))
}

fn pin_error(value: &Value, max_length: Option<usize>) -> Option<ValidationError> {
    let text = stepform_util::value_to_text(value);
    let all_digits = text.chars().all(|character| character.is_ascii_digit());
    match max_length {
        Some(expected) if text.chars().count() != expected || !all_digits => {
            Some(ValidationError::new(format!("Must be {expected} digits")))
        }
        None if !all_digits => Some(ValidationError::new("Must contain only digits")),
        _ => None,
    }
}

fn hex_color_error(value: &Value) -> Option<ValidationError> {
    let text = stepform_util::value_to_text(value);
    let valid = text.len() == 6 && text.chars().all(|character| character.is_ascii_hexdigit());
    (!valid).then(|| ValidationError::new("Must be a 6-digit hex color"))
}
