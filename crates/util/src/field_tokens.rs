//! Field-identifier token syntax.
//!
//! Field identifiers are UUID-v4 shaped strings. They appear in three places:
//! - as bare string leaves in action parameter trees,
//! - inside angle brackets in action URLs (`https://host/users/<id>`),
//! - as `{{token}}` interpolations in text elements, where the token names a field key.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static FIELD_IDENTIFIER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$").expect("valid identifier pattern")
});

static ANGLE_TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^>]*)>").expect("valid angle token pattern"));

static INTERPOLATION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("valid interpolation pattern"));

/// Returns true when `candidate` has the UUID-v4 shape used for field identifiers.
///
/// # Example
/// ```rust
/// use stepform_util::is_field_identifier;
///
/// assert!(is_field_identifier("9b2f6a4e-1c3d-4e5f-8a7b-0c1d2e3f4a5b"));
/// assert!(!is_field_identifier("age"));
/// ```
pub fn is_field_identifier(candidate: &str) -> bool {
    FIELD_IDENTIFIER_PATTERN.is_match(candidate)
}

/// Replaces every `<token>` in `template` for which `resolve` returns a value.
///
/// Tokens that `resolve` does not know are left verbatim, brackets included.
///
/// # Example
/// ```rust
/// use stepform_util::replace_angle_tokens;
///
/// let url = replace_angle_tokens("https://host/<user>/<missing>", |token| {
///     (token == "user").then(|| "42".to_string())
/// });
/// assert_eq!(url, "https://host/42/<missing>");
/// ```
pub fn replace_angle_tokens<F>(template: &str, resolve: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ANGLE_TOKEN_PATTERN
        .replace_all(template, |captures: &Captures| {
            let inner = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            resolve(inner).unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}

/// Extracts the field keys referenced by `{{key}}` interpolations, in order of appearance.
pub fn interpolation_tokens(text: &str) -> Vec<String> {
    INTERPOLATION_PATTERN
        .captures_iter(text)
        .filter_map(|captures| captures.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Renders a JSON value the way it should appear inside text or a URL.
///
/// Strings are emitted without quotes, `null` as the empty string, and everything else in
/// its compact JSON form.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifier_requires_version_four_shape() {
        assert!(is_field_identifier("9B2F6A4E-1C3D-4E5F-8A7B-0C1D2E3F4A5B"));
        // version nibble must be 4
        assert!(!is_field_identifier("9b2f6a4e-1c3d-3e5f-8a7b-0c1d2e3f4a5b"));
        // variant nibble must be 8, 9, a, or b
        assert!(!is_field_identifier("9b2f6a4e-1c3d-4e5f-7a7b-0c1d2e3f4a5b"));
        assert!(!is_field_identifier(" 9b2f6a4e-1c3d-4e5f-8a7b-0c1d2e3f4a5b"));
    }

    #[test]
    fn angle_tokens_keep_unknown_tokens() {
        let replaced = replace_angle_tokens("/a/<x>/b/<y>/<>", |token| match token {
            "x" => Some("1".into()),
            _ => None,
        });
        assert_eq!(replaced, "/a/1/b/<y>/<>");
    }

    #[test]
    fn interpolation_tokens_are_trimmed() {
        assert_eq!(interpolation_tokens("Hi {{ name }}, you owe {{amount}}"), vec!["name", "amount"]);
        assert!(interpolation_tokens("no tokens {here}").is_empty());
    }

    #[test]
    fn value_to_text_renders_scalars() {
        assert_eq!(value_to_text(&json!("plain")), "plain");
        assert_eq!(value_to_text(&json!(18)), "18");
        assert_eq!(value_to_text(&json!(true)), "true");
        assert_eq!(value_to_text(&Value::Null), "");
    }
}
