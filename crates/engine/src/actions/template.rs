//! Substitution of live field values into action requests, and extraction of response
//! values destined for fields.
//!
//! A string leaf is a field reference when it is a known identifier in the lookup map.
//! Response parameter trees mark their targets with UUID-shaped field identifiers.

use serde_json::Value;
use stepform_util::{is_field_identifier, replace_angle_tokens, value_to_text};

use super::context::LookupMap;

/// Deep-copies `params`, replacing every string leaf that names a known field identifier
/// with that field's value. Everything else keeps its exact shape.
///
/// ```rust
/// use serde_json::json;
/// use stepform_engine::actions::{LookupMap, replace_request_params};
///
/// let id = "0f8fad5b-d9cb-469f-a165-70867728950e";
/// let mut lookup = LookupMap::new();
/// lookup.insert(id.into(), json!("Ada"));
///
/// let body = replace_request_params(&json!({"user": {"name": id, "tags": [id, "literal", 3]}}), &lookup);
/// assert_eq!(body, json!({"user": {"name": "Ada", "tags": ["Ada", "literal", 3]}}));
/// ```
pub fn replace_request_params(params: &Value, lookup: &LookupMap) -> Value {
    match params {
        Value::Array(items) => Value::Array(items.iter().map(|item| replace_request_params(item, lookup)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), replace_request_params(value, lookup)))
                .collect(),
        ),
        Value::String(text) => lookup.get(text).cloned().unwrap_or_else(|| params.clone()),
        other => other.clone(),
    }
}

/// Replaces `<identifier>` tokens in `url` with the text of the referenced values.
/// Unknown tokens are left in place, brackets included.
pub fn replace_url_params(url: &str, lookup: &LookupMap) -> String {
    replace_angle_tokens(url, |token| lookup.get(token).map(value_to_text))
}

/// Walks `params` and `response` in lock-step and returns `(identifier, value)` pairs for
/// every identifier leaf, in tree order.
///
/// Branches the response does not contain are skipped.
pub fn collect_response_writes(params: &Value, response: &Value) -> Vec<(String, Value)> {
    let mut writes = Vec::new();
    collect_into(params, response, &mut writes);
    writes
}

fn collect_into(params: &Value, response: &Value, writes: &mut Vec<(String, Value)>) {
    match params {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                if let Some(nested) = response.get(index) {
                    collect_into(item, nested, writes);
                }
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                if let Some(nested) = response.get(key) {
                    collect_into(item, nested, writes);
                }
            }
        }
        Value::String(identifier) if is_field_identifier(identifier) => writes.push((identifier.clone(), response.clone())),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NAME_ID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";
    const CITY_ID: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";

    fn lookup() -> LookupMap {
        LookupMap::from([(NAME_ID.to_string(), json!("Ada")), (CITY_ID.to_string(), json!(42))])
    }

    #[test]
    fn request_substitution_keeps_structure() {
        let unknown = "9b2f6a4e-1c3d-4e5f-8a7b-0c1d2e3f4a5b";
        let params = json!({
            "name": NAME_ID,
            "nested": {"list": [CITY_ID, {"deep": NAME_ID}], "flag": true, "none": null},
            "unknown": unknown,
            "literal": "hello"
        });
        let body = replace_request_params(&params, &lookup());
        assert_eq!(
            body,
            json!({
                "name": "Ada",
                "nested": {"list": [42, {"deep": "Ada"}], "flag": true, "none": null},
                "unknown": unknown,
                "literal": "hello"
            })
        );
    }

    #[test]
    fn url_tokens_use_known_values_only() {
        let url = format!("https://example.com/users/<{NAME_ID}>/cities/<{CITY_ID}>?x=<other>");
        assert_eq!(replace_url_params(&url, &lookup()), "https://example.com/users/Ada/cities/42?x=<other>");
    }

    #[test]
    fn response_writes_follow_the_response_shape() {
        let params = json!({"user": {"name": NAME_ID}, "items": [{"city": CITY_ID}], "missing": {"name": NAME_ID}, "label": "x"});
        let response = json!({"user": {"name": "Grace", "extra": 1}, "items": [{"city": "Paris"}], "label": "ignored"});
        let mut writes = collect_response_writes(&params, &response);
        writes.sort_by(|left, right| left.0.cmp(&right.0));
        assert_eq!(
            writes,
            vec![(NAME_ID.to_string(), json!("Grace")), (CITY_ID.to_string(), json!("Paris"))]
        );
    }

    #[test]
    fn identifier_leaf_takes_whole_subtree() {
        let writes = collect_response_writes(&json!({"profile": NAME_ID}), &json!({"profile": {"a": [1, 2]}}));
        assert_eq!(writes, vec![(NAME_ID.to_string(), json!({"a": [1, 2]}))]);
    }
}
