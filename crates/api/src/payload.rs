//! Request bodies sent to the form backend.

use serde_json::{Map, Value, json};
use stepform_types::FieldSnapshot;

/// Step submission body: `{"servars": [{"key": k, <type>: value}], "panel_key": ..., ...}`.
///
/// File fields are never part of this body; they go through the multipart endpoint.
pub fn step_submission(form_key: &str, step_key: &str, snapshot: &FieldSnapshot, skip: bool, user_key: Option<&str>) -> Value {
    let servars: Vec<Value> = snapshot
        .fields
        .iter()
        .map(|field| {
            let mut entry = Map::new();
            entry.insert("key".into(), Value::String(field.key.clone()));
            entry.insert(field.kind.as_str().to_string(), field.value.clone());
            Value::Object(entry)
        })
        .collect();

    let mut body = Map::new();
    body.insert("servars".into(), Value::Array(servars));
    body.insert("panel_key".into(), Value::String(form_key.to_string()));
    body.insert("step_key".into(), Value::String(step_key.to_string()));
    if skip {
        body.insert("skip".into(), Value::Bool(true));
    }
    insert_user_key(&mut body, user_key);
    Value::Object(body)
}

/// Body persisting one field value written back by an action.
pub fn field_write(field_id: &str, value: &Value, user_key: Option<&str>) -> Value {
    json!({
        "fuser_key": user_key,
        "servar_id": field_id,
        "value": value,
    })
}

/// Body of a custom key/value submission.
pub fn custom_submission(form_key: &str, custom_key_values: &Map<String, Value>, user_key: Option<&str>) -> Value {
    let mut body = Map::new();
    body.insert("custom_key_values".into(), Value::Object(custom_key_values.clone()));
    body.insert("form_key".into(), Value::String(form_key.to_string()));
    insert_user_key(&mut body, user_key);
    Value::Object(body)
}

/// Body of a step lifecycle event.
pub fn step_event(form_key: &str, step_key: &str, event: &str, user_key: Option<&str>) -> Value {
    let mut body = Map::new();
    body.insert("form_key".into(), Value::String(form_key.to_string()));
    body.insert("step_key".into(), Value::String(step_key.to_string()));
    body.insert("event".into(), Value::String(event.to_string()));
    insert_user_key(&mut body, user_key);
    Value::Object(body)
}

fn insert_user_key(body: &mut Map<String, Value>, user_key: Option<&str>) {
    if let Some(user_key) = user_key {
        body.insert("fuser_key".into(), Value::String(user_key.to_string()));
    }
}
