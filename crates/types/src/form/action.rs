//! Declarative outbound calls attached to a step.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An outbound call executed when its step is submitted.
///
/// `params` and `response_params` are arbitrary JSON trees whose string leaves may be
/// field identifiers; `url` may embed identifiers inside angle brackets (`<id>`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    /// HTTP method, case-insensitive.
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub body_type: BodyKind,
    pub url: String,
    /// Templated request body tree.
    #[serde(default)]
    pub params: Value,
    /// Tree describing which response values are written back to which fields.
    #[serde(default)]
    pub response_params: Option<Value>,
    /// Identifier of the file-upload field a multipart action expects to send.
    #[serde(default)]
    pub form_data_servar: Option<String>,
    /// Multipart part name the staged file is attached under.
    #[serde(default)]
    pub form_data_key: Option<String>,
}

impl Default for Action {
    fn default() -> Self {
        Self {
            method: default_method(),
            body_type: BodyKind::default(),
            url: String::new(),
            params: Value::Null,
            response_params: None,
            form_data_servar: None,
            form_data_key: None,
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

/// Request body content kind of an action.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum BodyKind {
    /// Templated JSON body built from `params`.
    #[serde(rename = "application/json")]
    Json,
    /// Single staged file sent as multipart form data.
    #[serde(rename = "multipart/form-data")]
    Multipart,
    /// No request body.
    #[default]
    #[serde(other)]
    Empty,
}
