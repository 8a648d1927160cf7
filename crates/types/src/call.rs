//! Concrete outbound requests built from step actions.

use serde_json::Value;

use crate::session::StagedFile;

/// Body of an outbound action call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallBody {
    Empty,
    /// Serialized as the JSON request body.
    Json(Value),
    /// The staged file attached under `part_name`.
    Multipart { part_name: String, file: StagedFile },
}

/// A fully templated request ready for the network-call capability.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    /// Upper-case HTTP method.
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: CallBody,
}

impl CallRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
