//! Session-level payloads exchanged with the submission backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::form::{ServarType, Step};

/// Stored progress for an end user returned by the session endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    /// Previously persisted field values keyed by field key.
    #[serde(default)]
    pub field_values: Map<String, Value>,
    /// Step the user should resume on, when known.
    #[serde(default)]
    pub current_step_key: Option<String>,
}

/// A file selected by the user and staged for upload.
///
/// Only one file can be staged at a time, so it is tracked separately from the generic
/// field value map.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFile {
    /// Identifier of the file-upload servar the file was staged for.
    pub field_id: String,
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl StagedFile {
    /// JSON description of the file used where a field value is expected.
    pub fn describe(&self) -> Value {
        serde_json::json!({
            "file_name": self.file_name,
            "content_type": self.content_type,
            "size": self.bytes.len(),
        })
    }
}

impl std::fmt::Debug for StagedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedFile")
            .field("field_id", &self.field_id)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// One non-file field value as sent to the submission backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedField {
    pub key: String,
    pub kind: ServarType,
    pub value: Value,
}

/// Field values captured at submit time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSnapshot {
    /// Non-file fields in step order.
    pub fields: Vec<SubmittedField>,
    /// Staged file and the key of the field it belongs to.
    pub file: Option<(String, StagedFile)>,
}

/// Result of submitting a step.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The form continues with this step.
    Next(Box<Step>),
    /// The form is finished; the client may redirect.
    Terminal { redirect_url: Option<String> },
}

impl SubmitOutcome {
    /// Interprets the body returned by the step submission endpoint.
    ///
    /// An explicit `"step_number": null` marks the end of the form. A body without a step
    /// document (empty, or an object with no step fields) continues with an empty step,
    /// leaving navigation to the step's conditions.
    pub fn from_response(body: Value) -> Result<Self, serde_json::Error> {
        let Value::Object(fields) = &body else {
            return Ok(SubmitOutcome::Next(Box::default()));
        };
        if matches!(fields.get("step_number"), Some(Value::Null)) {
            let redirect_url = fields.get("redirect_url").and_then(Value::as_str).map(str::to_string);
            return Ok(SubmitOutcome::Terminal { redirect_url });
        }
        let step: Step = serde_json::from_value(body)?;
        Ok(SubmitOutcome::Next(Box::new(step)))
    }
}
