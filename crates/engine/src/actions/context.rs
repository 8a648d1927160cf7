use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use stepform_types::StagedFile;

/// Field identifier to value map consulted and updated during one pipeline run.
pub type LookupMap = HashMap<String, Value>;

/// Default time the pipeline waits for an action that writes response values back.
pub const DEFAULT_RESPONSE_BUDGET: Duration = Duration::from_secs(1);

/// State owned by a single pipeline run.
///
/// Built from a snapshot of the field store at submit time, so edits made while actions
/// are in flight only reach the next submission.
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    pub lookup: LookupMap,
    pub staged_file: Option<StagedFile>,
    /// Identifier of the current step's file-upload field holding the staged file.
    pub pending_file_field: Option<String>,
}

impl ActionContext {
    pub fn new(lookup: LookupMap, staged_file: Option<StagedFile>, pending_file_field: Option<String>) -> Self {
        Self {
            lookup,
            staged_file,
            pending_file_field,
        }
    }
}

/// Settings shared by every pipeline run of a session.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How long to wait for an action that declares response parameters.
    pub response_budget: Duration,
    /// Bearer credential attached to every action call.
    pub credential: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            response_budget: DEFAULT_RESPONSE_BUDGET,
            credential: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_response_budget(mut self, budget: Duration) -> Self {
        self.response_budget = budget;
        self
    }
}
