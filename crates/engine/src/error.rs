//! Error taxonomy for the step-flow engine.
//!
//! Only [`SessionError`] is returned from session operations as a hard failure. Action
//! failures and timeouts are absorbed by the pipeline and surface in its report, and a
//! trigger that matches no condition leaves the session where it is.

use thiserror::Error;

/// A single field failed its required, length, or format check.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Navigation could not move to another step.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("no condition matched trigger '{trigger}' on {element_type} {element_keys:?}")]
    NoMatchingCondition {
        element_type: String,
        element_keys: Vec<String>,
        trigger: String,
    },

    #[error("step '{0}' is not part of the form definition")]
    UnknownStep(String),

    #[error("already at the start of the navigation history")]
    AtStart,
}

/// One action could not be built or executed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("invalid action request: {reason}")]
    Build { reason: String },

    #[error("multipart action expects file field {expected:?} but the staged file belongs to {staged:?}")]
    FileFieldMismatch {
        expected: Option<String>,
        staged: Option<String>,
    },

    #[error("action call failed: {message}")]
    Transport { message: String },

    #[error("response wait exceeded {budget_ms}ms")]
    Timeout { budget_ms: u64 },
}

/// Depth analysis could not produce a result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("step '{0}' is not part of the step graph")]
    UnknownStep(String),

    #[error("step graph contains a cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("step '{target}' is not reachable from '{origin}'")]
    Unreachable { origin: String, target: String },
}

/// Failures of the session driver.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("backend request failed: {0:#}")]
    Backend(#[from] anyhow::Error),

    #[error("the session has no current step")]
    NoCurrentStep,

    #[error("the form is already finished")]
    Finished,

    #[error("field '{0}' is not part of the current step")]
    UnknownField(String),

    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}
