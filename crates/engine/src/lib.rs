//! # Stepform Engine
//!
//! The step-flow engine behind Stepform: a small interpreter over server-authored form
//! definitions that decides which step comes next, runs the outbound calls a step
//! declares, and computes the grid geometry of the step about to be shown.
//!
//! ## Key Features
//!
//! - **Field values**: typed defaults, edits, validation, and per-step formatting
//! - **Branching navigation**: first-match condition evaluation over a rewindable history
//! - **Depth analysis**: min/max path lengths over the step graph for progress estimates
//! - **Action pipeline**: sequential templated calls with bounded response write-back
//! - **Layout**: responsive column sizing and repeat-band row expansion
//!
//! ## Usage
//!
//! ```rust
//! use stepform_engine::conditions::TriggerSignature;
//! use stepform_engine::fields::default_field_values;
//! use stepform_engine::navigation::{NavigationState, next_step_key};
//!
//! let temp_dir = tempfile::tempdir()?;
//! let path = temp_dir.path().join("form.yaml");
//! std::fs::write(&path, r#"
//! steps:
//!   start:
//!     origin: true
//!     next_conditions:
//!       - {element_type: button, element_key: go, trigger: click, next_step_key: done}
//!   done: {}
//! "#)?;
//!
//! let definition = stepform_engine::load_form_definition(&path)?;
//! let values = default_field_values(definition.steps.values());
//! let start = &definition.steps["start"];
//! let next = next_step_key(&start.next_conditions, &TriggerSignature::button_click("go"), &values, &NavigationState::new("start"));
//! assert_eq!(next.new_step_key.as_deref(), Some("done"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`fields`**: the field value store and validation
//! - **`conditions`** / **`navigation`**: trigger matching and next-step selection
//! - **`graph`**: the step graph and depth analysis
//! - **`actions`**: the action pipeline and its transport seams
//! - **`layout`**: grid dimensions
//! - **`session`**: [`FormSession`], which drives all of the above against a [`FormBackend`]

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde_json::Value;

pub mod actions;
pub mod backend;
pub mod conditions;
pub mod error;
pub mod fields;
pub mod graph;
pub mod layout;
pub mod navigation;
pub mod session;

pub use actions::{ActionContext, ActionOutcome, ActionPipeline, ActionTransport, EchoTransport, FieldWriter, PipelineConfig, PipelineReport};
pub use backend::FormBackend;
pub use conditions::TriggerSignature;
pub use error::{ActionError, GraphError, NavigationError, SessionError, ValidationError};
pub use fields::{FieldEdit, FieldValueStore, FieldValues};
pub use graph::{DepthRange, StepGraph};
pub use layout::{Dimensions, Viewport};
pub use navigation::{NavigationState, NextStep};
pub use session::{FormSession, NavigationOutcome, RealtimeFields, StepTransition};

/// Loads a form definition from a JSON or YAML file.
///
/// Files ending in `.json` are parsed as JSON; anything else is parsed as YAML. The
/// document may key steps by step key or list them.
///
/// # Errors
///
/// Returns an error when the file cannot be read or does not describe a form.
pub fn load_form_definition(file_path: impl AsRef<Path>) -> Result<stepform_types::FormDefinition> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("failed to read form definition: {}", file_path.display()))?;

    let is_json = file_path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
    let document: Value = if is_json {
        serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", file_path.display()))?
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("invalid YAML in {}", file_path.display()))?
    };

    stepform_types::FormDefinition::from_value(document)
        .with_context(|| format!("{} does not describe a form definition", file_path.display()))
}
