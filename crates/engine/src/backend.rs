//! Form-definition and submission collaborators as seen by the session driver.

use anyhow::Result;
use serde_json::{Map, Value};
use async_trait::async_trait;
use stepform_api::FormClient;
use stepform_types::{FieldSnapshot, FormDefinition, SessionSnapshot, SubmitOutcome};

/// Supplies form definitions and persists submitted steps.
#[async_trait]
pub trait FormBackend: Send + Sync {
    /// Fetches every step of a form.
    async fn fetch_form(&self, form_key: &str) -> Result<FormDefinition>;

    /// Fetches the stored progress of the current end user.
    async fn fetch_session(&self, form_key: &str) -> Result<SessionSnapshot>;

    /// Persists the values of a step and returns what comes next.
    async fn submit_step(&self, form_key: &str, step_key: &str, snapshot: &FieldSnapshot, skip: bool) -> Result<SubmitOutcome>;

    /// Stores key/value pairs attached to the end user outside of any step.
    async fn submit_custom(&self, form_key: &str, custom_key_values: &Map<String, Value>) -> Result<()>;

    /// Records a step lifecycle event. Failures are not reported to the caller.
    async fn register_event(&self, _form_key: &str, _step_key: &str, _event: &str) {}
}

#[async_trait]
impl FormBackend for FormClient {
    async fn fetch_form(&self, form_key: &str) -> Result<FormDefinition> {
        FormClient::fetch_form(self, form_key).await
    }

    async fn fetch_session(&self, form_key: &str) -> Result<SessionSnapshot> {
        FormClient::fetch_session(self, form_key).await
    }

    async fn submit_step(&self, form_key: &str, step_key: &str, snapshot: &FieldSnapshot, skip: bool) -> Result<SubmitOutcome> {
        FormClient::submit_step(self, form_key, step_key, snapshot, skip).await
    }

    async fn submit_custom(&self, form_key: &str, custom_key_values: &Map<String, Value>) -> Result<()> {
        FormClient::submit_custom(self, form_key, custom_key_values).await
    }

    async fn register_event(&self, form_key: &str, step_key: &str, event: &str) {
        if let Err(error) = FormClient::register_event(self, form_key, step_key, event).await {
            tracing::debug!(form_key = %form_key, step_key = %step_key, event = %event, error = %error, "event not recorded");
        }
    }
}
