//! Session driver wiring the engine components to the collaborators.
//!
//! A [`FormSession`] owns the field store and navigation history of one end user working
//! through one form. Step changes come from two places: conditions selected by a trigger,
//! and the step returned by the submission backend for forms without conditions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde_json::Value;
use stepform_types::{FormDefinition, StagedFile, Step, SubmitOutcome};
use tracing::{debug, info};

use crate::actions::{ActionPipeline, PipelineReport};
use crate::backend::FormBackend;
use crate::conditions::TriggerSignature;
use crate::error::{NavigationError, SessionError, ValidationError};
use crate::fields::{FieldEdit, FieldValueStore, FieldValues, FormattedField, format_fields};
use crate::graph::{StepGraph, linear_progress_percent};
use crate::layout::{Dimensions, Viewport, calculate_dimensions};
use crate::navigation::{NavigationState, next_step_key};

/// Field values published after each submission for programmatic readers.
#[derive(Debug, Clone, Default)]
pub struct RealtimeFields {
    inner: Arc<RwLock<FieldValues>>,
}

impl RealtimeFields {
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.inner.read() {
            Ok(values) => values.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    pub fn snapshot(&self) -> FieldValues {
        match self.inner.read() {
            Ok(values) => values.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, entries: impl IntoIterator<Item = (String, Value)>) {
        let mut values = match self.inner.write() {
            Ok(values) => values,
            Err(poisoned) => poisoned.into_inner(),
        };
        values.extend(entries);
    }
}

/// Where the session stands after a trigger or a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Moved { from: String, to: String },
    /// No condition selected a step; the session stays put.
    Stayed,
    /// The form is complete.
    Finished { redirect_url: Option<String> },
}

/// Result of submitting the current step.
#[derive(Debug, Clone)]
pub struct StepTransition {
    /// Pipeline report; `None` when the step was skipped.
    pub pipeline: Option<PipelineReport>,
    pub navigation: NavigationOutcome,
}

/// One end user's pass through one form.
pub struct FormSession {
    form_key: String,
    backend: Arc<dyn FormBackend>,
    pipeline: ActionPipeline,
    definition: FormDefinition,
    graph: StepGraph,
    store: FieldValueStore,
    navigation: NavigationState,
    current: Step,
    realtime: RealtimeFields,
    finished: Option<Option<String>>,
}

impl std::fmt::Debug for FormSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormSession")
            .field("form_key", &self.form_key)
            .field("current_step", &self.current.key)
            .field("navigation", &self.navigation)
            .field("finished", &self.finished)
            .finish()
    }
}

impl FormSession {
    /// Fetches the form and the stored progress, hydrates defaults, and positions the
    /// session on the resume step (or the origin).
    pub async fn begin(form_key: impl Into<String>, backend: Arc<dyn FormBackend>, pipeline: ActionPipeline) -> Result<Self, SessionError> {
        let form_key = form_key.into();
        let definition = backend.fetch_form(&form_key).await?.normalized();
        let snapshot = backend.fetch_session(&form_key).await?;

        let origin = definition
            .origin_key()
            .or_else(|| definition.steps.keys().next().map(String::as_str))
            .map(str::to_string)
            .ok_or(SessionError::NoCurrentStep)?;

        let mut store = FieldValueStore::new();
        store.hydrate_definition(&definition);
        store.merge(snapshot.field_values);

        let mut navigation = NavigationState::new(origin);
        if let Some(resume) = snapshot.current_step_key.filter(|key| definition.steps.contains_key(key)) {
            navigation.resume_at(&resume);
        }
        let current = definition
            .step(navigation.current_step_key())
            .cloned()
            .ok_or_else(|| NavigationError::UnknownStep(navigation.current_step_key().to_string()))?;

        info!(form_key = %form_key, step_key = %current.key, steps = definition.steps.len(), "form session started");
        let session = Self {
            graph: StepGraph::from_definition(&definition),
            form_key,
            backend,
            pipeline,
            definition,
            store,
            navigation,
            current,
            realtime: RealtimeFields::default(),
            finished: None,
        };
        session.emit_event("load");
        Ok(session)
    }

    pub fn form_key(&self) -> &str {
        &self.form_key
    }

    pub fn current_step(&self) -> &Step {
        &self.current
    }

    pub fn definition(&self) -> &FormDefinition {
        &self.definition
    }

    pub fn navigation(&self) -> &NavigationState {
        &self.navigation
    }

    pub fn field_values(&self) -> &FieldValues {
        self.store.values()
    }

    pub fn realtime_fields(&self) -> RealtimeFields {
        self.realtime.clone()
    }

    /// Redirect target once the form is finished; `None` while the form is in progress.
    pub fn finished(&self) -> Option<Option<&str>> {
        self.finished.as_ref().map(Option::as_deref)
    }

    /// Fields of the current step formatted for external consumers.
    pub fn formatted_fields(&self) -> IndexMap<String, FormattedField> {
        format_fields(&self.current, self.store.values(), self.store.staged_file())
    }

    /// Applies an edit to a field of the current step.
    pub fn apply_edit(&mut self, field_key: &str, edit: FieldEdit) -> Result<Option<ValidationError>, SessionError> {
        let servar = self
            .current
            .servars()
            .find(|servar| servar.key == field_key)
            .cloned()
            .ok_or_else(|| SessionError::UnknownField(field_key.to_string()))?;
        Ok(self.store.apply_edit(&servar, edit))
    }

    pub fn stage_file(&mut self, file: StagedFile) {
        self.store.stage_file(file);
    }

    /// Whether a `next` button on the current step should be enabled.
    pub fn is_filled(&self) -> bool {
        self.store.is_filled(&self.current)
    }

    /// Validation failures of the current step keyed by field key.
    pub fn validate(&self) -> Vec<(String, ValidationError)> {
        self.store.validate_step(&self.current)
    }

    /// Grid geometry of the current step.
    pub fn dimensions(&self, viewport: Viewport) -> Dimensions {
        calculate_dimensions(&self.current, viewport, self.store.values())
    }

    /// Progress through the form as a percentage.
    ///
    /// Uses the step's reported position when present, otherwise the longest-path
    /// estimate over the step graph.
    pub fn progress(&self) -> Option<u32> {
        linear_progress_percent(&self.current).or_else(|| {
            self.graph
                .progress_percent(self.navigation.origin(), &self.current.key)
                .inspect_err(|error| debug!(error = %error, "progress unavailable"))
                .ok()
        })
    }

    /// Navigates by the current step's conditions without submitting anything.
    pub fn trigger(&mut self, signature: &TriggerSignature) -> Result<NavigationOutcome, SessionError> {
        self.ensure_active()?;
        let next = next_step_key(&self.current.next_conditions, signature, self.store.values(), &self.navigation);
        match next.new_step_key {
            Some(key) => self.move_to(&key, next.history),
            None => {
                debug!(step_key = %self.current.key, trigger = %signature.trigger, "trigger left the step unchanged");
                Ok(NavigationOutcome::Stayed)
            }
        }
    }

    /// Submits the current step.
    ///
    /// Runs the step's actions (unless `skip`), publishes the submitted values, persists
    /// them, then moves on: to the target of the first condition matching `signature`,
    /// or else to the step the backend returned.
    pub async fn submit(&mut self, signature: &TriggerSignature, skip: bool) -> Result<StepTransition, SessionError> {
        self.ensure_active()?;
        let step_key = self.current.key.clone();

        let pipeline = if skip {
            None
        } else {
            let context = self.store.action_context(&self.current);
            let report = self.pipeline.run(&self.current.actions, context).await;
            self.apply_write_back(&report);
            Some(report)
        };

        let snapshot = self.store.snapshot(&self.current);
        self.realtime.publish(snapshot.fields.iter().map(|field| (field.key.clone(), field.value.clone())));

        let outcome = self.backend.submit_step(&self.form_key, &step_key, &snapshot, skip).await?;
        self.store.clear_staged_file();
        self.emit_event("complete");

        let navigation = match outcome {
            SubmitOutcome::Terminal { redirect_url } => {
                info!(form_key = %self.form_key, step_key = %step_key, "form finished");
                self.finished = Some(redirect_url.clone());
                NavigationOutcome::Finished { redirect_url }
            }
            SubmitOutcome::Next(returned) => {
                let next = next_step_key(&self.current.next_conditions, signature, self.store.values(), &self.navigation);
                match next.new_step_key {
                    Some(key) => self.move_to(&key, next.history)?,
                    None if !returned.key.is_empty() && returned.key != step_key => {
                        let key = returned.key.clone();
                        self.definition.steps.entry(key.clone()).or_insert(*returned);
                        if let Some(step) = self.definition.step(&key) {
                            self.store.hydrate_step(step);
                        }
                        let mut history = self.navigation.clone();
                        history.advance(&key);
                        self.move_to(&key, history)?
                    }
                    None => NavigationOutcome::Stayed,
                }
            }
        };

        Ok(StepTransition { pipeline, navigation })
    }

    /// Stores values that belong to the end user but to no field of the form.
    pub async fn submit_custom(&self, custom_key_values: &FieldValues) -> Result<(), SessionError> {
        self.backend.submit_custom(&self.form_key, custom_key_values).await?;
        debug!(form_key = %self.form_key, keys = custom_key_values.len(), "custom values stored");
        Ok(())
    }

    /// Steps back one entry in the navigation history.
    pub fn go_back(&mut self) -> Result<&Step, SessionError> {
        self.ensure_active()?;
        let mut history = self.navigation.clone();
        let key = history.back()?.to_string();
        self.move_to(&key, history)?;
        Ok(&self.current)
    }

    fn move_to(&mut self, key: &str, history: NavigationState) -> Result<NavigationOutcome, SessionError> {
        let step = self
            .definition
            .step(key)
            .cloned()
            .ok_or_else(|| NavigationError::UnknownStep(key.to_string()))?;
        let from = std::mem::replace(&mut self.current, step).key;
        self.navigation = history;
        self.store.hydrate_step(&self.current);
        debug!(from = %from, to = %key, index = self.navigation.index(), "moved to step");
        self.emit_event("load");
        Ok(NavigationOutcome::Moved { from, to: key.to_string() })
    }

    fn apply_write_back(&mut self, report: &PipelineReport) {
        if report.writes.is_empty() {
            return;
        }
        let keys_by_id: HashMap<&str, &str> = self
            .definition
            .steps
            .values()
            .flat_map(|step| step.servars())
            .filter(|servar| !servar.id.is_empty())
            .map(|servar| (servar.id.as_str(), servar.key.as_str()))
            .collect();
        let updates: Vec<(String, Value)> = report
            .writes
            .iter()
            .filter_map(|(field_id, value)| keys_by_id.get(field_id.as_str()).map(|key| (key.to_string(), value.clone())))
            .collect();
        for (key, value) in updates {
            self.store.set_value(key, value);
        }
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.finished.is_some() {
            return Err(SessionError::Finished);
        }
        Ok(())
    }

    // Events are best-effort and dropped when no runtime is available.
    fn emit_event(&self, event: &'static str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        let form_key = self.form_key.clone();
        let step_key = self.current.key.clone();
        runtime.spawn(async move { backend.register_event(&form_key, &step_key, event).await });
    }
}
