//! Field value store: typed defaults, edits, validation, and per-step formatting.
//!
//! Values are keyed by servar key. File uploads are tracked out-of-band: a single staged
//! file replaces whatever the generic value map holds for file-upload fields.

pub mod validation;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use stepform_types::{FieldSnapshot, FormDefinition, Servar, ServarType, StagedFile, Step, SubmittedField};
use tracing::debug;

use crate::actions::{ActionContext, LookupMap};
use crate::error::ValidationError;

pub use validation::{REQUIRED_MESSAGE, field_error, is_empty_value};

/// Field values keyed by servar key.
pub type FieldValues = Map<String, Value>;

/// Default value for a freshly hydrated field of the given type.
///
/// Integer fields start as the empty string rather than zero so an untouched field stays
/// distinguishable from an explicit `0`.
pub fn default_value_for(kind: &ServarType) -> Value {
    match kind {
        ServarType::Checkbox => Value::Bool(false),
        ServarType::Multiselect => Value::Array(Vec::new()),
        ServarType::IntegerField => Value::String(String::new()),
        ServarType::HexColor => Value::String("000000".into()),
        ServarType::Select => Value::Null,
        _ => Value::String(String::new()),
    }
}

/// Initial value of a servar: its authored value when present, otherwise the type default.
pub fn initial_value(servar: &Servar) -> Value {
    if servar.value.is_null() {
        default_value_for(&servar.kind)
    } else {
        servar.value.clone()
    }
}

/// Computes initial values for every servar across `steps`.
pub fn default_field_values<'a>(steps: impl IntoIterator<Item = &'a Step>) -> FieldValues {
    let mut values = FieldValues::new();
    for step in steps {
        for servar in step.servars() {
            values.insert(servar.key.clone(), initial_value(servar));
        }
    }
    values
}

/// A field value prepared for external consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedField {
    pub value: Value,
    #[serde(rename = "type")]
    pub kind: ServarType,
    pub display_text: String,
}

/// Maps every servar of `step` to its value, type, and display name.
///
/// File-upload fields always report the pending file (or `null`), never the value map.
pub fn format_fields(step: &Step, values: &FieldValues, pending_file: Option<&StagedFile>) -> IndexMap<String, FormattedField> {
    step.servars()
        .map(|servar| {
            let value = if servar.kind.is_file() {
                pending_file.map(StagedFile::describe).unwrap_or(Value::Null)
            } else {
                values.get(&servar.key).cloned().unwrap_or(Value::Null)
            };
            (
                servar.key.clone(),
                FormattedField {
                    value,
                    kind: servar.kind.clone(),
                    display_text: servar.name.clone(),
                },
            )
        })
        .collect()
}

/// [`format_fields`] across every step, later steps overriding duplicate keys.
pub fn format_all_step_fields<'a>(
    steps: impl IntoIterator<Item = &'a Step>,
    values: &FieldValues,
    pending_file: Option<&StagedFile>,
) -> IndexMap<String, FormattedField> {
    let mut formatted = IndexMap::new();
    for step in steps {
        formatted.extend(format_fields(step, values, pending_file));
    }
    formatted
}

/// A user edit routed through the store.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEdit {
    /// Raw text typed into an input.
    Text(String),
    /// Checkbox state.
    Checked(bool),
    /// Select or deselect one option of a multiselect.
    ToggleOption { option: String, selected: bool },
    /// Color picked in a color input, with or without a leading `#`.
    Color(String),
    /// A value supplied programmatically.
    Value(Value),
}

/// Mutable field state for one form session.
#[derive(Debug, Clone, Default)]
pub struct FieldValueStore {
    values: FieldValues,
    staged_file: Option<StagedFile>,
}

impl FieldValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: FieldValues) -> Self {
        Self {
            values,
            staged_file: None,
        }
    }

    pub fn values(&self) -> &FieldValues {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Inserts initial values for every servar of `step` that has no value yet.
    pub fn hydrate_step(&mut self, step: &Step) {
        for servar in step.servars() {
            self.values.entry(servar.key.clone()).or_insert_with(|| initial_value(servar));
        }
    }

    /// Hydrates every step of a definition.
    pub fn hydrate_definition(&mut self, definition: &FormDefinition) {
        for step in definition.steps.values() {
            self.hydrate_step(step);
        }
    }

    /// Overlays previously persisted values.
    pub fn merge(&mut self, values: FieldValues) {
        self.values.extend(values);
    }

    /// Applies an edit to `servar` and returns the resulting validation failure, if any.
    ///
    /// The value is stored even when invalid so the user can keep editing.
    pub fn apply_edit(&mut self, servar: &Servar, edit: FieldEdit) -> Option<ValidationError> {
        let current = self.values.get(&servar.key).cloned().unwrap_or_else(|| initial_value(servar));
        let next = normalize_edit(&servar.kind, current, edit);
        let error = field_error(&next, servar);
        debug!(field = %servar.key, valid = error.is_none(), "field edited");
        self.values.insert(servar.key.clone(), next);
        error
    }

    /// Stores a value without validation, as for values written back by actions.
    pub fn set_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Stages a file, replacing any previously staged one.
    pub fn stage_file(&mut self, file: StagedFile) {
        self.staged_file = Some(file);
    }

    pub fn staged_file(&self) -> Option<&StagedFile> {
        self.staged_file.as_ref()
    }

    pub fn clear_staged_file(&mut self) {
        self.staged_file = None;
    }

    /// Validates every servar of `step`, returning failures keyed by field key.
    pub fn validate_step(&self, step: &Step) -> Vec<(String, ValidationError)> {
        step.servars()
            .filter_map(|servar| {
                let value = if servar.kind.is_file() {
                    self.file_value_for(servar)
                } else {
                    self.values.get(&servar.key).cloned().unwrap_or(Value::Null)
                };
                field_error(&value, servar).map(|error| (servar.key.clone(), error))
            })
            .collect()
    }

    /// Whether `step` has every field a `next` button waits for.
    ///
    /// Text fields, selects, and dropdowns must be non-empty and file uploads need a
    /// staged file; other field types never block.
    pub fn is_filled(&self, step: &Step) -> bool {
        step.servars().all(|servar| match servar.kind {
            ServarType::TextField | ServarType::Select | ServarType::Dropdown => {
                let value = self.values.get(&servar.key).unwrap_or(&Value::Null);
                !matches!(value, Value::Null) && value.as_str() != Some("")
            }
            ServarType::FileUpload => self.staged_file.is_some(),
            _ => true,
        })
    }

    /// Field-identifier keyed values of `step`, used as the lookup map of an action run.
    pub fn lookup_map(&self, step: &Step) -> LookupMap {
        step.servars()
            .filter(|servar| !servar.id.is_empty())
            .map(|servar| {
                let value = if servar.kind.is_file() {
                    self.file_value_for(servar)
                } else {
                    self.values.get(&servar.key).cloned().unwrap_or(Value::Null)
                };
                (servar.id.clone(), value)
            })
            .collect()
    }

    /// Snapshot of the values of `step` as submitted to the backend.
    pub fn snapshot(&self, step: &Step) -> FieldSnapshot {
        let fields = step
            .servars()
            .filter(|servar| !servar.kind.is_file())
            .map(|servar| SubmittedField {
                key: servar.key.clone(),
                kind: servar.kind.clone(),
                value: self.values.get(&servar.key).cloned().unwrap_or(Value::Null),
            })
            .collect();
        let file = self.pending_file_servar(step).zip(self.staged_file.clone()).map(|(servar, file)| (servar.key.clone(), file));
        FieldSnapshot { fields, file }
    }

    /// Builds the isolated context an action pipeline run works against.
    pub fn action_context(&self, step: &Step) -> ActionContext {
        let pending_field = self.pending_file_servar(step).map(|servar| servar.id.clone());
        ActionContext::new(self.lookup_map(step), self.staged_file.clone(), pending_field)
    }

    fn pending_file_servar<'a>(&self, step: &'a Step) -> Option<&'a Servar> {
        let staged = self.staged_file.as_ref()?;
        step.servars()
            .find(|servar| servar.kind.is_file() && (servar.id == staged.field_id || servar.key == staged.field_id))
    }

    fn file_value_for(&self, servar: &Servar) -> Value {
        self.staged_file
            .as_ref()
            .filter(|file| file.field_id == servar.id || file.field_id == servar.key)
            .map(StagedFile::describe)
            .unwrap_or(Value::Null)
    }
}

fn normalize_edit(kind: &ServarType, current: Value, edit: FieldEdit) -> Value {
    match (kind, edit) {
        (ServarType::IntegerField, FieldEdit::Text(text)) => match text.trim().parse::<i64>() {
            Ok(number) => Value::from(number),
            Err(_) => Value::String(text),
        },
        (ServarType::HexColor, FieldEdit::Color(color) | FieldEdit::Text(color)) => {
            Value::String(color.trim_start_matches('#').chars().take(6).collect())
        }
        (_, FieldEdit::ToggleOption { option, selected }) => {
            let mut options = match current {
                Value::Array(items) => items,
                _ => Vec::new(),
            };
            let option = Value::String(option);
            let present = options.contains(&option);
            if selected && !present {
                options.push(option);
            } else if !selected {
                options.retain(|item| item != &option);
            }
            Value::Array(options)
        }
        (_, FieldEdit::Checked(checked)) => Value::Bool(checked),
        (_, FieldEdit::Text(text) | FieldEdit::Color(text)) => Value::String(text),
        (_, FieldEdit::Value(value)) => value,
    }
}
