//! Strongly typed form definition schema shared by the engine, API client, and CLI.
//!
//! The structures mirror the JSON documents served by the form-definition backend. Field
//! names follow the wire format (`servar_fields`, `next_conditions`, ...) so definitions can
//! be deserialized directly, and ordered collections stay `Vec`s because authoring order is
//! semantically significant for both conditions and actions.

pub mod action;
pub mod condition;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use action::{Action, BodyKind};
pub use condition::{Comparison, Condition, Rule};

/// A complete form: every step keyed by its unique step key, in authoring order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FormDefinition {
    /// Steps keyed by step key.
    #[serde(default)]
    pub steps: IndexMap<String, Step>,
}

impl FormDefinition {
    /// Builds a definition from a list of steps, keyed by each step's `key`.
    pub fn from_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().map(|step| (step.key.clone(), step)).collect(),
        }
    }

    /// Fills in step keys that were omitted from the step body but present as map keys.
    pub fn normalized(mut self) -> Self {
        for (key, step) in self.steps.iter_mut() {
            if step.key.is_empty() {
                step.key = key.clone();
            }
        }
        self
    }

    /// Reads a definition from a JSON document.
    ///
    /// Accepts `{"steps": {key: step}}`, `{"steps": [step, ...]}`, or a bare map of steps.
    /// Step keys missing from step bodies are filled in from the map keys.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StepsDocument {
            Keyed { steps: IndexMap<String, Step> },
            Listed { steps: Vec<Step> },
            Bare(IndexMap<String, Step>),
        }

        let definition = match serde_json::from_value::<StepsDocument>(value)? {
            StepsDocument::Keyed { steps } | StepsDocument::Bare(steps) => FormDefinition { steps },
            StepsDocument::Listed { steps } => FormDefinition::from_steps(steps),
        };
        Ok(definition.normalized())
    }

    /// Looks up a step by key.
    pub fn step(&self, key: &str) -> Option<&Step> {
        self.steps.get(key)
    }

    /// Returns the key of the entry step (the step flagged `origin`).
    pub fn origin_key(&self) -> Option<&str> {
        self.steps.values().find(|step| step.origin).map(|step| step.key.as_str())
    }
}

/// One screen of a multi-step form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Unique key of the step within its form.
    #[serde(default)]
    pub key: String,
    /// Position of the step in a linear form; `None` on a terminal submission response.
    #[serde(default)]
    pub step_number: Option<u32>,
    /// Total step count reported for linear forms.
    #[serde(default)]
    pub total_steps: Option<u32>,
    /// Marks the entry step of the form.
    #[serde(default)]
    pub origin: bool,
    /// Typed input fields in authoring order.
    #[serde(default)]
    pub servar_fields: Vec<ServarField>,
    /// Static text and button elements.
    #[serde(default)]
    pub text_fields: Vec<TextField>,
    /// Outgoing conditions, evaluated in declared order.
    #[serde(default)]
    pub next_conditions: Vec<Condition>,
    /// Outbound calls executed when the step is submitted, in declared order.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Declared grid row sizes (CSS track sizes such as `50px`).
    #[serde(default)]
    pub grid_rows: Vec<String>,
    /// Declared grid column sizes.
    #[serde(default)]
    pub grid_columns: Vec<String>,
    /// First row of the repeat band (inclusive).
    #[serde(default)]
    pub repeat_row_start: Option<usize>,
    /// Last row of the repeat band (inclusive).
    #[serde(default)]
    pub repeat_row_end: Option<usize>,
    /// Optional progress bar placement.
    #[serde(default)]
    pub progress_bar: Option<ProgressBar>,
    /// Redirect target carried by terminal submission responses.
    #[serde(default)]
    pub redirect_url: Option<String>,
}

impl Step {
    /// Returns the repeat band when both ends are declared.
    pub fn repeat_band(&self) -> Option<RowBand> {
        match (self.repeat_row_start, self.repeat_row_end) {
            (Some(start), Some(end)) if start <= end => Some(RowBand { start, end }),
            _ => None,
        }
    }

    /// Iterates over the servars of this step.
    pub fn servars(&self) -> impl Iterator<Item = &Servar> {
        self.servar_fields.iter().map(|field| &field.servar)
    }

    /// Returns the file-upload servar of this step, if any.
    pub fn file_upload_servar(&self) -> Option<&Servar> {
        self.servars().find(|servar| servar.kind == ServarType::FileUpload)
    }

    /// Keys of the steps reachable through this step's conditions, in declared order.
    pub fn next_step_keys(&self) -> impl Iterator<Item = &str> {
        self.next_conditions.iter().map(|condition| condition.next_step_key.as_str())
    }
}

/// Inclusive row range duplicated once per element of the longest repeated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBand {
    pub start: usize,
    pub end: usize,
}

impl RowBand {
    pub fn contains(&self, row: usize) -> bool {
        (self.start..=self.end).contains(&row)
    }

    /// True when the inclusive range `[start, end]` overlaps the band.
    pub fn intersects(&self, start: usize, end: usize) -> bool {
        start <= self.end && end >= self.start
    }
}

/// Grid coordinates of an element. Missing end indices default to the start index.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridPlacement {
    #[serde(default)]
    pub row_index: usize,
    #[serde(default)]
    pub row_index_end: Option<usize>,
    #[serde(default)]
    pub column_index: usize,
    #[serde(default)]
    pub column_index_end: Option<usize>,
}

impl GridPlacement {
    pub fn row_end(&self) -> usize {
        self.row_index_end.unwrap_or(self.row_index).max(self.row_index)
    }

    pub fn column_end(&self) -> usize {
        self.column_index_end.unwrap_or(self.column_index).max(self.column_index)
    }
}

/// A servar together with its placement on the grid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServarField {
    pub servar: Servar,
    #[serde(flatten)]
    pub placement: GridPlacement,
    /// Presentation metadata (option lists for select-like fields).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A named, typed form field whose value is persisted server-side.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Servar {
    /// Opaque identifier (UUID-v4 shape) used by action templates.
    #[serde(default)]
    pub id: String,
    /// Stable field name.
    pub key: String,
    #[serde(rename = "type", default)]
    pub kind: ServarType,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Current value, shape depends on `kind`.
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Drives repeated-row expansion from an array value.
    #[serde(default)]
    pub repeated: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Enumerates the servar types known to the engine.
///
/// Unknown type names survive a round trip through [`ServarType::Other`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServarType {
    #[default]
    TextField,
    TextArea,
    IntegerField,
    Checkbox,
    Select,
    Multiselect,
    Dropdown,
    HexColor,
    FileUpload,
    PinInput,
    #[serde(untagged)]
    Other(String),
}

impl ServarType {
    /// Wire name of the type, used as the value key on submission.
    pub fn as_str(&self) -> &str {
        match self {
            ServarType::TextField => "text_field",
            ServarType::TextArea => "text_area",
            ServarType::IntegerField => "integer_field",
            ServarType::Checkbox => "checkbox",
            ServarType::Select => "select",
            ServarType::Multiselect => "multiselect",
            ServarType::Dropdown => "dropdown",
            ServarType::HexColor => "hex_color",
            ServarType::FileUpload => "file_upload",
            ServarType::PinInput => "pin_input",
            ServarType::Other(name) => name.as_str(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, ServarType::FileUpload)
    }
}

/// Where a text element navigates when clicked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TextLink {
    Next,
    Skip,
    #[serde(untagged)]
    Other(String),
}

/// Static text or button element.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TextField {
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub placement: GridPlacement,
    #[serde(default)]
    pub is_button: bool,
    #[serde(default)]
    pub link: Option<TextLink>,
    /// Repetition index for elements materialized inside the repeat band.
    #[serde(default)]
    pub repeat: Option<usize>,
}

/// Progress bar element placement.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressBar {
    #[serde(flatten)]
    pub placement: GridPlacement,
    /// `top`, `bottom`, or absent for where the percentage label is shown.
    #[serde(default)]
    pub percent_text_layout: Option<String>,
}
