//! Shared type definitions for Stepform: the form definition schema, the session
//! payloads exchanged with the backend, and the requests built from step actions.

pub mod call;
pub mod form;
pub mod session;

pub use call::{CallBody, CallRequest};
pub use form::{
    Action, BodyKind, Comparison, Condition, FormDefinition, GridPlacement, ProgressBar, RowBand, Rule, Servar, ServarField,
    ServarType, Step, TextField, TextLink,
};
pub use session::{FieldSnapshot, SessionSnapshot, StagedFile, SubmitOutcome, SubmittedField};
