//! Helpers shared by the Stepform engine, API client, and CLI.
//!
//! - [`field_tokens`]: recognition and substitution of field-identifier tokens
//! - [`http`]: response status mapping and strict JSON parsing
//! - [`redaction`]: masking of credentials before they reach logs

pub mod field_tokens;
pub mod http;
pub mod redaction;

pub use field_tokens::{interpolation_tokens, is_field_identifier, replace_angle_tokens, value_to_text};
pub use redaction::redact_sensitive;
