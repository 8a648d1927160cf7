//! # HTTP Utilities
//!
//! Status mapping and response parsing shared by the collaborator client and the
//! action transport.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Error raised when the backend answers with a non-success status.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{message} (HTTP {status})")]
pub struct FetchError {
    pub status: u16,
    pub message: String,
}

/// Return a user-facing message for a backend status code.
///
/// # Example
/// ```rust
/// use stepform_util::http::status_error_message;
///
/// assert_eq!(status_error_message(401), "Invalid API key");
/// assert_eq!(status_error_message(418), "Unknown error");
/// ```
pub fn status_error_message(status_code: u16) -> &'static str {
    match status_code {
        400 => "Invalid parameters",
        401 => "Invalid API key",
        404 => "Can't find object",
        500 => "Internal server error",
        _ => "Unknown error",
    }
}

/// Accepts `200` and `201`; every other status becomes a [`FetchError`].
pub fn check_response_status(status: StatusCode) -> Result<(), FetchError> {
    match status.as_u16() {
        200 | 201 => Ok(()),
        other => Err(FetchError {
            status: other,
            message: status_error_message(other).to_string(),
        }),
    }
}

/// Parse HTTP response text into JSON, providing detailed errors on failure.
///
/// Empty bodies parse to `Value::Null`. Parse failures carry the status and a
/// whitespace-collapsed preview of up to 200 characters of the body.
pub fn parse_response_json_strict(text: &str, status: Option<StatusCode>) -> Result<Value, JsonParseError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str::<Value>(text).map_err(|error| {
        let status_note = status
            .map(|code| format!("status {code}"))
            .unwrap_or_else(|| "unknown status".to_string());
        JsonParseError::new(status_note, error, truncate_response_preview(text, 200))
    })
}

fn truncate_response_preview(text: &str, limit: usize) -> String {
    let mut preview = String::new();
    for ch in text.chars() {
        if preview.len() >= limit {
            preview.push_str("...");
            break;
        }
        if ch.is_whitespace() {
            if !preview.ends_with(' ') {
                preview.push(' ');
            }
        } else {
            preview.push(ch);
        }
    }
    preview.trim().to_string()
}

/// Error returned when strict JSON parsing of an HTTP response fails.
#[derive(Debug, Error)]
#[error("failed to parse JSON response ({status_note}): {source}. body preview: {body_preview}")]
pub struct JsonParseError {
    status_note: String,
    #[source]
    source: serde_json::Error,
    body_preview: String,
}

impl JsonParseError {
    pub fn new(status_note: String, source: serde_json::Error, body_preview: String) -> Self {
        Self {
            status_note,
            source,
            body_preview,
        }
    }

    /// Access the truncated response preview captured during parsing.
    pub fn body_preview(&self) -> &str {
        &self.body_preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_statuses_pass() {
        assert!(check_response_status(StatusCode::OK).is_ok());
        assert!(check_response_status(StatusCode::CREATED).is_ok());
    }

    #[test]
    fn failure_statuses_map_to_messages() {
        let error = check_response_status(StatusCode::NOT_FOUND).expect_err("404 fails");
        assert_eq!(error.message, "Can't find object");
        assert_eq!(error.to_string(), "Can't find object (HTTP 404)");
        // 204 is not an accepted success code for this backend
        assert!(check_response_status(StatusCode::NO_CONTENT).is_err());
    }

    #[test]
    fn strict_parse_reports_preview() {
        let error = parse_response_json_strict("<html>\n oops</html>", Some(StatusCode::BAD_GATEWAY)).expect_err("not json");
        assert_eq!(error.body_preview(), "<html> oops</html>");
        assert!(error.to_string().contains("status 502"));
        assert_eq!(parse_response_json_strict("  ", None).expect("empty"), Value::Null);
    }

    #[test]
    fn preview_collapses_whitespace_runs() {
        assert_eq!(truncate_response_preview("a \r\n\t  b", 200), "a b");
        let long = "x".repeat(300);
        assert_eq!(truncate_response_preview(&long, 200), format!("{}...", "x".repeat(200)));
    }
}
