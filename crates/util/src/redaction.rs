//! Credential redaction for log output.

use once_cell::sync::Lazy;
use regex::Regex;

static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization:\s*)((?:bearer|token)\s+)?[\w\-\.=:/+]+",
        r"(?i)([A-Z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD)=)[^\s&]+",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Redacts values that look like secrets in a string.
///
/// Key names are preserved so redacted log lines stay readable.
///
/// # Example
/// ```rust
/// use stepform_util::redact_sensitive;
///
/// assert_eq!(redact_sensitive("Authorization: Token abc123"), "Authorization: [REDACTED]");
/// assert_eq!(
///     redact_sensitive("https://api.example.com/x?fuser_key=u1&step=2"),
///     "https://api.example.com/x?fuser_key=[REDACTED]&step=2"
/// );
/// ```
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in REDACT_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |captures: &regex::Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}[REDACTED]")
            })
            .into_owned();
    }
    redacted
}
