//! Environment-driven client configuration.

use std::env;

use anyhow::{Result, anyhow};
use url::Url;

pub const API_BASE_ENV: &str = "STEPFORM_API_BASE";
pub const CDN_BASE_ENV: &str = "STEPFORM_CDN_BASE";
pub const SDK_KEY_ENV: &str = "STEPFORM_SDK_KEY";
pub const USER_KEY_ENV: &str = "STEPFORM_USER_KEY";
pub const CLIENT_KEY_ENV: &str = "STEPFORM_CLIENT_KEY";

pub const DEFAULT_API_BASE: &str = "https://api.stepform.dev/";
pub const DEFAULT_CDN_BASE: &str = "https://cdn.stepform.dev/";

/// Hostnames allowed to use plain http.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

/// Endpoints and credentials for talking to the form backend.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the submission API, always ending in `/`.
    pub api_base: Url,
    /// Base URL the form definitions are served from, always ending in `/`.
    pub cdn_base: Url,
    /// SDK key sent as `Authorization: Token <key>`.
    pub sdk_key: String,
    /// End-user key identifying whose progress is stored.
    pub user_key: Option<String>,
    /// Bearer credential attached to action calls.
    pub client_key: Option<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base", &self.api_base.as_str())
            .field("cdn_base", &self.cdn_base.as_str())
            .field("sdk_key", &"[REDACTED]")
            .field("user_key", &self.user_key)
            .field("client_key", &self.client_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ClientConfig {
    /// Configuration against the default public endpoints.
    pub fn new(sdk_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_base: validate_base_url(DEFAULT_API_BASE, API_BASE_ENV)?,
            cdn_base: validate_base_url(DEFAULT_CDN_BASE, CDN_BASE_ENV)?,
            sdk_key: sdk_key.into(),
            user_key: None,
            client_key: None,
        })
    }

    /// Reads the configuration from `STEPFORM_*` environment variables.
    ///
    /// `STEPFORM_SDK_KEY` is required. Base URLs fall back to the public endpoints and must
    /// use https unless they point at localhost.
    pub fn from_env() -> Result<Self> {
        let sdk_key = non_empty_var(SDK_KEY_ENV).ok_or_else(|| anyhow!("{SDK_KEY_ENV} must be set"))?;
        let api_base = non_empty_var(API_BASE_ENV).unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let cdn_base = non_empty_var(CDN_BASE_ENV).unwrap_or_else(|| DEFAULT_CDN_BASE.to_string());

        Ok(Self {
            api_base: validate_base_url(&api_base, API_BASE_ENV)?,
            cdn_base: validate_base_url(&cdn_base, CDN_BASE_ENV)?,
            sdk_key,
            user_key: non_empty_var(USER_KEY_ENV),
            client_key: non_empty_var(CLIENT_KEY_ENV),
        })
    }

    pub fn with_user_key(mut self, user_key: impl Into<String>) -> Self {
        self.user_key = Some(user_key.into());
        self
    }

    pub fn with_api_base(mut self, base: &str) -> Result<Self> {
        self.api_base = validate_base_url(base, API_BASE_ENV)?;
        Ok(self)
    }

    pub fn with_cdn_base(mut self, base: &str) -> Result<Self> {
        self.cdn_base = validate_base_url(base, CDN_BASE_ENV)?;
        Ok(self)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

/// Validate that a base URL is acceptable for use by the client.
///
/// Rules:
/// - `localhost` or `127.0.0.1`: any scheme is allowed
/// - otherwise: scheme must be HTTPS
///
/// The returned URL always ends with `/` so endpoint paths can be joined onto it.
pub fn validate_base_url(base: &str, variable: &str) -> Result<Url> {
    let mut parsed = Url::parse(base).map_err(|error| anyhow!("Invalid {variable} URL '{base}': {error}"))?;
    let host_name = parsed
        .host_str()
        .ok_or_else(|| anyhow!("{variable} must include a host"))?
        .to_string();

    let is_local = LOCALHOST_DOMAINS.iter().any(|allowed| host_name.eq_ignore_ascii_case(allowed));
    if !is_local && parsed.scheme() != "https" {
        return Err(anyhow!(
            "{variable} must use https for non-localhost hosts; got '{}://'",
            parsed.scheme()
        ));
    }

    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_uses_defaults_and_requires_sdk_key() {
        temp_env::with_vars(
            [
                (SDK_KEY_ENV, Some("sdk-123")),
                (API_BASE_ENV, None),
                (CDN_BASE_ENV, None),
                (USER_KEY_ENV, Some("user-9")),
                (CLIENT_KEY_ENV, None),
            ],
            || {
                let config = ClientConfig::from_env().expect("config");
                assert_eq!(config.api_base.as_str(), DEFAULT_API_BASE);
                assert_eq!(config.cdn_base.as_str(), DEFAULT_CDN_BASE);
                assert_eq!(config.user_key.as_deref(), Some("user-9"));
                assert!(config.client_key.is_none());
            },
        );

        temp_env::with_var(SDK_KEY_ENV, None::<&str>, || {
            assert!(ClientConfig::from_env().is_err());
        });
    }

    #[test]
    fn base_urls_must_be_https_unless_local() {
        assert!(validate_base_url("http://api.example.com", API_BASE_ENV).is_err());
        assert!(validate_base_url("not a url", API_BASE_ENV).is_err());
        assert_eq!(
            validate_base_url("http://localhost:8006", API_BASE_ENV).expect("local").as_str(),
            "http://localhost:8006/"
        );
        assert_eq!(
            validate_base_url("https://api.example.com/v2", API_BASE_ENV).expect("https").as_str(),
            "https://api.example.com/v2/"
        );
    }

    #[test]
    fn debug_output_hides_keys() {
        let config = ClientConfig::new("sdk-secret").expect("config");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sdk-secret"));
    }
}
