//! Client for the form backend: definitions, stored progress, submissions and events.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Method, RequestBuilder, Response, header, multipart};
use serde_json::{Map, Value};
use stepform_types::{FieldSnapshot, FormDefinition, SessionSnapshot, StagedFile, SubmitOutcome};
use stepform_util::http::{check_response_status, parse_response_json_strict};
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::payload;

const FORM_PATH: &str = "api/panel/v4/";
const SESSION_PATH: &str = "api/panel/session/";
const STEP_SUBMIT_PATH: &str = "api/panel/step/submit/";
const FILE_SUBMIT_PATH: &str = "api/panel/step/submit/file/";
const CUSTOM_SUBMIT_PATH: &str = "api/panel/custom/submit/";
const FIELD_WRITE_PATH: &str = "api/servar/fuser/";
const EVENT_PATH: &str = "api/event/";

/// Thin wrapper around a configured `reqwest::Client` for the form backend.
///
/// Every request carries `Authorization: Token <sdk key>`. Responses other than `200`
/// and `201` are reported with the backend's status messages.
#[derive(Debug, Clone)]
pub struct FormClient {
    config: ClientConfig,
    http: Client,
    user_agent: String,
}

impl FormClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut default_headers = header::HeaderMap::new();
        let authorization = header::HeaderValue::from_str(&format!("Token {}", config.sdk_key)).context("SDK key is not a valid header value")?;
        default_headers.insert(header::AUTHORIZATION, authorization);
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("build http client")?;

        Ok(Self {
            config,
            http,
            user_agent: format!("stepform/{}; {}", env!("CARGO_PKG_VERSION"), std::env::consts::OS),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn user_key(&self) -> Option<&str> {
        self.config.user_key.as_deref()
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%url, %method, "building request");
        self.http.request(method, url).header(header::USER_AGENT, &self.user_agent)
    }

    /// Fetches every step of a form from the CDN.
    pub async fn fetch_form(&self, form_key: &str) -> Result<FormDefinition> {
        let mut url = join(&self.config.cdn_base, FORM_PATH)?;
        url.query_pairs_mut().append_pair("form_key", form_key);

        let body = read_json(self.request(Method::GET, url).send().await?).await?;
        FormDefinition::from_value(body).with_context(|| format!("form '{form_key}' returned an unreadable definition"))
    }

    /// Fetches the stored progress of the configured end user.
    pub async fn fetch_session(&self, form_key: &str) -> Result<SessionSnapshot> {
        let mut url = join(&self.config.api_base, SESSION_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("form_key", form_key);
            if let Some(user_key) = self.user_key() {
                query.append_pair("fuser_key", user_key);
            }
        }

        let body = read_json(self.request(Method::GET, url).send().await?).await?;
        if body.is_null() {
            return Ok(SessionSnapshot::default());
        }
        serde_json::from_value(body).context("session response is not a session snapshot")
    }

    /// Submits one step.
    ///
    /// Non-file values go to the JSON endpoint; a staged file goes to the multipart
    /// endpoint concurrently. The JSON response decides the outcome.
    pub async fn submit_step(&self, form_key: &str, step_key: &str, snapshot: &FieldSnapshot, skip: bool) -> Result<SubmitOutcome> {
        let body = payload::step_submission(form_key, step_key, snapshot, skip, self.user_key());
        let json_submission = async {
            let url = join(&self.config.api_base, STEP_SUBMIT_PATH)?;
            read_json(self.request(Method::POST, url).json(&body).send().await?).await
        };
        let file_submission = async {
            match &snapshot.file {
                Some((field_key, file)) => self.submit_file(field_key, file).await,
                None => Ok(()),
            }
        };

        let (response, ()) = tokio::try_join!(json_submission, file_submission)?;
        debug!(form_key = %form_key, step_key = %step_key, fields = snapshot.fields.len(), "step submitted");
        SubmitOutcome::from_response(response).context("submission response is not a step document")
    }

    async fn submit_file(&self, field_key: &str, file: &StagedFile) -> Result<()> {
        let user_key = self.user_key().ok_or_else(|| anyhow!("file uploads require {}", crate::config::USER_KEY_ENV))?;
        let url = join(&self.config.api_base, &format!("{FILE_SUBMIT_PATH}{user_key}/"))?;

        let form = multipart::Form::new().part(field_key.to_string(), file_part(file)?);
        let response = self.request(Method::POST, url).multipart(form).send().await?;
        check_response_status(response.status())?;
        Ok(())
    }

    /// Persists a value an action wrote back into a field.
    pub async fn write_field(&self, field_id: &str, value: &Value) -> Result<()> {
        let url = join(&self.config.api_base, FIELD_WRITE_PATH)?;
        let body = payload::field_write(field_id, value, self.user_key());
        let response = self.request(Method::POST, url).json(&body).send().await?;
        check_response_status(response.status())?;
        Ok(())
    }

    /// Submits arbitrary key/value pairs attached to the end user.
    pub async fn submit_custom(&self, form_key: &str, custom_key_values: &Map<String, Value>) -> Result<()> {
        let url = join(&self.config.api_base, CUSTOM_SUBMIT_PATH)?;
        let body = payload::custom_submission(form_key, custom_key_values, self.user_key());
        let response = self.request(Method::POST, url).json(&body).send().await?;
        check_response_status(response.status())?;
        Ok(())
    }

    /// Records a step lifecycle event such as `load` or `complete`.
    pub async fn register_event(&self, form_key: &str, step_key: &str, event: &str) -> Result<()> {
        let url = join(&self.config.api_base, EVENT_PATH)?;
        let body = payload::step_event(form_key, step_key, event, self.user_key());
        let response = self.request(Method::POST, url).json(&body).send().await?;
        check_response_status(response.status())?;
        Ok(())
    }
}

/// Builds the multipart part for a staged file.
pub(crate) fn file_part(file: &StagedFile) -> Result<multipart::Part> {
    let part = multipart::Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
    match &file.content_type {
        Some(content_type) => part
            .mime_str(content_type)
            .with_context(|| format!("invalid content type '{content_type}' for {}", file.file_name)),
        None => Ok(part),
    }
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path).with_context(|| format!("cannot join '{path}' onto {base}"))
}

async fn read_json(response: Response) -> Result<Value> {
    let status = response.status();
    check_response_status(status)?;
    let text = response.text().await?;
    Ok(parse_response_json_strict(&text, Some(status))?)
}
