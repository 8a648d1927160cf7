//! Executes templated action calls against arbitrary third-party endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, header};
use serde_json::Value;
use stepform_types::{CallBody, CallRequest};
use stepform_util::http::{check_response_status, parse_response_json_strict};
use stepform_util::redact_sensitive;
use tracing::debug;

use crate::client::file_part;

/// HTTP client for action calls.
///
/// Unlike [`crate::FormClient`] it carries no default credentials; the request headers
/// are exactly the ones the pipeline built.
#[derive(Debug, Clone)]
pub struct ActionClient {
    http: Client,
}

impl ActionClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build http client")?;
        Ok(Self { http })
    }

    /// Sends the request and parses the JSON response.
    ///
    /// Any status other than `200` or `201` is an error; an empty body parses to `null`.
    pub async fn execute(&self, request: CallRequest) -> Result<Value> {
        let method = Method::from_bytes(request.method.as_bytes()).with_context(|| format!("invalid HTTP method '{}'", request.method))?;
        debug!(method = %method, url = %redact_sensitive(&request.url), "calling action endpoint");

        let mut builder = self.http.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let has_content_type = request.header(header::CONTENT_TYPE.as_str()).is_some();
        builder = match request.body {
            CallBody::Empty => builder,
            CallBody::Json(body) if has_content_type => builder.body(body.to_string()),
            CallBody::Json(body) => builder.header(header::CONTENT_TYPE, "application/json").body(body.to_string()),
            CallBody::Multipart { part_name, file } => builder.multipart(reqwest::multipart::Form::new().part(part_name, file_part(&file)?)),
        };

        let response = builder.send().await.with_context(|| format!("request to {} failed", redact_sensitive(&request.url)))?;
        let status = response.status();
        check_response_status(status)?;
        let text = response.text().await?;
        Ok(parse_response_json_strict(&text, Some(status))?)
    }
}
