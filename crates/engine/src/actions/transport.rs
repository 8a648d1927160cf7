//! Seams between the pipeline and the outside world.
//!
//! [`ActionTransport`] issues the concrete call of an action and [`FieldWriter`] persists
//! values written back from responses. The HTTP implementations live on the
//! `stepform-api` clients; [`EchoTransport`] and [`LogOnlyWriter`] run without side
//! effects for previews and tests.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use stepform_api::{ActionClient, FormClient};
use stepform_types::{CallBody, CallRequest};
use stepform_util::redact_sensitive;
use tracing::debug;

/// Issues one action call and returns its parsed JSON response.
#[async_trait]
pub trait ActionTransport: Send + Sync {
    async fn call(&self, request: CallRequest) -> Result<Value>;
}

/// Persists a single field value on the backend.
#[async_trait]
pub trait FieldWriter: Send + Sync {
    async fn write_field(&self, field_id: &str, value: &Value) -> Result<()>;
}

/// Transport that answers every call with a description of the request it received.
///
/// Authorization headers are never echoed back.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoTransport;

#[async_trait]
impl ActionTransport for EchoTransport {
    async fn call(&self, request: CallRequest) -> Result<Value> {
        let mut echoed = Map::new();
        echoed.insert("method".into(), Value::String(request.method));
        echoed.insert("url".into(), Value::String(request.url));
        let headers: Map<String, Value> = request
            .headers
            .into_iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("authorization"))
            .map(|(name, value)| (name, Value::String(value)))
            .collect();
        echoed.insert("headers".into(), Value::Object(headers));
        match request.body {
            CallBody::Empty => {}
            CallBody::Json(body) => {
                echoed.insert("body".into(), body);
            }
            CallBody::Multipart { part_name, file } => {
                let mut parts = Map::new();
                parts.insert(part_name, file.describe());
                echoed.insert("body".into(), Value::Object(parts));
            }
        }
        Ok(Value::Object(echoed))
    }
}

/// Writer that only records the write in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyWriter;

#[async_trait]
impl FieldWriter for LogOnlyWriter {
    async fn write_field(&self, field_id: &str, value: &Value) -> Result<()> {
        debug!(field_id = %field_id, value = %value, "field write skipped");
        Ok(())
    }
}

#[async_trait]
impl ActionTransport for ActionClient {
    async fn call(&self, request: CallRequest) -> Result<Value> {
        debug!(method = %request.method, url = %redact_sensitive(&request.url), "issuing action call");
        self.execute(request).await
    }
}

#[async_trait]
impl FieldWriter for FormClient {
    async fn write_field(&self, field_id: &str, value: &Value) -> Result<()> {
        FormClient::write_field(self, field_id, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepform_types::StagedFile;

    #[tokio::test]
    async fn echo_omits_credentials() {
        let request = CallRequest {
            method: "POST".into(),
            url: "https://example.com/hook".into(),
            headers: vec![
                ("Authorization".into(), "Bearer secret".into()),
                ("Content-Type".into(), "application/json".into()),
            ],
            body: CallBody::Json(json!({"a": 1})),
        };
        let echoed = EchoTransport.call(request).await.expect("echo");
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["body"], json!({"a": 1}));
        assert_eq!(echoed["headers"], json!({"Content-Type": "application/json"}));
    }

    #[tokio::test]
    async fn echo_describes_multipart_files() {
        let request = CallRequest {
            method: "PUT".into(),
            url: "https://example.com/upload".into(),
            headers: Vec::new(),
            body: CallBody::Multipart {
                part_name: "document".into(),
                file: StagedFile {
                    field_id: "f".into(),
                    file_name: "id.pdf".into(),
                    content_type: None,
                    bytes: vec![0; 4],
                },
            },
        };
        let echoed = EchoTransport.call(request).await.expect("echo");
        assert_eq!(echoed["body"]["document"]["size"], 4);
    }
}
