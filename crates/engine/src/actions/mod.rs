//! # Action Pipeline
//!
//! Executes the declared actions of a submitted step, one at a time and in declared
//! order. Each action is turned into a [`CallRequest`] by substituting values from the
//! run's lookup map into its body and URL, then handed to an [`ActionTransport`].
//!
//! ## Response write-back
//!
//! Actions that declare `response_params` are awaited for at most
//! [`PipelineConfig::response_budget`]. The call runs on its own task, so giving up on the
//! wait does not cancel it: a late response is still persisted through the
//! [`FieldWriter`], but it no longer updates the lookup map of the run that issued it.
//! Actions without `response_params` are awaited to completion.
//!
//! ## Failure policy
//!
//! Nothing here is fatal. Build errors, transport errors, mismatched file fields, and
//! timeouts are logged and recorded in the [`PipelineReport`], and the next action runs.

mod context;
mod template;
mod transport;

use std::sync::Arc;

use serde_json::Value;
use stepform_types::{Action, BodyKind, CallBody, CallRequest};
use stepform_util::redact_sensitive;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use context::{ActionContext, DEFAULT_RESPONSE_BUDGET, LookupMap, PipelineConfig};
pub use template::{collect_response_writes, replace_request_params, replace_url_params};
pub use transport::{ActionTransport, EchoTransport, FieldWriter, LogOnlyWriter};

use crate::error::ActionError;

/// What happened to one action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The call finished in time; `written` response values were applied.
    Completed { written: usize },
    /// The response wait ran out; the call keeps running in the background.
    TimedOut(ActionError),
    /// The action was skipped before any call was made.
    Aborted(ActionError),
    /// The call failed.
    Failed(ActionError),
}

/// Result of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// One outcome per declared action, in order.
    pub outcomes: Vec<ActionOutcome>,
    /// Response values written back in time, in the order they were applied.
    pub writes: Vec<(String, Value)>,
    /// Lookup map as it stood after the last action.
    pub lookup: LookupMap,
}

impl PipelineReport {
    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, ActionOutcome::Completed { .. }))
            .count()
    }
}

/// Runs step actions against a transport and a field writer.
#[derive(Clone)]
pub struct ActionPipeline {
    transport: Arc<dyn ActionTransport>,
    writer: Arc<dyn FieldWriter>,
    config: PipelineConfig,
}

impl std::fmt::Debug for ActionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionPipeline")
            .field("response_budget", &self.config.response_budget)
            .field("has_credential", &self.config.credential.is_some())
            .finish()
    }
}

impl ActionPipeline {
    pub fn new(transport: Arc<dyn ActionTransport>, writer: Arc<dyn FieldWriter>, config: PipelineConfig) -> Self {
        Self {
            transport,
            writer,
            config,
        }
    }

    /// Pipeline that echoes requests and persists nothing.
    pub fn dry_run(config: PipelineConfig) -> Self {
        Self::new(Arc::new(EchoTransport), Arc::new(LogOnlyWriter), config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Executes `actions` sequentially against `context`.
    pub async fn run(&self, actions: &[Action], context: ActionContext) -> PipelineReport {
        let mut context = context;
        let mut report = PipelineReport::default();

        for (action_index, action) in actions.iter().enumerate() {
            let request = match self.build_request(action, &context) {
                Ok(request) => request,
                Err(error) => {
                    warn!(action_index, error = %error, "action skipped");
                    report.outcomes.push(ActionOutcome::Aborted(error));
                    continue;
                }
            };
            debug!(action_index, method = %request.method, url = %redact_sensitive(&request.url), "running action");

            let outcome = match &action.response_params {
                Some(response_params) => self.call_with_write_back(action_index, request, response_params.clone(), &mut context, &mut report).await,
                None => self.call_without_write_back(action_index, request).await,
            };
            report.outcomes.push(outcome);
        }

        report.lookup = context.lookup;
        report
    }

    /// Turns an action into a concrete request using the values in `context`.
    pub fn build_request(&self, action: &Action, context: &ActionContext) -> Result<CallRequest, ActionError> {
        let method = action.method.trim().to_ascii_uppercase();
        if method.is_empty() {
            return Err(ActionError::Build {
                reason: "method is empty".into(),
            });
        }
        let url = replace_url_params(action.url.trim(), &context.lookup);
        if url.is_empty() {
            return Err(ActionError::Build {
                reason: "url is empty".into(),
            });
        }

        let mut headers = Vec::new();
        if let Some(credential) = &self.config.credential {
            headers.push(("Authorization".to_string(), format!("Bearer {credential}")));
        }

        let body = match action.body_type {
            BodyKind::Json => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                CallBody::Json(replace_request_params(&action.params, &context.lookup))
            }
            BodyKind::Multipart => {
                let file = context
                    .staged_file
                    .as_ref()
                    .filter(|_| action.form_data_servar.is_some() && action.form_data_servar == context.pending_file_field);
                let Some(file) = file else {
                    return Err(ActionError::FileFieldMismatch {
                        expected: action.form_data_servar.clone(),
                        staged: context.pending_file_field.clone(),
                    });
                };
                let part_name = action
                    .form_data_key
                    .clone()
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| ActionError::Build {
                        reason: "multipart action has no form_data_key".into(),
                    })?;
                CallBody::Multipart {
                    part_name,
                    file: file.clone(),
                }
            }
            BodyKind::Empty => CallBody::Empty,
        };

        Ok(CallRequest { method, url, headers, body })
    }

    async fn call_with_write_back(
        &self,
        action_index: usize,
        request: CallRequest,
        response_params: Value,
        context: &mut ActionContext,
        report: &mut PipelineReport,
    ) -> ActionOutcome {
        let handle = self.spawn_call(request, Some(response_params));
        let budget = self.config.response_budget;

        match tokio::time::timeout(budget, handle).await {
            Ok(Ok(Ok(writes))) => {
                let written = writes.len();
                for (field_id, value) in writes {
                    context.lookup.insert(field_id.clone(), value.clone());
                    report.writes.push((field_id, value));
                }
                debug!(action_index, written, "action response applied");
                ActionOutcome::Completed { written }
            }
            Ok(Ok(Err(error))) => {
                warn!(action_index, error = %error, "action call failed");
                ActionOutcome::Failed(error)
            }
            Ok(Err(join_error)) => {
                warn!(action_index, error = %join_error, "action task ended abnormally");
                ActionOutcome::Failed(ActionError::Transport {
                    message: join_error.to_string(),
                })
            }
            Err(_) => {
                let error = ActionError::Timeout {
                    budget_ms: budget.as_millis() as u64,
                };
                warn!(action_index, error = %error, "continuing without the action response");
                ActionOutcome::TimedOut(error)
            }
        }
    }

    async fn call_without_write_back(&self, action_index: usize, request: CallRequest) -> ActionOutcome {
        match self.spawn_call(request, None).await {
            Ok(Ok(_)) => ActionOutcome::Completed { written: 0 },
            Ok(Err(error)) => {
                warn!(action_index, error = %error, "action call failed");
                ActionOutcome::Failed(error)
            }
            Err(join_error) => {
                warn!(action_index, error = %join_error, "action task ended abnormally");
                ActionOutcome::Failed(ActionError::Transport {
                    message: join_error.to_string(),
                })
            }
        }
    }

    // The spawned task owns the call and the persistence of its response values, so both
    // survive the pipeline abandoning the wait.
    fn spawn_call(&self, request: CallRequest, response_params: Option<Value>) -> JoinHandle<Result<Vec<(String, Value)>, ActionError>> {
        let transport = Arc::clone(&self.transport);
        let writer = Arc::clone(&self.writer);
        tokio::spawn(async move {
            let url = redact_sensitive(&request.url);
            let response = transport.call(request).await.map_err(|error| ActionError::Transport {
                message: format!("{error:#}"),
            })?;
            let Some(response_params) = response_params else {
                return Ok(Vec::new());
            };
            let writes = collect_response_writes(&response_params, &response);
            if !writes.is_empty() {
                tokio::spawn(persist_writes(writer, writes.clone(), url));
            }
            Ok(writes)
        })
    }
}

async fn persist_writes(writer: Arc<dyn FieldWriter>, writes: Vec<(String, Value)>, url: String) {
    for (field_id, value) in writes {
        if let Err(error) = writer.write_field(&field_id, &value).await {
            warn!(field_id = %field_id, url = %url, error = %error, "field write-back failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use stepform_types::StagedFile;

    const NAME_ID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";
    const GREETING_ID: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";

    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<CallRequest>>,
        responses: Mutex<Vec<anyhow::Result<Value>>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl ActionTransport for RecordingTransport {
        async fn call(&self, request: CallRequest) -> anyhow::Result<Value> {
            self.requests.lock().expect("lock").push(request);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut responses = self.responses.lock().expect("lock");
            if responses.is_empty() { Ok(json!({})) } else { responses.remove(0) }
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        writes: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl FieldWriter for RecordingWriter {
        async fn write_field(&self, field_id: &str, value: &Value) -> anyhow::Result<()> {
            self.writes.lock().expect("lock").push((field_id.to_string(), value.clone()));
            Ok(())
        }
    }

    fn json_action(params: Value, response_params: Option<Value>) -> Action {
        Action {
            method: "post".into(),
            body_type: BodyKind::Json,
            url: "https://example.com/hook".into(),
            params,
            response_params,
            ..Default::default()
        }
    }

    fn context() -> ActionContext {
        ActionContext::new(LookupMap::from([(NAME_ID.to_string(), json!("Ada"))]), None, None)
    }

    #[tokio::test]
    async fn later_actions_see_earlier_write_back() {
        let transport = Arc::new(RecordingTransport {
            responses: Mutex::new(vec![Ok(json!({"greeting": "hello Ada"})), Ok(json!({}))]),
            ..Default::default()
        });
        let writer = Arc::new(RecordingWriter::default());
        let pipeline = ActionPipeline::new(transport.clone(), writer.clone(), PipelineConfig::default().with_credential("ck"));

        let actions = vec![
            json_action(json!({"name": NAME_ID}), Some(json!({"greeting": GREETING_ID}))),
            json_action(json!({"message": GREETING_ID}), None),
        ];
        let report = pipeline.run(&actions, context()).await;

        assert_eq!(report.outcomes, vec![ActionOutcome::Completed { written: 1 }, ActionOutcome::Completed { written: 0 }]);
        assert_eq!(report.lookup.get(GREETING_ID), Some(&json!("hello Ada")));

        let requests = transport.requests.lock().expect("lock");
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].header("authorization"), Some("Bearer ck"));
        assert_eq!(requests[0].body, CallBody::Json(json!({"name": "Ada"})));
        assert_eq!(requests[1].body, CallBody::Json(json!({"message": "hello Ada"})));
        drop(requests);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(writer.writes.lock().expect("lock").clone(), vec![(GREETING_ID.to_string(), json!("hello Ada"))]);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_pipeline() {
        let transport = Arc::new(RecordingTransport {
            responses: Mutex::new(vec![Err(anyhow!("connection refused")), Ok(json!({}))]),
            ..Default::default()
        });
        let pipeline = ActionPipeline::new(transport.clone(), Arc::new(LogOnlyWriter), PipelineConfig::default());
        let actions = vec![json_action(json!({}), None), json_action(json!({}), None)];

        let report = pipeline.run(&actions, context()).await;
        assert!(matches!(report.outcomes[0], ActionOutcome::Failed(ActionError::Transport { .. })));
        assert_eq!(report.outcomes[1], ActionOutcome::Completed { written: 0 });
        assert_eq!(transport.requests.lock().expect("lock").len(), 2);
    }

    #[tokio::test]
    async fn mismatched_file_field_aborts_only_that_action() {
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = ActionPipeline::new(transport.clone(), Arc::new(LogOnlyWriter), PipelineConfig::default());
        let upload = Action {
            method: "post".into(),
            body_type: BodyKind::Multipart,
            url: "https://example.com/upload".into(),
            form_data_servar: Some("other-field".into()),
            form_data_key: Some("document".into()),
            ..Default::default()
        };
        let file = StagedFile {
            field_id: "file-field".into(),
            file_name: "id.pdf".into(),
            content_type: None,
            bytes: vec![1],
        };
        let context = ActionContext::new(LookupMap::new(), Some(file), Some("file-field".into()));

        let report = pipeline.run(&[upload.clone(), json_action(json!({}), None)], context.clone()).await;
        assert!(matches!(report.outcomes[0], ActionOutcome::Aborted(ActionError::FileFieldMismatch { .. })));
        assert_eq!(transport.requests.lock().expect("lock").len(), 1);

        let matching = Action {
            form_data_servar: Some("file-field".into()),
            ..upload
        };
        let request = pipeline.build_request(&matching, &context).expect("request");
        assert!(matches!(request.body, CallBody::Multipart { ref part_name, .. } if part_name == "document"));
    }

    #[tokio::test]
    async fn missing_response_branch_writes_nothing() {
        let transport = Arc::new(RecordingTransport {
            responses: Mutex::new(vec![Ok(json!({"status": "ok"}))]),
            ..Default::default()
        });
        let writer = Arc::new(RecordingWriter::default());
        let pipeline = ActionPipeline::new(transport, writer.clone(), PipelineConfig::default());
        let actions = vec![json_action(json!({}), Some(json!({"result": {"greeting": GREETING_ID}})))];

        let report = pipeline.run(&actions, context()).await;
        assert_eq!(report.outcomes, vec![ActionOutcome::Completed { written: 0 }]);
        assert!(report.writes.is_empty());
        assert!(report.lookup.get(GREETING_ID).is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(writer.writes.lock().expect("lock").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_response_times_out_but_still_persists() {
        let transport = Arc::new(RecordingTransport {
            responses: Mutex::new(vec![Ok(json!({"greeting": "late"}))]),
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let writer = Arc::new(RecordingWriter::default());
        let pipeline = ActionPipeline::new(transport, writer.clone(), PipelineConfig::default());
        let actions = vec![json_action(json!({}), Some(json!({"greeting": GREETING_ID})))];

        let report = pipeline.run(&actions, context()).await;
        assert_eq!(report.outcomes, vec![ActionOutcome::TimedOut(ActionError::Timeout { budget_ms: 1000 })]);
        assert!(report.lookup.get(GREETING_ID).is_none());
        assert!(writer.writes.lock().expect("lock").is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(writer.writes.lock().expect("lock").clone(), vec![(GREETING_ID.to_string(), json!("late"))]);
    }

    #[tokio::test]
    async fn url_tokens_are_substituted() {
        let pipeline = ActionPipeline::dry_run(PipelineConfig::default());
        let action = Action {
            url: format!("https://example.com/users/<{NAME_ID}>"),
            ..Default::default()
        };
        let request = pipeline.build_request(&action, &context()).expect("request");
        assert_eq!(request.url, "https://example.com/users/Ada");
        assert_eq!(request.method, "GET");
        assert_eq!(request.body, CallBody::Empty);
        assert!(request.header("authorization").is_none());
    }
}
