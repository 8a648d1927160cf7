use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use stepform_engine::{
    ActionPipeline, ActionTransport, FieldEdit, FieldWriter, FormBackend, FormSession, NavigationOutcome, PipelineConfig, SessionError,
    TriggerSignature,
};
use stepform_types::{CallRequest, FieldSnapshot, FormDefinition, SessionSnapshot, StagedFile, Step, SubmitOutcome};

const EMAIL_ID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";
const SCORE_ID: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";

#[derive(Default)]
struct FakeBackend {
    definition: Value,
    session: SessionSnapshot,
    terminal_after: Option<String>,
    submissions: Mutex<Vec<(String, FieldSnapshot, bool)>>,
    custom: Mutex<Vec<serde_json::Map<String, Value>>>,
}

#[async_trait]
impl FormBackend for FakeBackend {
    async fn fetch_form(&self, _form_key: &str) -> Result<FormDefinition> {
        Ok(FormDefinition::from_value(self.definition.clone())?)
    }

    async fn fetch_session(&self, _form_key: &str) -> Result<SessionSnapshot> {
        Ok(self.session.clone())
    }

    async fn submit_step(&self, _form_key: &str, step_key: &str, snapshot: &FieldSnapshot, skip: bool) -> Result<SubmitOutcome> {
        self.submissions
            .lock()
            .expect("lock")
            .push((step_key.to_string(), snapshot.clone(), skip));
        if self.terminal_after.as_deref() == Some(step_key) {
            return Ok(SubmitOutcome::Terminal {
                redirect_url: Some("https://example.com/thanks".into()),
            });
        }
        Ok(SubmitOutcome::Next(Box::new(Step::default())))
    }

    async fn submit_custom(&self, _form_key: &str, custom_key_values: &serde_json::Map<String, Value>) -> Result<()> {
        self.custom.lock().expect("lock").push(custom_key_values.clone());
        Ok(())
    }
}

#[derive(Default)]
struct ScoringTransport {
    requests: Mutex<Vec<CallRequest>>,
}

#[async_trait]
impl ActionTransport for ScoringTransport {
    async fn call(&self, request: CallRequest) -> Result<Value> {
        self.requests.lock().expect("lock").push(request);
        Ok(json!({"result": {"score": 87}}))
    }
}

#[derive(Default)]
struct MemoryWriter {
    writes: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl FieldWriter for MemoryWriter {
    async fn write_field(&self, field_id: &str, value: &Value) -> Result<()> {
        self.writes.lock().expect("lock").push((field_id.to_string(), value.clone()));
        Ok(())
    }
}

fn branching_form() -> Value {
    json!({
        "steps": {
            "contact": {
                "origin": true,
                "servar_fields": [
                    {"servar": {"id": EMAIL_ID, "key": "email", "type": "text_field", "required": true}},
                    {"servar": {"key": "plan", "type": "select"}},
                    {"servar": {"id": SCORE_ID, "key": "score", "type": "integer_field"}}
                ],
                "actions": [{
                    "method": "post",
                    "body_type": "application/json",
                    "url": "https://scoring.example.com/leads",
                    "params": {"email": EMAIL_ID},
                    "response_params": {"result": {"score": SCORE_ID}}
                }],
                "next_conditions": [
                    {"element_type": "button", "element_key": "next", "trigger": "click", "next_step_key": "pro",
                     "rules": [{"key": "plan", "value": "pro", "comparison": "equal"}]},
                    {"element_type": "button", "element_key": "next", "trigger": "click", "next_step_key": "free"}
                ]
            },
            "pro": {"next_conditions": [{"element_type": "button", "element_key": "next", "trigger": "click", "next_step_key": "done"}]},
            "free": {"next_conditions": [{"element_type": "button", "element_key": "next", "trigger": "click", "next_step_key": "done"}]},
            "done": {}
        }
    })
}

async fn start(backend: FakeBackend, transport: Arc<ScoringTransport>, writer: Arc<MemoryWriter>) -> (FormSession, Arc<FakeBackend>) {
    let backend = Arc::new(backend);
    let pipeline = ActionPipeline::new(transport, writer, PipelineConfig::default().with_credential("client-key"));
    let session = FormSession::begin("form-1", backend.clone(), pipeline).await.expect("session begins");
    (session, backend)
}

#[tokio::test]
async fn submit_runs_actions_then_follows_conditions() {
    let transport = Arc::new(ScoringTransport::default());
    let writer = Arc::new(MemoryWriter::default());
    let backend = FakeBackend {
        definition: branching_form(),
        ..Default::default()
    };
    let (mut session, backend) = start(backend, transport.clone(), writer.clone()).await;

    assert_eq!(session.current_step().key, "contact");
    assert!(!session.is_filled());
    assert_eq!(
        session.apply_edit("email", FieldEdit::Text(String::new())).expect("known field").map(|error| error.message),
        Some("This is a required field".to_string())
    );
    session.apply_edit("email", FieldEdit::Text("ada@example.com".into())).expect("edit");
    session.apply_edit("plan", FieldEdit::Text("pro".into())).expect("edit");
    assert!(session.is_filled());

    let transition = session.submit(&TriggerSignature::button_click("next"), false).await.expect("submit");
    assert_eq!(
        transition.navigation,
        NavigationOutcome::Moved {
            from: "contact".into(),
            to: "pro".into()
        }
    );

    let report = transition.pipeline.expect("actions ran");
    assert_eq!(report.completed(), 1);
    assert_eq!(session.field_values().get("score"), Some(&json!(87)));

    let requests = transport.requests.lock().expect("lock");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].header("Authorization"), Some("Bearer client-key"));
    drop(requests);

    let submissions = backend.submissions.lock().expect("lock");
    assert_eq!(submissions[0].0, "contact");
    assert!(submissions[0].1.fields.iter().any(|field| field.key == "email" && field.value == json!("ada@example.com")));
    drop(submissions);

    assert_eq!(session.realtime_fields().get("email"), Some(json!("ada@example.com")));

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(writer.writes.lock().expect("lock").clone(), vec![(SCORE_ID.to_string(), json!(87))]);
}

#[tokio::test]
async fn going_back_and_rechoosing_truncates_history() {
    let backend = FakeBackend {
        definition: branching_form(),
        ..Default::default()
    };
    let (mut session, _backend) = start(backend, Arc::default(), Arc::default()).await;

    session.apply_edit("plan", FieldEdit::Text("pro".into())).expect("edit");
    session.trigger(&TriggerSignature::button_click("next")).expect("trigger");
    assert_eq!(session.navigation().sequence(), ["pro".to_string()]);

    assert_eq!(session.go_back().expect("back").key, "contact");
    session.apply_edit("plan", FieldEdit::Text("basic".into())).expect("edit");
    let outcome = session.trigger(&TriggerSignature::button_click("next")).expect("trigger");

    assert_eq!(
        outcome,
        NavigationOutcome::Moved {
            from: "contact".into(),
            to: "free".into()
        }
    );
    assert_eq!(session.navigation().sequence(), ["free".to_string()]);
    assert_eq!(session.navigation().index(), 1);
    assert!(matches!(session.go_back(), Ok(step) if step.key == "contact"));
    assert!(matches!(session.go_back(), Err(SessionError::Navigation(_))));
}

#[tokio::test]
async fn unmatched_trigger_stays_on_step() {
    let backend = FakeBackend {
        definition: branching_form(),
        ..Default::default()
    };
    let (mut session, _backend) = start(backend, Arc::default(), Arc::default()).await;

    let outcome = session.trigger(&TriggerSignature::button_click("unknown")).expect("trigger");
    assert_eq!(outcome, NavigationOutcome::Stayed);
    assert_eq!(session.current_step().key, "contact");
}

#[tokio::test]
async fn resumes_from_stored_progress_and_finishes() {
    let mut field_values = serde_json::Map::new();
    field_values.insert("plan".into(), json!("pro"));
    let backend = FakeBackend {
        definition: branching_form(),
        session: SessionSnapshot {
            field_values,
            current_step_key: Some("pro".into()),
        },
        terminal_after: Some("pro".into()),
        ..Default::default()
    };
    let (mut session, backend) = start(backend, Arc::default(), Arc::default()).await;

    assert_eq!(session.current_step().key, "pro");
    assert_eq!(session.field_values().get("plan"), Some(&json!("pro")));
    assert_eq!(session.progress(), Some(50));

    let transition = session.submit(&TriggerSignature::button_click("next"), true).await.expect("submit");
    assert!(transition.pipeline.is_none());
    assert_eq!(
        transition.navigation,
        NavigationOutcome::Finished {
            redirect_url: Some("https://example.com/thanks".into())
        }
    );
    assert_eq!(session.finished(), Some(Some("https://example.com/thanks")));
    assert!(backend.submissions.lock().expect("lock")[0].2);
    assert!(matches!(session.trigger(&TriggerSignature::button_click("next")), Err(SessionError::Finished)));
}

#[tokio::test]
async fn staged_files_are_submitted_but_not_published() {
    const RESUME_ID: &str = "a3bb189e-8bf9-4888-9912-ace4e6543002";
    let backend = FakeBackend {
        definition: json!({
            "steps": {
                "documents": {
                    "origin": true,
                    "servar_fields": [
                        {"servar": {"key": "name", "type": "text_field"}},
                        {"servar": {"id": RESUME_ID, "key": "resume", "type": "file_upload"}}
                    ]
                }
            }
        }),
        ..Default::default()
    };
    let (mut session, backend) = start(backend, Arc::default(), Arc::default()).await;

    session.apply_edit("name", FieldEdit::Text("Ada".into())).expect("edit");
    session.stage_file(StagedFile {
        field_id: RESUME_ID.into(),
        file_name: "resume.pdf".into(),
        content_type: Some("application/pdf".into()),
        bytes: vec![1, 2, 3],
    });

    let transition = session.submit(&TriggerSignature::button_click("next"), false).await.expect("submit");
    assert_eq!(transition.navigation, NavigationOutcome::Stayed);

    let published = session.realtime_fields().snapshot();
    assert_eq!(published.get("name"), Some(&json!("Ada")));
    assert!(!published.contains_key("resume"));

    let submissions = backend.submissions.lock().expect("lock");
    let (_, snapshot, _) = &submissions[0];
    assert!(snapshot.fields.iter().all(|field| field.key != "resume"));
    assert_eq!(snapshot.file.as_ref().map(|(key, file)| (key.as_str(), file.file_name.as_str())), Some(("resume", "resume.pdf")));
}

#[tokio::test]
async fn custom_values_reach_the_backend() {
    let backend = FakeBackend {
        definition: branching_form(),
        ..Default::default()
    };
    let (session, backend) = start(backend, Arc::default(), Arc::default()).await;

    let mut custom = serde_json::Map::new();
    custom.insert("campaign".into(), json!("spring"));
    session.submit_custom(&custom).await.expect("custom values");

    assert_eq!(backend.custom.lock().expect("lock").clone(), vec![custom]);
    assert_eq!(session.current_step().key, "contact");
}
