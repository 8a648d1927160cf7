use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use stepform_api::{ActionClient, ClientConfig, FormClient};
use stepform_engine::fields::{FieldValueStore, FieldValues, default_field_values};
use stepform_engine::layout::calculate_dimensions;
use stepform_engine::navigation::{NavigationState, next_step_key};
use stepform_engine::{
    ActionOutcome, ActionPipeline, FieldEdit, FieldWriter, FormSession, NavigationOutcome, PipelineConfig, StepGraph, TriggerSignature,
    Viewport, load_form_definition,
};
use stepform_types::{CallBody, CallRequest, FormDefinition, Step};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("depth", sub)) => depth_cmd(sub),
        Some(("validate", sub)) => validate_cmd(sub),
        Some(("layout", sub)) => layout_cmd(sub),
        Some(("next", sub)) => next_cmd(sub),
        Some(("actions", sub)) => actions_cmd(sub).await,
        Some(("run", sub)) => run_cmd(sub).await,
        _ => bail!("unknown command; see --help"),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Log filter from `RUST_LOG`, falling back to `info` when unset or invalid.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn build_cli() -> Command {
    let file = Arg::new("file")
        .long("file")
        .short('f')
        .required(true)
        .action(ArgAction::Set)
        .help("Path to a form definition (YAML or JSON)");
    let step = Arg::new("step")
        .long("step")
        .short('s')
        .action(ArgAction::Set)
        .help("Step key; defaults to the origin step");
    let values = Arg::new("values")
        .long("values")
        .action(ArgAction::Set)
        .help("JSON object of field values layered over the defaults");

    Command::new("stepform")
        .about("Inspect and drive server-defined step forms")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("depth")
                .about("Shortest and longest path between two steps")
                .arg(file.clone())
                .arg(Arg::new("from").long("from").action(ArgAction::Set).help("Origin step; defaults to the origin"))
                .arg(Arg::new("to").long("to").required(true).action(ArgAction::Set).help("Target step")),
        )
        .subcommand(
            Command::new("validate")
                .about("Check that the step graph has no cycles or dangling targets")
                .arg(file.clone()),
        )
        .subcommand(
            Command::new("layout")
                .about("Grid dimensions of a step")
                .arg(file.clone())
                .arg(step.clone())
                .arg(values.clone())
                .arg(
                    Arg::new("width")
                        .long("width")
                        .action(ArgAction::Set)
                        .value_parser(clap::value_parser!(u32))
                        .default_value("1024")
                        .help("Viewport width in pixels"),
                ),
        )
        .subcommand(
            Command::new("next")
                .about("Resolve the step a trigger leads to")
                .arg(file.clone())
                .arg(step.clone())
                .arg(values.clone())
                .arg(Arg::new("element-type").long("element-type").default_value("button").action(ArgAction::Set))
                .arg(Arg::new("element-key").long("element-key").required(true).action(ArgAction::Set))
                .arg(Arg::new("trigger").long("trigger").default_value("click").action(ArgAction::Set)),
        )
        .subcommand(
            Command::new("actions")
                .about("Preview the requests a step's actions would send")
                .arg(file)
                .arg(step)
                .arg(values)
                .arg(
                    Arg::new("credential")
                        .long("credential")
                        .env("STEPFORM_CLIENT_KEY")
                        .hide_env_values(true)
                        .action(ArgAction::Set)
                        .help("Bearer credential attached to action calls"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Work through a live form using scripted answers")
                .arg(Arg::new("form").long("form").required(true).action(ArgAction::Set).help("Form key"))
                .arg(
                    Arg::new("answers")
                        .long("answers")
                        .short('a')
                        .action(ArgAction::Set)
                        .help("YAML or JSON file with per-step values and triggers"),
                ),
        )
}

fn depth_cmd(matches: &ArgMatches) -> Result<()> {
    let definition = load_definition(matches)?;
    let graph = StepGraph::from_definition(&definition);
    let from = match matches.get_one::<String>("from") {
        Some(from) => from.clone(),
        None => origin_of(&definition)?,
    };
    let to = matches.get_one::<String>("to").context("--to is required")?;

    let range = graph.recurse_depth(&from, to)?;
    let progress = graph.progress_percent(&from, to).ok();
    print_json(&json!({"from": from, "to": to, "min": range.min, "max": range.max, "progress": progress}))
}

fn validate_cmd(matches: &ArgMatches) -> Result<()> {
    let definition = load_definition(matches)?;
    let graph = StepGraph::from_definition(&definition);
    let mut problems = Vec::new();

    if definition.origin_key().is_none() {
        problems.push("no step is marked as the origin".to_string());
    }
    for step in definition.steps.values() {
        for condition in &step.next_conditions {
            if !definition.steps.contains_key(&condition.next_step_key) {
                problems.push(format!("step '{}' targets unknown step '{}'", step.key, condition.next_step_key));
            }
        }
    }
    if let Some(cycle) = graph.find_cycle() {
        problems.push(format!("cycle: {}", cycle.join(" -> ")));
    }

    if problems.is_empty() {
        info!(steps = graph.len(), "form definition is valid");
        return Ok(());
    }
    for problem in &problems {
        warn!("{problem}");
    }
    bail!("{} problem(s) found", problems.len())
}

fn layout_cmd(matches: &ArgMatches) -> Result<()> {
    let definition = load_definition(matches)?;
    let step = select_step(&definition, matches)?;
    let values = field_values(&definition, matches)?;
    let width = matches.get_one::<u32>("width").copied().unwrap_or(1024);

    let dimensions = calculate_dimensions(step, Viewport::new(width), &values);
    print_json(&serde_json::to_value(&dimensions)?)
}

fn next_cmd(matches: &ArgMatches) -> Result<()> {
    let definition = load_definition(matches)?;
    let step = select_step(&definition, matches)?;
    let values = field_values(&definition, matches)?;
    let signature = TriggerSignature::new(
        string_arg(matches, "element-type")?,
        string_arg(matches, "element-key")?,
        string_arg(matches, "trigger")?,
    );

    let history = NavigationState::new(origin_of(&definition)?);
    let next = next_step_key(&step.next_conditions, &signature, &values, &history);
    print_json(&json!({"from": step.key, "next_step_key": next.new_step_key}))
}

async fn actions_cmd(matches: &ArgMatches) -> Result<()> {
    let definition = load_definition(matches)?;
    let step = select_step(&definition, matches)?;
    let store = FieldValueStore::from_values(field_values(&definition, matches)?);

    let mut config = PipelineConfig::default();
    if let Some(credential) = matches.get_one::<String>("credential") {
        config = config.with_credential(credential.clone());
    }
    let pipeline = ActionPipeline::dry_run(config);
    let context = store.action_context(step);

    let plan: Vec<Value> = step
        .actions
        .iter()
        .map(|action| match pipeline.build_request(action, &context) {
            Ok(request) => describe_request(&request),
            Err(error) => json!({"error": error.to_string()}),
        })
        .collect();
    print_json(&Value::Array(plan))?;

    let report = pipeline.run(&step.actions, context).await;
    info!(actions = step.actions.len(), completed = report.completed(), writes = report.writes.len(), "dry run finished");
    Ok(())
}

/// Scripted answers for `run`, keyed by step key.
#[derive(Debug, Default, Deserialize)]
struct Answers {
    #[serde(default)]
    steps: Map<String, Value>,
    /// Values stored against the end user before the first step.
    #[serde(default)]
    custom: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct StepAnswer {
    #[serde(default)]
    values: Map<String, Value>,
    #[serde(default)]
    trigger: Option<TriggerSignature>,
    #[serde(default)]
    skip: bool,
}

async fn run_cmd(matches: &ArgMatches) -> Result<()> {
    let form_key = string_arg(matches, "form")?;
    let answers = match matches.get_one::<String>("answers") {
        Some(path) => read_answers(Path::new(path))?,
        None => Answers::default(),
    };

    let config = ClientConfig::from_env()?;
    let mut pipeline_config = PipelineConfig::default();
    if let Some(credential) = &config.client_key {
        pipeline_config = pipeline_config.with_credential(credential.clone());
    }
    let client = Arc::new(FormClient::new(config)?);
    let writer: Arc<dyn FieldWriter> = client.clone();
    let pipeline = ActionPipeline::new(Arc::new(ActionClient::new()?), writer, pipeline_config);
    let mut session = FormSession::begin(form_key, client, pipeline).await?;
    if !answers.custom.is_empty() {
        session.submit_custom(&answers.custom).await?;
    }

    loop {
        let step_key = session.current_step().key.clone();
        let answer: StepAnswer = match answers.steps.get(&step_key) {
            Some(value) => serde_json::from_value(value.clone()).with_context(|| format!("invalid answers for step '{step_key}'"))?,
            None => StepAnswer::default(),
        };

        for (field_key, value) in answer.values {
            if let Some(error) = session.apply_edit(&field_key, FieldEdit::Value(value))? {
                warn!(step_key = %step_key, field_key = %field_key, "{}", error.message);
            }
        }
        if !answer.skip && !session.is_filled() {
            bail!("step '{step_key}' has unfilled required fields");
        }

        let signature = answer.trigger.unwrap_or_else(|| TriggerSignature::button_click("next"));
        let transition = session.submit(&signature, answer.skip).await?;
        if let Some(report) = &transition.pipeline {
            for outcome in report.outcomes.iter().filter(|outcome| !matches!(outcome, ActionOutcome::Completed { .. })) {
                warn!(step_key = %step_key, ?outcome, "action did not complete");
            }
        }

        match transition.navigation {
            NavigationOutcome::Moved { from, to } => info!(from = %from, to = %to, progress = ?session.progress(), "moved"),
            NavigationOutcome::Stayed => bail!("no condition on step '{step_key}' matched {signature:?}"),
            NavigationOutcome::Finished { redirect_url } => {
                print_json(&json!({"finished": true, "redirect_url": redirect_url}))?;
                return Ok(());
            }
        }
    }
}

fn load_definition(matches: &ArgMatches) -> Result<FormDefinition> {
    let file = string_arg(matches, "file")?;
    Ok(load_form_definition(&file)?.normalized())
}

fn origin_of(definition: &FormDefinition) -> Result<String> {
    definition
        .origin_key()
        .or_else(|| definition.steps.keys().next().map(String::as_str))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("form definition has no steps"))
}

fn select_step<'a>(definition: &'a FormDefinition, matches: &ArgMatches) -> Result<&'a Step> {
    let key = match matches.get_one::<String>("step") {
        Some(key) => key.clone(),
        None => origin_of(definition)?,
    };
    definition.step(&key).ok_or_else(|| anyhow!("step '{key}' not found"))
}

fn field_values(definition: &FormDefinition, matches: &ArgMatches) -> Result<FieldValues> {
    let mut values = default_field_values(definition.steps.values());
    if let Some(raw) = matches.get_one::<String>("values") {
        let overrides: Map<String, Value> = serde_json::from_str(raw).context("--values must be a JSON object")?;
        values.extend(overrides);
    }
    Ok(values)
}

fn read_answers(path: &Path) -> Result<Answers> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read answers: {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("invalid answers file {}", path.display()))
}

fn describe_request(request: &CallRequest) -> Value {
    let mut headers = Map::new();
    for (name, value) in &request.headers {
        let redacted = stepform_util::redact_sensitive(&format!("{name}: {value}"));
        let value = redacted.split_once(':').map(|(_, value)| value.trim()).unwrap_or_default();
        headers.insert(name.clone(), Value::String(value.to_string()));
    }
    let body = match &request.body {
        CallBody::Empty => Value::Null,
        CallBody::Json(body) => body.clone(),
        CallBody::Multipart { part_name, file } => {
            let mut parts = Map::new();
            parts.insert(part_name.clone(), file.describe());
            json!({ "multipart": parts })
        }
    };
    json!({
        "method": request.method,
        "url": stepform_util::redact_sensitive(&request.url),
        "headers": headers,
        "body": body,
    })
}

fn string_arg(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| anyhow!("--{name} is required"))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn log_filter_follows_rust_log() {
        temp_env::with_var("RUST_LOG", Some("stepform_engine=debug"), || {
            assert_eq!(env_filter().to_string(), "stepform_engine=debug");
        });
        temp_env::with_var("RUST_LOG", None::<&str>, || {
            assert_eq!(env_filter().to_string(), "info");
        });
    }

    #[test]
    fn parses_layout_arguments() {
        let matches = build_cli()
            .try_get_matches_from(["stepform", "layout", "--file", "form.yaml", "--width", "375"])
            .expect("parses");
        let (name, sub) = matches.subcommand().expect("subcommand");
        assert_eq!(name, "layout");
        assert_eq!(sub.get_one::<u32>("width"), Some(&375));
        assert!(sub.get_one::<String>("step").is_none());
    }

    #[test]
    fn answers_accept_triggers_and_values() {
        let answers: Answers = serde_yaml::from_str(
            r#"
custom: {campaign: spring}
steps:
  contact:
    values: {email: ada@example.com}
    trigger: {element_type: button, element_keys: [continue], trigger: click}
"#,
        )
        .expect("answers");
        assert_eq!(answers.custom["campaign"], json!("spring"));
        let answer: StepAnswer = serde_json::from_value(answers.steps["contact"].clone()).expect("step answer");
        assert_eq!(answer.values["email"], json!("ada@example.com"));
        assert_eq!(answer.trigger, Some(TriggerSignature::button_click("continue")));
        assert!(!answer.skip);
    }

    #[test]
    fn describe_request_redacts_credentials() {
        let request = CallRequest {
            method: "POST".into(),
            url: "https://scoring.example.com/leads".into(),
            headers: vec![("Authorization".into(), "Bearer abcdefghijklmnopqrstuvwxyz0123456789".into())],
            body: CallBody::Json(json!({"email": "ada@example.com"})),
        };
        let described = describe_request(&request);
        assert_eq!(described["body"]["email"], json!("ada@example.com"));
        assert!(!described["headers"]["Authorization"].as_str().unwrap_or_default().contains("abcdefghijklmnop"));
    }
}
