//! Tool-driven scaffold generations and build dispatch

use forge_core::{
    ArtifactType, BuildConfig, BuildResult, OutwardEvent, Pipeline, PipelineConfig,
    PipelineError, StreamOutcome,
};
use forge_output::ProjectBuilder;
use forge_test_utils::{
    list_files, subject, write_file_args, RecordingBuilder, ScriptedModel, ScriptedProvider, Step,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn scaffold_steps() -> Vec<Step> {
    vec![
        Step::text("Setting up the project."),
        Step::write_file("src/App.jsx", "export default () => <h1>Hi</h1>;\n"),
        Step::write_file("src/index.css", "h1 { color: teal; }\n"),
        Step::Complete,
    ]
}

fn pipeline(root: &Path, model: Arc<ScriptedModel>, builder: Arc<RecordingBuilder>) -> Pipeline {
    Pipeline::builder(PipelineConfig::default().with_output_root(root))
        .provider(ScriptedProvider::new(model))
        .project_builder(builder)
        .build()
        .unwrap()
}

#[tokio::test]
async fn streaming_scaffold_forwards_tool_events_and_builds_once() {
    let tmp = tempfile::TempDir::new().unwrap();
    let builder = RecordingBuilder::new();
    let pipeline = pipeline(tmp.path(), ScriptedModel::new(scaffold_steps()), builder.clone());

    let (events, outcome) = pipeline
        .generate_streaming(subject(21), ArtifactType::Scaffold, "a react app")
        .unwrap()
        .collect_all()
        .await;

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            OutwardEvent::AiResponse { .. } => "ai_response",
            OutwardEvent::ToolRequest { .. } => "tool_request",
            OutwardEvent::ToolExecuted { .. } => "tool_executed",
            OutwardEvent::Done => "done",
            OutwardEvent::Error { .. } => "error",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "ai_response",
            "tool_request",
            "tool_request",
            "tool_executed",
            "tool_request",
            "tool_request",
            "tool_executed",
            "done",
        ]
    );

    // Fragments reassemble to the original arguments
    let first_call: String = events
        .iter()
        .filter_map(|e| match e {
            OutwardEvent::ToolRequest { index: 0, arguments, .. } => Some(arguments.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        first_call,
        write_file_args("src/App.jsx", "export default () => <h1>Hi</h1>;\n")
    );
    assert!(events.iter().any(|e| matches!(
        e,
        OutwardEvent::ToolExecuted { result, .. } if result == "File written: src/index.css"
    )));

    let project = tmp.path().join("scaffold_21");
    assert_eq!(list_files(&project), vec!["src/App.jsx", "src/index.css"]);

    let StreamOutcome::Completed { directory, build: Some(build) } = outcome else {
        panic!("expected completed scaffold with a build");
    };
    assert_eq!(directory.as_deref(), Some(project.as_path()));
    assert_eq!(build.wait().await, BuildResult::Success { output_directory: project.join("dist") });
    assert_eq!(builder.wait_for_calls(1, WAIT).await, vec![project]);
}

#[tokio::test]
async fn blocking_scaffold_returns_build_handle() {
    let tmp = tempfile::TempDir::new().unwrap();
    let builder = RecordingBuilder::returning(BuildResult::failure("missing package.json"));
    let pipeline = pipeline(tmp.path(), ScriptedModel::new(scaffold_steps()), builder.clone());

    let generated = pipeline
        .generate(subject(22), ArtifactType::Scaffold, "a react app")
        .await
        .unwrap();

    assert_eq!(generated.directory, tmp.path().join("scaffold_22"));
    assert!(generated.artifact.is_none());
    let build = generated.build.expect("scaffold dispatches a build");
    assert_eq!(build.key().kind, ArtifactType::Scaffold);
    assert_eq!(build.wait().await, BuildResult::failure("missing package.json"));
    assert_eq!(builder.calls().len(), 1);
}

#[tokio::test]
async fn failed_agent_is_never_built() {
    let tmp = tempfile::TempDir::new().unwrap();
    let builder = RecordingBuilder::new();
    let model = ScriptedModel::new(vec![
        Step::write_file("src/App.jsx", "partial"),
        Step::Fail("tool loop exceeded".into()),
    ]);
    let pipeline = pipeline(tmp.path(), model, builder.clone());

    let (events, outcome) = pipeline
        .generate_streaming(subject(23), ArtifactType::Scaffold, "a react app")
        .unwrap()
        .collect_all()
        .await;

    assert_eq!(events.last(), Some(&OutwardEvent::error("tool loop exceeded")));
    assert!(matches!(outcome, StreamOutcome::Failed(_)));
    assert!(builder.wait_for_calls(1, Duration::from_millis(200)).await.is_empty());
}

#[tokio::test]
async fn blocking_scaffold_failure_is_stream_error() {
    let tmp = tempfile::TempDir::new().unwrap();
    let builder = RecordingBuilder::new();
    let model = ScriptedModel::new(vec![Step::Fail("quota".into())]);
    let pipeline = pipeline(tmp.path(), model, builder.clone());

    let err = pipeline
        .generate(subject(24), ArtifactType::Scaffold, "a react app")
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::StreamFailed(ref m) if m == "quota"));
    assert!(builder.calls().is_empty());
    assert!(!tmp.path().join("scaffold_24").exists());
}

#[tokio::test]
async fn failed_streaming_scaffold_creates_no_directory() {
    let tmp = tempfile::TempDir::new().unwrap();
    let builder = RecordingBuilder::new();
    let model = ScriptedModel::new(vec![
        Step::text("Let me think."),
        Step::Fail("rate limited".into()),
    ]);
    let pipeline = pipeline(tmp.path(), model, builder.clone());

    let (events, outcome) = pipeline
        .generate_streaming(subject(28), ArtifactType::Scaffold, "a react app")
        .unwrap()
        .collect_all()
        .await;

    assert_eq!(events.last(), Some(&OutwardEvent::error("rate limited")));
    assert!(matches!(outcome, StreamOutcome::Failed(_)));
    assert!(!tmp.path().join("scaffold_28").exists());
}

#[tokio::test]
async fn scaffold_cancelled_before_any_write_creates_no_directory() {
    let tmp = tempfile::TempDir::new().unwrap();
    let builder = RecordingBuilder::new();
    let gate = Arc::new(tokio::sync::Notify::new());
    let model = ScriptedModel::new(vec![
        Step::text("Planning the layout."),
        Step::Gate(Arc::clone(&gate)),
        Step::write_file("index.html", "<div id=root></div>"),
        Step::Complete,
    ]);
    let pipeline = pipeline(tmp.path(), model, builder.clone());

    let mut stream = pipeline
        .generate_streaming(subject(29), ArtifactType::Scaffold, "an app")
        .unwrap();
    assert!(matches!(stream.recv().await, Some(OutwardEvent::AiResponse { .. })));

    let outcome = stream.cancel().await.unwrap();
    gate.notify_one();

    assert!(matches!(outcome, StreamOutcome::Cancelled));
    assert!(builder.calls().is_empty());
    assert!(!tmp.path().join("scaffold_29").exists());
}

#[tokio::test]
async fn completed_scaffold_without_writes_still_gets_a_directory() {
    let tmp = tempfile::TempDir::new().unwrap();
    let builder = RecordingBuilder::new();
    let model = ScriptedModel::new(vec![Step::text("Nothing to do."), Step::Complete]);
    let pipeline = pipeline(tmp.path(), model, builder.clone());

    let generated = pipeline
        .generate(subject(30), ArtifactType::Scaffold, "an app")
        .await
        .unwrap();

    let project = tmp.path().join("scaffold_30");
    assert!(project.is_dir());
    assert_eq!(generated.directory, project);
    assert_eq!(builder.wait_for_calls(1, WAIT).await, vec![project]);
}

#[tokio::test]
async fn cancelled_scaffold_is_left_unbuilt() {
    let tmp = tempfile::TempDir::new().unwrap();
    let builder = RecordingBuilder::new();
    let gate = Arc::new(tokio::sync::Notify::new());
    let model = ScriptedModel::new(vec![
        Step::write_file("index.html", "<div id=root></div>"),
        Step::Gate(Arc::clone(&gate)),
        Step::Complete,
    ]);
    let pipeline = pipeline(tmp.path(), model, builder.clone());

    let mut stream = pipeline
        .generate_streaming(subject(25), ArtifactType::Scaffold, "an app")
        .unwrap();
    while let Some(event) = stream.recv().await {
        if matches!(event, OutwardEvent::ToolExecuted { .. }) {
            break;
        }
    }

    let outcome = stream.cancel().await.unwrap();
    gate.notify_one();

    assert!(matches!(outcome, StreamOutcome::Cancelled));
    assert!(builder.calls().is_empty());
    assert_eq!(list_files(&tmp.path().join("scaffold_25")), vec!["index.html"]);
}

#[tokio::test]
async fn tool_errors_are_reported_to_the_agent() {
    let tmp = tempfile::TempDir::new().unwrap();
    let builder = RecordingBuilder::new();
    let model = ScriptedModel::new(vec![
        Step::Tool {
            name: "deleteFile".into(),
            arguments: r#"{"relativeFilePath":"package.json"}"#.into(),
        },
        Step::write_file("../escape.js", "nope"),
        Step::Complete,
    ]);
    let pipeline = pipeline(tmp.path(), model, builder.clone());

    let (events, outcome) = pipeline
        .generate_streaming(subject(26), ArtifactType::Scaffold, "an app")
        .unwrap()
        .collect_all()
        .await;

    let results: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            OutwardEvent::ToolExecuted { result, .. } => Some(result.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.starts_with("Error: ")));
    assert!(outcome.is_completed());
    assert!(!tmp.path().join("escape.js").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn real_builder_rejects_project_without_manifest() {
    let tmp = tempfile::TempDir::new().unwrap();
    let project_builder = Arc::new(ProjectBuilder::new(
        BuildConfig::default()
            .with_install_command(["true"])
            .with_build_command(["true"]),
    ));
    let pipeline = Pipeline::builder(PipelineConfig::default().with_output_root(tmp.path()))
        .provider(ScriptedProvider::new(ScriptedModel::new(scaffold_steps())))
        .project_builder(project_builder)
        .build()
        .unwrap();

    let generated = pipeline
        .generate(subject(27), ArtifactType::Scaffold, "a react app")
        .await
        .unwrap();
    let result = generated.build.unwrap().wait().await;

    assert_eq!(result, BuildResult::failure("missing package.json"));
    assert!(!generated.directory.join("dist").exists());
}
