//! End-to-end runs of the healing loop against a scripted agent

mod helpers;

use healing_pipeline::core::RunStatus;
use healing_pipeline::execution::ExecutionEvent;
use helpers::*;
use std::fs;
use std::time::Duration;

const FILE_MARKER: &str = r#"
name: "heal-by-writing"
max_iterations: 5
markers:
  - id: "fixed"
    name: "Fix applied"
    kind: file_exists
    source: "fixed.txt"
    target: "true"
"#;

#[tokio::test]
async fn test_agent_fix_makes_next_iteration_pass() {
    let dir = tempfile::tempdir().unwrap();
    let agent = MockAgent::new(vec!["Created fixed.txt."]).with_fix(0, |root| {
        fs::write(root.join("fixed.txt"), "ok").unwrap();
    });
    let prompts = agent.prompts();
    let (engine, log) = engine_with_log(agent);

    let session = engine.run(&pipeline_at(FILE_MARKER, dir.path())).await;

    assert_eq!(session.status, RunStatus::Succeeded);
    assert_eq!(pass_counts(&session), vec![0, 1]);
    assert_eq!(session.iterations[0].changes, vec!["Write: fixed"]);
    assert_eq!(session.iterations[0].analysis, "Created fixed.txt.");
    assert!(session.iterations[1].analysis.is_empty());
    assert_eq!(prompts.lock().unwrap().len(), 1);
    assert_eq!(session.transcript.len(), 1);

    let events = log.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::AgentActivity { message, .. } if message.contains("tool Write fixed"))));
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::RunFinished {
            status: RunStatus::Succeeded,
            ..
        })
    ));
}

#[tokio::test]
async fn test_unhelpful_agent_exhausts_iteration_cap() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, log) = engine_with_log(MockAgent::new(vec!["I could not find the problem."]));

    let mut pipeline = pipeline_at(FILE_MARKER, dir.path());
    pipeline.max_iterations = 3;
    let session = engine.run(&pipeline).await;

    assert_eq!(session.status, RunStatus::Failed);
    assert_eq!(session.iterations.len(), 3);
    assert_eq!(session.transcript.len(), 2);
    assert!(session.error.is_none());

    let healings = log
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::HealingStarted { .. }))
        .count();
    assert_eq!(healings, 2);
}

#[tokio::test]
async fn test_declining_pass_counts_abort_as_regression() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    let yaml = r#"
name: "regressing"
max_iterations: 10
markers:
  - { id: "a", name: "A exists", kind: file_exists, source: "a.txt", target: "true" }
  - { id: "b", name: "B exists", kind: file_exists, source: "b.txt", target: "true" }
  - { id: "c", name: "C exists", kind: file_exists, source: "c.txt", target: "true" }
  - { id: "d", name: "D exists", kind: file_exists, source: "d.txt", target: "true" }
"#;

    // Each healing round deletes one of the files that was passing
    let agent = MockAgent::new(vec!["Cleaning up."])
        .with_fix(0, |root| fs::remove_file(root.join("a.txt")).unwrap())
        .with_fix(1, |root| fs::remove_file(root.join("b.txt")).unwrap())
        .with_fix(2, |root| fs::remove_file(root.join("c.txt")).unwrap());
    let prompts = agent.prompts();
    let (engine, log) = engine_with_log(agent);

    let session = engine.run(&pipeline_at(yaml, dir.path())).await;

    assert_eq!(session.status, RunStatus::Aborted);
    assert_eq!(pass_counts(&session), vec![3, 2, 1, 0]);
    assert_eq!(prompts.lock().unwrap().len(), 3);
    assert!(session.error.as_deref().unwrap().contains("Regression detected"));

    let events = log.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        ExecutionEvent::RegressionDetected { iteration: 4, pass_counts } if pass_counts == &vec![3, 2, 1, 0]
    )));
}

#[cfg(unix)]
#[tokio::test]
async fn test_iteration_placeholder_reaches_commands() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
name: "counter"
max_iterations: 5
variables:
  greeting: "hello"
steps:
  - id: "say"
    name: "Say"
    command: "echo {{greeting}}-{{iteration}}"
    output_key: "say"
markers:
  - id: "second"
    name: "Reached second iteration"
    kind: regex
    source: "say:hello-(\\d+)"
    operator: greater_or_equal
    target: "2"
"#;

    let (engine, _log) = engine_with_log(MockAgent::new(vec!["Try again."]));
    let session = engine.run(&pipeline_at(yaml, dir.path())).await;

    assert_eq!(session.status, RunStatus::Succeeded);
    assert_eq!(session.iterations.len(), 2);
    assert_eq!(session.iterations[0].step_results[0].command, "echo hello-1");
    assert_eq!(session.iterations[1].marker_results[0].actual, "2");
}

#[cfg(unix)]
#[tokio::test]
async fn test_prompt_carries_failure_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
name: "broken-build"
description: "Keep the build green"
max_iterations: 2
steps:
  - id: "build"
    name: "Build"
    command: "echo 'error: missing semicolon at main.c:3' >&2; exit 2"
    output_key: "build"
markers:
  - id: "build-ok"
    name: "Build succeeds"
    kind: exit_code
    source: "build"
    target: "0"
file_access:
  - { pattern: "src/**", access: editable }
  - { pattern: "secrets/**", access: excluded }
healing_context: "Project {{pipeline_name}} at iteration {{iteration}}."
"#;

    let agent = MockAgent::new(vec!["Added the semicolon."]);
    let prompts = agent.prompts();
    let (engine, _log) = engine_with_log(agent);
    let session = engine.run(&pipeline_at(yaml, dir.path())).await;
    assert_eq!(session.status, RunStatus::Failed);

    let prompts = prompts.lock().unwrap();
    let prompt = &prompts[0];
    assert!(prompt.contains("broken-build"));
    assert!(prompt.contains("Keep the build green"));
    assert!(prompt.contains("[FAIL] Build succeeds: actual=2 expected == 0"));
    assert!(prompt.contains("missing semicolon at main.c:3"));
    assert!(prompt.contains("src/**"));
    assert!(prompt.contains("secrets/**"));
    assert!(prompt.contains("Project broken-build at iteration 1."));
}

#[tokio::test]
async fn test_pause_holds_run_until_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let agent = MockAgent::new(vec!["Created fixed.txt."]).with_fix(0, |root| {
        fs::write(root.join("fixed.txt"), "ok").unwrap();
    });
    let (engine, log) = engine_with_log(agent);
    let handle = engine.handle();
    let pipeline = pipeline_at(FILE_MARKER, dir.path());

    let observer = log.clone();
    let controller = handle.clone();
    let control = async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let started = observer
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, ExecutionEvent::IterationStarted { .. }));
        assert!(!started, "paused run must not start an iteration");
        controller.resume();
    };

    handle.pause();
    let (session, ()) = tokio::join!(engine.run(&pipeline), control);

    assert_eq!(session.status, RunStatus::Succeeded);
    assert!(!handle.is_paused());
    let events = log.lock().unwrap();
    let resumed = events
        .iter()
        .position(|e| matches!(e, ExecutionEvent::Resumed))
        .unwrap();
    let first_iteration = events
        .iter()
        .position(|e| matches!(e, ExecutionEvent::IterationStarted { .. }))
        .unwrap();
    assert!(resumed < first_iteration);
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancel_kills_running_step() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
name: "slow"
steps:
  - id: "wait"
    name: "Wait"
    command: "sleep 30"
    output_key: "wait"
markers:
  - { id: "done", name: "Done", kind: exit_code, source: "wait", target: "0" }
"#;

    let (engine, _log) = engine_with_log(MockAgent::new(vec!["unused"]));
    let handle = engine.handle();
    let pipeline = pipeline_at(yaml, dir.path());

    let control = async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.cancel();
    };

    let started = std::time::Instant::now();
    let (session, ()) = tokio::join!(engine.run(&pipeline), control);

    assert_eq!(session.status, RunStatus::Aborted);
    assert!(session.iterations.is_empty());
    assert!(session.transcript.is_empty());
    assert!(started.elapsed() < Duration::from_secs(10));
}
