//! Subprocess client against a fake agent speaking stream-json
#![cfg(unix)]

use healing_pipeline::agent::{AgentClientConfig, AgentError, AgentEvent, AgentExecutor, FileChange, SubprocessClient};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Write an executable shell script standing in for the agent CLI
fn fake_agent(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-agent.sh");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn client(script: &Path, timeout_secs: u64) -> SubprocessClient {
    SubprocessClient::new(
        AgentClientConfig::new()
            .with_executable(script.display().to_string())
            .with_timeout(timeout_secs),
    )
}

const SCRIPTED_SESSION: &str = r#"
cat > "$(dirname "$0")/prompt.txt"
echo "$@" > "$(dirname "$0")/args.txt"
echo '{"type":"system","subtype":"init"}'
echo '{"type":"assistant","message":{"content":[{"type":"text","text":"Looking at the build."},{"type":"tool_use","name":"Edit","input":{"file_path":"src/main.rs"}}]}}'
echo 'warning: not json at all'
echo '{"type":"tool_use","name":"Read","input":{"file_path":"Cargo.toml"}}'
echo '{"type":"assistant","message":{"content":[{"type":"text","text":"Fixed it."}]}}'
echo '{"type":"result","subtype":"success","is_error":false,"result":"Done","total_cost_usd":0.25,"num_turns":3,"duration_ms":1200,"usage":{"input_tokens":100,"output_tokens":50}}'
"#;

#[tokio::test]
async fn test_stream_is_aggregated() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_agent(dir.path(), SCRIPTED_SESSION);
    let agent = client(&script, 30);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback = move |event: &AgentEvent| sink.lock().unwrap().push(event.clone());

    let request = agent.config().request("please fix the build", dir.path());
    let response = agent
        .invoke(&request, Some(&callback), &CancellationToken::new())
        .await
        .unwrap();

    assert!(response.succeeded());
    assert_eq!(response.content, "Looking at the build.\nFixed it.");
    assert_eq!(
        response.changed_files,
        vec![FileChange {
            tool: "Edit".to_string(),
            path: Some("src/main.rs".to_string())
        }]
    );
    let usage = response.usage.unwrap();
    assert_eq!(usage.cost_usd, 0.25);
    assert_eq!(usage.turns, 3);
    assert_eq!(usage.input_tokens, 100);

    // The prompt goes in on stdin, not on the command line
    assert_eq!(fs::read_to_string(dir.path().join("prompt.txt")).unwrap(), "please fix the build");
    let args = fs::read_to_string(dir.path().join("args.txt")).unwrap();
    assert!(args.contains("--output-format stream-json"));
    assert!(args.contains("--allowedTools Read,Edit,Write,Bash,Grep,Glob"));
    assert!(!args.contains("please fix the build"));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 6);
    assert!(matches!(&seen[0], AgentEvent::Other { kind } if kind == "system"));
    assert!(matches!(&seen[2], AgentEvent::Raw { line } if line == "warning: not json at all"));
    assert!(matches!(&seen[5], AgentEvent::Result { .. }));
}

#[tokio::test]
async fn test_nonzero_exit_is_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_agent(
        dir.path(),
        r#"cat > /dev/null
echo '{"type":"result","is_error":true,"result":"out of turns"}'
exit 3"#,
    );
    let agent = client(&script, 30);

    let request = agent.config().request("fix", dir.path());
    let response = agent.invoke(&request, None, &CancellationToken::new()).await.unwrap();

    assert!(!response.succeeded());
    assert!(!response.timed_out);
    assert_eq!(response.exit_code, Some(3));
    assert_eq!(response.content, "out of turns");
}

#[tokio::test]
async fn test_timeout_keeps_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_agent(
        dir.path(),
        r#"cat > /dev/null
echo '{"type":"assistant","message":"Halfway there."}'
sleep 30"#,
    );
    let agent = client(&script, 1);

    let started = Instant::now();
    let request = agent.config().request("fix", dir.path());
    let response = agent.invoke(&request, None, &CancellationToken::new()).await.unwrap();

    assert!(response.timed_out);
    assert_eq!(response.exit_code, None);
    assert_eq!(response.content, "Halfway there.");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_background_child_does_not_hold_the_round_open() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_agent(
        dir.path(),
        r#"cat > /dev/null
echo '{"type":"result","result":"fixed","num_turns":1}'
sleep 20 &
exit 0"#,
    );
    let agent = client(&script, 15);

    let started = Instant::now();
    let request = agent.config().request("fix", dir.path());
    let response = agent.invoke(&request, None, &CancellationToken::new()).await.unwrap();

    assert!(!response.timed_out);
    assert_eq!(response.exit_code, Some(0));
    assert_eq!(response.content, "fixed");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_timeout_keeps_every_buffered_line() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_agent(
        dir.path(),
        r#"cat > /dev/null
i=0
while [ $i -lt 200 ]; do
  echo "{\"type\":\"assistant\",\"message\":\"line $i\"}"
  i=$((i + 1))
done
sleep 30"#,
    );
    let agent = client(&script, 1);

    let seen = Arc::new(Mutex::new(0usize));
    let counter = seen.clone();
    let callback = move |_: &AgentEvent| *counter.lock().unwrap() += 1;

    let request = agent.config().request("fix", dir.path());
    let response = agent
        .invoke(&request, Some(&callback), &CancellationToken::new())
        .await
        .unwrap();

    assert!(response.timed_out);
    assert_eq!(*seen.lock().unwrap(), 200);
    assert_eq!(response.content.lines().count(), 200);
    assert!(response.content.ends_with("line 199"));
}

#[tokio::test]
async fn test_cancel_kills_agent() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_agent(dir.path(), "cat > /dev/null\nsleep 30");
    let agent = client(&script, 60);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let request = agent.config().request("fix", dir.path());
    let result = agent.invoke(&request, None, &cancel).await;

    assert!(matches!(result, Err(AgentError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(10));
}
