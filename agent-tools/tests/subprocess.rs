#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use agent_tools::{DiscoveryOptions, MAX_OUTPUT_CHARS, ToolOutcome, ToolRegistry, load_tools};
use futures::future::join_all;
use serde_json::{Map, Value, json};
use tempfile::TempDir;

fn options() -> DiscoveryOptions {
    DiscoveryOptions {
        entry_point: "run.sh".into(),
        ..DiscoveryOptions::default()
    }
}

fn install(root: &Path, name: &str, manifest: Value, script: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("tool.json"), manifest.to_string()).unwrap();
    fs::write(dir.join("run.sh"), script).unwrap();
}

fn registry_with(tools: &[(&str, Value, &str)]) -> (TempDir, ToolRegistry) {
    let root = tempfile::tempdir().unwrap();
    for (name, manifest, script) in tools {
        install(root.path(), name, manifest.clone(), script);
    }
    let registry = ToolRegistry::new();
    let report = load_tools(&[root.path().to_path_buf()], &registry, &options());
    assert_eq!(report.count(), tools.len(), "skipped: {:?}", report.skipped);
    (root, registry)
}

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[tokio::test]
async fn success_returns_trimmed_stdout_and_drops_stderr() {
    let (_root, registry) = registry_with(&[(
        "greet",
        json!({"name": "greet"}),
        "echo 'diagnostic noise' >&2\nprintf '  hello there  \\n\\n'\n",
    )]);

    let outcome = registry.execute("greet", &Map::new()).await.unwrap();
    assert_eq!(outcome, ToolOutcome::Success("hello there".into()));
}

#[tokio::test]
async fn arguments_arrive_as_one_json_value() {
    let (_root, registry) = registry_with(&[(
        "echo",
        json!({"name": "echo"}),
        "printf '%s' \"$1\"\n",
    )]);

    let payload = args(json!({"text": "$(rm -rf /); `id` ünïcode", "n": 3}));
    let outcome = registry.execute("echo", &payload).await.unwrap();

    let ToolOutcome::Success(text) = outcome else {
        panic!("expected success");
    };
    let echoed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(echoed, Value::Object(payload));
}

#[tokio::test]
async fn runs_inside_the_bundle_directory() {
    let root = tempfile::tempdir().unwrap();
    install(
        root.path(),
        "reader",
        json!({"name": "reader"}),
        "cat data.txt\n",
    );
    fs::write(root.path().join("reader/data.txt"), "bundled resource\n").unwrap();

    let registry = ToolRegistry::new();
    load_tools(&[root.path().to_path_buf()], &registry, &options());

    let outcome = registry.execute("reader", &Map::new()).await.unwrap();
    assert_eq!(outcome, ToolOutcome::Success("bundled resource".into()));
}

#[tokio::test]
async fn empty_output_is_no_output() {
    let (_root, registry) = registry_with(&[("quiet", json!({"name": "quiet"}), "exit 0\n")]);

    let outcome = registry.execute("quiet", &Map::new()).await.unwrap();
    assert_eq!(outcome, ToolOutcome::NoOutput);
    assert_eq!(outcome.to_text(), "(no output)");
}

#[tokio::test]
async fn oversized_output_is_truncated_with_exact_count() {
    let (_root, registry) = registry_with(&[(
        "flood",
        json!({"name": "flood"}),
        "head -c 10250 /dev/zero | tr '\\0' 'a'\n",
    )]);

    let outcome = registry.execute("flood", &Map::new()).await.unwrap();
    let expected = format!(
        "{}\n... (truncated, 250 more chars)",
        "a".repeat(MAX_OUTPUT_CHARS)
    );
    assert_eq!(outcome, ToolOutcome::Success(expected));
}

#[tokio::test]
async fn non_zero_exit_reports_code_and_stderr() {
    let (_root, registry) = registry_with(&[
        (
            "broken",
            json!({"name": "broken"}),
            "echo partial\necho 'something broke' >&2\nexit 3\n",
        ),
        ("silent-fail", json!({"name": "silent-fail"}), "exit 4\n"),
    ]);

    let outcome = registry.execute("broken", &Map::new()).await.unwrap();
    assert_eq!(
        outcome,
        ToolOutcome::Failed {
            exit_code: Some(3),
            stderr: "something broke".into(),
        }
    );
    assert_eq!(outcome.to_text(), "Error (exit 3): something broke");

    let outcome = registry.execute("silent-fail", &Map::new()).await.unwrap();
    assert_eq!(outcome.to_text(), "Error (exit 4)");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn timeout_kills_the_process() {
    let (root, registry) = registry_with(&[(
        "sleepy",
        json!({"name": "sleepy", "timeout": 0.5}),
        "echo $$ > pid\nexec sleep 30\n",
    )]);

    let started = Instant::now();
    let outcome = registry.execute("sleepy", &Map::new()).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(
        outcome,
        ToolOutcome::TimedOut {
            tool: "sleepy".into(),
            timeout: Duration::from_millis(500),
        }
    );
    assert_eq!(outcome.to_text(), "Error: Tool 'sleepy' timed out after 0.5s");

    let pid = fs::read_to_string(root.path().join("sleepy/pid")).unwrap();
    let proc_entry = Path::new("/proc").join(pid.trim());
    assert!(!proc_entry.exists(), "tool process {} still running", pid.trim());
}

/// Waits briefly for `pid` to disappear. A zombie awaiting its reaper counts
/// as gone.
#[cfg(target_os = "linux")]
async fn process_gone(pid: &str) -> bool {
    let stat = Path::new("/proc").join(pid.trim()).join("stat");
    for _ in 0..100 {
        let Ok(stat) = fs::read_to_string(&stat) else {
            return true;
        };
        let state = stat.rsplit(')').next().unwrap_or_default().trim_start();
        if state.starts_with('Z') {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn timeout_kills_forked_children() {
    let (root, registry) = registry_with(&[(
        "spawner",
        json!({"name": "spawner", "timeout": 0.5}),
        "sleep 30 &\necho $! > child.pid\nwait\n",
    )]);

    let outcome = registry.execute("spawner", &Map::new()).await.unwrap();
    assert!(matches!(outcome, ToolOutcome::TimedOut { .. }), "{outcome:?}");

    let pid = fs::read_to_string(root.path().join("spawner/child.pid")).unwrap();
    assert!(process_gone(&pid).await, "forked process {} survived the call", pid.trim());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn background_child_does_not_hold_the_result() {
    let (root, registry) = registry_with(&[(
        "detached",
        json!({"name": "detached", "timeout": 3}),
        "sleep 5 &\necho $! > child.pid\necho done\nexit 0\n",
    )]);

    let started = Instant::now();
    let outcome = registry.execute("detached", &Map::new()).await.unwrap();
    assert_eq!(outcome, ToolOutcome::Success("done".into()));
    assert!(started.elapsed() < Duration::from_secs(2));

    let pid = fs::read_to_string(root.path().join("detached/child.pid")).unwrap();
    assert!(process_gone(&pid).await, "background process {} survived the call", pid.trim());
}

#[tokio::test]
async fn unspawnable_entry_point_is_execution_error() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("plain");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("tool.json"), json!({"name": "plain"}).to_string()).unwrap();
    // No extension and no execute bit: there is nothing to run it with.
    fs::write(dir.join("run"), "echo unreachable\n").unwrap();

    let registry = ToolRegistry::new();
    let report = load_tools(
        &[root.path().to_path_buf()],
        &registry,
        &DiscoveryOptions {
            entry_point: "run".into(),
            ..DiscoveryOptions::default()
        },
    );
    assert_eq!(report.registered, ["plain"]);

    let outcome = registry.execute("plain", &Map::new()).await.unwrap();
    assert!(matches!(outcome, ToolOutcome::ExecutionError { .. }), "{outcome:?}");
    let text = outcome.to_text();
    assert!(text.starts_with("Error executing tool 'plain': "), "{text}");
    assert!(!outcome.is_success());
}

#[tokio::test]
async fn concurrent_invocations_are_independent() {
    let (_root, registry) = registry_with(&[(
        "id",
        json!({"name": "id"}),
        "sleep 0.2\nprintf '%s' \"$1\"\n",
    )]);

    let calls = (0..4).map(|n| {
        let registry = &registry;
        async move {
            let outcome = registry
                .execute("id", &args(json!({"n": n})))
                .await
                .unwrap();
            (n, outcome)
        }
    });

    for (n, outcome) in join_all(calls).await {
        assert_eq!(outcome, ToolOutcome::Success(format!("{{\"n\":{n}}}")));
    }
}
