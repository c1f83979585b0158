use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar(workspace_env: Option<&PathBuf>) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_labreportd");
    let mut cmd = Command::new(exe);
    match workspace_env {
        Some(p) => cmd.env("LABREPORT_WORKSPACE", p),
        None => cmd.env_remove("LABREPORT_WORKSPACE"),
    };
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn labreportd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "expected failure: {}", value);
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn workspace_from_environment_uses_configured_title() {
    let workspace = temp_dir("labreport-config-env");
    std::fs::write(
        workspace.join("labreport.json"),
        r#"{"experimentTitle":"Acid-Base Titration"}"#,
    )
    .expect("write config");

    let (mut child, mut stdin, mut reader) = spawn_sidecar(Some(&workspace));
    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(
        health["workspacePath"],
        json!(workspace.to_string_lossy().to_string())
    );

    let login = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "session.login",
        json!({ "studentId": "S001", "password": "pw1" }),
    );
    assert_eq!(login["report"]["title"], json!("Acid-Base Titration"));
    assert!(workspace.join("labreport.sqlite3").is_file());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn invalid_config_keeps_workspace_unselected() {
    let workspace = temp_dir("labreport-config-invalid");
    std::fs::write(workspace.join("labreport.json"), "{ nope").expect("write config");

    let (mut child, mut stdin, mut reader) = spawn_sidecar(None);
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "workspace_open_failed");

    let missing = request(&mut stdin, &mut reader, "2", "workspace.select", json!({}));
    assert_eq!(error_code(&missing), "bad_params");

    let health = request_ok(&mut stdin, &mut reader, "3", "health", json!({}));
    assert_eq!(health["workspacePath"], serde_json::Value::Null);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn selecting_a_workspace_ends_the_session() {
    let first = temp_dir("labreport-config-switch-a");
    let second = temp_dir("labreport-config-switch-b");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(Some(&first));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "session.login",
        json!({ "studentId": "S001", "password": "pw1" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": second.to_string_lossy() }),
    );
    let status = request_ok(&mut stdin, &mut reader, "3", "session.status", json!({}));
    assert_eq!(status["state"], json!("loggedOut"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(first);
    let _ = std::fs::remove_dir_all(second);
}
