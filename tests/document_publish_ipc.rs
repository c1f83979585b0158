use serde_json::json;
use std::io::{BufRead, BufReader, Read, Write};
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_labreportd");
    let mut child = Command::new(exe)
        .env_remove("LABREPORT_WORKSPACE")
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

const TEMPLATE: &str = "학번: {{학번}}\n이름: {{이름}}\n{{실험제목}}\n\n{{측정결과_표}}\n\n분석: {{결과분석}}\n결론: {{결론}}\n";

#[test]
fn create_publish_and_export_report_document() {
    let workspace = temp_dir("labreport-document-publish");
    std::fs::write(
        workspace.join("labreport.json"),
        r#"{"templateId":"lab-tpl","writerIdentity":"writer@lab","documentLinkBase":"https://docs.example/d/"}"#,
    )
    .expect("write config");
    let template_path = workspace.join("titration.txt");
    std::fs::write(&template_path, TEMPLATE).expect("write template");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["templateId"], json!("lab-tpl"));

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "templates.import",
        json!({ "templateId": "lab-tpl", "path": template_path.to_string_lossy() }),
    );
    assert_eq!(imported["title"], json!("titration"));
    assert_eq!(imported["sharedWith"], json!(["writer@lab"]));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "session.login",
        json!({ "studentId": "S001", "password": "pw1" }),
    );
    let no_doc = request(&mut stdin, &mut reader, "4", "document.publish", json!({}));
    assert_eq!(error_code(&no_doc), "no_document");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "report.update",
        json!({ "patch": {
            "name": "Kim",
            "title": "Acid-Base Titration",
            "analysis": "NaOH 0.1M",
            "conclusion": "중화점 확인"
        } }),
    );

    let created = request_ok(&mut stdin, &mut reader, "6", "document.create", json!({}));
    let doc_id = created["docId"].as_str().expect("docId").to_string();
    assert_eq!(
        created["documentLink"],
        json!(format!("https://docs.example/d/{}", doc_id))
    );

    let again = request(&mut stdin, &mut reader, "7", "document.create", json!({}));
    assert_eq!(error_code(&again), "document_exists");

    let published = request_ok(&mut stdin, &mut reader, "8", "document.publish", json!({}));
    let replacements = published["replacements"].as_array().expect("replacements");
    assert_eq!(replacements.len(), 6);
    assert!(replacements.iter().all(|r| r["occurrences"] == json!(1)));

    let republished = request_ok(&mut stdin, &mut reader, "9", "document.publish", json!({}));
    assert!(republished["replacements"]
        .as_array()
        .expect("replacements")
        .iter()
        .all(|r| r["occurrences"] == json!(0)));

    let txt_path = workspace.join("out").join("report.txt");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "document.export",
        json!({ "path": txt_path.to_string_lossy() }),
    );
    assert_eq!(exported["format"], json!("text"));
    let body = std::fs::read_to_string(&txt_path).expect("read export");
    assert!(body.starts_with("학번: S001\n이름: Kim\nAcid-Base Titration\n"));
    assert!(body.contains("average"));
    assert!(body.contains("분석: NaOH 0.1M"));
    assert!(body.contains("결론: 중화점 확인"));
    assert!(!body.contains("{{"));

    let odt_path = workspace.join("out").join("report.odt");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "document.export",
        json!({ "path": odt_path.to_string_lossy() }),
    );
    assert_eq!(exported["format"], json!("odt"));
    let mut archive =
        zip::ZipArchive::new(std::fs::File::open(&odt_path).expect("open odt")).expect("zip");
    let mut content = String::new();
    archive
        .by_name("content.xml")
        .expect("content.xml")
        .read_to_string(&mut content)
        .expect("read content");
    assert!(content.contains("<text:p>이름: Kim</text:p>"));
    assert_eq!(exported["templateId"], json!("lab-tpl"));

    // A regular file where the output directory should be.
    let blocked = workspace.join("out").join("report.txt").join("nested.txt");
    let failed = request(
        &mut stdin,
        &mut reader,
        "11b",
        "document.export",
        json!({ "path": blocked.to_string_lossy() }),
    );
    assert_eq!(error_code(&failed), "export_failed");
    assert_eq!(
        failed["error"]["details"]["path"],
        json!(blocked.to_string_lossy())
    );

    // The stored record keeps the document id across logins.
    let _ = request_ok(&mut stdin, &mut reader, "12", "session.logout", json!({}));
    let login = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "session.login",
        json!({ "studentId": "S001", "password": "pw1" }),
    );
    assert_eq!(login["report"]["docId"], json!(doc_id));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn inaccessible_template_reports_sharing_hint() {
    let workspace = temp_dir("labreport-document-template-error");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "templates.import",
        json!({ "templateId": "private", "body": "{{이름}}", "sharedWith": ["someone@else"] }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "session.login",
        json!({ "studentId": "S002", "password": "pw" }),
    );

    let unconfigured = request(&mut stdin, &mut reader, "4", "document.create", json!({}));
    assert_eq!(error_code(&unconfigured), "bad_params");

    for (id, template) in [("5", "missing"), ("6", "private")] {
        let resp = request(
            &mut stdin,
            &mut reader,
            id,
            "document.create",
            json!({ "templateId": template }),
        );
        assert_eq!(error_code(&resp), "template_copy_failed");
        let message = resp["error"]["message"].as_str().unwrap_or("");
        assert!(message.contains("shared with 'labreportd' as an editor"), "{}", message);
        assert_eq!(resp["error"]["details"]["templateId"], json!(template));
    }

    let listed = request_ok(&mut stdin, &mut reader, "7", "templates.list", json!({}));
    assert_eq!(listed["templates"][0]["id"], json!("private"));
    assert_eq!(listed["templates"][0]["sharedWith"], json!(["someone@else"]));

    let report = request_ok(&mut stdin, &mut reader, "8", "report.get", json!({}));
    assert_eq!(report["report"]["docId"], serde_json::Value::Null);

    let conn = rusqlite::Connection::open(workspace.join("labreport.sqlite3")).expect("open db");
    let docs: i64 = conn
        .query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))
        .expect("count");
    assert_eq!(docs, 0);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
