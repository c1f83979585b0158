use crate::error::LabError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Error response for a domain failure. The message is meant to be shown
/// to the user as is.
pub fn fail(id: &str, e: &LabError) -> serde_json::Value {
    let details = match e {
        LabError::TemplateCopy {
            template_id,
            identity,
            ..
        } => Some(json!({ "templateId": template_id, "identity": identity })),
        LabError::Update { document_id, .. } => Some(json!({ "documentId": document_id })),
        LabError::DocumentExists(doc_id) => Some(json!({ "docId": doc_id })),
        LabError::Export { path, .. } => Some(json!({ "path": path })),
        _ => None,
    };
    err(id, e.code(), e.to_string(), details)
}

pub fn respond(id: &str, result: crate::error::Result<serde_json::Value>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => fail(id, &e),
    }
}
