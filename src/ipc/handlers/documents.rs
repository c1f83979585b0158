use crate::document::{export_document, DocumentService};
use crate::error::{LabError, Result};
use crate::ipc::error::respond;
use crate::ipc::helpers::{self, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

/// Operator-side setup: stores a template and the identities it is shared
/// with. The body comes from `path` (a UTF-8 text file) or inline `body`.
fn handle_templates_import(state: &mut AppState, req: &Request) -> Result<serde_json::Value> {
    let ws = helpers::workspace(&state.workspace)?;

    let path = optional_str(req, "path").map(PathBuf::from);
    let body = match (&path, req.params.get("body").and_then(|v| v.as_str())) {
        (Some(p), _) => std::fs::read_to_string(p).map_err(|e| {
            LabError::InvalidInput(format!("failed to read {}: {}", p.to_string_lossy(), e))
        })?,
        (None, Some(b)) => b.to_string(),
        (None, None) => {
            return Err(LabError::InvalidInput(
                "missing params.path or params.body".into(),
            ))
        }
    };

    let template_id = optional_str(req, "templateId")
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let title = optional_str(req, "title")
        .map(str::to_string)
        .or_else(|| {
            path.as_ref()
                .and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().to_string())
        })
        .unwrap_or_else(|| template_id.clone());

    let shared_with: Vec<String> = match req.params.get("sharedWith") {
        None | Some(serde_json::Value::Null) => vec![ws.config.writer_identity.clone()],
        Some(v) => serde_json::from_value(v.clone()).map_err(|_| {
            LabError::InvalidInput("sharedWith must be an array of strings".into())
        })?,
    };

    let conn = helpers::connect(ws)?;
    helpers::generator(ws, &conn)
        .service()
        .import_template(&template_id, &title, &body, &shared_with)
        .map_err(|e| LabError::Connection(format!("{e:#}")))?;

    Ok(json!({
        "templateId": template_id,
        "title": title,
        "sharedWith": shared_with,
    }))
}

fn handle_templates_list(state: &mut AppState) -> Result<serde_json::Value> {
    let ws = helpers::workspace(&state.workspace)?;
    let conn = helpers::connect(ws)?;
    let templates = helpers::generator(ws, &conn)
        .service()
        .list_templates()
        .map_err(|e| LabError::Connection(format!("{e:#}")))?;
    Ok(json!({ "templates": templates }))
}

fn handle_document_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value> {
    let ws = helpers::workspace(&state.workspace)?;
    state.session.active()?;
    let template_id = optional_str(req, "templateId")
        .map(str::to_string)
        .or_else(|| ws.config.template_id.clone())
        .ok_or_else(|| {
            LabError::InvalidInput("no templateId given and none configured".into())
        })?;

    let conn = helpers::connect(ws)?;
    let repo = helpers::repository(ws, &conn);
    let generator = helpers::generator(ws, &conn);
    let doc_id = state
        .session
        .create_document(&repo, &generator, &template_id)?;

    Ok(json!({
        "docId": doc_id,
        "documentLink": ws.config.document_link(&doc_id),
    }))
}

fn handle_document_publish(state: &mut AppState) -> Result<serde_json::Value> {
    let ws = helpers::workspace(&state.workspace)?;
    state.session.active()?;
    let conn = helpers::connect(ws)?;
    let generator = helpers::generator(ws, &conn);
    let replacements = state.session.publish(&generator)?;
    Ok(json!({ "replacements": replacements }))
}

fn handle_document_export(state: &mut AppState, req: &Request) -> Result<serde_json::Value> {
    let ws = helpers::workspace(&state.workspace)?;
    let out_path = PathBuf::from(required_str(req, "path")?);
    let active = state.session.active()?;
    let Some(doc_id) = active.record.doc_id.as_deref() else {
        return Err(LabError::NoDocument);
    };

    let conn = helpers::connect(ws)?;
    let doc = helpers::generator(ws, &conn)
        .service()
        .get(doc_id)
        .map_err(|e| LabError::Connection(format!("{e:#}")))?
        .ok_or_else(|| LabError::InvalidInput(format!("document {} no longer exists", doc_id)))?;
    let format = export_document(&doc, &out_path).map_err(|e| LabError::Export {
        path: out_path.to_string_lossy().to_string(),
        reason: format!("{e:#}"),
    })?;

    Ok(json!({
        "path": out_path.to_string_lossy(),
        "title": doc.title,
        "templateId": doc.template_id,
        "format": format.as_str(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "templates.import" => handle_templates_import(state, req),
        "templates.list" => handle_templates_list(state),
        "document.create" => handle_document_create(state, req),
        "document.publish" => handle_document_publish(state),
        "document.export" => handle_document_export(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
