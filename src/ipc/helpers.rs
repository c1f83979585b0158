use crate::db;
use crate::document::{DocumentGenerator, SqliteDocuments};
use crate::error::{LabError, Result};
use crate::ipc::types::{Request, Workspace};
use crate::repository::{Repository, SqliteTable};
use crate::session::ActiveReport;
use rusqlite::Connection;
use serde_json::json;

pub fn workspace(selected: &Option<Workspace>) -> Result<&Workspace> {
    selected.as_ref().ok_or(LabError::NoWorkspace)
}

/// Opens the workspace database for the current request only.
pub fn connect(ws: &Workspace) -> Result<Connection> {
    db::open_db(&ws.path).map_err(|e| LabError::Connection(format!("{e:#}")))
}

pub fn required_str<'r>(req: &'r Request, key: &str) -> Result<&'r str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| LabError::InvalidInput(format!("missing params.{}", key)))
}

pub fn optional_str<'r>(req: &'r Request, key: &str) -> Option<&'r str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// What the form shows. The password hash never leaves the process.
pub fn report_view(ws: &Workspace, active: &ActiveReport) -> serde_json::Value {
    let r = &active.record;
    json!({
        "studentId": active.student_id,
        "title": r.title,
        "name": r.name,
        "measurements": r.measurements,
        "analysis": r.analysis,
        "conclusion": r.conclusion,
        "docId": r.doc_id,
        "documentLink": r.doc_id.as_deref().map(|id| ws.config.document_link(id)),
    })
}

pub fn repository<'c>(ws: &Workspace, conn: &'c Connection) -> Repository<SqliteTable<'c>> {
    Repository::new(SqliteTable::new(conn), ws.config.experiment_title.clone())
}

pub fn generator<'c>(ws: &Workspace, conn: &'c Connection) -> DocumentGenerator<SqliteDocuments<'c>> {
    DocumentGenerator::new(SqliteDocuments::new(conn), ws.config.writer_identity.clone())
}
