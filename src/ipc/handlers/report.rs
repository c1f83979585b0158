use crate::error::{LabError, Result};
use crate::ipc::error::respond;
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::record::ReportPatch;
use log::info;
use serde_json::json;

fn handle_get(state: &mut AppState) -> Result<serde_json::Value> {
    let ws = helpers::workspace(&state.workspace)?;
    let active = state.session.active()?;
    Ok(json!({ "report": helpers::report_view(ws, active) }))
}

/// Applies form input to the in-memory record. Nothing is written until
/// `report.save`.
fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value> {
    let ws = helpers::workspace(&state.workspace)?;
    let Some(raw) = req.params.get("patch") else {
        return Err(LabError::InvalidInput("missing params.patch".into()));
    };
    let patch: ReportPatch = serde_json::from_value(raw.clone())
        .map_err(|e| LabError::InvalidInput(format!("invalid patch: {}", e)))?;

    state.session.edit(patch)?;
    let active = state.session.active()?;
    Ok(json!({ "report": helpers::report_view(ws, active) }))
}

fn handle_save(state: &mut AppState) -> Result<serde_json::Value> {
    let ws = helpers::workspace(&state.workspace)?;
    // Fail fast before touching the store.
    let active = state.session.active()?;
    let conn = helpers::connect(ws)?;
    let repo = helpers::repository(ws, &conn);

    let outcome = state.session.save(&repo)?;
    info!("report saved for {} ({})", active.student_id, outcome.as_str());
    Ok(json!({ "saved": outcome.as_str(), "row": outcome.row() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "report.get" => handle_get(state),
        "report.update" => handle_update(state, req),
        "report.save" => handle_save(state),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
