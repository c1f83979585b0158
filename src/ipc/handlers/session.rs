use crate::error::Result;
use crate::ipc::error::respond;
use crate::ipc::helpers::{self, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_login(state: &mut AppState, req: &Request) -> Result<serde_json::Value> {
    let student_id = required_str(req, "studentId")?;
    let password = required_str(req, "password")?;
    let ws = helpers::workspace(&state.workspace)?;
    let conn = helpers::connect(ws)?;
    let repo = helpers::repository(ws, &conn);

    let outcome = state.session.login(&repo, student_id, password)?;
    let active = state.session.active()?;
    Ok(json!({
        "outcome": outcome.as_str(),
        "report": helpers::report_view(ws, active),
    }))
}

fn handle_logout(state: &mut AppState) -> Result<serde_json::Value> {
    state.session.logout();
    Ok(json!({ "state": state.session.state_name() }))
}

fn handle_status(state: &mut AppState) -> Result<serde_json::Value> {
    Ok(json!({
        "state": state.session.state_name(),
        "studentId": state.session.student_id(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "session.login" => handle_login(state, req),
        "session.logout" => handle_logout(state),
        "session.status" => handle_status(state),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
