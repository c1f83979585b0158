use crate::config::LabConfig;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request, Workspace};
use log::info;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|w| w.path.to_string_lossy().to_string()),
            "session": state.session.state_name(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match select_workspace(state, &path) {
        Ok(()) => {
            let cfg = state.workspace.as_ref().map(|w| &w.config);
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "experimentTitle": cfg.map(|c| c.experiment_title.clone()),
                    "templateId": cfg.and_then(|c| c.template_id.clone()),
                }),
            )
        }
        Err(e) => err(&req.id, "workspace_open_failed", format!("{e:#}"), None),
    }
}

/// Opens (creating if needed) the workspace database and reads its config.
/// Switching workspaces always ends the current session.
pub fn select_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    // Only a connectivity check; requests open their own connection.
    drop(db::open_db(path)?);
    let config = LabConfig::load(path)?;
    state.session.logout();
    state.workspace = Some(Workspace {
        path: path.to_path_buf(),
        config,
    });
    info!("workspace selected: {}", path.to_string_lossy());
    Ok(())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
