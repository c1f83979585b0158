use std::path::PathBuf;

use crate::config::LabConfig;
use crate::session::Session;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct Workspace {
    pub path: PathBuf,
    pub config: LabConfig,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<Workspace>,
    pub session: Session,
}
