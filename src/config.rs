use crate::record::DEFAULT_EXPERIMENT_TITLE;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "labreport.json";
pub const WORKSPACE_ENV: &str = "LABREPORT_WORKSPACE";

/// Workspace settings read from `labreport.json`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabConfig {
    pub experiment_title: String,
    /// Template used by `document.create` when the request names none.
    pub template_id: Option<String>,
    /// Identity that copies templates and writes to generated documents.
    pub writer_identity: String,
    pub document_link_base: String,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            experiment_title: DEFAULT_EXPERIMENT_TITLE.to_string(),
            template_id: None,
            writer_identity: "labreportd".to_string(),
            document_link_base: "labreport://documents/".to_string(),
        }
    }
}

impl LabConfig {
    pub fn load(workspace: &Path) -> anyhow::Result<Self> {
        let path = workspace.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
        let cfg: LabConfig = serde_json::from_str(&text)
            .with_context(|| format!("{} is invalid JSON", path.to_string_lossy()))?;
        Ok(cfg)
    }

    pub fn document_link(&self, document_id: &str) -> String {
        format!("{}{}", self.document_link_base, document_id)
    }
}
