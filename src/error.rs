use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabError {
    #[error("record store unavailable: {0}")]
    Connection(String),

    #[error("stored record is malformed: {0}")]
    Decode(String),

    #[error("student id or password does not match")]
    AuthenticationMismatch,

    #[error(
        "could not copy template '{template_id}': {reason}. \
         Check that the template document is shared with '{identity}' as an editor."
    )]
    TemplateCopy {
        template_id: String,
        identity: String,
        reason: String,
    },

    #[error("could not update document '{document_id}': {reason}")]
    Update { document_id: String, reason: String },

    #[error("log in first")]
    NotLoggedIn,

    #[error("select a workspace first")]
    NoWorkspace,

    #[error("{0}")]
    InvalidInput(String),

    #[error("a report document already exists: {0}")]
    DocumentExists(String),

    #[error("no report document yet; create one first")]
    NoDocument,

    #[error("could not export to {path}: {reason}")]
    Export { path: String, reason: String },
}

impl LabError {
    /// Stable error code carried in IPC error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_failed",
            Self::Decode(_) => "decode_failed",
            Self::AuthenticationMismatch => "auth_mismatch",
            Self::TemplateCopy { .. } => "template_copy_failed",
            Self::Update { .. } => "document_update_failed",
            Self::NotLoggedIn => "not_logged_in",
            Self::NoWorkspace => "no_workspace",
            Self::InvalidInput(_) => "bad_params",
            Self::DocumentExists(_) => "document_exists",
            Self::NoDocument => "no_document",
            Self::Export { .. } => "export_failed",
        }
    }
}

impl From<rusqlite::Error> for LabError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Connection(e.to_string())
    }
}

impl From<serde_json::Error> for LabError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LabError>;
