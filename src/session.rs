use crate::credentials::{hash_password, verify_password};
use crate::document::{self, DocumentGenerator, DocumentService, Replacement};
use crate::error::{LabError, Result};
use crate::record::{ReportPatch, StudentRecord, PASSWORD_HASH_FIELD};
use crate::repository::{RecordSource, RecordTable, Repository, UpsertOutcome};
use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Registered,
    Authenticated,
}

impl LoginOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Authenticated => "authenticated",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveReport {
    pub student_id: String,
    pub record: StudentRecord,
}

/// The single session of this process. Every operation takes the session
/// explicitly; logging out drops the in-memory record.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Session {
    #[default]
    LoggedOut,
    Authenticating {
        student_id: String,
    },
    LoggedIn(ActiveReport),
}

impl Session {
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::LoggedOut => "loggedOut",
            Self::Authenticating { .. } => "authenticating",
            Self::LoggedIn(_) => "loggedIn",
        }
    }

    /// The id being authenticated or logged in, if any.
    pub fn student_id(&self) -> Option<&str> {
        match self {
            Self::LoggedOut => None,
            Self::Authenticating { student_id } => Some(student_id.as_str()),
            Self::LoggedIn(a) => Some(a.student_id.as_str()),
        }
    }

    pub fn active(&self) -> Result<&ActiveReport> {
        match self {
            Self::LoggedIn(a) => Ok(a),
            _ => Err(LabError::NotLoggedIn),
        }
    }

    fn active_mut(&mut self) -> Result<&mut ActiveReport> {
        match self {
            Self::LoggedIn(a) => Ok(a),
            _ => Err(LabError::NotLoggedIn),
        }
    }

    /// Registers the id on first use, otherwise checks the password. Any
    /// failure leaves the session logged out.
    pub fn login<T: RecordTable>(
        &mut self,
        repo: &Repository<T>,
        student_id: &str,
        password: &str,
    ) -> Result<LoginOutcome> {
        if student_id.is_empty() || password.is_empty() {
            return Err(LabError::InvalidInput(
                "student id and password are both required".into(),
            ));
        }

        *self = Self::Authenticating {
            student_id: student_id.to_string(),
        };
        match authenticate(repo, student_id, password) {
            Ok((outcome, record)) => {
                info!("{} {}", student_id, outcome.as_str());
                *self = Self::LoggedIn(ActiveReport {
                    student_id: student_id.to_string(),
                    record,
                });
                Ok(outcome)
            }
            Err(e) => {
                *self = Self::LoggedOut;
                Err(e)
            }
        }
    }

    pub fn logout(&mut self) {
        *self = Self::LoggedOut;
    }

    pub fn edit(&mut self, patch: ReportPatch) -> Result<&StudentRecord> {
        let active = self.active_mut()?;
        active.record.apply_patch(patch);
        Ok(&active.record)
    }

    pub fn save<T: RecordTable>(&self, repo: &Repository<T>) -> Result<UpsertOutcome> {
        let active = self.active()?;
        repo.save(&active.student_id, &active.record)
    }

    /// Copies the template for this student and stores the new document id.
    /// Refused once the record already points at a document.
    pub fn create_document<T: RecordTable, S: DocumentService>(
        &mut self,
        repo: &Repository<T>,
        generator: &DocumentGenerator<S>,
        template_id: &str,
    ) -> Result<String> {
        let active = self.active_mut()?;
        if let Some(existing) = &active.record.doc_id {
            return Err(LabError::DocumentExists(existing.clone()));
        }

        let title = document::document_title(&active.student_id, &active.record.name);
        let document_id = generator.instantiate(template_id, &title)?;
        active.record.doc_id = Some(document_id.clone());
        repo.save(&active.student_id, &active.record)?;
        Ok(document_id)
    }

    /// Writes the current in-memory record into the student's document.
    pub fn publish<S: DocumentService>(
        &self,
        generator: &DocumentGenerator<S>,
    ) -> Result<Vec<Replacement>> {
        let active = self.active()?;
        let Some(document_id) = &active.record.doc_id else {
            return Err(LabError::NoDocument);
        };
        let fields = document::report_fields(&active.student_id, &active.record);
        generator.populate(document_id, &fields)
    }
}

fn authenticate<T: RecordTable>(
    repo: &Repository<T>,
    student_id: &str,
    password: &str,
) -> Result<(LoginOutcome, StudentRecord)> {
    let loaded = repo.load(student_id)?;
    // An unreadable row or hash must not be re-registered under a new password.
    match &loaded.source {
        RecordSource::Corrupt { reason, .. } => return Err(LabError::Decode(reason.clone())),
        RecordSource::Stored { repaired, .. }
            if repaired.iter().any(|f| f == PASSWORD_HASH_FIELD) =>
        {
            return Err(LabError::Decode(format!(
                "{} is not a string",
                PASSWORD_HASH_FIELD
            )))
        }
        _ => {}
    }

    let mut record = loaded.record;
    match record.password_hash.clone() {
        None => {
            record.password_hash = Some(hash_password(password));
            repo.save(student_id, &record)?;
            Ok((LoginOutcome::Registered, record))
        }
        Some(stored) if verify_password(&stored, password) => {
            Ok((LoginOutcome::Authenticated, record))
        }
        Some(_) => {
            warn!("password mismatch for {}", student_id);
            Err(LabError::AuthenticationMismatch)
        }
    }
}
