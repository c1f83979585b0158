mod export;
mod store;

pub use export::export_document;
pub use store::SqliteDocuments;

use crate::error::{LabError, Result};
use crate::record::{Cell, MeasurementRow, StudentRecord, Trial};
use log::{info, warn};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub template_id: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    pub id: String,
    pub title: String,
    pub shared_with: Vec<String>,
}

/// Where documents live. Infrastructure failures come back as `anyhow`
/// errors; `DocumentGenerator` turns them into the user-facing taxonomy.
pub trait DocumentService {
    /// Copies a template under a new title on behalf of `requester`. Fails
    /// without creating anything if the template is missing or not shared
    /// with the requester.
    fn copy_template(&self, template_id: &str, title: &str, requester: &str)
        -> anyhow::Result<String>;
    fn grant_writer(&self, document_id: &str, identity: &str) -> anyhow::Result<()>;
    /// Applies every replacement in order as one batch and returns the
    /// occurrence count per replacement.
    fn replace_all_text(
        &self,
        document_id: &str,
        editor: &str,
        replacements: &[(String, String)],
    ) -> anyhow::Result<Vec<usize>>;
    fn get(&self, document_id: &str) -> anyhow::Result<Option<Document>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    StudentId,
    Name,
    Title,
    Analysis,
    Conclusion,
    MeasurementTable,
}

impl Placeholder {
    pub const ALL: [Placeholder; 6] = [
        Placeholder::StudentId,
        Placeholder::Name,
        Placeholder::Title,
        Placeholder::Analysis,
        Placeholder::Conclusion,
        Placeholder::MeasurementTable,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Self::StudentId => "{{학번}}",
            Self::Name => "{{이름}}",
            Self::Title => "{{실험제목}}",
            Self::Analysis => "{{결과분석}}",
            Self::Conclusion => "{{결론}}",
            Self::MeasurementTable => "{{측정결과_표}}",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Replacement {
    pub token: &'static str,
    pub occurrences: usize,
}

const TABLE_HEADERS: [&str; 3] = [
    "시도",
    "사용한 염산(HCl) 용액의 부피(mL)",
    "소비된 수산화나트륨(NaOH) 용액의 부피(mL)",
];

fn trial_text(t: &Trial) -> String {
    match t {
        Trial::Number(n) => n.to_string(),
        Trial::Label(s) => s.clone(),
        Trial::Empty => String::new(),
    }
}

fn cell_text(c: &Cell) -> String {
    match c {
        Cell::Number(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => {
            format!("{:.1}", v)
        }
        Cell::Number(v) => v.to_string(),
        Cell::Text(s) => s.clone(),
        Cell::Empty => String::new(),
    }
}

/// Plain-text table: a header line, then one line per row, every column
/// right-aligned to its widest cell and separated by two spaces.
pub fn render_measurement_table(rows: &[MeasurementRow]) -> String {
    let mut grid: Vec<[String; 3]> = Vec::with_capacity(rows.len() + 1);
    grid.push(TABLE_HEADERS.map(str::to_string));
    for r in rows {
        grid.push([
            trial_text(&r.trial),
            cell_text(&r.volume_a),
            cell_text(&r.volume_b),
        ]);
    }

    let mut widths = [0usize; 3];
    for line in &grid {
        for (w, cell) in widths.iter_mut().zip(line) {
            *w = (*w).max(cell.chars().count());
        }
    }

    grid.iter()
        .map(|line| {
            line.iter()
                .zip(widths)
                .map(|(cell, w)| format!("{:>w$}", cell, w = w))
                .collect::<Vec<_>>()
                .join("  ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Values for every placeholder, taken from the record.
pub fn report_fields(student_id: &str, record: &StudentRecord) -> Vec<(Placeholder, String)> {
    Placeholder::ALL
        .iter()
        .map(|&p| {
            let value = match p {
                Placeholder::StudentId => student_id.to_string(),
                Placeholder::Name => record.name.clone(),
                Placeholder::Title => record.title.clone(),
                Placeholder::Analysis => record.analysis.clone(),
                Placeholder::Conclusion => record.conclusion.clone(),
                Placeholder::MeasurementTable => render_measurement_table(&record.measurements),
            };
            (p, value)
        })
        .collect()
}

pub fn document_title(student_id: &str, name: &str) -> String {
    format!("{} {} - 실험 보고서", student_id, name)
}

pub struct DocumentGenerator<S> {
    service: S,
    writer_identity: String,
}

impl<S: DocumentService> DocumentGenerator<S> {
    pub fn new(service: S, writer_identity: impl Into<String>) -> Self {
        Self {
            service,
            writer_identity: writer_identity.into(),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Copies the template and grants the writer identity edit rights on
    /// the copy.
    pub fn instantiate(&self, template_id: &str, title: &str) -> Result<String> {
        let copy_error = |reason: String| LabError::TemplateCopy {
            template_id: template_id.to_string(),
            identity: self.writer_identity.clone(),
            reason,
        };

        let document_id = self
            .service
            .copy_template(template_id, title, &self.writer_identity)
            .map_err(|e| copy_error(format!("{e:#}")))?;
        self.service
            .grant_writer(&document_id, &self.writer_identity)
            .map_err(|e| copy_error(format!("{e:#}")))?;

        info!("created document {} from template {}", document_id, template_id);
        Ok(document_id)
    }

    /// Literal, case-sensitive replacement of each placeholder token. Tokens
    /// consumed by an earlier run are simply not found again.
    pub fn populate(
        &self,
        document_id: &str,
        fields: &[(Placeholder, String)],
    ) -> Result<Vec<Replacement>> {
        let replacements: Vec<(String, String)> = fields
            .iter()
            .map(|(p, v)| (p.token().to_string(), v.clone()))
            .collect();
        let counts = self
            .service
            .replace_all_text(document_id, &self.writer_identity, &replacements)
            .map_err(|e| LabError::Update {
                document_id: document_id.to_string(),
                reason: format!("{e:#}"),
            })?;

        let out: Vec<Replacement> = fields
            .iter()
            .zip(counts)
            .map(|((p, _), occurrences)| Replacement {
                token: p.token(),
                occurrences,
            })
            .collect();
        for r in out.iter().filter(|r| r.occurrences == 0) {
            warn!("placeholder {} not found in document {}", r.token, document_id);
        }
        Ok(out)
    }
}
