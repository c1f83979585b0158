use crate::error::{LabError, Result};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

pub const DEFAULT_EXPERIMENT_TITLE: &str = "산-염기 적정 실험";
pub const DEFAULT_ANALYSIS: &str = "실험 결과에 대한 분석 내용을 여기에 작성하세요.";
pub const DEFAULT_CONCLUSION: &str = "결론 및 고찰 내용을 여기에 작성하세요.";
pub const AVERAGE_LABEL: &str = "average";

/// Trial column: a trial number, a text label such as "average", or blank
/// for rows the student added but has not filled in yet.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum Trial {
    Number(i64),
    Label(String),
    #[default]
    Empty,
}

impl Trial {
    /// Whole-valued floats (`1.0`) are trial numbers; other scalars become
    /// labels. Never fails.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::String(s) => Self::Label(s),
            Value::Bool(b) => Self::Label(b.to_string()),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Self::Number(i),
                (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                    Self::Number(f as i64)
                }
                _ => Self::Label(n.to_string()),
            },
            other => {
                warn!("trial cell holds {}; left blank", json_kind(&other));
                Self::Empty
            }
        }
    }
}

impl<'de> Deserialize<'de> for Trial {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(d).map(Self::from_value)
    }
}

/// Volume cell. Whatever the student typed is kept: numbers stay numbers,
/// other scalars are stored as text.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

impl Cell {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::String(s) => Self::Text(s),
            Value::Bool(b) => Self::Text(b.to_string()),
            Value::Number(n) => match n.as_f64() {
                Some(f) => Self::Number(f),
                None => Self::Text(n.to_string()),
            },
            other => {
                warn!("volume cell holds {}; left blank", json_kind(&other));
                Self::Empty
            }
        }
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(d).map(Self::from_value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRow {
    #[serde(default, alias = "시도")]
    pub trial: Trial,
    #[serde(default, alias = "사용한 염산(HCl) 용액의 부피(mL)")]
    pub volume_a: Cell,
    #[serde(default, alias = "소비된 수산화나트륨(NaOH) 용액의 부피(mL)")]
    pub volume_b: Cell,
}

impl MeasurementRow {
    pub fn new(trial: Trial, volume_a: f64, volume_b: f64) -> Self {
        Self {
            trial,
            volume_a: Cell::Number(volume_a),
            volume_b: Cell::Number(volume_b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRecord {
    pub title: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub doc_id: Option<String>,
    pub measurements: Vec<MeasurementRow>,
    pub analysis: String,
    pub conclusion: String,
    /// Top-level keys this version does not know about. Kept so that a
    /// newer writer's fields survive a load/save by this one.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A decoded payload. Absent, `null` and unusable fields are all `None`.
#[derive(Debug, Clone, Default)]
pub struct PartialRecord {
    pub title: Option<String>,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub doc_id: Option<String>,
    pub measurements: Option<Vec<MeasurementRow>>,
    pub analysis: Option<String>,
    pub conclusion: Option<String>,
    pub extra: Map<String, Value>,
    /// Known fields that were present but had the wrong shape.
    pub repaired: Vec<String>,
}

pub const PASSWORD_HASH_FIELD: &str = "password_hash";

/// Form fields the presentation layer may change. Credentials and the
/// document link are not editable through a patch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub measurements: Option<Vec<MeasurementRow>>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
}

pub fn default_measurements() -> Vec<MeasurementRow> {
    vec![
        MeasurementRow::new(Trial::Number(1), 10.0, 0.0),
        MeasurementRow::new(Trial::Number(2), 10.0, 0.0),
        MeasurementRow::new(Trial::Number(3), 10.0, 0.0),
        MeasurementRow::new(Trial::Label(AVERAGE_LABEL.to_string()), 10.0, 0.0),
    ]
}

pub fn default_record(experiment_title: &str) -> StudentRecord {
    StudentRecord {
        title: experiment_title.to_string(),
        name: String::new(),
        password_hash: None,
        doc_id: None,
        measurements: default_measurements(),
        analysis: DEFAULT_ANALYSIS.to_string(),
        conclusion: DEFAULT_CONCLUSION.to_string(),
        extra: Map::new(),
    }
}

/// Parses a stored payload. A blank cell decodes as an empty object. Only
/// a payload that is not a JSON object fails; a known field with the wrong
/// type is dropped (and listed in `repaired`) so the rest still loads.
pub fn decode(raw: &str) -> Result<PartialRecord> {
    if raw.trim().is_empty() {
        return Ok(PartialRecord::default());
    }
    let value: Value = serde_json::from_str(&null_non_finite(raw))?;
    let mut fields = match value {
        Value::Object(m) => m,
        other => {
            return Err(LabError::Decode(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            )))
        }
    };

    let mut repaired = Vec::new();
    let title = take_string(&mut fields, "title", &mut repaired);
    let name = take_string(&mut fields, "name", &mut repaired);
    let password_hash = take_string(&mut fields, PASSWORD_HASH_FIELD, &mut repaired);
    let doc_id = take_string(&mut fields, "doc_id", &mut repaired);
    let measurements = take_measurements(&mut fields, &mut repaired);
    let analysis = take_string(&mut fields, "analysis", &mut repaired);
    let conclusion = take_string(&mut fields, "conclusion", &mut repaired);

    Ok(PartialRecord {
        title,
        name,
        password_hash,
        doc_id,
        measurements,
        analysis,
        conclusion,
        extra: fields,
        repaired,
    })
}

fn take_string(
    fields: &mut Map<String, Value>,
    key: &str,
    repaired: &mut Vec<String>,
) -> Option<String> {
    match fields.remove(key)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => {
            warn!(
                "stored field {} is {}, expected a string; using the default",
                key,
                json_kind(&other)
            );
            repaired.push(key.to_string());
            None
        }
    }
}

/// Rows that are not objects are dropped. If nothing survives from a
/// non-empty table, the default table is used.
fn take_measurements(
    fields: &mut Map<String, Value>,
    repaired: &mut Vec<String>,
) -> Option<Vec<MeasurementRow>> {
    let rows = match fields.remove("measurements")? {
        Value::Null => return None,
        Value::Array(rows) => rows,
        other => {
            warn!(
                "stored measurements are {}, expected an array; using the default table",
                json_kind(&other)
            );
            repaired.push("measurements".to_string());
            return None;
        }
    };

    let total = rows.len();
    let kept: Vec<MeasurementRow> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(i, row)| match serde_json::from_value(row) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!("dropping measurement row {}: {}", i, e);
                None
            }
        })
        .collect();
    if kept.len() < total {
        repaired.push("measurements".to_string());
    }
    if kept.is_empty() && total > 0 {
        return None;
    }
    Some(kept)
}

/// Older writers emitted bare `NaN` / `Infinity` for blank float cells.
/// Those tokens are not JSON; outside string literals they read as `null`.
fn null_non_finite(raw: &str) -> Cow<'_, str> {
    if !raw.contains("NaN") && !raw.contains("Infinity") {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = raw;
    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(token) = ["-Infinity", "Infinity", "NaN"]
            .into_iter()
            .find(|t| rest.starts_with(t))
        {
            out.push_str("null");
            rest = &rest[token.len()..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    Cow::Owned(out)
}

/// Overlays `partial` onto `defaults` field by field.
pub fn merge(defaults: StudentRecord, partial: PartialRecord) -> StudentRecord {
    let mut extra = defaults.extra;
    extra.extend(partial.extra);
    StudentRecord {
        title: partial.title.unwrap_or(defaults.title),
        name: partial.name.unwrap_or(defaults.name),
        password_hash: partial.password_hash.or(defaults.password_hash),
        doc_id: partial.doc_id.or(defaults.doc_id),
        measurements: partial.measurements.unwrap_or(defaults.measurements),
        analysis: partial.analysis.unwrap_or(defaults.analysis),
        conclusion: partial.conclusion.unwrap_or(defaults.conclusion),
        extra,
    }
}

pub fn encode(record: &StudentRecord) -> Result<String> {
    Ok(serde_json::to_string(record)?)
}

impl StudentRecord {
    pub fn apply_patch(&mut self, patch: ReportPatch) {
        if let Some(v) = patch.title {
            self.title = v;
        }
        if let Some(v) = patch.name {
            self.name = v;
        }
        if let Some(v) = patch.measurements {
            self.measurements = v;
        }
        if let Some(v) = patch.analysis {
            self.analysis = v;
        }
        if let Some(v) = patch.conclusion {
            self.conclusion = v;
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
