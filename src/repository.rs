use crate::db;
use crate::error::{LabError, Result};
use crate::record::{self, StudentRecord};
use log::{debug, warn};
use rusqlite::{Connection, OptionalExtension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted { row: i64 },
    Updated { row: i64 },
}

impl UpsertOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted { .. } => "inserted",
            Self::Updated { .. } => "updated",
        }
    }

    pub fn row(self) -> i64 {
        match self {
            Self::Inserted { row } | Self::Updated { row } => row,
        }
    }
}

/// Two-column table: student identifier, encoded record.
pub trait RecordTable {
    /// Case-sensitive exact match on the identifier column.
    fn find(&self, student_id: &str) -> Result<Option<i64>>;
    fn payload(&self, row: i64) -> Result<Option<String>>;
    /// Overwrites the payload of the row holding `student_id`, or appends a
    /// new row. Find and write happen as one operation.
    fn upsert(&self, student_id: &str, payload: &str) -> Result<UpsertOutcome>;
}

pub struct SqliteTable<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteTable<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

fn find_row(conn: &Connection, student_id: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT row_index FROM student_data WHERE student_id = ?",
        [student_id],
        |r| r.get(0),
    )
    .optional()
}

impl RecordTable for SqliteTable<'_> {
    fn find(&self, student_id: &str) -> Result<Option<i64>> {
        Ok(find_row(self.conn, student_id)?)
    }

    fn payload(&self, row: i64) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT payload FROM student_data WHERE row_index = ?",
                [row],
                |r| r.get(0),
            )
            .optional()?)
    }

    fn upsert(&self, student_id: &str, payload: &str) -> Result<UpsertOutcome> {
        let tx = self.conn.unchecked_transaction()?;
        let now = db::now_rfc3339();
        let outcome = match find_row(&tx, student_id)? {
            Some(row) => {
                tx.execute(
                    "UPDATE student_data SET payload = ?, updated_at = ? WHERE row_index = ?",
                    (payload, &now, row),
                )?;
                UpsertOutcome::Updated { row }
            }
            None => {
                tx.execute(
                    "INSERT INTO student_data(student_id, payload, updated_at) VALUES(?, ?, ?)",
                    (student_id, payload, &now),
                )?;
                UpsertOutcome::Inserted {
                    row: tx.last_insert_rowid(),
                }
            }
        };
        tx.commit()?;
        Ok(outcome)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordSource {
    /// `repaired` names the fields that were unusable and fell back to
    /// their defaults.
    Stored { row: i64, repaired: Vec<String> },
    Missing,
    /// The row exists but its payload could not be decoded; the returned
    /// record holds defaults only.
    Corrupt { row: i64, reason: String },
}

#[derive(Debug, Clone)]
pub struct Loaded {
    pub record: StudentRecord,
    pub source: RecordSource,
}

pub struct Repository<T> {
    table: T,
    experiment_title: String,
}

impl<T: RecordTable> Repository<T> {
    pub fn new(table: T, experiment_title: impl Into<String>) -> Self {
        Self {
            table,
            experiment_title: experiment_title.into(),
        }
    }

    pub fn defaults(&self) -> StudentRecord {
        record::default_record(&self.experiment_title)
    }

    pub fn find(&self, student_id: &str) -> Result<Option<i64>> {
        if student_id.is_empty() {
            return Ok(None);
        }
        self.table.find(student_id)
    }

    /// Lookup has no side effect: an unknown id yields the defaults without
    /// creating a row.
    pub fn load(&self, student_id: &str) -> Result<Loaded> {
        let Some(row) = self.find(student_id)? else {
            debug!("no stored record for {}", student_id);
            return Ok(Loaded {
                record: self.defaults(),
                source: RecordSource::Missing,
            });
        };
        let raw = self.table.payload(row)?.unwrap_or_default();
        match record::decode(&raw) {
            Ok(mut partial) => {
                let repaired = std::mem::take(&mut partial.repaired);
                if repaired.is_empty() {
                    debug!("loaded record for {} from row {}", student_id, row);
                } else {
                    warn!(
                        "record for {} at row {} had unusable fields: {}",
                        student_id,
                        row,
                        repaired.join(", ")
                    );
                }
                Ok(Loaded {
                    record: record::merge(self.defaults(), partial),
                    source: RecordSource::Stored { row, repaired },
                })
            }
            Err(e) => {
                let reason = match e {
                    LabError::Decode(msg) => msg,
                    other => other.to_string(),
                };
                warn!(
                    "stored record for {} at row {} is malformed: {}",
                    student_id, row, reason
                );
                Ok(Loaded {
                    record: self.defaults(),
                    source: RecordSource::Corrupt { row, reason },
                })
            }
        }
    }

    /// Last write wins: there is no version check against the stored row.
    pub fn save(&self, student_id: &str, record: &StudentRecord) -> Result<UpsertOutcome> {
        let payload = record::encode(record)?;
        let outcome = self.table.upsert(student_id, &payload)?;
        debug!(
            "saved record for {} at row {} ({})",
            student_id,
            outcome.row(),
            outcome.as_str()
        );
        Ok(outcome)
    }
}
