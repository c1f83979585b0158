use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "labreport.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // One row per student: identifier in the first column, encoded record
    // in the second. SQLite's default BINARY collation keeps lookups
    // case-sensitive.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_data(
            row_index INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL UNIQUE,
            payload TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS templates(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS template_shares(
            template_id TEXT NOT NULL,
            identity TEXT NOT NULL,
            PRIMARY KEY(template_id, identity),
            FOREIGN KEY(template_id) REFERENCES templates(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            template_id TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS document_permissions(
            document_id TEXT NOT NULL,
            identity TEXT NOT NULL,
            role TEXT NOT NULL,
            PRIMARY KEY(document_id, identity),
            FOREIGN KEY(document_id) REFERENCES documents(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_document_permissions_document ON document_permissions(document_id)",
        [],
    )?;

    Ok(())
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
