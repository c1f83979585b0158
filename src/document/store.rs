use super::{Document, DocumentService, TemplateInfo};
use crate::db;
use anyhow::{anyhow, Context};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

pub const ROLE_WRITER: &str = "writer";

/// Templates, documents and permissions kept in the workspace database.
pub struct SqliteDocuments<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteDocuments<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Creates or replaces a template and its share list.
    pub fn import_template(
        &self,
        template_id: &str,
        title: &str,
        body: &str,
        shared_with: &[String],
    ) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO templates(id, title, body, created_at) VALUES(?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET title = excluded.title, body = excluded.body",
            (template_id, title, body, db::now_rfc3339()),
        )
        .context("failed to store template")?;
        tx.execute(
            "DELETE FROM template_shares WHERE template_id = ?",
            [template_id],
        )?;
        for identity in shared_with {
            tx.execute(
                "INSERT OR IGNORE INTO template_shares(template_id, identity) VALUES(?, ?)",
                (template_id, identity),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_templates(&self) -> anyhow::Result<Vec<TemplateInfo>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title FROM templates ORDER BY id")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, title) in rows {
            let shared_with = self.template_shares(&id)?;
            out.push(TemplateInfo {
                id,
                title,
                shared_with,
            });
        }
        Ok(out)
    }

    fn template_shares(&self, template_id: &str) -> anyhow::Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT identity FROM template_shares WHERE template_id = ? ORDER BY identity",
        )?;
        let shares = stmt
            .query_map([template_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(shares)
    }

    fn has_role(&self, document_id: &str, identity: &str, role: &str) -> anyhow::Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM document_permissions WHERE document_id = ? AND identity = ? AND role = ?",
                (document_id, identity, role),
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl DocumentService for SqliteDocuments<'_> {
    fn copy_template(
        &self,
        template_id: &str,
        title: &str,
        requester: &str,
    ) -> anyhow::Result<String> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM templates WHERE id = ?",
                [template_id],
                |r| r.get(0),
            )
            .optional()
            .context("failed to read template")?;
        let Some(body) = body else {
            return Err(anyhow!("template not found"));
        };
        if !self.template_shares(template_id)?.iter().any(|s| s == requester) {
            return Err(anyhow!("template is not shared with {}", requester));
        }

        let document_id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO documents(id, title, template_id, body, created_at) VALUES(?, ?, ?, ?, ?)",
                (&document_id, title, template_id, &body, db::now_rfc3339()),
            )
            .context("failed to create document")?;
        Ok(document_id)
    }

    fn grant_writer(&self, document_id: &str, identity: &str) -> anyhow::Result<()> {
        self.conn
            .execute(
                "INSERT INTO document_permissions(document_id, identity, role) VALUES(?, ?, ?)
                 ON CONFLICT(document_id, identity) DO UPDATE SET role = excluded.role",
                (document_id, identity, ROLE_WRITER),
            )
            .context("failed to grant writer permission")?;
        Ok(())
    }

    fn replace_all_text(
        &self,
        document_id: &str,
        editor: &str,
        replacements: &[(String, String)],
    ) -> anyhow::Result<Vec<usize>> {
        let Some(doc) = self.get(document_id)? else {
            return Err(anyhow!("document not found"));
        };
        if !self.has_role(document_id, editor, ROLE_WRITER)? {
            return Err(anyhow!("{} has no write permission", editor));
        }

        let mut body = doc.body;
        let mut counts = Vec::with_capacity(replacements.len());
        for (token, value) in replacements {
            let n = body.matches(token.as_str()).count();
            if n > 0 {
                body = body.replace(token.as_str(), value);
            }
            counts.push(n);
        }

        self.conn
            .execute(
                "UPDATE documents SET body = ?, updated_at = ? WHERE id = ?",
                (&body, db::now_rfc3339(), document_id),
            )
            .context("failed to write document")?;
        Ok(counts)
    }

    fn get(&self, document_id: &str) -> anyhow::Result<Option<Document>> {
        let doc = self
            .conn
            .query_row(
                "SELECT id, title, template_id, body FROM documents WHERE id = ?",
                [document_id],
                |r| {
                    Ok(Document {
                        id: r.get(0)?,
                        title: r.get(1)?,
                        template_id: r.get(2)?,
                        body: r.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(doc)
    }
}
