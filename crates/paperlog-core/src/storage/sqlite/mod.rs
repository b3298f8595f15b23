mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::error::{PaperlogError, Result};
use crate::models::{Paper, PaperFields, PaperId};

use super::PaperStore;

pub use schema::SCHEMA_VERSION;

const SELECT_COLUMNS: &str = "id, doi, title, authors, abstract_text, citation_count, citing_dois,
    year, journal, conference, published_date, publisher, work_type, pdf_url, html_url,
    references_count, sources, updated_at";

/// SQLite-backed paper store. The connection is shared behind a mutex; every
/// statement is short, so the async methods run them inline.
pub struct SqlitePaperStore {
    path: Option<String>,
    connection: Mutex<Connection>,
}

impl SqlitePaperStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_string_lossy().to_string()))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<String>) -> Result<Self> {
        schema::apply_pragmas(&conn)?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            path,
            connection: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn find(conn: &Connection, doi: &str) -> Result<Option<Paper>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM papers WHERE doi = ?1");
        let paper = conn
            .query_row(&sql, params![doi], row_to_paper)
            .optional()?;
        Ok(paper)
    }

    fn write(conn: &Connection, paper: &Paper, insert: bool) -> Result<()> {
        let f = &paper.fields;
        let sql = if insert {
            "INSERT INTO papers (id, doi, title, authors, abstract_text, citation_count,
                citing_dois, year, journal, conference, published_date, publisher, work_type,
                pdf_url, html_url, references_count, sources, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        } else {
            "UPDATE papers SET id = ?1, title = ?3, authors = ?4, abstract_text = ?5,
                citation_count = ?6, citing_dois = ?7, year = ?8, journal = ?9, conference = ?10,
                published_date = ?11, publisher = ?12, work_type = ?13, pdf_url = ?14,
                html_url = ?15, references_count = ?16, sources = ?17, updated_at = ?18
             WHERE doi = ?2"
        };
        let result = conn.execute(
            sql,
            params![
                paper.id.to_string(),
                paper.doi,
                f.title,
                serde_json::to_string(&f.authors)?,
                f.abstract_text,
                f.citation_count,
                serde_json::to_string(&f.citing_dois)?,
                f.year,
                f.journal,
                f.conference,
                f.published_date,
                f.publisher,
                f.work_type,
                f.pdf_url,
                f.html_url,
                f.references_count,
                serde_json::to_string(&f.sources)?,
                paper.updated_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if insert && err.code == ErrorCode::ConstraintViolation =>
            {
                Err(PaperlogError::Duplicate(paper.doi.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl PaperStore for SqlitePaperStore {
    async fn get_paper_by_doi(&self, doi: &str) -> Result<Option<Paper>> {
        Self::find(&self.conn(), doi)
    }

    async fn insert_paper(&self, doi: &str, fields: &PaperFields) -> Result<Paper> {
        let paper = Paper::new(doi, fields.clone());
        Self::write(&self.conn(), &paper, true)?;
        Ok(paper)
    }

    async fn update_paper(&self, doi: &str, fields: &PaperFields) -> Result<Paper> {
        let conn = self.conn();
        let mut paper =
            Self::find(&conn, doi)?.ok_or_else(|| PaperlogError::PaperNotFound(doi.to_string()))?;
        paper.fields.patch(fields);
        paper.touch();
        Self::write(&conn, &paper, false)?;
        Ok(paper)
    }

    async fn search_papers(&self, needle: &str, limit: usize) -> Result<Vec<Paper>> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", escape_like(&needle));
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM papers
             WHERE lower(title) LIKE ?1 ESCAPE '\\'
                OR lower(abstract_text) LIKE ?1 ESCAPE '\\'
                OR lower(journal) LIKE ?1 ESCAPE '\\'
                OR lower(conference) LIKE ?1 ESCAPE '\\'
             ORDER BY updated_at
             LIMIT ?2"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![pattern, limit], row_to_paper)?;
        let mut papers = Vec::new();
        for row in rows {
            papers.push(row?);
        }
        Ok(papers)
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn row_to_paper(row: &Row) -> rusqlite::Result<Paper> {
    let id: String = row.get(0)?;
    let authors: String = row.get(3)?;
    let citing_dois: String = row.get(6)?;
    let sources: String = row.get(16)?;
    let updated_at: String = row.get(17)?;

    Ok(Paper {
        id: PaperId::from_uuid(Uuid::parse_str(&id).unwrap_or_default()),
        doi: row.get(1)?,
        fields: PaperFields {
            title: row.get(2)?,
            authors: serde_json::from_str(&authors).unwrap_or_default(),
            abstract_text: row.get(4)?,
            citation_count: row.get(5)?,
            citing_dois: serde_json::from_str(&citing_dois).unwrap_or_default(),
            year: row.get(7)?,
            journal: row.get(8)?,
            conference: row.get(9)?,
            published_date: row.get(10)?,
            publisher: row.get(11)?,
            work_type: row.get(12)?,
            pdf_url: row.get(13)?,
            html_url: row.get(14)?,
            references_count: row.get(15)?,
            sources: serde_json::from_str(&sources).unwrap_or_default(),
        },
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
