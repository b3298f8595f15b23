use chrono::Utc;
use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: u32 = 1;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;
    Ok(())
}

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS papers (
            id               TEXT PRIMARY KEY,
            doi              TEXT UNIQUE NOT NULL,
            title            TEXT,
            authors          TEXT NOT NULL DEFAULT '[]',
            abstract_text    TEXT,
            citation_count   INTEGER,
            citing_dois      TEXT NOT NULL DEFAULT '[]',
            year             INTEGER,
            journal          TEXT,
            conference       TEXT,
            published_date   TEXT,
            publisher        TEXT,
            work_type        TEXT,
            pdf_url          TEXT,
            html_url         TEXT,
            references_count INTEGER,
            sources          TEXT NOT NULL DEFAULT '[]',
            updated_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_papers_updated_at ON papers(updated_at);
        ",
    )?;
    Ok(())
}

fn is_migration_applied(conn: &Connection, version: u32) -> Result<bool> {
    let applied: bool = conn
        .prepare("SELECT 1 FROM schema_migrations WHERE version = ?1")?
        .exists(rusqlite::params![version])?;
    Ok(applied)
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    create_tables(conn)?;
    if !is_migration_applied(conn, SCHEMA_VERSION)? {
        conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![SCHEMA_VERSION, Utc::now().to_rfc3339()],
        )?;
    }
    Ok(())
}
