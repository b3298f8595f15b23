mod memory;
pub mod sqlite;

pub use memory::MemoryPaperStore;
pub use sqlite::SqlitePaperStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Paper, PaperFields};

/// Persistence boundary for papers, keyed by canonical DOI.
///
/// Implementations own conflict handling: `insert_paper` must fail with
/// [`PaperlogError::Duplicate`](crate::PaperlogError::Duplicate) when the DOI
/// already exists, and `update_paper` patches an existing row.
#[async_trait]
pub trait PaperStore: Send + Sync {
    async fn get_paper_by_doi(&self, doi: &str) -> Result<Option<Paper>>;
    async fn insert_paper(&self, doi: &str, fields: &PaperFields) -> Result<Paper>;
    async fn update_paper(&self, doi: &str, fields: &PaperFields) -> Result<Paper>;
    async fn search_papers(&self, needle: &str, limit: usize) -> Result<Vec<Paper>>;
}

/// Insert, retrying once as an update when the DOI is already stored.
pub async fn upsert_paper(
    store: &dyn PaperStore,
    doi: &str,
    fields: &PaperFields,
) -> Result<Paper> {
    match store.insert_paper(doi, fields).await {
        Err(err) if err.is_duplicate() => store.update_paper(doi, fields).await,
        other => other,
    }
}
