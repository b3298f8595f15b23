use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{PaperlogError, Result};
use crate::models::{Paper, PaperFields};

use super::PaperStore;

/// Process-local store, used by tests and as a scratch store for the CLI.
#[derive(Default)]
pub struct MemoryPaperStore {
    papers: Mutex<HashMap<String, Paper>>,
}

impl MemoryPaperStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Paper>> {
        // A poisoned map is still structurally valid; keep serving it.
        self.papers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PaperStore for MemoryPaperStore {
    async fn get_paper_by_doi(&self, doi: &str) -> Result<Option<Paper>> {
        Ok(self.lock().get(doi).cloned())
    }

    async fn insert_paper(&self, doi: &str, fields: &PaperFields) -> Result<Paper> {
        let mut papers = self.lock();
        if papers.contains_key(doi) {
            return Err(PaperlogError::Duplicate(doi.to_string()));
        }
        let paper = Paper::new(doi, fields.clone());
        papers.insert(doi.to_string(), paper.clone());
        Ok(paper)
    }

    async fn update_paper(&self, doi: &str, fields: &PaperFields) -> Result<Paper> {
        let mut papers = self.lock();
        let paper = papers
            .get_mut(doi)
            .ok_or_else(|| PaperlogError::PaperNotFound(doi.to_string()))?;
        paper.fields.patch(fields);
        paper.touch();
        Ok(paper.clone())
    }

    async fn search_papers(&self, needle: &str, limit: usize) -> Result<Vec<Paper>> {
        let papers = self.lock();
        let mut hits = papers
            .values()
            .filter(|paper| paper.matches_text(needle))
            .cloned()
            .collect::<Vec<_>>();
        hits.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.doi.cmp(&b.doi)));
        hits.truncate(limit);
        Ok(hits)
    }
}
