use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Author;

/// Opaque store identifier, independent of the DOI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaperId(Uuid);

impl PaperId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PaperId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The metadata columns written by an upsert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperFields {
    pub title: Option<String>,
    pub authors: Vec<Author>,
    pub abstract_text: Option<String>,
    pub citation_count: Option<u32>,
    pub citing_dois: Vec<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub conference: Option<String>,
    pub published_date: Option<String>,
    pub publisher: Option<String>,
    pub work_type: Option<String>,
    pub pdf_url: Option<String>,
    pub html_url: Option<String>,
    pub references_count: Option<u32>,
    pub sources: Vec<String>,
}

impl PaperFields {
    /// Overwrite with every non-empty field of `update`, keeping the rest.
    pub fn patch(&mut self, update: &PaperFields) {
        patch_opt(&mut self.title, &update.title);
        if !update.authors.is_empty() {
            self.authors = update.authors.clone();
        }
        patch_opt(&mut self.abstract_text, &update.abstract_text);
        if update.citation_count.is_some() {
            self.citation_count = update.citation_count;
        }
        for doi in &update.citing_dois {
            if !self.citing_dois.contains(doi) {
                self.citing_dois.push(doi.clone());
            }
        }
        if update.year.is_some() {
            self.year = update.year;
        }
        patch_opt(&mut self.journal, &update.journal);
        patch_opt(&mut self.conference, &update.conference);
        patch_opt(&mut self.published_date, &update.published_date);
        patch_opt(&mut self.publisher, &update.publisher);
        patch_opt(&mut self.work_type, &update.work_type);
        patch_opt(&mut self.pdf_url, &update.pdf_url);
        patch_opt(&mut self.html_url, &update.html_url);
        if update.references_count.is_some() {
            self.references_count = update.references_count;
        }
        for source in &update.sources {
            if !self.sources.contains(source) {
                self.sources.push(source.clone());
            }
        }
    }
}

fn patch_opt(target: &mut Option<String>, update: &Option<String>) {
    if let Some(value) = update
        && !value.trim().is_empty()
    {
        *target = Some(value.clone());
    }
}

/// A persisted paper. Keyed by `doi` (unique) and by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: PaperId,
    pub doi: String,
    #[serde(flatten)]
    pub fields: PaperFields,
    pub updated_at: DateTime<Utc>,
}

impl Paper {
    pub fn new(doi: impl Into<String>, fields: PaperFields) -> Self {
        Self {
            id: PaperId::new(),
            doi: doi.into(),
            fields,
            updated_at: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Journal name, or the conference name for proceedings.
    pub fn venue(&self) -> Option<&str> {
        self.fields
            .journal
            .as_deref()
            .or(self.fields.conference.as_deref())
    }

    /// Case-insensitive substring match over title, abstract and venue.
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        [
            self.fields.title.as_deref(),
            self.fields.abstract_text.as_deref(),
            self.fields.journal.as_deref(),
            self.fields.conference.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|haystack| haystack.to_lowercase().contains(&needle))
    }
}
