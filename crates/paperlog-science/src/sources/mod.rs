//! Upstream metadata sources.
//!
//! Each adapter turns one API's JSON (or XML for PubMed) into a
//! [`PartialRecord`] carrying only the fields that source supplies. Merging
//! happens later in [`crate::enrichment::merge`].

pub mod crossref;
pub mod openalex;
pub mod pubmed;
pub mod semantic_scholar;

pub use crossref::CrossRefSource;
pub use openalex::OpenAlexSource;
pub use pubmed::PubMedSource;
pub use semantic_scholar::SemanticScholarSource;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{Result, ScienceError};
use crate::identifiers::Doi;
use crate::types::{PartialRecord, SourceName};

#[async_trait]
pub trait ExternalSource: Send + Sync {
    fn name(&self) -> SourceName;

    /// `Ok(None)` when the source has no record for `doi`.
    async fn fetch_by_doi(&self, doi: &Doi) -> Result<Option<PartialRecord>>;

    /// Keyword search. `query` is already in the source's plain syntax.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PartialRecord>>;
}

/// Sources that can list the papers citing a DOI.
#[async_trait]
pub trait CitationSource: Send + Sync {
    async fn fetch_citing_dois(&self, doi: &Doi, limit: usize) -> Result<Vec<Doi>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Venue {
    Journal(String),
    Conference(String),
}

impl Venue {
    pub fn apply(self, partial: &mut PartialRecord) {
        match self {
            Venue::Journal(name) => partial.journal = Some(name),
            Venue::Conference(name) => partial.conference = Some(name),
        }
    }
}

/// Decide whether a venue is a conference or a journal. Blank names yield
/// `None`.
pub fn classify_venue(name: &str, explicit_conference: bool) -> Option<Venue> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let lower = name.to_lowercase();
    if explicit_conference || lower.contains("conference") || lower.contains("proceedings") {
        Some(Venue::Conference(name.to_string()))
    } else {
        Some(Venue::Journal(name.to_string()))
    }
}

/// Trimmed, non-empty string or `None`.
pub(crate) fn text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#?[A-Za-z0-9]{1,10};").expect("valid regex"));

/// Decode XML entities and character references. Entities quick-xml does not
/// know (HTML's `&nbsp;` and friends) are left as written.
pub(crate) fn unescape_xml(raw: &str) -> String {
    ENTITY_RE
        .replace_all(raw, |caps: &Captures| {
            let entity = &caps[0];
            quick_xml::escape::unescape(entity)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| entity.to_string())
        })
        .into_owned()
}

/// Treat a 404 as "this source has nothing".
pub(crate) fn found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ScienceError::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_entities_and_character_references_decode() {
        assert_eq!(
            unescape_xml("Crohn&#x2019;s &#233;tude &amp; &lt;b&gt; &nbsp;"),
            "Crohn\u{2019}s \u{e9}tude & <b> &nbsp;"
        );
        assert_eq!(unescape_xml("AT&T"), "AT&T");
    }

    #[test]
    fn venue_keywords_mark_conferences() {
        assert_eq!(
            classify_venue("Proceedings of the VLDB Endowment", false),
            Some(Venue::Conference("Proceedings of the VLDB Endowment".to_string()))
        );
        assert_eq!(
            classify_venue("International CONFERENCE on Learning", false),
            Some(Venue::Conference("International CONFERENCE on Learning".to_string()))
        );
        assert_eq!(
            classify_venue("Nature", false),
            Some(Venue::Journal("Nature".to_string()))
        );
        assert_eq!(
            classify_venue("NeurIPS", true),
            Some(Venue::Conference("NeurIPS".to_string()))
        );
        assert_eq!(classify_venue("  ", true), None);
    }
}
