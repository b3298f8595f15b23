use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use paperlog_core::{Author, Paper, PaperFields};
use serde::{Deserialize, Serialize, Serializer};

use crate::enrichment::abstracts::reconstruct_abstract;
use crate::identifiers::{Doi, Pmid};

/// Upstream metadata sources, declared in merge priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceName {
    #[serde(rename = "crossref")]
    CrossRef,
    #[serde(rename = "openalex")]
    OpenAlex,
    #[serde(rename = "semantic_scholar")]
    SemanticScholar,
    #[serde(rename = "pubmed")]
    PubMed,
}

impl SourceName {
    pub const ALL: [SourceName; 4] = [
        Self::CrossRef,
        Self::OpenAlex,
        Self::SemanticScholar,
        Self::PubMed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CrossRef => "crossref",
            Self::OpenAlex => "openalex",
            Self::SemanticScholar => "semantic_scholar",
            Self::PubMed => "pubmed",
        }
    }

    /// Lower is applied first during merge.
    pub fn priority(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|source| source.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown source: {s}"))
    }
}

/// Word → token positions, as served by OpenAlex instead of abstract prose.
pub type InvertedIndex = HashMap<String, Vec<u32>>;

#[derive(Debug, Clone, PartialEq)]
pub enum AbstractText {
    Plain(String),
    InvertedIndex(InvertedIndex),
}

impl AbstractText {
    /// Prose form; `None` when it would be blank.
    pub fn resolve(&self) -> Option<String> {
        let text = match self {
            Self::Plain(text) => text.trim().to_string(),
            Self::InvertedIndex(index) => reconstruct_abstract(Some(index))?,
        };
        if text.is_empty() { None } else { Some(text) }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Plain(text) => text.trim().is_empty(),
            Self::InvertedIndex(index) => index.values().all(Vec::is_empty),
        }
    }
}

/// One source's view of a paper. Only the fields the source is authoritative
/// for are set.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRecord {
    pub source: SourceName,
    pub doi: Option<Doi>,
    /// Source-native identifier (OpenAlex work URL, S2 paper id, ...).
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub authors: Vec<Author>,
    pub abstract_text: Option<AbstractText>,
    pub citation_count: Option<u32>,
    pub citing_dois: BTreeSet<Doi>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub conference: Option<String>,
    pub published_date: Option<String>,
    pub publisher: Option<String>,
    pub work_type: Option<String>,
    pub pdf_url: Option<String>,
    pub html_url: Option<String>,
    pub references_count: Option<u32>,
}

impl PartialRecord {
    pub fn new(source: SourceName) -> Self {
        Self {
            source,
            doi: None,
            external_id: None,
            title: None,
            authors: Vec::new(),
            abstract_text: None,
            citation_count: None,
            citing_dois: BTreeSet::new(),
            year: None,
            journal: None,
            conference: None,
            published_date: None,
            publisher: None,
            work_type: None,
            pdf_url: None,
            html_url: None,
            references_count: None,
        }
    }

    /// True when the source supplied no metadata field at all. Identifiers
    /// alone do not count as a contribution.
    pub fn is_empty(&self) -> bool {
        let blank = |value: &Option<String>| value.as_deref().is_none_or(|s| s.trim().is_empty());
        blank(&self.title)
            && self.authors.iter().all(Author::is_empty)
            && self.abstract_text.as_ref().is_none_or(AbstractText::is_empty)
            && self.citation_count.is_none()
            && self.citing_dois.is_empty()
            && self.year.is_none()
            && blank(&self.journal)
            && blank(&self.conference)
            && blank(&self.published_date)
            && blank(&self.publisher)
            && blank(&self.work_type)
            && blank(&self.pdf_url)
            && blank(&self.html_url)
            && self.references_count.is_none()
    }
}

/// What a resolved record is keyed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Doi(Doi),
    /// PubMed article with no DOI; displays as `pmid:<pmid>`.
    Pmid(Pmid),
    /// Input that never validated; carries the normalized text.
    Unresolved(String),
}

impl RecordKey {
    pub fn doi(&self) -> Option<&Doi> {
        match self {
            Self::Doi(doi) => Some(doi),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Doi(doi) => write!(f, "{doi}"),
            Self::Pmid(pmid) => f.write_str(&pmid.placeholder_key()),
            Self::Unresolved(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for RecordKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The reconciled record handed back to callers and converted into a
/// [`Paper`] for the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperRecord {
    #[serde(rename = "doi")]
    pub key: RecordKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u32>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub citing_dois: BTreeSet<Doi>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub work_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references_count: Option<u32>,
    pub sources: BTreeSet<SourceName>,
}

impl PaperRecord {
    pub fn empty(key: RecordKey) -> Self {
        Self {
            key,
            title: None,
            authors: Vec::new(),
            abstract_text: None,
            citation_count: None,
            citing_dois: BTreeSet::new(),
            year: None,
            journal: None,
            conference: None,
            published_date: None,
            publisher: None,
            work_type: None,
            pdf_url: None,
            html_url: None,
            references_count: None,
            sources: BTreeSet::new(),
        }
    }

    pub fn doi(&self) -> Option<&Doi> {
        self.key.doi()
    }

    /// No source contributed anything.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn venue(&self) -> Option<&str> {
        self.journal.as_deref().or(self.conference.as_deref())
    }

    /// Rebuild a record from the stored copy of a paper.
    pub fn from_paper(doi: Doi, paper: &Paper) -> Self {
        let f = &paper.fields;
        Self {
            key: RecordKey::Doi(doi),
            title: f.title.clone(),
            authors: f.authors.clone(),
            abstract_text: f.abstract_text.clone(),
            citation_count: f.citation_count,
            citing_dois: f
                .citing_dois
                .iter()
                .filter_map(|raw| Doi::parse(raw).ok())
                .collect(),
            year: f.year,
            journal: f.journal.clone(),
            conference: f.conference.clone(),
            published_date: f.published_date.clone(),
            publisher: f.publisher.clone(),
            work_type: f.work_type.clone(),
            pdf_url: f.pdf_url.clone(),
            html_url: f.html_url.clone(),
            references_count: f.references_count,
            sources: f
                .sources
                .iter()
                .filter_map(|raw| raw.parse().ok())
                .collect(),
        }
    }

    /// Write payload for the paper store.
    pub fn to_fields(&self) -> PaperFields {
        PaperFields {
            title: self.title.clone(),
            authors: self.authors.clone(),
            abstract_text: self.abstract_text.clone(),
            citation_count: self.citation_count,
            citing_dois: self.citing_dois.iter().map(ToString::to_string).collect(),
            year: self.year,
            journal: self.journal.clone(),
            conference: self.conference.clone(),
            published_date: self.published_date.clone(),
            publisher: self.publisher.clone(),
            work_type: self.work_type.clone(),
            pdf_url: self.pdf_url.clone(),
            html_url: self.html_url.clone(),
            references_count: self.references_count,
            sources: self.sources.iter().map(ToString::to_string).collect(),
        }
    }
}
