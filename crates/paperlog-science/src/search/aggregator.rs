use std::collections::HashMap;
use std::sync::Arc;

use paperlog_core::PaperStore;

use crate::error::Result;
use crate::identifiers::Doi;
use crate::rate_limit::RateLimiter;
use crate::search::query::SearchQuery;
use crate::sources::ExternalSource;
use crate::types::{PaperRecord, PartialRecord, RecordKey};

/// Keyword search over the local store, topped up from upstream sources when
/// the store has too few hits.
pub struct Searcher {
    sources: Vec<Arc<dyn ExternalSource>>,
    limiter: Arc<RateLimiter>,
    store: Arc<dyn PaperStore>,
    local_hit_threshold: usize,
}

impl Searcher {
    pub fn new(
        mut sources: Vec<Arc<dyn ExternalSource>>,
        limiter: Arc<RateLimiter>,
        store: Arc<dyn PaperStore>,
        local_hit_threshold: usize,
    ) -> Self {
        sources.sort_by_key(|s| s.name().priority());
        Self {
            sources,
            limiter,
            store,
            local_hit_threshold,
        }
    }

    /// Deduplicated by DOI, ordered by citation count (missing counts as 0),
    /// at most `limit` records.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperRecord>> {
        let parsed = SearchQuery::parse(query);
        if limit == 0 || parsed.terms().is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = Hits::default();
        for paper in self
            .store
            .search_papers(&parsed.plain_text(), limit.max(self.local_hit_threshold))
            .await?
        {
            if let Ok(doi) = Doi::parse(&paper.doi) {
                hits.insert_record(PaperRecord::from_paper(doi, &paper));
            }
        }

        if hits.len() >= self.local_hit_threshold {
            tracing::debug!(query, local = hits.len(), "answered from local store");
            return Ok(hits.ranked(limit));
        }

        let source_query = parsed.to_source_query();
        for source in &self.sources {
            if hits.len() >= limit {
                break;
            }
            self.limiter.acquire_global().await;
            match source.search(&source_query, limit).await {
                Ok(partials) => {
                    tracing::debug!(source = %source.name(), hits = partials.len(), "search page");
                    for partial in partials {
                        hits.insert_partial(partial);
                    }
                }
                Err(e) => {
                    if e.is_rate_limit() {
                        self.limiter.penalize();
                    }
                    tracing::warn!(source = %source.name(), error = %e, "search failed");
                }
            }
        }

        Ok(hits.ranked(limit))
    }
}

/// Search results keyed by canonical DOI, in first-seen order.
#[derive(Default)]
struct Hits {
    records: Vec<PaperRecord>,
    index: HashMap<Doi, usize>,
}

impl Hits {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn insert_record(&mut self, record: PaperRecord) {
        let Some(doi) = record.doi().cloned() else {
            return;
        };
        if !self.index.contains_key(&doi) {
            self.index.insert(doi, self.records.len());
            self.records.push(record);
        }
    }

    /// A hit without a DOI survives only if its source identifier is one.
    fn insert_partial(&mut self, partial: PartialRecord) {
        let Some(doi) = partial
            .doi
            .clone()
            .or_else(|| partial.external_id.as_deref().and_then(|id| Doi::parse(id).ok()))
        else {
            return;
        };

        match self.index.get(&doi) {
            Some(&i) => self.records[i].absorb(partial),
            None => {
                let mut record = PaperRecord::empty(RecordKey::Doi(doi.clone()));
                record.absorb(partial);
                self.index.insert(doi, self.records.len());
                self.records.push(record);
            }
        }
    }

    fn ranked(mut self, limit: usize) -> Vec<PaperRecord> {
        self.records
            .sort_by_key(|r| std::cmp::Reverse(r.citation_count.unwrap_or(0)));
        self.records.truncate(limit);
        self.records
    }
}
