//! The resolver facade: DOI or PMID in, reconciled record out.
//!
//! A DOI lookup runs normalize → claim → (first-lookup pause) → global slot
//! → concurrent fetch → merge → upsert. Citing-paper discovery runs after the
//! record has been returned, on its own task; short-lived callers wait for
//! it with [`Resolver::wait_for_background`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use paperlog_core::{AppConfig, Paper, PaperFields, PaperStore, upsert_paper};
use tokio::task::JoinSet;

use crate::enrichment::fetch::Fetcher;
use crate::enrichment::merge::merge;
use crate::error::{Result, ScienceError};
use crate::identifiers::{Doi, Pmid, doi};
use crate::rate_limit::{RateLimitSettings, RateLimiter};
use crate::search::Searcher;
use crate::sources::{
    CitationSource, CrossRefSource, ExternalSource, OpenAlexSource, PubMedSource,
    SemanticScholarSource,
};
use crate::types::{PaperRecord, RecordKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverSettings {
    pub citing_papers: bool,
    pub max_citing_papers: usize,
    pub local_hit_threshold: usize,
    pub default_limit: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ResolverSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            citing_papers: config.enrichment.citing_papers,
            max_citing_papers: config.enrichment.max_citing_papers,
            local_hit_threshold: config.search.local_hit_threshold,
            default_limit: config.search.default_limit,
        }
    }
}

pub struct Resolver {
    fetcher: Fetcher,
    searcher: Searcher,
    limiter: Arc<RateLimiter>,
    store: Arc<dyn PaperStore>,
    pubmed: Option<Arc<PubMedSource>>,
    citations: Option<Arc<dyn CitationSource>>,
    settings: ResolverSettings,
    background: Mutex<JoinSet<()>>,
}

impl Resolver {
    pub fn new(
        sources: Vec<Arc<dyn ExternalSource>>,
        limiter: Arc<RateLimiter>,
        store: Arc<dyn PaperStore>,
        settings: ResolverSettings,
    ) -> Self {
        let searcher = Searcher::new(
            sources.clone(),
            limiter.clone(),
            store.clone(),
            settings.local_hit_threshold,
        );
        Self {
            fetcher: Fetcher::new(sources),
            searcher,
            limiter,
            store,
            pubmed: None,
            citations: None,
            settings,
            background: Mutex::new(JoinSet::new()),
        }
    }

    /// Production wiring: CrossRef, OpenAlex and Semantic Scholar for DOI
    /// lookups and search, PubMed for PMIDs, Semantic Scholar for citing
    /// papers, wall-clock rate limiting.
    pub fn from_config(config: &AppConfig, store: Arc<dyn PaperStore>) -> Result<Self> {
        let sc = &config.sources;
        let email = sc.polite_email.as_deref();
        let timeout = Duration::from_secs(sc.request_timeout_secs);

        let crossref = Arc::new(CrossRefSource::with_params(&sc.crossref_url, email, timeout)?);
        let openalex = Arc::new(OpenAlexSource::with_params(&sc.openalex_url, email, timeout)?);
        let s2 = Arc::new(SemanticScholarSource::with_params(
            &sc.semantic_scholar_url,
            sc.semantic_scholar_api_key.clone(),
            email,
            timeout,
        )?);
        let pubmed = Arc::new(PubMedSource::with_params(&sc.pubmed_url, email, timeout)?);

        let limiter = Arc::new(RateLimiter::with_system_clock(RateLimitSettings::from(
            &config.rate_limit,
        )));

        let sources: Vec<Arc<dyn ExternalSource>> = vec![crossref, openalex, s2.clone()];
        Ok(Self::new(
            sources,
            limiter,
            store,
            ResolverSettings::from(config),
        )
        .with_pubmed(pubmed)
        .with_citation_source(s2))
    }

    pub fn with_pubmed(mut self, pubmed: Arc<PubMedSource>) -> Self {
        self.pubmed = Some(pubmed);
        self
    }

    pub fn with_citation_source(mut self, source: Arc<dyn CitationSource>) -> Self {
        self.citations = Some(source);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn store(&self) -> &Arc<dyn PaperStore> {
        &self.store
    }

    // ─── DOI ──────────────────────────────────────────────────────────────

    /// Never fails: any error yields an empty record keyed by the (normalized)
    /// input.
    pub async fn resolve_by_doi(&self, raw: &str) -> PaperRecord {
        match self.try_resolve_by_doi(raw).await {
            Ok(record) => record,
            Err(e) => {
                if e.is_input_error() {
                    tracing::debug!(input = raw, error = %e, "rejected DOI");
                } else {
                    tracing::warn!(input = raw, error = %e, "DOI resolution failed");
                }
                let key = Doi::parse(raw)
                    .map(RecordKey::Doi)
                    .unwrap_or_else(|_| RecordKey::Unresolved(doi::normalize(raw)));
                PaperRecord::empty(key)
            }
        }
    }

    pub async fn try_resolve_by_doi(&self, raw: &str) -> Result<PaperRecord> {
        let doi = Doi::parse(raw)?;
        let stored = self.stored(&doi).await;

        if !self.limiter.claim(&doi) {
            return stored
                .map(|paper| PaperRecord::from_paper(doi.clone(), &paper))
                .ok_or_else(|| ScienceError::CoolingDown(doi.to_string()));
        }

        if stored.is_none() {
            self.limiter.first_lookup_pause().await;
        }
        self.limiter.acquire_global().await;
        self.limiter.restamp(&doi);

        let report = self.fetcher.fetch_all(&doi).await;
        if report.rate_limited {
            self.limiter.penalize();
        }

        let mut record = merge(RecordKey::Doi(doi.clone()), report.partials);
        if record.is_empty() {
            return stored
                .map(|paper| PaperRecord::from_paper(doi.clone(), &paper))
                .ok_or_else(|| ScienceError::NotFound(doi.to_string()));
        }
        if let Some(paper) = &stored {
            record
                .citing_dois
                .extend(paper.fields.citing_dois.iter().filter_map(|d| Doi::parse(d).ok()));
        }

        match upsert_paper(self.store.as_ref(), doi.as_str(), &record.to_fields()).await {
            Ok(_) => tracing::info!(%doi, sources = ?record.sources, "resolved"),
            Err(e) => tracing::warn!(%doi, error = %e, "resolved but not persisted"),
        }

        self.spawn_citing_discovery(doi);
        Ok(record)
    }

    async fn stored(&self, doi: &Doi) -> Option<Paper> {
        match self.store.get_paper_by_doi(doi.as_str()).await {
            Ok(paper) => paper,
            Err(e) => {
                tracing::warn!(%doi, error = %e, "paper store lookup failed");
                None
            }
        }
    }

    // ─── Citing papers ────────────────────────────────────────────────────

    fn spawn_citing_discovery(&self, doi: Doi) {
        if !self.settings.citing_papers {
            return;
        }
        let Some(citations) = self.citations.clone() else {
            return;
        };
        let limiter = self.limiter.clone();
        let store = self.store.clone();
        let max = self.settings.max_citing_papers;

        let mut tasks = self.background();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) =
                discover(citations.as_ref(), limiter.as_ref(), store.as_ref(), &doi, max).await
            {
                tracing::warn!(%doi, error = %e, "citing-paper discovery failed");
            }
        });
    }

    /// Wait for citing-paper discovery tasks spawned so far.
    pub async fn wait_for_background(&self) {
        let mut tasks = std::mem::take(&mut *self.background());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "background task panicked or was cancelled");
            }
        }
    }

    fn background(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.background.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetch the DOIs citing `raw` and merge them into the stored paper.
    pub async fn discover_citing(&self, raw: &str) -> Result<Vec<Doi>> {
        let doi = Doi::parse(raw)?;
        let citations = self
            .citations
            .as_deref()
            .ok_or_else(|| ScienceError::SourceUnavailable("citations".to_string()))?;
        discover(
            citations,
            self.limiter.as_ref(),
            self.store.as_ref(),
            &doi,
            self.settings.max_citing_papers,
        )
        .await
    }

    // ─── PMID ─────────────────────────────────────────────────────────────

    /// `None` on any failure.
    pub async fn resolve_by_pmid(&self, raw: &str) -> Option<PaperRecord> {
        match self.try_resolve_by_pmid(raw).await {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(input = raw, error = %e, "PMID resolution failed");
                None
            }
        }
    }

    /// Convert to a DOI via PubMed and resolve that. When PubMed has no DOI,
    /// or the DOI lookup yields nothing, the PubMed fields alone are returned;
    /// such a record is not persisted.
    pub async fn try_resolve_by_pmid(&self, raw: &str) -> Result<PaperRecord> {
        let pmid = Pmid::parse(raw)?;
        let pubmed = self
            .pubmed
            .as_ref()
            .ok_or_else(|| ScienceError::SourceUnavailable("pubmed".to_string()))?;

        self.limiter.acquire_global().await;
        let article = match pubmed.fetch_article(&pmid).await {
            Ok(Some(article)) => article,
            Ok(None) => return Err(ScienceError::NotFound(pmid.placeholder_key())),
            Err(e) => {
                if e.is_rate_limit() {
                    self.limiter.penalize();
                }
                return Err(e);
            }
        };

        let key = match &article.doi {
            Some(doi) => match self.try_resolve_by_doi(doi.as_str()).await {
                Ok(record) => return Ok(record),
                Err(e) => {
                    tracing::debug!(%pmid, %doi, error = %e, "falling back to PubMed fields");
                    RecordKey::Doi(doi.clone())
                }
            },
            None => RecordKey::Pmid(pmid),
        };
        Ok(merge(key, vec![article.into_partial()]))
    }

    // ─── Search ───────────────────────────────────────────────────────────

    /// `limit == 0` means the configured default.
    pub async fn search_by_keywords(&self, query: &str, limit: usize) -> Vec<PaperRecord> {
        let limit = if limit == 0 {
            self.settings.default_limit
        } else {
            limit
        };
        match self.searcher.search(query, limit).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(query, error = %e, "keyword search failed");
                Vec::new()
            }
        }
    }
}

async fn discover(
    citations: &dyn CitationSource,
    limiter: &RateLimiter,
    store: &dyn PaperStore,
    doi: &Doi,
    max: usize,
) -> Result<Vec<Doi>> {
    limiter.acquire_global().await;
    let citing = match citations.fetch_citing_dois(doi, max).await {
        Ok(citing) => citing,
        Err(e) => {
            if e.is_rate_limit() {
                limiter.penalize();
            }
            return Err(e);
        }
    };

    if !citing.is_empty() {
        let fields = PaperFields {
            citing_dois: citing.iter().map(ToString::to_string).collect(),
            ..Default::default()
        };
        upsert_paper(store, doi.as_str(), &fields).await?;
        tracing::debug!(%doi, count = citing.len(), "stored citing papers");
    }
    Ok(citing)
}
