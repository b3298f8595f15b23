use std::sync::Arc;

use futures::future::join_all;

use crate::identifiers::Doi;
use crate::sources::ExternalSource;
use crate::types::{PartialRecord, SourceName};

/// Outcome of one concurrent batch against every source.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// Answers that carried a record, in source priority order.
    pub partials: Vec<PartialRecord>,
    pub failures: Vec<(SourceName, String)>,
    /// At least one source answered HTTP 429.
    pub rate_limited: bool,
}

impl FetchReport {
    pub fn sources_answered(&self) -> Vec<SourceName> {
        self.partials.iter().map(|p| p.source).collect()
    }
}

/// Queries all registered sources at once and waits for every one to settle.
/// A failing source only loses its own contribution.
#[derive(Clone)]
pub struct Fetcher {
    sources: Vec<Arc<dyn ExternalSource>>,
}

impl Fetcher {
    pub fn new(mut sources: Vec<Arc<dyn ExternalSource>>) -> Self {
        sources.sort_by_key(|s| s.name().priority());
        Self { sources }
    }

    pub fn sources(&self) -> &[Arc<dyn ExternalSource>] {
        &self.sources
    }

    pub async fn fetch_all(&self, doi: &Doi) -> FetchReport {
        let results = join_all(self.sources.iter().map(|source| async move {
            (source.name(), source.fetch_by_doi(doi).await)
        }))
        .await;

        let mut report = FetchReport::default();
        for (name, result) in results {
            match result {
                Ok(Some(partial)) => report.partials.push(partial),
                Ok(None) => tracing::debug!(source = %name, %doi, "no record"),
                Err(e) => {
                    tracing::warn!(source = %name, %doi, error = %e, "source lookup failed");
                    report.rate_limited |= e.is_rate_limit();
                    report.failures.push((name, e.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::{Result, ScienceError};

    struct Canned {
        name: SourceName,
        outcome: fn() -> Result<Option<PartialRecord>>,
    }

    #[async_trait]
    impl ExternalSource for Canned {
        fn name(&self) -> SourceName {
            self.name
        }

        async fn fetch_by_doi(&self, _doi: &Doi) -> Result<Option<PartialRecord>> {
            (self.outcome)()
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<PartialRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn failures_are_isolated_and_order_is_by_priority() {
        let fetcher = Fetcher::new(vec![
            Arc::new(Canned {
                name: SourceName::SemanticScholar,
                outcome: || {
                    let mut p = PartialRecord::new(SourceName::SemanticScholar);
                    p.year = Some(2001);
                    Ok(Some(p))
                },
            }),
            Arc::new(Canned {
                name: SourceName::OpenAlex,
                outcome: || Err(ScienceError::RateLimit("openalex".to_string(), 5)),
            }),
            Arc::new(Canned {
                name: SourceName::CrossRef,
                outcome: || Ok(Some(PartialRecord::new(SourceName::CrossRef))),
            }),
        ]);

        let report = fetcher.fetch_all(&Doi::parse("10.1000/x").unwrap()).await;
        assert_eq!(
            report.sources_answered(),
            vec![SourceName::CrossRef, SourceName::SemanticScholar]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, SourceName::OpenAlex);
        assert!(report.rate_limited);
    }
}
