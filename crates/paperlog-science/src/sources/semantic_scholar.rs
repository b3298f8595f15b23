use std::time::Duration;

use async_trait::async_trait;
use paperlog_core::Author;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::error::{Result, ScienceError};
use crate::http::{HttpClient, user_agent};
use crate::identifiers::Doi;
use crate::sources::{CitationSource, ExternalSource, classify_venue, found, text};
use crate::types::{AbstractText, PartialRecord, SourceName};

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";
const PAPER_FIELDS: &str = "paperId,externalIds,title,abstract,year,authors,citationCount,referenceCount,venue,publicationVenue,publicationTypes,publicationDate,journal,openAccessPdf,url";
const CITATION_FIELDS: &str = "externalIds";
const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");
const MAX_SEARCH_LIMIT: usize = 100;
const MAX_CITATION_LIMIT: usize = 1000;

pub struct SemanticScholarSource {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarSource {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_params(BASE_URL, api_key, None, Duration::from_secs(30))
    }

    pub fn with_params(
        base_url: &str,
        api_key: Option<String>,
        polite_email: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(SourceName::SemanticScholar, &user_agent(polite_email), timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()),
        })
    }

    pub async fn fetch_paper(&self, doi: &Doi) -> Result<Option<S2Paper>> {
        let url = format!(
            "{}/paper/DOI:{}?fields={}",
            self.base_url,
            doi.path_encoded(),
            PAPER_FIELDS
        );
        let json = found(
            self.client
                .get_json_with_headers::<Value>(&url, self.auth_headers()?)
                .await,
        )?;
        Ok(json.as_ref().map(S2Paper::from_json))
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = self.api_key.as_deref() {
            let value =
                HeaderValue::from_str(key).map_err(|e| ScienceError::Parse(e.to_string()))?;
            headers.insert(API_KEY_HEADER, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl ExternalSource for SemanticScholarSource {
    fn name(&self) -> SourceName {
        SourceName::SemanticScholar
    }

    async fn fetch_by_doi(&self, doi: &Doi) -> Result<Option<PartialRecord>> {
        Ok(self.fetch_paper(doi).await?.map(S2Paper::into_partial))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PartialRecord>> {
        let url = format!(
            "{}/paper/search?query={}&limit={}&fields={}",
            self.base_url,
            urlencoding::encode(query),
            limit.clamp(1, MAX_SEARCH_LIMIT),
            PAPER_FIELDS
        );
        let json: Value = self
            .client
            .get_json_with_headers(&url, self.auth_headers()?)
            .await?;

        Ok(json
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| S2Paper::from_json(item).into_partial())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl CitationSource for SemanticScholarSource {
    async fn fetch_citing_dois(&self, doi: &Doi, limit: usize) -> Result<Vec<Doi>> {
        let url = format!(
            "{}/paper/DOI:{}/citations?fields={}&limit={}",
            self.base_url,
            doi.path_encoded(),
            CITATION_FIELDS,
            limit.clamp(1, MAX_CITATION_LIMIT)
        );
        let Some(json) = found(
            self.client
                .get_json_with_headers::<Value>(&url, self.auth_headers()?)
                .await,
        )?
        else {
            return Ok(Vec::new());
        };

        let mut dois: Vec<Doi> = json
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item["citingPaper"]["externalIds"]["DOI"].as_str())
                    .filter_map(|raw| Doi::parse(raw).ok())
                    .collect()
            })
            .unwrap_or_default();
        dois.sort();
        dois.dedup();
        dois.truncate(limit);
        Ok(dois)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct S2Paper {
    pub paper_id: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub publication_date: Option<String>,
    pub authors: Vec<String>,
    pub citation_count: Option<u32>,
    pub reference_count: Option<u32>,
    pub venue: Option<String>,
    pub venue_is_conference: bool,
    pub open_access_pdf: Option<String>,
    pub url: Option<String>,
}

impl S2Paper {
    pub fn from_json(v: &Value) -> Self {
        let publication_venue = &v["publicationVenue"];
        let venue = text(publication_venue["name"].as_str())
            .or_else(|| text(v["venue"].as_str()))
            .or_else(|| text(v["journal"]["name"].as_str()));
        let typed_conference = v["publicationTypes"]
            .as_array()
            .is_some_and(|types| types.iter().any(|t| t.as_str() == Some("Conference")));

        Self {
            paper_id: text(v["paperId"].as_str()),
            doi: text(v["externalIds"]["DOI"].as_str()),
            title: text(v["title"].as_str()),
            abstract_text: text(v["abstract"].as_str()),
            year: v["year"].as_i64().and_then(|n| i32::try_from(n).ok()),
            publication_date: text(v["publicationDate"].as_str()),
            authors: v["authors"]
                .as_array()
                .map(|arr| arr.iter().filter_map(|a| text(a["name"].as_str())).collect())
                .unwrap_or_default(),
            citation_count: as_u32(&v["citationCount"]),
            reference_count: as_u32(&v["referenceCount"]),
            venue,
            venue_is_conference: publication_venue["type"].as_str() == Some("conference")
                || typed_conference,
            open_access_pdf: text(v["openAccessPdf"]["url"].as_str()),
            url: text(v["url"].as_str()),
        }
    }

    pub fn into_partial(self) -> PartialRecord {
        let mut partial = PartialRecord::new(SourceName::SemanticScholar);
        partial.doi = self.doi.as_deref().and_then(|d| Doi::parse(d).ok());
        partial.external_id = self.paper_id;
        partial.title = self.title;
        partial.authors = self.authors.into_iter().map(Author::from_name).collect();
        partial.abstract_text = self.abstract_text.map(AbstractText::Plain);
        partial.year = self.year;
        partial.published_date = self.publication_date;
        partial.citation_count = self.citation_count;
        partial.references_count = self.reference_count;
        partial.pdf_url = self.open_access_pdf;
        partial.html_url = self.url;
        if let Some(venue) = self
            .venue
            .as_deref()
            .and_then(|name| classify_venue(name, self.venue_is_conference))
        {
            venue.apply(&mut partial);
        }
        partial
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};

    use super::*;

    fn source(base_url: &str, api_key: Option<&str>) -> SemanticScholarSource {
        SemanticScholarSource::with_params(
            base_url,
            api_key.map(str::to_string),
            None,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_sends_api_key_and_maps_paper() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/paper/DOI:10.48550/arxiv.1706.03762")
            .match_query(Matcher::Any)
            .match_header("x-api-key", "secret")
            .with_status(200)
            .with_body(
                r#"{
                    "paperId": "204e3073870fae3d05bcbc2f6a8e263d9b72e776",
                    "externalIds": {"DOI": "10.48550/arXiv.1706.03762", "ArXiv": "1706.03762"},
                    "title": "Attention Is All You Need",
                    "abstract": "The dominant sequence transduction models...",
                    "year": 2017,
                    "authors": [{"name": "Ashish Vaswani"}, {"name": "Noam Shazeer"}],
                    "citationCount": 90000,
                    "referenceCount": 41,
                    "venue": "Neural Information Processing Systems",
                    "publicationVenue": {"name": "Neural Information Processing Systems", "type": "conference"},
                    "openAccessPdf": {"url": "https://arxiv.org/pdf/1706.03762"}
                }"#,
            )
            .create_async()
            .await;

        let doi = Doi::parse("10.48550/arXiv.1706.03762").unwrap();
        let partial = source(&server.url(), Some("secret"))
            .fetch_by_doi(&doi)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(partial.doi, Some(doi));
        assert_eq!(
            partial.external_id.as_deref(),
            Some("204e3073870fae3d05bcbc2f6a8e263d9b72e776")
        );
        assert_eq!(partial.authors.len(), 2);
        assert_eq!(partial.citation_count, Some(90000));
        assert_eq!(
            partial.conference.as_deref(),
            Some("Neural Information Processing Systems")
        );
        assert_eq!(partial.pdf_url.as_deref(), Some("https://arxiv.org/pdf/1706.03762"));
    }

    #[tokio::test]
    async fn citing_dois_are_normalized_and_deduplicated() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/paper/DOI:10.1000/x/citations")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"data": [
                    {"citingPaper": {"externalIds": {"DOI": "10.2000/B"}}},
                    {"citingPaper": {"externalIds": {"DOI": "10.2000/a"}}},
                    {"citingPaper": {"externalIds": {"DOI": "10.2000/b"}}},
                    {"citingPaper": {"externalIds": {"ArXiv": "2101.00001"}}}
                ]}"#,
            )
            .create_async()
            .await;

        let doi = Doi::parse("10.1000/x").unwrap();
        let citing = source(&server.url(), None)
            .fetch_citing_dois(&doi, 10)
            .await
            .unwrap();
        let citing: Vec<&str> = citing.iter().map(Doi::as_str).collect();
        assert_eq!(citing, vec!["10.2000/a", "10.2000/b"]);
    }

    #[tokio::test]
    async fn search_reads_data_array() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/paper/search")
            .match_query(Matcher::UrlEncoded("query".into(), "transformers".into()))
            .with_status(200)
            .with_body(r#"{"total": 1, "data": [{"paperId": "abc", "title": "T", "citationCount": 4}]}"#)
            .create_async()
            .await;

        let hits = source(&server.url(), None).search("transformers", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doi, None);
        assert_eq!(hits[0].external_id.as_deref(), Some("abc"));
        assert_eq!(hits[0].citation_count, Some(4));
    }
}
