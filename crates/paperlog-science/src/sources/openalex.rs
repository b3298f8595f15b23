use std::time::Duration;

use async_trait::async_trait;
use paperlog_core::Author;
use reqwest::Url;
use serde_json::Value;

use crate::error::{Result, ScienceError};
use crate::http::{HttpClient, user_agent};
use crate::identifiers::Doi;
use crate::sources::{ExternalSource, classify_venue, found, text};
use crate::types::{AbstractText, InvertedIndex, PartialRecord, SourceName};

const BASE_URL: &str = "https://api.openalex.org";

/// OpenAlex caps `per-page` at 200.
const MAX_PER_PAGE: usize = 200;

pub struct OpenAlexSource {
    client: HttpClient,
    base_url: String,
}

impl OpenAlexSource {
    pub fn new(polite_email: Option<&str>) -> Result<Self> {
        Self::with_params(BASE_URL, polite_email, Duration::from_secs(30))
    }

    pub fn with_params(base_url: &str, polite_email: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(SourceName::OpenAlex, &user_agent(polite_email), timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn fetch_work(&self, doi: &Doi) -> Result<Option<OpenAlexWork>> {
        let url = format!("{}/works/doi:{}", self.base_url, doi.path_encoded());
        let work = found(self.client.get_json::<Value>(&url).await)?;
        Ok(work.as_ref().map(OpenAlexWork::from_json))
    }

    pub async fn search_works(&self, query: &str, limit: usize) -> Result<Vec<OpenAlexWork>> {
        let mut url = parse_base_url(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| ScienceError::Parse("invalid OpenAlex base URL".to_string()))?
            .pop_if_empty()
            .push("works");
        url.query_pairs_mut()
            .append_pair("search", query)
            .append_pair("per-page", &limit.clamp(1, MAX_PER_PAGE).to_string());

        let json: Value = self.client.get_json(url.as_str()).await?;
        Ok(json
            .get("results")
            .and_then(Value::as_array)
            .map(|results| results.iter().map(OpenAlexWork::from_json).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ExternalSource for OpenAlexSource {
    fn name(&self) -> SourceName {
        SourceName::OpenAlex
    }

    async fn fetch_by_doi(&self, doi: &Doi) -> Result<Option<PartialRecord>> {
        Ok(self.fetch_work(doi).await?.map(OpenAlexWork::into_partial))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PartialRecord>> {
        Ok(self
            .search_works(query, limit)
            .await?
            .into_iter()
            .map(OpenAlexWork::into_partial)
            .collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenAlexWork {
    pub id: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub publication_year: Option<i32>,
    pub publication_date: Option<String>,
    pub work_type: Option<String>,
    pub venue: Option<String>,
    pub venue_is_conference: bool,
    pub publisher: Option<String>,
    pub cited_by_count: Option<u32>,
    pub referenced_works_count: Option<u32>,
    pub pdf_url: Option<String>,
    pub landing_page_url: Option<String>,
    /// Kept as served; only rebuilt into prose if it wins the merge.
    pub abstract_inverted_index: Option<InvertedIndex>,
}

impl OpenAlexWork {
    pub fn from_json(v: &Value) -> Self {
        let str_at = |value: &Value| text(value.as_str());
        let count_at = |value: &Value| value.as_u64().and_then(|n| u32::try_from(n).ok());

        let authors = v
            .get("authorships")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|a| text(a["author"]["display_name"].as_str()))
                    .collect()
            })
            .unwrap_or_default();

        let primary = &v["primary_location"];
        let venue_source = &primary["source"];

        let abstract_inverted_index = v
            .get("abstract_inverted_index")
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(token, positions)| {
                        let values = positions
                            .as_array()?
                            .iter()
                            .filter_map(Value::as_u64)
                            .filter_map(|n| u32::try_from(n).ok())
                            .collect::<Vec<_>>();
                        if values.is_empty() {
                            None
                        } else {
                            Some((token.clone(), values))
                        }
                    })
                    .collect::<InvertedIndex>()
            });

        Self {
            id: str_at(&v["id"]),
            doi: str_at(&v["doi"]),
            title: str_at(&v["title"]).or_else(|| str_at(&v["display_name"])),
            authors,
            publication_year: v["publication_year"]
                .as_i64()
                .and_then(|n| i32::try_from(n).ok()),
            publication_date: str_at(&v["publication_date"]),
            work_type: str_at(&v["type"]),
            venue: str_at(&venue_source["display_name"]),
            venue_is_conference: venue_source["type"].as_str() == Some("conference"),
            publisher: str_at(&venue_source["host_organization_name"]),
            cited_by_count: count_at(&v["cited_by_count"]),
            referenced_works_count: count_at(&v["referenced_works_count"]),
            pdf_url: str_at(&primary["pdf_url"])
                .or_else(|| str_at(&v["best_oa_location"]["pdf_url"])),
            landing_page_url: str_at(&primary["landing_page_url"]),
            abstract_inverted_index,
        }
    }

    pub fn into_partial(self) -> PartialRecord {
        let mut partial = PartialRecord::new(SourceName::OpenAlex);
        partial.doi = self.doi.as_deref().and_then(|d| Doi::parse(d).ok());
        partial.external_id = self.id;
        partial.title = self.title;
        partial.authors = self.authors.into_iter().map(Author::from_name).collect();
        partial.abstract_text = self.abstract_inverted_index.map(AbstractText::InvertedIndex);
        partial.citation_count = self.cited_by_count;
        partial.references_count = self.referenced_works_count;
        partial.year = self.publication_year;
        partial.published_date = self.publication_date;
        partial.work_type = self.work_type;
        partial.publisher = self.publisher;
        partial.pdf_url = self.pdf_url;
        partial.html_url = self.landing_page_url;
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

fn parse_base_url(base_url: &str) -> Result<Url> {
    Url::parse(base_url).map_err(|e| ScienceError::Parse(format!("invalid URL {base_url}: {e}")))
}
