use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use paperlog_core::Author;
use regex::Regex;
use serde_json::Value;

use crate::error::Result;
use crate::http::{HttpClient, user_agent};
use crate::identifiers::Doi;
use crate::sources::{ExternalSource, classify_venue, found, text, unescape_xml};
use crate::types::{AbstractText, PartialRecord, SourceName};

static MARKUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

pub struct CrossRefSource {
    client: HttpClient,
    base_url: String,
}

impl CrossRefSource {
    pub fn new(polite_email: Option<&str>) -> Result<Self> {
        Self::with_params("https://api.crossref.org", polite_email, Duration::from_secs(30))
    }

    pub fn with_params(base_url: &str, polite_email: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = HttpClient::new(SourceName::CrossRef, &user_agent(polite_email), timeout)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn fetch_work(&self, doi: &Doi) -> Result<Option<CrossRefWork>> {
        let url = format!("{}/works/{}", self.base_url, doi.path_encoded());
        let Some(val) = found(self.client.get_json::<Value>(&url).await)? else {
            return Ok(None);
        };
        Ok(Some(CrossRefWork::from_json(&val["message"])))
    }
}

#[async_trait]
impl ExternalSource for CrossRefSource {
    fn name(&self) -> SourceName {
        SourceName::CrossRef
    }

    async fn fetch_by_doi(&self, doi: &Doi) -> Result<Option<PartialRecord>> {
        Ok(self.fetch_work(doi).await?.map(CrossRefWork::into_partial))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PartialRecord>> {
        let url = format!(
            "{}/works?query={}&rows={}",
            self.base_url,
            urlencoding::encode(query),
            limit.max(1)
        );
        let val: Value = self.client.get_json(&url).await?;

        Ok(val["message"]["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| CrossRefWork::from_json(item).into_partial())
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// The subset of a CrossRef `message` object we read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossRefWork {
    pub doi: Option<String>,
    pub title: Option<String>,
    pub authors: Vec<Author>,
    pub abstract_text: Option<String>,
    pub container_title: Option<String>,
    pub work_type: Option<String>,
    pub publisher: Option<String>,
    pub published: Option<(i32, Option<u32>, Option<u32>)>,
    pub reference_count: Option<u32>,
    pub citation_count: Option<u32>,
    pub pdf_url: Option<String>,
    pub html_url: Option<String>,
}

impl CrossRefWork {
    pub fn from_json(v: &Value) -> Self {
        let authors = v["author"]
            .as_array()
            .map(|list| {
                list.iter()
                    .map(|a| {
                        Author::from_parts(
                            text(a["given"].as_str()),
                            text(a["family"].as_str()),
                            text(a["name"].as_str()),
                        )
                    })
                    .filter(|a| !a.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let pdf_url = v["link"].as_array().and_then(|links| {
            links
                .iter()
                .find(|l| l["content-type"].as_str() == Some("application/pdf"))
                .and_then(|l| text(l["URL"].as_str()))
        });

        Self {
            doi: text(v["DOI"].as_str()),
            title: text(v["title"][0].as_str()),
            authors,
            abstract_text: v["abstract"].as_str().and_then(strip_jats),
            container_title: text(v["container-title"][0].as_str()),
            work_type: text(v["type"].as_str()),
            publisher: text(v["publisher"].as_str()),
            published: parse_date(v),
            reference_count: v["reference-count"].as_u64().map(|n| n as u32),
            citation_count: v["is-referenced-by-count"].as_u64().map(|n| n as u32),
            pdf_url,
            html_url: text(v["resource"]["primary"]["URL"].as_str())
                .or_else(|| text(v["URL"].as_str())),
        }
    }

    pub fn into_partial(self) -> PartialRecord {
        let mut partial = PartialRecord::new(SourceName::CrossRef);
        partial.doi = self.doi.as_deref().and_then(|d| Doi::parse(d).ok());
        partial.external_id = self.doi;
        partial.title = self.title;
        partial.authors = self.authors;
        partial.abstract_text = self.abstract_text.map(AbstractText::Plain);
        partial.citation_count = self.citation_count;
        partial.references_count = self.reference_count;
        partial.publisher = self.publisher;
        partial.pdf_url = self.pdf_url;
        partial.html_url = self.html_url;

        if let Some((year, month, day)) = self.published {
            partial.year = Some(year);
            partial.published_date = Some(match (month, day) {
                (Some(m), Some(d)) => format!("{year:04}-{m:02}-{d:02}"),
                (Some(m), None) => format!("{year:04}-{m:02}"),
                _ => format!("{year:04}"),
            });
        }

        let proceedings = self
            .work_type
            .as_deref()
            .is_some_and(|t| t.starts_with("proceedings"));
        if let Some(venue) = self
            .container_title
            .as_deref()
            .and_then(|name| classify_venue(name, proceedings))
        {
            venue.apply(&mut partial);
        }
        partial.work_type = self.work_type;
        partial
    }
}

fn parse_date(v: &Value) -> Option<(i32, Option<u32>, Option<u32>)> {
    ["published-print", "published-online", "published", "issued", "created"]
        .iter()
        .map(|key| &v[*key]["date-parts"][0])
        .find_map(|parts| {
            let year = parts[0].as_i64()? as i32;
            let month = parts[1].as_u64().map(|n| n as u32);
            let day = parts[2].as_u64().map(|n| n as u32);
            Some((year, month, day))
        })
}

/// CrossRef abstracts are JATS XML fragments; keep only the prose.
fn strip_jats(raw: &str) -> Option<String> {
    let plain = unescape_xml(&MARKUP_RE.replace_all(raw, " "));
    let plain = WHITESPACE_RE.replace_all(plain.trim(), " ");
    let plain = plain.trim().trim_start_matches("Abstract ").trim();
    if plain.is_empty() { None } else { Some(plain.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn source(base_url: &str) -> CrossRefSource {
        CrossRefSource::with_params(base_url, None, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_crossref_fetch_by_doi() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/works/10.1038/nature14539")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                "status": "ok",
                "message": {
                    "DOI": "10.1038/nature14539",
                    "title": ["Human-level control through deep reinforcement learning"],
                    "author": [
                        {"given": "Volodymyr", "family": "Mnih"},
                        {"given": "Koray", "family": "Kavukcuoglu"}
                    ],
                    "abstract": "<jats:p>The theory of <jats:italic>reinforcement</jats:italic> learning.</jats:p>",
                    "published-print": {"date-parts": [[2015, 2, 26]]},
                    "type": "journal-article",
                    "container-title": ["Nature"],
                    "publisher": "Springer Science and Business Media LLC",
                    "is-referenced-by-count": 20000,
                    "reference-count": 31,
                    "link": [{"URL": "https://example.org/paper.pdf", "content-type": "application/pdf"}],
                    "resource": {"primary": {"URL": "https://www.nature.com/articles/nature14539"}}
                }
            }"#,
            )
            .create_async()
            .await;

        let doi = Doi::parse("10.1038/nature14539").unwrap();
        let partial = source(&server.url()).fetch_by_doi(&doi).await.unwrap().unwrap();

        assert_eq!(partial.source, SourceName::CrossRef);
        assert_eq!(partial.doi, Some(doi));
        assert_eq!(
            partial.title.as_deref(),
            Some("Human-level control through deep reinforcement learning")
        );
        assert_eq!(partial.authors.len(), 2);
        assert_eq!(partial.authors[0].display_name(), "Volodymyr Mnih");
        assert_eq!(
            partial.abstract_text,
            Some(AbstractText::Plain(
                "The theory of reinforcement learning.".to_string()
            ))
        );
        assert_eq!(partial.year, Some(2015));
        assert_eq!(partial.published_date.as_deref(), Some("2015-02-26"));
        assert_eq!(partial.journal.as_deref(), Some("Nature"));
        assert_eq!(partial.conference, None);
        assert_eq!(partial.citation_count, Some(20000));
        assert_eq!(partial.references_count, Some(31));
        assert_eq!(partial.pdf_url.as_deref(), Some("https://example.org/paper.pdf"));
        assert_eq!(
            partial.html_url.as_deref(),
            Some("https://www.nature.com/articles/nature14539")
        );
    }

    #[tokio::test]
    async fn unknown_doi_is_none() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/works/10.1000/missing")
            .with_status(404)
            .create_async()
            .await;

        let doi = Doi::parse("10.1000/missing").unwrap();
        assert!(source(&server.url()).fetch_by_doi(&doi).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_maps_items() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "graph neural".into()),
                Matcher::UrlEncoded("rows".into(), "5".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"message": {"items": [
                    {"DOI": "10.1145/1", "title": ["A"], "type": "proceedings-article",
                     "container-title": ["KDD"], "is-referenced-by-count": 3},
                    {"title": ["No DOI"]}
                ]}}"#,
            )
            .create_async()
            .await;

        let hits = source(&server.url()).search("graph neural", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doi.as_ref().map(Doi::as_str), Some("10.1145/1"));
        assert_eq!(hits[0].conference.as_deref(), Some("KDD"));
        assert_eq!(hits[1].doi, None);
    }

    #[test]
    fn jats_markup_is_stripped() {
        assert_eq!(
            strip_jats("<jats:title>Abstract</jats:title><jats:p>Deep\n  learning.</jats:p>"),
            Some("Deep learning.".to_string())
        );
        assert_eq!(strip_jats("<jats:p> </jats:p>"), None);
    }

    #[test]
    fn jats_entities_are_decoded() {
        assert_eq!(
            strip_jats("<jats:p>Crohn&#x2019;s disease &amp; caf&#233; &lt;5%</jats:p>"),
            Some("Crohn\u{2019}s disease & caf\u{e9} <5%".to_string())
        );
    }
}
