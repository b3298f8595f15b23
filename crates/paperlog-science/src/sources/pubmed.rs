//! PubMed E-utilities `efetch`, used to turn a PMID into a DOI.
//!
//! The XML is read with targeted patterns rather than a full parser: a
//! DOI-typed identifier first, then any article identifier that looks like a
//! DOI. The reference list is cut off beforehand so cited works' DOIs are
//! never mistaken for the article's own.

use std::time::Duration;

use once_cell::sync::Lazy;
use paperlog_core::Author;
use regex::Regex;

use crate::error::Result;
use crate::http::{HttpClient, user_agent};
use crate::identifiers::{Doi, Pmid};
use crate::sources::{text, unescape_xml};
use crate::types::{PaperRecord, PartialRecord, RecordKey, SourceName};

const BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

static TYPED_ARTICLE_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<ArticleId[^>]*\bIdType="doi"[^>]*>\s*([^<]+?)\s*</ArticleId>"#)
        .expect("valid regex")
});
static ELOCATION_DOI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<ELocationID[^>]*\bEIdType="doi"[^>]*>\s*([^<]+?)\s*</ELocationID>"#)
        .expect("valid regex")
});
static ANY_ARTICLE_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<ArticleId[^>]*>\s*([^<]+?)\s*</ArticleId>").expect("valid regex")
});
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<ArticleTitle[^>]*>(.*?)</ArticleTitle>").expect("valid regex"));
static AUTHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<Author\b[^>]*>(.*?)</Author>").expect("valid regex"));
static LAST_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<LastName>(.*?)</LastName>").expect("valid regex"));
static FORE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<ForeName>(.*?)</ForeName>").expect("valid regex"));
static COLLECTIVE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<CollectiveName>(.*?)</CollectiveName>").expect("valid regex"));
static PUB_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<PubDate>.*?(?:<Year>(\d{4})</Year>|<MedlineDate>(\d{4}))")
        .expect("valid regex")
});
static JOURNAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<Journal>.*?<Title>(.*?)</Title>").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

pub struct PubMedSource {
    client: HttpClient,
    base_url: String,
}

impl PubMedSource {
    pub fn new(polite_email: Option<&str>) -> Result<Self> {
        Self::with_params(BASE_URL, polite_email, Duration::from_secs(30))
    }

    pub fn with_params(base_url: &str, polite_email: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(SourceName::PubMed, &user_agent(polite_email), timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// One efetch round trip. `Ok(None)` when PubMed returns no article.
    pub async fn fetch_article(&self, pmid: &Pmid) -> Result<Option<PubMedArticle>> {
        let url = format!(
            "{}/efetch.fcgi?db=pubmed&id={}&retmode=xml",
            self.base_url,
            pmid.as_str()
        );
        let xml = self.client.get(&url).await?;
        Ok(PubMedArticle::from_xml(pmid.clone(), &xml))
    }

    /// DOI for a PMID. Any failure, including malformed input, yields `None`.
    pub async fn pmid_to_doi(&self, raw: &str) -> Option<Doi> {
        self.lookup(raw).await?.doi
    }

    /// Minimal record built from PubMed alone, keyed `pmid:<pmid>`.
    pub async fn pmid_to_partial_record(&self, raw: &str) -> Option<PaperRecord> {
        let article = self.lookup(raw).await?;
        let key = RecordKey::Pmid(article.pmid.clone());
        Some(crate::enrichment::merge(key, vec![article.into_partial()]))
    }

    async fn lookup(&self, raw: &str) -> Option<PubMedArticle> {
        let pmid = Pmid::parse(raw).ok()?;
        match self.fetch_article(&pmid).await {
            Ok(article) => article,
            Err(e) => {
                tracing::warn!(%pmid, error = %e, "PubMed lookup failed");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PubMedArticle {
    pub pmid: Pmid,
    pub doi: Option<Doi>,
    pub title: Option<String>,
    pub authors: Vec<Author>,
    pub year: Option<i32>,
    pub journal: Option<String>,
}

impl PubMedArticle {
    pub fn from_xml(pmid: Pmid, xml: &str) -> Option<Self> {
        if !xml.contains("<PubmedArticle") && !xml.contains("<PubmedBookArticle") {
            return None;
        }
        let article = xml.split("<ReferenceList").next().unwrap_or(xml);

        let authors = AUTHOR_RE
            .captures_iter(article)
            .map(|c| {
                let body = c.get(1).map_or("", |m| m.as_str());
                let field = |re: &Regex| {
                    re.captures(body)
                        .and_then(|c| c.get(1))
                        .and_then(|m| inner_text(m.as_str()))
                };
                Author::from_parts(
                    field(&FORE_NAME_RE),
                    field(&LAST_NAME_RE),
                    field(&COLLECTIVE_NAME_RE),
                )
            })
            .filter(|a| !a.is_empty())
            .collect();

        let year = PUB_YEAR_RE.captures(article).and_then(|c| {
            c.get(1)
                .or_else(|| c.get(2))
                .and_then(|m| m.as_str().parse().ok())
        });

        Some(Self {
            pmid,
            doi: extract_doi(article),
            title: capture(&TITLE_RE, article),
            authors,
            year,
            journal: capture(&JOURNAL_RE, article),
        })
    }

    pub fn into_partial(self) -> PartialRecord {
        let mut partial = PartialRecord::new(SourceName::PubMed);
        partial.external_id = Some(self.pmid.to_string());
        partial.doi = self.doi;
        partial.title = self.title;
        partial.authors = self.authors;
        partial.year = self.year;
        partial.journal = self.journal;
        partial
    }
}

/// DOI-typed identifiers win over DOI-shaped generic ones.
pub fn extract_doi(xml: &str) -> Option<Doi> {
    [&*TYPED_ARTICLE_ID_RE, &*ELOCATION_DOI_RE, &*ANY_ARTICLE_ID_RE]
        .into_iter()
        .flat_map(|re| re.captures_iter(xml))
        .filter_map(|c| c.get(1))
        .find_map(|m| Doi::parse(&unescape_xml(m.as_str())).ok())
}

fn capture(re: &Regex, xml: &str) -> Option<String> {
    re.captures(xml)
        .and_then(|c| c.get(1))
        .and_then(|m| inner_text(m.as_str()))
}

/// Drop inline markup (`<i>`, `<sup>`, ...) and decode entities.
fn inner_text(fragment: &str) -> Option<String> {
    let plain = unescape_xml(&TAG_RE.replace_all(fragment, ""));
    text(Some(plain.as_str()))
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};

    use super::*;

    const ARTICLE: &str = r#"<?xml version="1.0" ?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">31452104</PMID>
      <Article PubModel="Print-Electronic">
        <Journal>
          <JournalIssue CitedMedium="Internet">
            <PubDate><Year>2019</Year><Month>Aug</Month></PubDate>
          </JournalIssue>
          <Title>Nature methods</Title>
        </Journal>
        <ArticleTitle>Single-cell <i>RNA</i> sequencing &amp; analysis.</ArticleTitle>
        <ELocationID EIdType="doi" ValidYN="Y">10.1038/S41592-019-0537-1</ELocationID>
        <AuthorList CompleteYN="Y">
          <Author ValidYN="Y"><LastName>Smith</LastName><ForeName>Jane</ForeName></Author>
          <Author ValidYN="Y"><CollectiveName>Human Cell Atlas</CollectiveName></Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">31452104</ArticleId>
      </ArticleIdList>
      <ReferenceList>
        <Reference><ArticleIdList><ArticleId IdType="doi">10.1000/cited</ArticleId></ArticleIdList></Reference>
      </ReferenceList>
    </PubmedData>
  </PubmedArticle>
</PubmedArticleSet>"#;

    fn pmid(s: &str) -> Pmid {
        Pmid::parse(s).unwrap()
    }

    #[test]
    fn parses_article_fields() {
        let article = PubMedArticle::from_xml(pmid("31452104"), ARTICLE).unwrap();
        assert_eq!(
            article.doi.as_ref().map(Doi::as_str),
            Some("10.1038/s41592-019-0537-1")
        );
        assert_eq!(
            article.title.as_deref(),
            Some("Single-cell RNA sequencing & analysis.")
        );
        assert_eq!(article.year, Some(2019));
        assert_eq!(article.journal.as_deref(), Some("Nature methods"));
        let names: Vec<String> = article.authors.iter().map(Author::display_name).collect();
        assert_eq!(names, vec!["Jane Smith", "Human Cell Atlas"]);
    }

    #[test]
    fn typed_id_beats_generic_id() {
        let xml = r#"<ArticleId IdType="pii">10.9999/not-this</ArticleId>
                     <ArticleId IdType="doi">10.1000/this-one</ArticleId>"#;
        assert_eq!(extract_doi(xml).unwrap().as_str(), "10.1000/this-one");
    }

    #[test]
    fn generic_id_used_when_doi_shaped() {
        let xml = r#"<ArticleId IdType="pubmed">123</ArticleId>
                     <ArticleId IdType="pii">10.1000/generic</ArticleId>"#;
        assert_eq!(extract_doi(xml).unwrap().as_str(), "10.1000/generic");
        assert_eq!(extract_doi(r#"<ArticleId IdType="pubmed">123</ArticleId>"#), None);
    }

    #[test]
    fn reference_dois_are_ignored() {
        let xml = ARTICLE.replace(
            r#"<ELocationID EIdType="doi" ValidYN="Y">10.1038/S41592-019-0537-1</ELocationID>"#,
            "",
        );
        let article = PubMedArticle::from_xml(pmid("31452104"), &xml).unwrap();
        assert_eq!(article.doi, None);
    }

    #[test]
    fn character_references_are_decoded() {
        let xml = r#"<PubmedArticle><ArticleTitle>Crohn&#x2019;s disease &#233;tude</ArticleTitle>
            <AuthorList><Author><LastName>M&#252;ller</LastName><ForeName>Ren&#xE9;</ForeName></Author></AuthorList>
            </PubmedArticle>"#;
        let article = PubMedArticle::from_xml(pmid("42"), xml).unwrap();
        assert_eq!(article.title.as_deref(), Some("Crohn\u{2019}s disease \u{e9}tude"));
        assert_eq!(article.authors[0].display_name(), "Ren\u{e9} M\u{fc}ller");
    }

    #[test]
    fn empty_result_set_has_no_article() {
        assert!(PubMedArticle::from_xml(pmid("1"), "<PubmedArticleSet></PubmedArticleSet>").is_none());
    }

    #[tokio::test]
    async fn pmid_to_doi_round_trip() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("db".into(), "pubmed".into()),
                Matcher::UrlEncoded("id".into(), "31452104".into()),
                Matcher::UrlEncoded("retmode".into(), "xml".into()),
            ]))
            .with_status(200)
            .with_body(ARTICLE)
            .create_async()
            .await;

        let source = PubMedSource::with_params(&server.url(), None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            source.pmid_to_doi("31452104").await.map(|d| d.to_string()),
            Some("10.1038/s41592-019-0537-1".to_string())
        );

        let record = source.pmid_to_partial_record(" 31452104 ").await.unwrap();
        assert_eq!(record.key.to_string(), "pmid:31452104");
        assert_eq!(record.year, Some(2019));
        assert!(record.sources.contains(&SourceName::PubMed));
    }

    #[tokio::test]
    async fn invalid_or_failed_lookups_are_none() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let source = PubMedSource::with_params(&server.url(), None, Duration::from_secs(5)).unwrap();
        assert_eq!(source.pmid_to_doi("abc").await, None);
        assert_eq!(source.pmid_to_doi("42").await, None);
        assert!(source.pmid_to_partial_record("42").await.is_none());
    }
}
