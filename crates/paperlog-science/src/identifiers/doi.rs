use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScienceError};

static DOI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^10\.\d{4,}/\S+$").expect("valid regex"));
static RESOLVER_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://(dx\.)?doi\.org/").expect("valid regex"));

/// Canonical DOI: lower-cased, resolver prefix stripped, always matching
/// `^10\.\d{4,}/\S+$`. Two inputs that normalize identically are the same DOI.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Doi(String);

impl Doi {
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = normalize(input);
        if DOI_RE.is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(ScienceError::InvalidDoi(input.trim().to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolver URL, `https://doi.org/<doi>`.
    pub fn url(&self) -> String {
        format!("https://doi.org/{}", self.0)
    }

    /// Percent-encoded for use inside a URL path; `/` is kept literal since the
    /// metadata APIs expect `prefix/suffix` as-is.
    pub fn path_encoded(&self) -> String {
        urlencoding::encode(&self.0).replace("%2F", "/")
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Doi {
    type Err = ScienceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Doi {
    type Error = ScienceError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Doi> for String {
    fn from(value: Doi) -> Self {
        value.0
    }
}

/// Trim, lower-case, strip `http(s)://(dx.)?doi.org/` and `doi:` labels.
///
/// Total: garbage in, garbage out. Stripping repeats until nothing changes so
/// the result is a fixed point.
pub fn normalize(raw: &str) -> String {
    let mut current = raw.trim().to_lowercase();
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(value: &str) -> String {
    let stripped = if let Some(m) = RESOLVER_PREFIX_RE.find(value) {
        &value[m.end()..]
    } else if let Some(rest) = value.strip_prefix("doi:") {
        rest
    } else {
        value
    };
    stripped.trim().to_string()
}

pub fn is_valid(raw: &str) -> bool {
    DOI_RE.is_match(&normalize(raw))
}

pub fn to_url(raw: &str) -> String {
    format!("https://doi.org/{}", normalize(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bare_doi() {
        let doi = Doi::parse("10.1000/xyz123").unwrap();
        assert_eq!(doi.as_str(), "10.1000/xyz123");
        assert_eq!(doi.url(), "https://doi.org/10.1000/xyz123");
    }

    #[test]
    fn doi_with_https_prefix() {
        let doi = Doi::parse("https://doi.org/10.1000/xyz123").unwrap();
        assert_eq!(doi.as_str(), "10.1000/xyz123");
    }

    #[test]
    fn doi_with_dx_doi_org() {
        let doi = Doi::parse("http://dx.doi.org/10.1000/xyz123").unwrap();
        assert_eq!(doi.as_str(), "10.1000/xyz123");
    }

    #[test]
    fn doi_with_label() {
        assert_eq!(Doi::parse("DOI: 10.1000/xyz123").unwrap().as_str(), "10.1000/xyz123");
    }

    #[test]
    fn uppercase_url_normalized_to_lowercase() {
        let doi = Doi::parse("  https://doi.org/10.1038/NATURE.2023.001 ").unwrap();
        assert_eq!(doi.as_str(), "10.1038/nature.2023.001");
    }

    #[test]
    fn equal_after_normalization() {
        assert_eq!(
            Doi::parse("10.1038/ABC").unwrap(),
            Doi::parse("https://dx.doi.org/10.1038/abc").unwrap()
        );
    }

    #[test]
    fn permissive_suffix_is_accepted() {
        assert!(is_valid("10.1000/über-paper?v=2"));
        assert!(is_valid("10.1002/(sici)1097-4571(199806)49:8<693::aid-asi4>3.0.co;2-0"));
    }

    #[test]
    fn reject_short_registrant() {
        assert!(!is_valid("10.123/abc"));
    }

    #[test]
    fn reject_not_a_doi() {
        assert!(Doi::parse("not-a-doi").is_err());
        assert!(!is_valid("deep learning for proteins"));
    }

    #[test]
    fn reject_doi_without_suffix() {
        assert!(Doi::parse("10.1000").is_err());
        assert!(Doi::parse("10.1000/").is_err());
    }

    #[test]
    fn reject_whitespace_in_suffix() {
        assert!(!is_valid("10.1000/abc def"));
    }

    #[test]
    fn reject_empty_string() {
        assert!(Doi::parse("").is_err());
    }

    #[test]
    fn to_url_normalizes_first() {
        assert_eq!(to_url("HTTPS://DOI.ORG/10.1000/X"), "https://doi.org/10.1000/x");
    }

    #[test]
    fn nested_prefixes_are_all_stripped() {
        assert_eq!(normalize("https://doi.org/doi:10.1000/x"), "10.1000/x");
        assert_eq!(normalize("https://doi.org/https://doi.org/10.1000/x"), "10.1000/x");
    }

    #[test]
    fn path_encoding_keeps_slash() {
        let doi = Doi::parse("10.1002/(sici)x y").unwrap_err();
        assert!(matches!(doi, ScienceError::InvalidDoi(_)));
        let doi = Doi::parse("10.1002/a#b").unwrap();
        assert_eq!(doi.path_encoded(), "10.1002/a%23b");
    }

    #[test]
    fn serde_rejects_invalid() {
        let ok: Doi = serde_json::from_str("\"10.1000/ABC\"").unwrap();
        assert_eq!(ok.as_str(), "10.1000/abc");
        assert!(serde_json::from_str::<Doi>("\"nope\"").is_err());
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(raw in ".*") {
            let once = normalize(&raw);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn prefixed_forms_normalize_alike(suffix in "[a-zA-Z0-9._;()-]{1,20}") {
            let bare = format!("10.1234/{suffix}");
            let url = format!("https://doi.org/{bare}");
            prop_assert_eq!(normalize(&bare), normalize(&url));
            prop_assert!(is_valid(&url));
        }
    }
}
