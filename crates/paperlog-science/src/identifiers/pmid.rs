use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScienceError};

/// PubMed identifier: a non-empty run of ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pmid(String);

impl Pmid {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ScienceError::InvalidPmid(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stand-in record key used when PubMed knows no DOI for the article.
    /// Deliberately not DOI-shaped.
    pub fn placeholder_key(&self) -> String {
        format!("pmid:{}", self.0)
    }
}

impl fmt::Display for Pmid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Pmid {
    type Error = ScienceError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Pmid> for String {
    fn from(value: Pmid) -> Self {
        value.0
    }
}
