use serde::{Deserialize, Serialize};

/// A paper author as reported by a metadata source.
///
/// Sources disagree on structure: CrossRef splits `given`/`family`, OpenAlex and
/// Semantic Scholar only carry a display name. `name` is filled from the parts
/// when a source omits it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Author {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Author {
    pub fn from_name(name: impl Into<String>) -> Self {
        Self {
            given: None,
            family: None,
            name: Some(name.into()),
        }
    }

    pub fn from_parts(given: Option<String>, family: Option<String>, name: Option<String>) -> Self {
        let given = given.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let family = family.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let name = name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| join_parts(given.as_deref(), family.as_deref()));
        Self {
            given,
            family,
            name,
        }
    }

    /// `name`, or `"given family"` when the source gave no display name.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| join_parts(self.given.as_deref(), self.family.as_deref()))
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.display_name().trim().is_empty()
    }
}

impl PartialEq for Author {
    fn eq(&self, other: &Self) -> bool {
        self.display_name() == other.display_name()
    }
}

impl Eq for Author {}

fn join_parts(given: Option<&str>, family: Option<&str>) -> Option<String> {
    match (given, family) {
        (Some(g), Some(f)) => Some(format!("{g} {f}")),
        (Some(g), None) => Some(g.to_string()),
        (None, Some(f)) => Some(f.to_string()),
        (None, None) => None,
    }
}
