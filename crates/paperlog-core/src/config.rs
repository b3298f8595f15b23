use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Root application configuration, loaded from `~/.config/paperlog/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sources: SourcesConfig,
    pub rate_limit: RateLimitConfig,
    pub search: SearchConfig,
    pub enrichment: EnrichmentConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Added to the User-Agent so CrossRef/OpenAlex route us to the polite pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polite_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_scholar_api_key: Option<String>,
    pub crossref_url: String,
    pub openalex_url: String,
    pub semantic_scholar_url: String,
    pub pubmed_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub min_global_interval_ms: u64,
    pub per_doi_cooldown_secs: u64,
    pub rate_limit_penalty_secs: u64,
    pub first_lookup_delay_ms: u64,
    pub ledger_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Local hits at or above this count skip the remote sources.
    pub local_hit_threshold: usize,
    pub default_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub citing_papers: bool,
    pub max_citing_papers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            polite_email: None,
            semantic_scholar_api_key: None,
            crossref_url: "https://api.crossref.org".to_string(),
            openalex_url: "https://api.openalex.org".to_string(),
            semantic_scholar_url: "https://api.semanticscholar.org/graph/v1".to_string(),
            pubmed_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_global_interval_ms: 2_500,
            per_doi_cooldown_secs: 45,
            rate_limit_penalty_secs: 10,
            first_lookup_delay_ms: 300,
            ledger_capacity: 10_000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            local_hit_threshold: 5,
            default_limit: 20,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            citing_papers: true,
            max_citing_papers: 100,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("paperlog");
        Self {
            data_dir: data_dir.to_string_lossy().to_string(),
        }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("paperlog")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if the file doesn't exist.
    /// Credentials from the environment override the file.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn apply_env(&mut self) {
        if let Some(email) = env_first(["PAPERLOG_POLITE_EMAIL"]) {
            self.sources.polite_email = Some(email);
        }
        if let Some(key) = env_first([
            "PAPERLOG_SEMANTIC_SCHOLAR_API_KEY",
            "SEMANTIC_SCHOLAR_API_KEY",
        ]) {
            self.sources.semantic_scholar_api_key = Some(key);
        }
    }

    /// Path to the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir).join("papers.db")
    }
}

fn env_first<const N: usize>(keys: [&str; N]) -> Option<String> {
    keys.into_iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}
