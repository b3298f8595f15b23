//! Paperlog core: paper entities, the paper store and configuration.

pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::{AppConfig, EnrichmentConfig, RateLimitConfig, SearchConfig, SourcesConfig};
pub use error::{PaperlogError, Result};
pub use models::*;
pub use storage::{MemoryPaperStore, PaperStore, SqlitePaperStore, upsert_paper};
