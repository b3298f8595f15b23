//! Paperlog science: DOI/PMID resolution, multi-source metadata merge,
//! keyword search.

pub mod enrichment;
pub mod error;
pub mod http;
pub mod identifiers;
pub mod rate_limit;
pub mod search;
pub mod sources;
pub mod types;

pub use enrichment::{FetchReport, Fetcher, Resolver, ResolverSettings, merge, reconstruct_abstract};
pub use error::{Result, ScienceError};
pub use identifiers::{Doi, Pmid};
pub use rate_limit::{Clock, ManualClock, RateLimitSettings, RateLimiter, SystemClock};
pub use search::{QueryExpr, SearchQuery, Searcher};
pub use sources::{CitationSource, ExternalSource};
pub use types::{AbstractText, InvertedIndex, PaperRecord, PartialRecord, RecordKey, SourceName};
