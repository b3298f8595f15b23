pub mod aggregator;
pub mod query;

pub use aggregator::Searcher;
pub use query::{QueryExpr, SearchQuery, SearchTerm};
