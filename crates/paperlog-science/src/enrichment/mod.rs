pub mod abstracts;
pub mod fetch;
pub mod merge;
pub mod pipeline;

pub use abstracts::reconstruct_abstract;
pub use fetch::{FetchReport, Fetcher};
pub use merge::merge;
pub use pipeline::{Resolver, ResolverSettings};
