pub mod cache;
pub mod cached_search;
pub mod shard;

pub use cache::{LoadReport, ResultCache, DEFAULT_FLUSH_INTERVAL, MASTER_SHARD};
pub use cached_search::CachedSearch;
