//! Query result caching keyed by canonical query keys.

mod key;
mod query_cache;

pub use key::{LIST_SEPARATOR, QueryKey, normalize_list};
pub use query_cache::{CacheLookup, CacheStats, FetchResult, QueryCache};
