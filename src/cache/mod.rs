//! In-memory caches in front of the store.
//!
//! [`RecencyCache`] holds parsed documents with least-recently-used eviction. [`TtlCache`] holds
//! query results and attachment-existence answers for a fixed time-to-live. Both guard their state
//! with a single `parking_lot::Mutex` that is only held for the duration of a map operation, never
//! across file or store I/O.
mod recency;
mod ttl;

pub use recency::{CacheStats, RecencyCache};
pub use ttl::TtlCache;
