//! KV-cache coordinator (§4.4, §4.5): per-node registry of cached system
//! prompts, warmup, and periodic resync.

pub mod fingerprint;
pub mod registry;
pub mod warmer;

pub use fingerprint::fingerprint;
pub use registry::{CacheEntry, CacheRegistry};
pub use warmer::{
    warm_up_nodes, CacheClient, CacheStateResponse, CacheSynchronizer, ReqwestCacheClient,
    WarmResult,
};
