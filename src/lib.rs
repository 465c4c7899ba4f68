//! fleet-dns - DNS forwarding core that answers with the fastest address
//!
//! Given a client query, this crate fans the query out to every configured
//! upstream in parallel, probes the addresses they return, and rewrites the
//! winning response so it carries the single address expected to give the
//! client the lowest connection latency.
//!
//! Features:
//! - Parallel upstream exchange that keeps every successful response
//! - ICMP echo and TCP connect probes raced against each other per address
//! - Bounded LRU reachability cache with packed, TTL-stamped entries
//! - First successful probe wins; cached observations compete on latency
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fleet_dns::{FastestAddr, FastestAddrConfig, UdpUpstream, Upstream};
//!
//! # async fn example(query: hickory_proto::op::Message) -> fleet_dns::Result<()> {
//! let engine = FastestAddr::new(FastestAddrConfig::default());
//!
//! let upstreams: Vec<Arc<dyn Upstream>> = vec![
//!     Arc::new(UdpUpstream::new("8.8.8.8:53".parse().unwrap())),
//!     Arc::new(UdpUpstream::new("1.1.1.1:53".parse().unwrap())),
//! ];
//!
//! let (reply, via) = engine.exchange_fastest(&query, &upstreams).await?;
//! println!("answered from {}", via.address());
//! # Ok(())
//! # }
//! ```

mod cache;
mod candidate;
mod config;
mod engine;
pub mod error;
mod probe;
mod race;
mod upstream;

pub use cache::{CacheEntry, CacheStats, IpKey, ReachabilityCache};
pub use config::{
    FastestAddrConfig, DEFAULT_CACHE_SIZE_BYTES, DEFAULT_PROBE_TIMEOUT, DEFAULT_TCP_PORT,
    DEFAULT_TTL_SECS,
};
pub use engine::FastestAddr;
pub use error::{Error, Result};
pub use upstream::{exchange_all, ExchangeResult, UdpUpstream, Upstream};
