//! A distributed, sharded, read-through cache.
//!
//! Values are grouped into named [`Group`]s, each backed by a source loader that is consulted on
//! a cache miss. Every key is owned by exactly one shard, picked through a consistent-hash ring
//! over all peers. A shard that does not own a key asks the owner for it over HTTP and falls back
//! to loading the value itself if that fails. Concurrent misses for the same key within a shard
//! share a single load.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use smallcache::{GroupRegistry, HttpPool};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let registry = GroupRegistry::new();
//! let scores = registry.new_group("scores", 2 << 20, |key: String| async move {
//!     Ok::<_, anyhow::Error>(format!("score of {key}"))
//! });
//!
//! let pool = HttpPool::new("http://10.0.0.1:8001", registry);
//! pool.set_peers(["http://10.0.0.1:8001", "http://10.0.0.2:8001"]);
//! scores.register_peers(Arc::new(pool.clone()))?;
//!
//! let listener = tokio::net::TcpListener::bind("10.0.0.1:8001").await?;
//! tokio::spawn(async move { axum::serve(listener, pool.router()).await });
//!
//! let value = scores.get("Tom").await?;
//! println!("{value}");
//! # Ok(())
//! # }
//! ```

#[macro_use]
pub mod metrics;

pub mod byteview;
pub mod config;
pub mod consistenthash;
pub mod group;
pub mod http;
pub mod logging;
pub mod lru;
pub mod peers;
pub mod protocol;
pub mod singleflight;
pub mod sources;
pub mod utils;

pub use byteview::ByteView;
pub use group::{Getter, Group, GroupError, GroupRegistry};
pub use http::{HttpGetter, HttpPool, PoolOptions};
pub use peers::{FetchError, PeerGetter, PeerPicker};
