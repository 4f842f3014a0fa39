use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use parking_lot::Mutex;

use super::{DEFAULT_BASE_PATH, DEFAULT_REPLICAS, HttpGetter, server};
use crate::consistenthash::HashRing;
use crate::group::GroupRegistry;
use crate::peers::{PeerGetter, PeerPicker};

/// Tunables of an [`HttpPool`].
#[derive(Clone, Debug)]
pub struct PoolOptions {
    /// The path prefix under which peers serve each other.
    ///
    /// Must start and end with `/`, all peers must agree on it.
    pub base_path: String,
    /// The number of virtual nodes per peer on the hash ring.
    pub replicas: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_owned(),
            replicas: DEFAULT_REPLICAS,
        }
    }
}

/// The peer set currently in effect, swapped as a whole on [`HttpPool::set_peers`].
#[derive(Debug)]
struct Peers {
    ring: HashRing,
    getters: HashMap<String, Arc<HttpGetter>>,
}

struct PoolInner {
    self_url: String,
    options: PoolOptions,
    registry: GroupRegistry,
    client: reqwest::Client,
    peers: Mutex<Peers>,
}

/// One shard's view of the cluster.
///
/// The pool answers peer requests for the groups in its [`GroupRegistry`] (see
/// [`router`](Self::router)), and as a [`PeerPicker`] routes lookups to the peer owning a key.
/// Cloning the pool is cheap and yields a handle to the same peer set.
#[derive(Clone)]
pub struct HttpPool {
    inner: Arc<PoolInner>,
}

impl HttpPool {
    /// Creates a pool for the shard reachable at `self_url`, with default options.
    pub fn new(self_url: impl Into<String>, registry: GroupRegistry) -> Self {
        Self::with_options(self_url, registry, PoolOptions::default())
    }

    pub fn with_options(
        self_url: impl Into<String>,
        registry: GroupRegistry,
        options: PoolOptions,
    ) -> Self {
        let peers = Peers {
            ring: HashRing::new(options.replicas),
            getters: HashMap::new(),
        };

        Self {
            inner: Arc::new(PoolInner {
                self_url: normalize_url(&self_url.into()).to_owned(),
                options,
                registry,
                client: reqwest::Client::new(),
                peers: Mutex::new(peers),
            }),
        }
    }

    /// The URL identifying this shard among its peers.
    pub fn self_url(&self) -> &str {
        &self.inner.self_url
    }

    /// The path prefix under which this pool serves its peers.
    pub fn base_path(&self) -> &str {
        &self.inner.options.base_path
    }

    /// The groups this pool serves.
    pub fn registry(&self) -> &GroupRegistry {
        &self.inner.registry
    }

    /// Replaces the set of peers, including this shard itself.
    ///
    /// Each peer is a base URL like `http://10.0.0.2:8001`. The new ring and clients are built
    /// before they are swapped in, concurrent lookups observe either the old or the new set.
    pub fn set_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let peers: Vec<String> = peers
            .into_iter()
            .map(|peer| normalize_url(peer.as_ref()).to_owned())
            .collect();

        let mut ring = HashRing::new(self.inner.options.replicas);
        ring.add(peers.iter().cloned());

        let getters = peers
            .iter()
            .map(|peer| {
                let base_url = format!("{peer}{}", self.base_path());
                let getter = HttpGetter::new(self.inner.client.clone(), base_url);
                (peer.clone(), Arc::new(getter))
            })
            .collect();

        tracing::info!(peers = ?peers, "Updated peer set");
        *self.inner.peers.lock() = Peers { ring, getters };
    }

    /// Returns the peer that owns `key`, which may be this shard itself.
    pub fn owner(&self, key: &str) -> Option<String> {
        self.inner.peers.lock().ring.get(key).map(str::to_owned)
    }

    /// Builds the router serving peer requests under the base path.
    pub fn router(&self) -> Router {
        let route = format!("{}*path", self.base_path());
        Router::new()
            .route(&route, get(server::serve_peer_request))
            .with_state(self.clone())
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let peers = self.inner.peers.lock();
        let peer = peers.ring.get(key)?;
        if peer == self.inner.self_url {
            return None;
        }

        tracing::debug!(key, "Pick peer {}", peer);
        let getter = peers.getters.get(peer)?;
        Some(getter.clone())
    }
}

impl fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPool")
            .field("self_url", &self.inner.self_url)
            .field("options", &self.inner.options)
            .field("peers", &*self.inner.peers.lock())
            .finish()
    }
}

/// Strips trailing slashes so that `http://a/` and `http://a` name the same peer.
fn normalize_url(url: &str) -> &str {
    url.trim_end_matches('/')
}
