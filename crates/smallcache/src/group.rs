//! Cache groups: named namespaces that sequence local cache, peer and source lookups.
//!
//! ```text
//!                            yes
//! key -> cached locally? --------------------------------------> return cached value
//!          | no                        yes
//!          +--> owned by a remote peer? ---> fetch from peer ---> return value
//!                  | no (or fetch failed)
//!                  +--> call the source loader ---> populate local cache ---> return value
//! ```
//!
//! Everything after the local cache miss runs inside a [`SingleFlight`], so concurrent misses
//! for the same key share one peer fetch or source load.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};

use crate::byteview::ByteView;
use crate::lru::LruCache;
use crate::peers::{FetchError, PeerGetter, PeerPicker};
use crate::protocol::Request;
use crate::singleflight::{Cancelled, SingleFlight};

/// The source of truth for a group, consulted when no cache holds a key.
///
/// Any async closure taking the key and returning bytes qualifies:
///
/// ```
/// # use smallcache::Group;
/// let group = Group::new("scores", 2 << 10, |key: String| async move {
///     match key.as_str() {
///         "Tom" => Ok(b"630".to_vec()),
///         _ => Err(anyhow::anyhow!("{key} not exist")),
///     }
/// });
/// ```
pub trait Getter: Send + Sync + 'static {
    /// Loads the value for `key`.
    fn get(&self, key: &str) -> BoxFuture<'static, anyhow::Result<Bytes>>;
}

impl<F, Fut, B> Getter for F
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<B>> + Send + 'static,
    B: Into<Bytes>,
{
    fn get(&self, key: &str) -> BoxFuture<'static, anyhow::Result<Bytes>> {
        let load = self(key.to_owned());
        async move { load.await.map(Into::into) }.boxed()
    }
}

/// Errors returned from [`Group`] operations.
///
/// The error is cloned to every caller waiting on the same coalesced load.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GroupError {
    /// An empty key was requested.
    #[error("key is required")]
    EmptyKey,
    /// [`Group::register_peers`] was called more than once.
    #[error("peers are already registered for group `{0}`")]
    PeersAlreadyRegistered(String),
    /// The source loader failed.
    #[error("{0}")]
    Load(Arc<anyhow::Error>),
    /// The coalesced load went away without a result.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl GroupError {
    /// Whether this error signals a misconfiguration rather than a failed lookup.
    ///
    /// Fatal errors indicate a programming error and should abort startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PeersAlreadyRegistered(_))
    }
}

struct GroupInner {
    name: String,
    getter: Box<dyn Getter>,
    main_cache: Mutex<LruCache<ByteView>>,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    loader: SingleFlight<Result<ByteView, GroupError>>,
}

/// A cache namespace with its own source loader and byte budget.
///
/// Cloning a group is cheap and yields a handle to the same namespace.
#[derive(Clone)]
pub struct Group {
    inner: Arc<GroupInner>,
}

impl Group {
    /// Creates a group caching at most `cache_bytes` (`0` = unbounded) loaded through `getter`.
    ///
    /// The group is not registered anywhere, use [`GroupRegistry::new_group`] to make it
    /// reachable for peers.
    pub fn new(name: impl Into<String>, cache_bytes: usize, getter: impl Getter) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                name: name.into(),
                getter: Box::new(getter),
                main_cache: Mutex::new(LruCache::new(cache_bytes)),
                peers: OnceLock::new(),
                loader: SingleFlight::new(),
            }),
        }
    }

    /// The name of this group.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Installs the peer picker used to locate owners of keys.
    ///
    /// A group is bound to exactly one peer topology, a second call fails with a fatal
    /// [`GroupError::PeersAlreadyRegistered`] and leaves the installed picker untouched.
    ///
    /// An [`HttpPool`](crate::HttpPool) holds the registry this group lives in, so registering
    /// it forms a reference cycle and neither is ever freed. Groups are meant to live for the
    /// whole process.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) -> Result<(), GroupError> {
        self.inner
            .peers
            .set(peers)
            .map_err(|_| GroupError::PeersAlreadyRegistered(self.inner.name.clone()))
    }

    /// Returns the value for `key`, loading it on a cache miss.
    pub async fn get(&self, key: &str) -> Result<ByteView, GroupError> {
        if key.is_empty() {
            return Err(GroupError::EmptyKey);
        }

        let name = self.name();
        crate::metric!(counter("group.get") += 1, "group" => name);

        let cached = self.inner.main_cache.lock().get(key).cloned();
        if let Some(value) = cached {
            crate::metric!(counter("group.hit") += 1, "group" => name);
            tracing::debug!(group = name, key, "cache hit");
            return Ok(value);
        }

        crate::metric!(counter("group.miss") += 1, "group" => name);
        self.load(key).await
    }

    /// Whether `key` is currently held in this group's local cache.
    pub fn is_cached(&self, key: &str) -> bool {
        self.inner.main_cache.lock().contains(key)
    }

    /// The number of entries and accounted bytes in the local cache.
    pub fn cache_usage(&self) -> (usize, usize) {
        let cache = self.inner.main_cache.lock();
        (cache.len(), cache.used_bytes())
    }

    /// Loads `key` from a peer or the source, coalescing concurrent loads of the same key.
    fn load(&self, key: &str) -> BoxFuture<'static, Result<ByteView, GroupError>> {
        let group = self.clone();
        let owned_key = key.to_owned();
        let computation = async move { group.load_uncoalesced(&owned_key).await };

        self.inner
            .loader
            .work(key, computation)
            .map(|result| result.unwrap_or_else(|cancelled| Err(cancelled.into())))
            .boxed()
    }

    async fn load_uncoalesced(&self, key: &str) -> Result<ByteView, GroupError> {
        let peer = self
            .inner
            .peers
            .get()
            .and_then(|peers| peers.pick_peer(key));

        if let Some(peer) = peer {
            match self.get_from_peer(peer.as_ref(), key).await {
                Ok(value) => {
                    crate::metric!(counter("group.load.peer") += 1, "group" => self.name());
                    return Ok(value);
                }
                Err(error) => {
                    crate::metric!(counter("group.peer.failure") += 1, "group" => self.name());
                    tracing::warn!(
                        group = self.name(),
                        key,
                        peer = peer.address(),
                        error = &error as &dyn std::error::Error,
                        "failed to get from peer"
                    );
                }
            }
        }

        self.get_locally(key).await
    }

    /// Values fetched from peers are returned as-is and not cached here, the owning shard
    /// caches them.
    async fn get_from_peer(
        &self,
        peer: &dyn PeerGetter,
        key: &str,
    ) -> Result<ByteView, FetchError> {
        let request = Request {
            group: self.inner.name.clone(),
            key: key.to_owned(),
        };
        let response = peer.get(&request).await?;
        Ok(response.value.into())
    }

    async fn get_locally(&self, key: &str) -> Result<ByteView, GroupError> {
        crate::metric!(counter("group.load.local") += 1, "group" => self.name());

        let bytes = self
            .inner
            .getter
            .get(key)
            .await
            .map_err(|err| GroupError::Load(Arc::new(err)))?;

        let value = ByteView::copy_from_slice(&bytes);
        self.populate_cache(key, value.clone());
        Ok(value)
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        let mut cache = self.inner.main_cache.lock();
        cache.add(key, value);
        crate::metric!(gauge("group.cache.bytes") = cache.used_bytes() as u64, "group" => self.name());
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.inner.name)
            .field("main_cache", &*self.inner.main_cache.lock())
            .field("peers", &self.inner.peers.get())
            .field("loader", &self.inner.loader)
            .finish()
    }
}

/// The set of groups reachable by name.
///
/// The registry is shared between the application and the peer server, which resolves the group
/// named in incoming requests through it. Registering a name twice replaces the earlier group.
#[derive(Clone, Debug, Default)]
pub struct GroupRegistry {
    groups: Arc<RwLock<HashMap<String, Group>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a group and registers it under its name.
    pub fn new_group(
        &self,
        name: impl Into<String>,
        cache_bytes: usize,
        getter: impl Getter,
    ) -> Group {
        let group = Group::new(name, cache_bytes, getter);
        self.register(group.clone());
        group
    }

    /// Registers `group` under its name, returning the group it replaced.
    pub fn register(&self, group: Group) -> Option<Group> {
        let replaced = self
            .groups
            .write()
            .insert(group.name().to_owned(), group);
        if let Some(replaced) = &replaced {
            tracing::warn!(group = replaced.name(), "replacing existing group");
        }
        replaced
    }

    /// Looks up the group registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<Group> {
        self.groups.read().get(name).cloned()
    }
}
