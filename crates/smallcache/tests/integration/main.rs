use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use smallcache::{Group, GroupRegistry, HttpPool, PeerPicker};
use smallcache_test::{HitCounter, Listener, Server};

mod routing;
mod server;

/// One shard of a test cluster serving the `scores` group.
///
/// The source loader answers `<key>@<shard>`, so values reveal which shard loaded them. Keys
/// starting with `missing` fail to load.
pub struct Shard {
    pub name: &'static str,
    pub url: String,
    pub pool: HttpPool,
    pub group: Group,
    pub hits: HitCounter,
    pub server: Option<Server>,
    loads: Arc<AtomicUsize>,
}

impl Shard {
    /// The number of times the source loader of this shard was called.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Finds a key owned by `owner`, derived from `prefix`.
    pub fn key_owned_by(&self, owner: &Shard, prefix: &str) -> String {
        (0..)
            .map(|i| format!("{prefix}{i}"))
            .find(|key| self.pool.owner(key).as_deref() == Some(owner.url.as_str()))
            .unwrap()
    }

    /// Stops serving peer requests and waits until the port is closed.
    pub async fn shutdown(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.handle.abort();
            (&mut server.handle).await.ok();
        }
    }
}

fn scores_group(registry: &GroupRegistry, name: &'static str, loads: Arc<AtomicUsize>) -> Group {
    registry.new_group("scores", 2 << 10, move |key: String| {
        loads.fetch_add(1, Ordering::SeqCst);
        async move {
            if key.starts_with("missing") {
                anyhow::bail!("{key} not exist");
            }
            Ok(format!("{key}@{name}"))
        }
    })
}

/// Starts one shard per name, all aware of each other.
pub fn cluster<const N: usize>(names: [&'static str; N]) -> [Shard; N] {
    let listeners = names.map(|_| Listener::bind());
    let urls: Vec<String> = listeners
        .iter()
        .map(|listener| listener.url("").as_str().trim_end_matches('/').to_owned())
        .collect();

    let shards: Vec<Shard> = names
        .into_iter()
        .zip(listeners)
        .zip(&urls)
        .map(|((name, listener), url)| {
            let registry = GroupRegistry::new();
            let loads = Arc::new(AtomicUsize::new(0));
            let group = scores_group(&registry, name, loads.clone());

            let pool = HttpPool::new(url.clone(), registry);
            pool.set_peers(&urls);
            if N > 1 {
                let picker: Arc<dyn PeerPicker> = Arc::new(pool.clone());
                group.register_peers(picker).unwrap();
            }

            let hits = HitCounter::new();
            let server = listener.serve(hits.layer(pool.router()));

            Shard {
                name,
                url: url.clone(),
                pool,
                group,
                hits,
                server: Some(server),
                loads,
            }
        })
        .collect();

    shards.try_into().unwrap_or_else(|_| unreachable!())
}
