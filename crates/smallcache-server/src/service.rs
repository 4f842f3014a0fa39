//! The groups a shard serves, wired to the shard's peer pool.

use std::sync::Arc;

use anyhow::{Context, Result};
use smallcache::config::Config;
use smallcache::{Group, GroupRegistry, HttpPool, PeerPicker};

/// Shared state of the web application.
#[derive(Clone, Debug)]
pub struct Service {
    registry: GroupRegistry,
    pool: HttpPool,
}

impl Service {
    /// Creates the configured groups and the peer pool serving them.
    ///
    /// With peers configured, every group routes keys it does not own to their owner.
    pub fn create(config: &Config) -> Result<Self> {
        let registry = GroupRegistry::new();
        let pool = HttpPool::with_options(
            config.self_url(),
            registry.clone(),
            config.pool_options(),
        );
        if !config.peers.is_empty() {
            pool.set_peers(&config.peers);
        }

        for (name, group_config) in &config.groups {
            let cache_bytes = usize::try_from(group_config.cache_bytes)
                .with_context(|| format!("cache_bytes of group `{name}` is too large"))?;
            let group = registry.new_group(name.as_str(), cache_bytes, group_config.source.clone());

            if !config.peers.is_empty() {
                let picker: Arc<dyn PeerPicker> = Arc::new(pool.clone());
                group
                    .register_peers(picker)
                    .with_context(|| format!("failed to register peers for group `{name}`"))?;
            }

            tracing::info!(group = name.as_str(), cache_bytes, "Serving group");
        }

        Ok(Self { registry, pool })
    }

    /// Looks up a served group by name.
    pub fn group(&self, name: &str) -> Option<Group> {
        self.registry.lookup(name)
    }

    /// The pool answering peer requests.
    pub fn pool(&self) -> &HttpPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> Config {
        let dir = smallcache_test::tempdir();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, yaml).unwrap();
        Config::get(Some(&path)).unwrap()
    }

    #[tokio::test]
    async fn test_create_groups() {
        smallcache_test::setup();

        let config = config(
            r#"
            groups:
              scores:
                source:
                  type: static
                  entries:
                    Tom: "630"
            "#,
        );
        let service = Service::create(&config).unwrap();

        assert!(service.group("unknown").is_none());
        let scores = service.group("scores").unwrap();
        assert_eq!(scores.get("Tom").await.unwrap().to_string(), "630");
        assert!(scores.is_cached("Tom"));
    }

    #[tokio::test]
    async fn test_create_with_peers() {
        smallcache_test::setup();

        let config = config(
            r#"
            self_url: http://10.0.0.1:8001
            peers:
              - http://10.0.0.1:8001
              - http://10.0.0.2:8001
            groups:
              scores:
                source:
                  type: static
            "#,
        );
        let service = Service::create(&config).unwrap();

        assert_eq!(service.pool().self_url(), "http://10.0.0.1:8001");
        let key = (0..)
            .map(|i| format!("key-{i}"))
            .find(|key| service.pool().owner(key).as_deref() == Some("http://10.0.0.2:8001"))
            .unwrap();
        assert!(service.pool().pick_peer(&key).is_some());

        // Peers are bound once, at creation.
        let scores = service.group("scores").unwrap();
        let err = scores
            .register_peers(Arc::new(service.pool().clone()))
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
