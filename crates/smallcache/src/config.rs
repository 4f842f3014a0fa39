use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::http::{DEFAULT_BASE_PATH, DEFAULT_REPLICAS, PoolOptions};
use crate::sources::SourceConfig;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the shard.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "smallcache".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// The default byte budget of a group's local cache, 2 MiB.
pub const DEFAULT_CACHE_BYTES: u64 = 2 << 20;

fn default_cache_bytes() -> u64 {
    DEFAULT_CACHE_BYTES
}

/// A group served by this shard.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct GroupConfig {
    /// The byte budget of the local cache, `0` disables eviction.
    #[serde(default = "default_cache_bytes")]
    pub cache_bytes: u64,
    /// Where values come from when no shard has them cached.
    pub source: SourceConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host and port to bind the HTTP webserver to.
    pub bind: String,

    /// The URL under which the other shards reach this one.
    ///
    /// Must match this shard's entry in `peers`. Defaults to `http://<bind>`.
    pub self_url: Option<String>,

    /// Base URLs of all shards in the cluster, including this one.
    pub peers: Vec<String>,

    /// The path prefix under which shards serve each other.
    pub base_path: String,

    /// The number of virtual nodes per shard on the hash ring.
    pub replicas: usize,

    /// The groups served by this shard, by name.
    pub groups: BTreeMap<String, GroupConfig>,

    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// DSN to report internal errors to
    pub sentry_dsn: Option<Url>,
}

impl Config {
    /// The URL identifying this shard among its peers.
    pub fn self_url(&self) -> String {
        match &self.self_url {
            Some(url) => url.clone(),
            None => format!("http://{}", self.bind),
        }
    }

    /// Options for the peer pool of this shard.
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            base_path: self.base_path.clone(),
            replicas: self.replicas,
        }
    }
}

/// Checks if we are running in docker.
fn is_docker() -> bool {
    if fs::metadata("/.dockerenv").is_ok() {
        return true;
    }

    fs::read_to_string("/proc/self/cgroup")
        .map(|s| s.contains("/docker"))
        .unwrap_or(false)
}

/// Default value for the "bind" configuration.
fn default_bind() -> String {
    if is_docker() {
        // Docker images rely on this service being exposed
        "0.0.0.0:8001".to_owned()
    } else {
        "127.0.0.1:8001".to_owned()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: default_bind(),
            self_url: None,
            peers: Vec::new(),
            base_path: DEFAULT_BASE_PATH.to_owned(),
            replicas: DEFAULT_REPLICAS,
            groups: BTreeMap::new(),
            logging: Logging::default(),
            metrics: Metrics::default(),
            sentry_dsn: None,
        }
    }
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            )?,
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }

    fn validate(&self) -> Result<()> {
        if !self.base_path.starts_with('/') || !self.base_path.ends_with('/') {
            anyhow::bail!(
                "invalid base_path `{}`: must start and end with `/`",
                self.base_path
            );
        }
        if self.replicas == 0 {
            anyhow::bail!("invalid replicas: must be greater than 0");
        }

        let self_url = self.self_url();
        Url::parse(&self_url).with_context(|| format!("invalid self_url `{self_url}`"))?;
        for peer in &self.peers {
            Url::parse(peer).with_context(|| format!("invalid peer URL `{peer}`"))?;
        }

        let self_url = self_url.trim_end_matches('/');
        if !self.peers.is_empty()
            && !self
                .peers
                .iter()
                .any(|peer| peer.trim_end_matches('/') == self_url)
        {
            anyhow::bail!("self_url `{self_url}` must be one of the configured peers");
        }

        for (name, group) in &self.groups {
            if name.is_empty() {
                anyhow::bail!("group names must not be empty");
            }
            usize::try_from(group.cache_bytes)
                .with_context(|| format!("cache_bytes of group `{name}` is too large"))?;
        }

        Ok(())
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticSourceConfig;

    fn parse(yaml: &str) -> Result<Config> {
        let config = Config::from_reader(yaml.as_bytes())?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::get(None).unwrap();
        assert_eq!(cfg.base_path, "/_smallcache/");
        assert_eq!(cfg.replicas, 50);
        assert!(cfg.peers.is_empty());
        assert!(cfg.groups.is_empty());
        assert_eq!(cfg.self_url(), format!("http://{}", cfg.bind));
        assert_eq!(cfg.logging.level, LevelFilter::INFO);
        assert_eq!(cfg.metrics.prefix, "smallcache");
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
            bind: 0.0.0.0:9000
            self_url: http://10.0.0.1:9000
            peers:
              - http://10.0.0.1:9000
              - http://10.0.0.2:9000
            replicas: 10
            groups:
              scores:
                cache_bytes: 1024
                source:
                  type: static
                  entries:
                    Tom: "630"
              avatars:
                source:
                  type: filesystem
                  path: /var/lib/avatars
            logging:
              level: debug
              format: json
        "#;
        let cfg = parse(yaml).unwrap();

        assert_eq!(cfg.self_url(), "http://10.0.0.1:9000");
        assert_eq!(cfg.peers.len(), 2);
        assert_eq!(cfg.pool_options().replicas, 10);
        assert_eq!(cfg.pool_options().base_path, "/_smallcache/");
        assert_eq!(
            cfg.groups["scores"],
            GroupConfig {
                cache_bytes: 1024,
                source: SourceConfig::Static(StaticSourceConfig {
                    entries: [("Tom".to_owned(), "630".to_owned())].into(),
                }),
            }
        );
        assert_eq!(cfg.groups["avatars"].cache_bytes, DEFAULT_CACHE_BYTES);
        assert_eq!(cfg.logging.level, LevelFilter::DEBUG);
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_base_path() {
        let err = parse("base_path: /peers").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"invalid base_path `/peers`: must start and end with `/`");
    }

    #[test]
    fn test_invalid_replicas() {
        let err = parse("replicas: 0").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"invalid replicas: must be greater than 0");
    }

    #[test]
    fn test_invalid_peer() {
        let err = parse("peers: [\"not a url\"]").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"invalid peer URL `not a url`");
    }

    #[test]
    fn test_self_url_not_in_peers() {
        let yaml = r#"
            self_url: http://10.0.0.3:9000/
            peers:
              - http://10.0.0.1:9000
              - http://10.0.0.2:9000
        "#;
        let err = parse(yaml).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"self_url `http://10.0.0.3:9000` must be one of the configured peers");

        // Trailing slashes don't matter when matching this shard.
        let yaml = r#"
            self_url: http://10.0.0.2:9000/
            peers:
              - http://10.0.0.1:9000
              - http://10.0.0.2:9000
        "#;
        assert!(parse(yaml).is_ok());
    }

    #[test]
    fn test_invalid_level() {
        let err = parse("logging:\n  level: loud").unwrap_err();
        assert!(format!("{err:#}").contains("unknown variant `loud`"));
    }

    #[test]
    fn test_unknown_fields() {
        // Unknown fields should not cause failure
        let yaml = r#"
            caches:
              not_a_cache: 1h
        "#;
        assert!(parse(yaml).is_ok());
    }

    #[test]
    fn test_empty_file() {
        // Empty files aren't supported
        let result = Config::from_reader("".as_bytes());
        insta::assert_snapshot!(result.unwrap_err().to_string(), @"config file empty");
    }
}
