//! Configurable source loaders for groups declared in the config file.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use anyhow::Context;
use bytes::Bytes;
use futures::future::{self, BoxFuture, FutureExt};
use serde::Deserialize;

use crate::group::Getter;

/// The source of truth of a configured group.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Values listed inline in the configuration.
    Static(StaticSourceConfig),
    /// One file per key in a local directory.
    Filesystem(FilesystemSourceConfig),
}

/// Configuration for a source of inline values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct StaticSourceConfig {
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
}

/// Configuration for a source reading `<path>/<key>`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FilesystemSourceConfig {
    pub path: PathBuf,
}

fn not_found(key: &str) -> anyhow::Error {
    anyhow::anyhow!("{key} not exist")
}

impl StaticSourceConfig {
    fn load(&self, key: &str) -> anyhow::Result<Bytes> {
        match self.entries.get(key) {
            Some(value) => Ok(Bytes::copy_from_slice(value.as_bytes())),
            None => Err(not_found(key)),
        }
    }
}

impl FilesystemSourceConfig {
    fn load(&self, key: &str) -> BoxFuture<'static, anyhow::Result<Bytes>> {
        // Keys name a single file inside the directory, never anything above or below it.
        if key.contains(['/', '\\']) || key.contains("..") {
            return future::ready(Err(anyhow::anyhow!("invalid key `{key}`"))).boxed();
        }

        let path = self.path.join(key);
        let key = key.to_owned();
        async move {
            match tokio::fs::read(&path).await {
                Ok(contents) => Ok(Bytes::from(contents)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Err(not_found(&key)),
                Err(err) => {
                    Err(err).with_context(|| format!("failed to read `{}`", path.display()))
                }
            }
        }
        .boxed()
    }
}

impl Getter for SourceConfig {
    fn get(&self, key: &str) -> BoxFuture<'static, anyhow::Result<Bytes>> {
        match self {
            Self::Static(source) => future::ready(source.load(key)).boxed(),
            Self::Filesystem(source) => source.load(key),
        }
    }
}
