//! Consistent hashing of keys onto shards.

use std::collections::HashMap;
use std::fmt;

/// The hash function used to place keys and virtual nodes on the ring.
pub type HashFn = fn(&[u8]) -> u32;

/// A consistent-hash ring mapping keys to shard identifiers.
///
/// Every shard is placed on the ring `replicas` times as virtual nodes, which smooths the key
/// distribution when only a handful of shards exist. A key belongs to the first virtual node at or
/// after its own hash, wrapping around past the largest one.
#[derive(Clone)]
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    /// Sorted virtual node hashes.
    keys: Vec<u32>,
    nodes: HashMap<u32, String>,
}

impl HashRing {
    /// Creates an empty ring using CRC-32 (IEEE) as hash function.
    pub fn new(replicas: usize) -> Self {
        Self::with_hash(replicas, crc32fast::hash)
    }

    /// Creates an empty ring using a custom hash function.
    pub fn with_hash(replicas: usize, hash: HashFn) -> Self {
        Self {
            hash,
            replicas,
            keys: Vec::new(),
            nodes: HashMap::new(),
        }
    }

    /// Places the given shards on the ring.
    pub fn add<I, S>(&mut self, shards: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for shard in shards {
            let shard = shard.into();
            for i in 0..self.replicas {
                let hash = (self.hash)(format!("{i}{shard}").as_bytes());
                self.keys.push(hash);
                self.nodes.insert(hash, shard.clone());
            }
        }
        self.keys.sort_unstable();
    }

    /// Returns the shard owning `key`, or `None` if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let idx = self.keys.partition_point(|&node| node < hash);
        let node = self.keys[idx % self.keys.len()];
        self.nodes.get(&node).map(String::as_str)
    }

    /// Whether no shard has been added yet.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for HashRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("virtual_nodes", &self.keys.len())
            .finish()
    }
}
