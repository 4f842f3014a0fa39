//! A byte-bounded least-recently-used cache.
//!
//! Entries are accounted by `key.len() + value.len()`. Once the accounted size exceeds the
//! configured budget, entries are evicted from the least-recently-used end until it fits again.
//! A budget of `0` disables eviction.
//!
//! The cache performs no internal locking, callers have to synchronize access.

use std::collections::HashMap;
use std::fmt;

/// A value that can be stored in an [`LruCache`].
pub trait Value {
    /// The number of bytes this value accounts for.
    fn len(&self) -> usize;
}

type EvictionCallback<V> = Box<dyn FnMut(String, V) + Send>;

#[derive(Debug)]
struct Node<V> {
    key: String,
    value: V,
    /// Towards the most recently used end.
    prev: Option<usize>,
    /// Towards the least recently used end.
    next: Option<usize>,
}

/// A least-recently-used cache bounded by the accounted size of its entries.
///
/// Entries are kept in a doubly linked list threaded through a `Vec`, with a key index for O(1)
/// lookups and recency updates.
pub struct LruCache<V> {
    max_bytes: usize,
    used_bytes: usize,
    nodes: Vec<Node<V>>,
    index: HashMap<String, usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used.
    tail: Option<usize>,
    on_evicted: Option<EvictionCallback<V>>,
}

impl<V: Value> LruCache<V> {
    /// Creates a cache holding at most `max_bytes` worth of entries.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            nodes: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            on_evicted: None,
        }
    }

    /// Creates a cache that invokes `on_evicted` for every entry removed by eviction.
    pub fn with_eviction_callback<F>(max_bytes: usize, on_evicted: F) -> Self
    where
        F: FnMut(String, V) + Send + 'static,
    {
        Self {
            on_evicted: Some(Box::new(on_evicted)),
            ..Self::new(max_bytes)
        }
    }

    /// Inserts or replaces the value for `key` and marks it most recently used.
    ///
    /// Evicts least recently used entries afterwards until the cache fits its budget again.
    pub fn add(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();

        if let Some(&idx) = self.index.get(&key) {
            self.move_to_front(idx);
            let node = &mut self.nodes[idx];
            self.used_bytes = self.used_bytes - node.value.len() + value.len();
            node.value = value;
        } else {
            let idx = self.nodes.len();
            self.used_bytes += key.len() + value.len();
            self.index.insert(key.clone(), idx);
            self.nodes.push(Node {
                key,
                value,
                prev: None,
                next: None,
            });
            self.push_front(idx);
        }

        while self.max_bytes != 0 && self.used_bytes > self.max_bytes {
            if !self.evict_oldest() {
                break;
            }
        }
    }

    /// Looks up `key` and marks it most recently used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.move_to_front(idx);
        Some(&self.nodes[idx].value)
    }

    /// Whether `key` is present, without touching its recency.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Evicts the least recently used entry, if any.
    pub fn remove_oldest(&mut self) {
        self.evict_oldest();
    }

    /// The number of entries in the cache.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The accounted size of all entries currently in the cache.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    fn evict_oldest(&mut self) -> bool {
        let Some(idx) = self.tail else {
            return false;
        };
        let Node { key, value, .. } = self.remove_node(idx);
        self.used_bytes -= key.len() + value.len();
        crate::metric!(counter("lru.evicted") += 1);

        if let Some(on_evicted) = self.on_evicted.as_mut() {
            on_evicted(key, value);
        }
        true
    }

    fn remove_node(&mut self, idx: usize) -> Node<V> {
        self.unlink(idx);
        let node = self.nodes.swap_remove(idx);
        self.index.remove(&node.key);

        // The former last node now lives at `idx`, repoint everything that referred to it.
        if idx < self.nodes.len() {
            let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
            match prev {
                Some(prev) => self.nodes[prev].next = Some(idx),
                None => self.head = Some(idx),
            }
            match next {
                Some(next) => self.nodes[next].prev = Some(idx),
                None => self.tail = Some(idx),
            }
            if let Some(slot) = self.index.get_mut(self.nodes[idx].key.as_str()) {
                *slot = idx;
            }
        }

        node
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[idx].prev = None;
        self.nodes[idx].next = None;
    }

    fn push_front(&mut self, idx: usize) {
        self.nodes[idx].prev = None;
        self.nodes[idx].next = self.head;
        match self.head {
            Some(head) => self.nodes[head].prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.unlink(idx);
            self.push_front(idx);
        }
    }
}

impl<V> fmt::Debug for LruCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("max_bytes", &self.max_bytes)
            .field("used_bytes", &self.used_bytes)
            .field("entries", &self.nodes.len())
            .finish()
    }
}
