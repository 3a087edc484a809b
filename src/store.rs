use std::fmt::{self, Display, Formatter};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use slab::Slab;

use crate::key::Key;
use crate::policy::Policy;

/// The cache of a single computation.
///
/// Entries live in an ordered table. Table order is insertion order, except
/// that hits move an entry to the back under [`Policy::Lru`]. The wrapped
/// computation never runs while the store is locked.
pub struct Store<Out> {
    /// Used in diagnostics.
    name: String,
    data: Mutex<StoreData<Out>>,
}

impl<Out: Clone> Store<Out> {
    /// Create an empty store.
    pub fn new(name: impl Into<String>, capacity: usize, policy: Policy) -> Self {
        Self {
            name: name.into(),
            data: Mutex::new(StoreData {
                capacity,
                policy,
                persistent: false,
                table: Table::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Keep caching even while caching is globally disabled.
    pub fn persistent(mut self) -> Self {
        self.data.get_mut().persistent = true;
        self
    }

    /// The name of the store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the cached value for `key` and record a hit.
    pub fn lookup(&self, key: Key) -> Option<Out> {
        let mut data = self.data.lock();
        let policy = data.policy;
        let index = *data.table.index.get(&key)?;
        if policy == Policy::Lru {
            data.table.move_to_back(index);
        }

        let entry = &mut data.table.slots[index].entry;
        entry.counter += 1;
        let value = entry.value.clone();
        data.hits += 1;
        Some(value)
    }

    /// Insert a freshly computed value and record a miss.
    ///
    /// Evicts entries until there is room. A value for a key that is already
    /// present (inserted by a concurrent miss) replaces the old value in place.
    pub fn insert(&self, key: Key, value: Out) {
        let mut data = self.data.lock();
        data.misses += 1;

        if let Some(&index) = data.table.index.get(&key) {
            data.table.slots[index].entry.value = value;
            return;
        }

        while data.table.len() >= data.capacity {
            if !data.evict_one(&self.name) {
                break;
            }
        }

        if data.table.len() < data.capacity {
            data.table.push_back(key, CachedEntry { value, counter: 0 });
        }
    }
}

impl<Out> Store<Out> {
    /// Change the capacity, evicting entries that no longer fit.
    pub fn set_capacity(&self, capacity: usize) {
        let mut data = self.data.lock();
        data.capacity = capacity;
        while data.table.len() > capacity {
            data.evict_one(&self.name);
        }
    }

    /// Change the eviction policy.
    ///
    /// Switching to [`Policy::Lfu`] resets every retrieval counter, so that
    /// entries from before the switch don't look under-used.
    pub fn set_policy(&self, policy: Policy) {
        let mut data = self.data.lock();
        if policy == Policy::Lfu && data.policy != Policy::Lfu {
            for (_, node) in data.table.slots.iter_mut() {
                node.entry.counter = 0;
            }
        }
        data.policy = policy;
    }

    /// Remove all entries and zero the statistics.
    pub fn clear(&self) {
        let mut data = self.data.lock();
        data.table.clear();
        data.hits = 0;
        data.misses = 0;
    }

    /// Whether an entry for `key` is present.
    pub fn contains(&self, key: Key) -> bool {
        self.data.lock().table.index.contains_key(&key)
    }

    /// How often the entry for `key` has been retrieved.
    pub fn counter(&self, key: Key) -> Option<u64> {
        let data = self.data.lock();
        let index = *data.table.index.get(&key)?;
        Some(data.table.slots[index].entry.counter)
    }

    /// The present keys in table order, front first.
    pub fn keys(&self) -> Vec<Key> {
        let data = self.data.lock();
        data.table.iter().map(|(_, node)| node.key).collect()
    }

    /// Whether the store caches while caching is globally disabled.
    pub fn is_persistent(&self) -> bool {
        self.data.lock().persistent
    }

    /// A snapshot of the store's statistics.
    pub fn stats(&self) -> Stats {
        let data = self.data.lock();
        Stats {
            name: self.name.clone(),
            capacity: data.capacity,
            policy: data.policy,
            persistent: data.persistent,
            hits: data.hits,
            misses: data.misses,
            current_size: data.table.len(),
        }
    }
}

/// The internal data of a store.
struct StoreData<Out> {
    capacity: usize,
    policy: Policy,
    persistent: bool,
    table: Table<Out>,
    hits: u64,
    misses: u64,
}

impl<Out> StoreData<Out> {
    /// Evict one entry according to the policy. Returns false if the table
    /// was already empty.
    fn evict_one(&mut self, name: &str) -> bool {
        let victim = match self.policy {
            Policy::Fifo | Policy::Lru => self.table.head,
            Policy::Lfu => self
                .table
                .iter()
                .min_by_key(|(_, node)| node.entry.counter)
                .map(|(index, _)| index),
        };

        let Some(index) = victim else { return false };
        let node = self.table.remove(index);
        tracing::trace!(
            store = name,
            key = %node.key,
            policy = %self.policy,
            retrievals = node.entry.counter,
            "evicted cache entry"
        );
        true
    }
}

/// A cached value with its retrieval counter.
struct CachedEntry<Out> {
    value: Out,
    /// Incremented on every hit.
    counter: u64,
}

/// A slot in the table's doubly-linked list.
struct Node<Out> {
    key: Key,
    entry: CachedEntry<Out>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// An insertion-ordered map from keys to entries with O(1) reordering.
struct Table<Out> {
    slots: Slab<Node<Out>>,
    index: FxHashMap<Key, usize>,
    /// The front: oldest or least recently used.
    head: Option<usize>,
    /// The back: newest or most recently used.
    tail: Option<usize>,
}

impl<Out> Table<Out> {
    fn new() -> Self {
        Self {
            slots: Slab::new(),
            index: FxHashMap::default(),
            head: None,
            tail: None,
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    fn push_back(&mut self, key: Key, entry: CachedEntry<Out>) {
        let index = self.slots.insert(Node { key, entry, prev: self.tail, next: None });
        self.link_back(index);
        self.index.insert(key, index);
    }

    fn remove(&mut self, index: usize) -> Node<Out> {
        self.unlink(index);
        let node = self.slots.remove(index);
        self.index.remove(&node.key);
        node
    }

    fn move_to_back(&mut self, index: usize) {
        if self.tail == Some(index) {
            return;
        }
        self.unlink(index);
        self.link_back(index);
    }

    /// Attach a slot at the back of the list.
    fn link_back(&mut self, index: usize) {
        let tail = self.tail;
        let node = &mut self.slots[index];
        node.prev = tail;
        node.next = None;
        match tail {
            Some(tail) => self.slots[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
    }

    /// Detach a slot from the list without freeing it.
    fn unlink(&mut self, index: usize) {
        let (prev, next) = {
            let node = &self.slots[index];
            (node.prev, node.next)
        };
        match prev {
            Some(prev) => self.slots[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slots[next].prev = prev,
            None => self.tail = prev,
        }
    }

    /// Iterate over slots in list order, front first.
    fn iter(&self) -> impl Iterator<Item = (usize, &Node<Out>)> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let index = cursor?;
            let node = &self.slots[index];
            cursor = node.next;
            Some((index, node))
        })
    }
}

/// Statistics of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub name: String,
    pub capacity: usize,
    pub policy: Policy,
    pub persistent: bool,
    /// How often a cached value was returned.
    pub hits: u64,
    /// How often the computation ran and its result was stored.
    pub misses: u64,
    pub current_size: usize,
}

impl Display for Stats {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "<Stats `{}`>", self.name)?;
        writeln!(f, "\t capacity = {}", self.capacity)?;
        writeln!(f, "\t policy = {}", self.policy)?;
        writeln!(f, "\t hits = {}", self.hits)?;
        writeln!(f, "\t misses = {}", self.misses)?;
        write!(f, "\t current_size = {}", self.current_size)
    }
}

/// The configuration surface of a store, independent of its output type.
pub trait AnyStore: Send + Sync {
    fn set_capacity(&self, capacity: usize);
    fn set_policy(&self, policy: Policy);
    fn clear(&self);
    fn stats(&self) -> Stats;
}

impl<Out: Send> AnyStore for Store<Out> {
    fn set_capacity(&self, capacity: usize) {
        Store::set_capacity(self, capacity)
    }

    fn set_policy(&self, policy: Policy) {
        Store::set_policy(self, policy)
    }

    fn clear(&self) {
        Store::clear(self)
    }

    fn stats(&self) -> Stats {
        Store::stats(self)
    }
}
