use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::key::{Params, Signature};
use crate::memoize::Memoized;
use crate::policy::Policy;
use crate::store::{AnyStore, Stats, Store};

/// The factory default capacity of a store.
pub const DEFAULT_CAPACITY: usize = 128;

/// The factory default eviction policy.
pub const DEFAULT_POLICY: Policy = Policy::Lru;

/// The registry used by `#[memoize]`.
static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

/// The process-wide registry.
pub fn global() -> &'static Registry {
    &GLOBAL
}

/// The configuration of a single store.
///
/// Unset fields inherit the registry defaults at registration time.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct CacheConfig {
    capacity: Option<usize>,
    policy: Option<Policy>,
    persistent: bool,
}

impl CacheConfig {
    /// A configuration that inherits everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate an untyped capacity and policy name.
    pub fn parse(capacity: i64, policy: &str) -> Result<Self> {
        Ok(Self::new().capacity(validate_capacity(capacity)?).policy(policy.parse()?))
    }

    /// Set the maximum number of entries.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the eviction policy.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Keep caching even while the registry is disabled.
    ///
    /// Meant for long-running one-time constructions, like loading an
    /// emulator, that are too expensive to repeat.
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

fn validate_capacity(capacity: i64) -> Result<usize> {
    usize::try_from(capacity).map_err(|_| {
        Error::Config(format!(
            "capacity should be at least zero, got {capacity}; \
             to disable caching, use `Registry::disable`"
        ))
    })
}

/// Holds the default configuration, the enable switch and all live stores.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct Registry(Arc<Inner>);

struct Inner {
    enabled: AtomicBool,
    state: RwLock<State>,
}

struct State {
    capacity: usize,
    policy: Policy,
    stores: Vec<Weak<dyn AnyStore>>,
}

impl State {
    /// Apply `f` to every live store and forget dropped ones.
    fn for_each(&mut self, mut f: impl FnMut(&dyn AnyStore)) {
        self.stores.retain(|weak| match weak.upgrade() {
            Some(store) => {
                f(&*store);
                true
            }
            None => false,
        });
    }
}

impl Registry {
    /// Create an enabled registry with factory defaults.
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            enabled: AtomicBool::new(true),
            state: RwLock::new(State {
                capacity: DEFAULT_CAPACITY,
                policy: DEFAULT_POLICY,
                stores: Vec::new(),
            }),
        }))
    }

    /// Create and register a store.
    pub fn register<Out>(&self, name: &str, config: CacheConfig) -> Arc<Store<Out>>
    where
        Out: Clone + Send + 'static,
    {
        let mut state = self.0.state.write();
        let capacity = config.capacity.unwrap_or(state.capacity);
        let policy = config.policy.unwrap_or(state.policy);
        let mut store = Store::new(name, capacity, policy);
        if config.persistent {
            store = store.persistent();
        }

        let store = Arc::new(store);
        let erased: Arc<dyn AnyStore> = store.clone();
        state.stores.retain(|weak| weak.strong_count() > 0);
        state.stores.push(Arc::downgrade(&erased));
        tracing::debug!(store = name, capacity, %policy, "registered cache store");
        store
    }

    /// Wrap a computation with a cache.
    ///
    /// The signature names the positional parameters of `In` and declares
    /// the defaults of optional ones.
    pub fn memoize<In, Out, F>(
        &self,
        name: &str,
        config: CacheConfig,
        signature: Signature,
        func: F,
    ) -> Memoized<In, Out>
    where
        In: Params,
        Out: Clone + Send + 'static,
        F: Fn(In) -> Out + Send + Sync + 'static,
    {
        let store = self.register(name, config);
        Memoized::new(self.clone(), store, signature, func)
    }

    /// Whether caching is enabled.
    pub fn is_enabled(&self) -> bool {
        self.0.enabled.load(Ordering::SeqCst)
    }

    /// Enable caching.
    pub fn enable(&self) {
        self.0.enabled.store(true, Ordering::SeqCst);
        tracing::debug!("caching enabled");
    }

    /// Disable caching for all stores that are not persistent.
    pub fn disable(&self) {
        self.0.enabled.store(false, Ordering::SeqCst);
        tracing::debug!("caching disabled");
    }

    /// The default capacity.
    pub fn capacity(&self) -> usize {
        self.0.state.read().capacity
    }

    /// The default eviction policy.
    pub fn policy(&self) -> Policy {
        self.0.state.read().policy
    }

    /// Set the default capacity and apply it to every store.
    pub fn set_capacity(&self, capacity: i64) -> Result<()> {
        let capacity = validate_capacity(capacity)?;
        let mut state = self.0.state.write();
        state.capacity = capacity;
        state.for_each(|store| store.set_capacity(capacity));
        tracing::debug!(capacity, stores = state.stores.len(), "set cache capacity");
        Ok(())
    }

    /// Set the default eviction policy by name and apply it to every store.
    pub fn set_policy(&self, name: &str) -> Result<()> {
        let policy: Policy = name.parse()?;
        let mut state = self.0.state.write();
        state.policy = policy;
        state.for_each(|store| store.set_policy(policy));
        tracing::debug!(%policy, stores = state.stores.len(), "set cache policy");
        Ok(())
    }

    /// Restore the factory default capacity and policy on every store.
    pub fn reset(&self) {
        let mut state = self.0.state.write();
        state.capacity = DEFAULT_CAPACITY;
        state.policy = DEFAULT_POLICY;
        state.for_each(|store| {
            store.set_capacity(DEFAULT_CAPACITY);
            store.set_policy(DEFAULT_POLICY);
        });
        tracing::debug!("reset cache configuration");
    }

    /// Empty every store and zero its statistics.
    pub fn clear_all(&self) {
        self.0.state.write().for_each(|store| store.clear());
    }

    /// Statistics of every live store.
    pub fn stats(&self) -> Vec<Stats> {
        let mut stats = Vec::new();
        self.0.state.write().for_each(|store| stats.push(store.stats()));
        stats
    }

    /// The number of live stores.
    pub fn len(&self) -> usize {
        let mut len = 0;
        self.0.state.write().for_each(|_| len += 1);
        len
    }

    /// Whether no store is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key;

    #[test]
    fn test_setters_fan_out() {
        let registry = Registry::new();
        let a = registry.register::<u32>("a", CacheConfig::new());
        let b = registry.register::<String>("b", CacheConfig::new().capacity(4).policy(Policy::Fifo));
        assert_eq!((a.stats().capacity, a.stats().policy), (128, Policy::Lru));
        assert_eq!((b.stats().capacity, b.stats().policy), (4, Policy::Fifo));

        registry.set_capacity(16).unwrap();
        registry.set_policy("lfu").unwrap();
        for stats in registry.stats() {
            assert_eq!((stats.capacity, stats.policy), (16, Policy::Lfu));
        }

        registry.reset();
        assert_eq!((registry.capacity(), registry.policy()), (DEFAULT_CAPACITY, DEFAULT_POLICY));
        assert_eq!((b.stats().capacity, b.stats().policy), (DEFAULT_CAPACITY, DEFAULT_POLICY));
    }

    #[test]
    fn test_invalid_configuration_changes_nothing() {
        let registry = Registry::new();
        let store = registry.register::<u32>("store", CacheConfig::new());
        assert!(matches!(registry.set_capacity(-1), Err(Error::Config(_))));
        assert!(matches!(registry.set_policy("random"), Err(Error::Config(_))));
        assert_eq!(registry.capacity(), DEFAULT_CAPACITY);
        assert_eq!(registry.policy(), DEFAULT_POLICY);
        assert_eq!(store.stats().capacity, DEFAULT_CAPACITY);
        assert!(CacheConfig::parse(-3, "lru").is_err());
        assert!(CacheConfig::parse(3, "mru").is_err());
        assert_eq!(
            CacheConfig::parse(3, "fifo").unwrap(),
            CacheConfig::new().capacity(3).policy(Policy::Fifo),
        );
    }

    #[test]
    fn test_registration_inherits_current_defaults() {
        let registry = Registry::new();
        registry.set_capacity(2).unwrap();
        let store = registry.register::<u8>("late", CacheConfig::new());
        assert_eq!(store.stats().capacity, 2);
    }

    #[test]
    fn test_clear_all_and_dropped_stores() {
        let registry = Registry::new();
        let kept = registry.register::<u32>("kept", CacheConfig::new());
        let dropped = registry.register::<u32>("dropped", CacheConfig::new());
        kept.insert(key::key(&1).unwrap(), 1);
        assert_eq!(registry.len(), 2);
        drop(dropped);
        assert_eq!(registry.len(), 1);
        registry.clear_all();
        assert_eq!(kept.stats().current_size, 0);
        assert_eq!(kept.stats().misses, 0);
    }

    #[test]
    fn test_registration_forgets_dropped_stores() {
        let registry = Registry::new();
        for i in 0..100 {
            let square = registry.memoize(
                "square",
                CacheConfig::new(),
                Signature::new().param("x"),
                |(x,): (u32,)| x * x,
            );
            assert_eq!(square.call((i,)), i * i);
        }
        assert!(registry.0.state.read().stores.len() <= 1);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_enable_disable() {
        let registry = Registry::new();
        assert!(registry.is_enabled());
        registry.disable();
        assert!(!registry.is_enabled());
        registry.enable();
        assert!(registry.is_enabled());
    }
}
