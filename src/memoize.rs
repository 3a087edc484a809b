use std::sync::Arc;

use crate::error::Result;
use crate::key::{Key, Params, Signature};
use crate::registry::Registry;
use crate::store::{Stats, Store};

/// Executes a function, trying to use a cached result for it.
///
/// While the registry is disabled, only persistent stores are consulted. If
/// the input cannot be keyed, the function runs uncached and the error is
/// logged.
pub fn memoize<In, Out, K, F>(
    registry: &Registry,
    store: &Store<Out>,
    input: In,
    key: K,
    func: F,
) -> Out
where
    Out: Clone,
    K: FnOnce(&In) -> Result<Key>,
    F: FnOnce(In) -> Out,
{
    // Early bypass if caching is disabled.
    if !registry.is_enabled() && !store.is_persistent() {
        let output = func(input);

        #[cfg(feature = "testing")]
        crate::testing::record(crate::testing::Outcome::Bypass);

        return output;
    }

    match key(&input) {
        Ok(key) => cached(store, key, input, func),
        Err(err) => {
            tracing::warn!(store = store.name(), %err, "computing without cache");
            let output = func(input);

            #[cfg(feature = "testing")]
            crate::testing::record(crate::testing::Outcome::Bypass);

            output
        }
    }
}

/// Look up `key`, or compute and insert.
fn cached<In, Out, F>(store: &Store<Out>, key: Key, input: In, func: F) -> Out
where
    Out: Clone,
    F: FnOnce(In) -> Out,
{
    // Check if there is a cached output.
    if let Some(output) = store.lookup(key) {
        #[cfg(feature = "testing")]
        crate::testing::record(crate::testing::Outcome::Hit);

        return output;
    }

    // Concurrent misses on the same key may both get here. The store keeps
    // whichever insert comes last.
    let output = func(input);
    store.insert(key, output.clone());

    #[cfg(feature = "testing")]
    crate::testing::record(crate::testing::Outcome::Miss);

    output
}

/// A computation wrapped with its own cache store.
///
/// Created by [`Registry::memoize`].
pub struct Memoized<In, Out> {
    registry: Registry,
    store: Arc<Store<Out>>,
    signature: Signature,
    func: Box<dyn Fn(In) -> Out + Send + Sync>,
}

impl<In, Out> Memoized<In, Out>
where
    In: Params,
    Out: Clone + Send + 'static,
{
    pub(crate) fn new<F>(
        registry: Registry,
        store: Arc<Store<Out>>,
        signature: Signature,
        func: F,
    ) -> Self
    where
        F: Fn(In) -> Out + Send + Sync + 'static,
    {
        Self { registry, store, signature, func: Box::new(func) }
    }

    /// Call the computation or return its cached result.
    ///
    /// Arguments that cannot be keyed make the call run uncached.
    pub fn call(&self, input: In) -> Out {
        memoize(
            &self.registry,
            &*self.store,
            input,
            |input| self.key(input),
            |input| (self.func)(input),
        )
    }

    /// Like [`call`](Self::call), but fails instead of running uncached when
    /// the arguments cannot be keyed.
    pub fn try_call(&self, input: In) -> Result<Out> {
        if !self.registry.is_enabled() && !self.store.is_persistent() {
            return Ok(self.call(input));
        }

        let key = self.key(&input)?;
        Ok(cached(&*self.store, key, input, |input| (self.func)(input)))
    }

    /// The key a call with `input` would use.
    pub fn key(&self, input: &In) -> Result<Key> {
        self.signature.key(input.args())
    }

    /// The store backing this computation.
    pub fn store(&self) -> &Store<Out> {
        &self.store
    }

    /// A snapshot of the store's statistics.
    pub fn stats(&self) -> Stats {
        self.store.stats()
    }

    /// Remove all cached results and zero the statistics.
    pub fn clear(&self) {
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::Error;
    use crate::key::Opaque;
    use crate::registry::CacheConfig;

    #[test]
    fn test_call_hits_after_miss() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let square = registry.memoize(
            "square",
            CacheConfig::new(),
            Signature::new().param("x"),
            move |(x,): (f64,)| {
                counter.fetch_add(1, Ordering::SeqCst);
                x * x
            },
        );

        assert_eq!(square.call((3.0,)), 9.0);
        assert_eq!(square.call((3.0,)), 9.0);
        assert_eq!(square.call((4.0,)), 16.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let stats = square.stats();
        assert_eq!((stats.hits, stats.misses, stats.current_size), (1, 2, 2));
    }

    #[test]
    fn test_threads_share_results() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cube = registry.memoize(
            "cube",
            CacheConfig::new().capacity(16),
            Signature::new().param("x"),
            move |(x,): (u64,)| {
                counter.fetch_add(1, Ordering::SeqCst);
                x * x * x
            },
        );

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for x in 0..500u64 {
                        assert_eq!(cube.call((x % 16,)), (x % 16).pow(3));
                    }
                });
            }
        });

        let stats = cube.stats();
        assert_eq!(stats.current_size, 16);
        assert_eq!(stats.hits + stats.misses, 8 * 500);
        assert_eq!(stats.misses as usize, calls.load(Ordering::SeqCst));
        assert!(calls.load(Ordering::SeqCst) >= 16);
    }

    #[test]
    fn test_unhashable_runs_uncached() {
        struct Solver;
        let registry = Registry::new();
        let solve = registry.memoize(
            "solve",
            CacheConfig::new(),
            Signature::new().param("solver").param("x"),
            |(_, x): (Opaque<Solver>, i32)| x + 1,
        );

        assert_eq!(solve.call((Opaque(Solver), 1)), 2);
        assert_eq!(solve.call((Opaque(Solver), 1)), 2);
        assert_eq!(solve.stats().current_size, 0);
        assert!(matches!(
            solve.try_call((Opaque(Solver), 1)),
            Err(Error::UnhashableType(_))
        ));
    }

    #[test]
    fn test_disabled_bypasses_unless_persistent() {
        let registry = Registry::new();
        let ordinary = registry.memoize(
            "ordinary",
            CacheConfig::new(),
            Signature::new().param("n"),
            |(n,): (u32,)| n,
        );
        let emulator = registry.memoize(
            "load_emulator",
            CacheConfig::new().capacity(8).persistent(),
            Signature::new().param("path"),
            |(path,): (&'static str,)| path.len(),
        );

        registry.disable();
        ordinary.call((1,));
        ordinary.call((1,));
        emulator.call(("emu.bin",));
        emulator.call(("emu.bin",));
        assert_eq!(ordinary.stats().current_size, 0);
        assert_eq!(emulator.stats().hits, 1);

        registry.enable();
        ordinary.call((1,));
        ordinary.call((1,));
        assert_eq!(ordinary.stats().hits, 1);
    }
}
