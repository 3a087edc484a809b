/*!
Bounded caching for expensive computations and write-protected model objects.

- Wrap a computation with a store of bounded size and a FIFO, LRU or LFU
  eviction policy, either at runtime through [`Registry::memoize`] or with
  the [`memoize`] attribute.
- Keep model objects read-only outside of explicit [`MutationScope`]s and
  compare them by a lazily cached canonical representation.
- Let a concrete type satisfy an interface through any one of several
  [linked](link) operations.

```
use ccl_base::{CacheConfig, Registry, Signature};

let registry = Registry::new();
let growth = registry.memoize(
    "growth",
    CacheConfig::new().capacity(16),
    Signature::new().param("a").optional("k", 0.1),
    |(a, k): (f64, Option<f64>)| a * k.unwrap_or(0.1),
);

// Omitting an optional argument and passing its default share a key.
assert_eq!(growth.call((1.0, None)), growth.call((1.0, Some(0.1))));
assert_eq!(growth.stats().hits, 1);
```
*/

mod error;
mod guard;
mod hash;
pub mod key;
pub mod link;
mod memoize;
mod object;
mod policy;
mod registry;
mod repr;
mod store;
#[cfg(feature = "testing")]
mod testing;

pub use crate::error::{Error, Result};
pub use crate::guard::{Lockable, MutationGuard, MutationScope};
pub use crate::key::{Arg, Buffer, Hashed, Key, Opaque, Ordered, Params, Signature, ToArg};
pub use crate::link::{Capabilities, Interface, Linked, capabilities, instantiate};
pub use crate::memoize::Memoized;
pub use crate::object::{Guarded, GuardedObject};
pub use crate::policy::Policy;
pub use crate::registry::{
    CacheConfig, DEFAULT_CAPACITY, DEFAULT_POLICY, Registry, global,
};
pub use crate::repr::{Repr, ReprBuilder, ReprCache};
pub use crate::store::{Stats, Store};

#[cfg(feature = "macros")]
pub use ccl_base_macros::{memoize, unlock};

/// These are implementation details. Do not rely on them!
#[doc(hidden)]
pub mod internal {
    pub use crate::guard::Lockable;
    pub use crate::key::{Arg, Key, ToArg};
    pub use crate::memoize::memoize;
    pub use crate::policy::Policy;
    pub use crate::registry::{CacheConfig, global};
    pub use crate::store::Store;

    #[cfg(feature = "testing")]
    pub use crate::testing::{Outcome, last_outcome, last_was_hit};

    /// Key the arguments of a call by parameter name.
    pub fn named(args: Vec<(&str, Arg)>) -> crate::Result<Key> {
        let args = args.into_iter().map(|(name, arg)| (name.to_string(), arg));
        Arg::Map(args.collect()).key()
    }
}
