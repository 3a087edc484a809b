use std::fmt::{self, Debug, Formatter, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// A canonical representation and its hash.
#[derive(Clone, PartialEq, Eq)]
pub struct Repr {
    text: Arc<str>,
    hash: u128,
}

impl Repr {
    fn new(text: String) -> Self {
        let hash = crate::hash::hash(text.as_str());
        Self { text: text.into(), hash }
    }

    /// The representation string.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The hash of the representation string.
    pub fn hash(&self) -> u128 {
        self.hash
    }
}

impl Debug for Repr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A lazily computed representation that is discarded on mutation.
///
/// Rendering runs without holding the cache's lock. A rendering that
/// overlaps an invalidation is returned to its caller but not cached.
#[derive(Default)]
pub struct ReprCache(Mutex<Slot>);

#[derive(Default)]
struct Slot {
    repr: Option<Repr>,
    /// Bumped on every invalidation.
    generation: u64,
}

impl ReprCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached representation, rendering it first if needed.
    pub fn get_or_render(&self, render: impl FnOnce() -> String) -> Repr {
        let generation = {
            let slot = self.0.lock();
            if let Some(repr) = &slot.repr {
                return repr.clone();
            }
            slot.generation
        };

        let repr = Repr::new(render());
        let mut slot = self.0.lock();
        if slot.generation != generation {
            return repr;
        }
        slot.repr.get_or_insert(repr).clone()
    }

    /// Whether a representation is cached.
    pub fn is_cached(&self) -> bool {
        self.0.lock().repr.is_some()
    }

    /// Discard the cached representation.
    pub fn invalidate(&self) {
        let mut slot = self.0.lock();
        slot.repr = None;
        slot.generation = slot.generation.wrapping_add(1);
    }
}

/// Renders `Name(field=value, ...)` descriptions.
///
/// Field values use their `Debug` output; guarded objects render as their
/// own representation.
pub struct ReprBuilder {
    buf: String,
    fields: usize,
}

impl ReprBuilder {
    /// Start a description of a type.
    pub fn new(name: &str) -> Self {
        let mut buf = String::with_capacity(64);
        buf.push_str(name);
        buf.push('(');
        Self { buf, fields: 0 }
    }

    /// Add a field.
    pub fn field(mut self, name: &str, value: &dyn Debug) -> Self {
        if self.fields > 0 {
            self.buf.push_str(", ");
        }
        let _ = write!(self.buf, "{name}={value:?}");
        self.fields += 1;
        self
    }

    /// Finish the description.
    pub fn finish(mut self) -> String {
        self.buf.push(')');
        self.buf
    }
}
