use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::repr::ReprCache;

/// Source of session tokens. Zero means "no session".
static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Source of object identities.
static NEXT_OBJECT: AtomicU64 = AtomicU64::new(1);

/// The lock and session state of one guarded object.
///
/// The guard starts unlocked so that the object can be built, and is locked
/// once construction completes. Afterwards, fields may only be assigned
/// inside a [`MutationScope`].
pub struct MutationGuard {
    /// Unique per guard and unaffected by moves.
    id: u64,
    locked: AtomicBool,
    /// Token of the active scope, or zero.
    session: AtomicU64,
    repr: ReprCache,
}

impl MutationGuard {
    /// Create an unlocked guard for an object under construction.
    pub fn new() -> Self {
        Self {
            id: NEXT_OBJECT.fetch_add(1, Ordering::Relaxed),
            locked: AtomicBool::new(false),
            session: AtomicU64::new(0),
            repr: ReprCache::new(),
        }
    }

    /// The identity of the guarded object.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Lock the object. Called when construction completes.
    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    /// Whether field assignment is currently forbidden.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// The token of the active mutation scope, if any.
    pub fn session(&self) -> Option<NonZeroU64> {
        NonZeroU64::new(self.session.load(Ordering::SeqCst))
    }

    /// Fail with a permission error if the object is locked.
    pub fn check(&self, type_name: &'static str) -> Result<()> {
        if self.is_locked() {
            return Err(Error::Permission { type_name });
        }
        Ok(())
    }

    /// Enter a mutation scope. See [`MutationScope::enter`].
    pub fn scope(&self, mutate: bool) -> MutationScope<'_> {
        MutationScope::enter(self, mutate)
    }

    /// The object's representation cache.
    pub fn repr(&self) -> &ReprCache {
        &self.repr
    }
}

impl Default for MutationGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Access to the mutation guard of an object.
pub trait Lockable {
    fn mutation_guard(&self) -> &MutationGuard;
}

impl Lockable for MutationGuard {
    fn mutation_guard(&self) -> &MutationGuard {
        self
    }
}

impl<T: Lockable + ?Sized> Lockable for &T {
    fn mutation_guard(&self) -> &MutationGuard {
        (**self).mutation_guard()
    }
}

/// A bounded region in which a locked object may be modified.
///
/// Only the outermost scope on an object owns the session; nested scopes
/// are no-ops. When the owning scope ends, the object is locked again and,
/// if the scope was declared mutating, its cached representation is
/// discarded.
#[must_use = "the object is locked again as soon as the scope is dropped"]
pub struct MutationScope<'a> {
    guard: &'a MutationGuard,
    /// Present if this scope owns the session.
    token: Option<NonZeroU64>,
    mutate: bool,
}

impl<'a> MutationScope<'a> {
    /// Unlock the object unless another scope is already active on it.
    pub fn enter(guard: &'a MutationGuard, mutate: bool) -> Self {
        let token = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        let owned = guard
            .session
            .compare_exchange(0, token, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if owned {
            guard.locked.store(false, Ordering::SeqCst);
        }

        Self {
            guard,
            token: owned.then(|| NonZeroU64::new(token)).flatten(),
            mutate,
        }
    }

    /// Whether this scope owns the object's session.
    pub fn is_owner(&self) -> bool {
        self.token.is_some()
    }

    /// Whether the scope declared a mutating change.
    pub fn is_mutating(&self) -> bool {
        self.mutate
    }
}

impl Drop for MutationScope<'_> {
    fn drop(&mut self) {
        let Some(token) = self.token else { return };
        if self.guard.session.load(Ordering::SeqCst) != token.get() {
            return;
        }

        if self.mutate {
            self.guard.repr.invalidate();
        }
        self.guard.locked.store(true, Ordering::SeqCst);
        self.guard.session.store(0, Ordering::SeqCst);
    }
}
