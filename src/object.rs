use std::any::{TypeId, type_name};
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};

use parking_lot::{RwLock, RwLockReadGuard};

use crate::error::{Error, Result};
use crate::guard::{Lockable, MutationGuard};
use crate::key::{Arg, ToArg};
use crate::repr::Repr;

/// The base contract of a guarded model object.
pub trait GuardedObject: Send + Sync + 'static {
    /// Render a canonical description of the object.
    ///
    /// Two objects of the same type with equal descriptions are equal. If
    /// `None`, the object is only equal to itself.
    fn describe(&self) -> Option<String> {
        None
    }

    /// Derive internal state from the constructor's fields.
    ///
    /// Runs once, before the object is locked. Does not count as a mutation.
    fn build(&mut self) {}

    /// Apply named parameter updates.
    ///
    /// Types are immutable unless they override this.
    fn update_parameters(&mut self, params: &[(&str, Arg)]) -> Result<()> {
        let _ = params;
        Err(Error::NotImplemented { type_name: type_name::<Self>() })
    }
}

/// A model object that is read-only outside of mutation scopes.
///
/// Equality and hashing use the lazily cached representation rendered by
/// [`GuardedObject::describe`]. The representation only changes after a
/// mutating scope ends.
pub struct Guarded<T> {
    value: RwLock<T>,
    guard: MutationGuard,
}

impl<T: GuardedObject> Guarded<T> {
    /// Finish constructing an object and lock it.
    pub fn new(mut value: T) -> Self {
        let guard = MutationGuard::new();
        value.build();
        guard.lock();
        Self { value: RwLock::new(value), guard }
    }

    /// Borrow the object.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.value.read()
    }

    /// Assign fields of the object.
    ///
    /// Fails with [`Error::Permission`] unless a mutation scope is active.
    ///
    /// `f` runs under the object's write lock and must not access the same
    /// object again, neither directly (`read`, `repr`, comparison, hashing)
    /// nor by passing it to a memoized computation. Doing so deadlocks.
    pub fn assign<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut value = self.value.write();
        self.guard.check(type_name::<T>())?;
        Ok(f(&mut value))
    }

    /// Run `f` inside a mutation scope on this object.
    pub fn unlocked<R>(&self, mutate: bool, f: impl FnOnce(&Self) -> R) -> R {
        let _scope = self.guard.scope(mutate);
        f(self)
    }

    /// Request a mutation through [`GuardedObject::update_parameters`].
    pub fn update_parameters(&self, params: &[(&str, Arg)]) -> Result<()> {
        self.unlocked(true, |this| {
            this.assign(|value| value.update_parameters(params))
                .and_then(|result| result)
        })
    }

    /// The canonical representation, rendered on first access.
    ///
    /// Objects without a description render as their type name and a
    /// process-unique identity.
    pub fn repr(&self) -> Repr {
        self.guard.repr().get_or_render(|| {
            self.value.read().describe().unwrap_or_else(|| {
                format!("<{} object #{}>", type_name::<T>(), self.guard.id())
            })
        })
    }

    /// Whether the representation is currently cached.
    pub fn is_repr_cached(&self) -> bool {
        self.guard.repr().is_cached()
    }
}

impl<T> Lockable for Guarded<T> {
    fn mutation_guard(&self) -> &MutationGuard {
        &self.guard
    }
}

impl<T: GuardedObject, U: GuardedObject> PartialEq<Guarded<U>> for Guarded<T> {
    fn eq(&self, other: &Guarded<U>) -> bool {
        TypeId::of::<T>() == TypeId::of::<U>()
            && self.repr().as_str() == other.repr().as_str()
    }
}

impl<T: GuardedObject> Eq for Guarded<T> {}

impl<T: GuardedObject> Hash for Guarded<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u128(self.repr().hash());
    }
}

impl<T: GuardedObject> Debug for Guarded<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.repr().as_str())
    }
}

/// Guarded objects are keyed by their representation.
impl<T: GuardedObject> ToArg for Guarded<T> {
    fn to_arg(&self) -> Arg {
        Arg::Hashed(self.repr().hash())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::repr::ReprBuilder;

    struct MassDef {
        delta: u32,
        rho_type: &'static str,
        name: String,
    }

    impl MassDef {
        fn new(delta: u32, rho_type: &'static str) -> Guarded<Self> {
            Guarded::new(Self { delta, rho_type, name: String::new() })
        }
    }

    impl GuardedObject for MassDef {
        fn describe(&self) -> Option<String> {
            Some(
                ReprBuilder::new("MassDef")
                    .field("delta", &self.delta)
                    .field("rho_type", &self.rho_type)
                    .finish(),
            )
        }

        fn build(&mut self) {
            self.name = format!("{}{}", self.delta, &self.rho_type[..1]);
        }

        fn update_parameters(&mut self, params: &[(&str, Arg)]) -> Result<()> {
            for (name, value) in params {
                match (*name, value) {
                    ("delta", Arg::Int(delta)) => self.delta = *delta as u32,
                    _ => return Err(Error::Config(format!("unknown parameter `{name}`"))),
                }
            }
            Ok(())
        }
    }

    struct Anonymous;

    impl GuardedObject for Anonymous {}

    struct Concentration(u32);

    impl GuardedObject for Concentration {
        fn describe(&self) -> Option<String> {
            Some(
                ReprBuilder::new("MassDef")
                    .field("delta", &self.0)
                    .field("rho_type", &"matter")
                    .finish(),
            )
        }
    }

    #[test]
    fn test_locked_after_construction() {
        let mdef = MassDef::new(200, "matter");
        assert_eq!(mdef.read().name, "200m");
        assert_eq!(
            mdef.assign(|m| m.delta = 500),
            Err(Error::Permission { type_name: type_name::<MassDef>() })
        );
        assert_eq!(mdef.read().delta, 200);
    }

    #[test]
    fn test_mutating_scope_discards_repr() {
        let mdef = MassDef::new(200, "matter");
        assert!(!mdef.is_repr_cached());
        let before = mdef.repr();
        assert!(mdef.is_repr_cached());

        mdef.unlocked(true, |m| m.assign(|m| m.delta = 500)).unwrap();
        assert!(!mdef.is_repr_cached());
        assert_ne!(mdef.repr(), before);
        assert_eq!(mdef.repr().as_str(), r#"MassDef(delta=500, rho_type="matter")"#);
    }

    #[test]
    fn test_non_mutating_scope_keeps_repr() {
        let mdef = MassDef::new(200, "matter");
        let before = mdef.repr();
        mdef.unlocked(false, |m| m.assign(|m| m.name = "internal".into())).unwrap();
        assert!(mdef.is_repr_cached());
        assert_eq!(mdef.repr(), before);
    }

    #[test]
    fn test_update_parameters() {
        let mdef = MassDef::new(200, "matter");
        let before = mdef.repr();
        mdef.update_parameters(&[("delta", Arg::Int(500))]).unwrap();
        assert_eq!(mdef.read().delta, 500);
        assert_ne!(mdef.repr(), before);
        assert!(mdef.assign(|m| m.delta = 1).is_err());

        let anon = Guarded::new(Anonymous);
        assert!(matches!(
            anon.update_parameters(&[("x", Arg::Int(2))]),
            Err(Error::NotImplemented { .. })
        ));
    }

    #[test]
    fn test_equality_and_hash() {
        let a = MassDef::new(200, "matter");
        let b = MassDef::new(200, "matter");
        let c = MassDef::new(500, "matter");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(crate::hash::hash(&a), crate::hash::hash(&b));

        // Same rendering, different type.
        let imposter = Guarded::new(Concentration(200));
        assert_eq!(a.repr().as_str(), imposter.repr().as_str());
        assert!(a != imposter);
        assert!(imposter == Guarded::new(Concentration(200)));

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_identity_fallback() {
        let a = Guarded::new(Anonymous);
        let b = Guarded::new(Anonymous);
        assert_eq!(a, a);
        assert_ne!(a, b);
        assert!(a.repr().as_str().contains("Anonymous object #"));
    }

    fn rendered() -> Guarded<Anonymous> {
        let object = Guarded::new(Anonymous);
        object.repr();
        object
    }

    #[test]
    fn test_identity_fallback_survives_moves() {
        let objects: Vec<_> = (0..16).map(|_| rendered()).collect();
        for (i, a) in objects.iter().enumerate() {
            for b in &objects[i + 1..] {
                assert_ne!(a, b);
                assert_ne!(a.repr().hash(), b.repr().hash());
            }
        }

        let moved: Vec<_> = objects.into_iter().rev().collect();
        assert_eq!(moved[0], moved[0]);
        assert_ne!(moved[0], moved[1]);
    }

    struct Solver(f64);

    impl GuardedObject for Solver {}

    #[test]
    fn test_anonymous_arguments_do_not_share_results() {
        let registry = crate::registry::Registry::new();
        let run = registry.memoize(
            "run",
            crate::registry::CacheConfig::new(),
            crate::key::Signature::new().param("solver"),
            |(solver,): (&'static Guarded<Solver>,)| solver.read().0,
        );

        let a: &'static _ = Box::leak(Box::new(Guarded::new(Solver(1.0))));
        let b: &'static _ = Box::leak(Box::new(Guarded::new(Solver(2.0))));
        assert_eq!(run.call((a,)), 1.0);
        assert_eq!(run.call((b,)), 2.0);
        assert_eq!(run.call((a,)), 1.0);
        assert_eq!(run.stats().hits, 1);
    }
}
