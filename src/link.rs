//! Linked abstract operations.
//!
//! An interface can declare groups of linked operations. Implementing any
//! one operation of a group satisfies the whole group, so a concrete type
//! only needs one of several equivalent entry points (say, a profile in
//! real space or in Fourier space) to be instantiable.

use std::any::{TypeId, type_name};
use std::collections::BTreeSet;
use std::sync::LazyLock;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// The operations an abstract interface requires.
#[derive(Debug, Clone)]
pub struct Interface {
    name: &'static str,
    required: BTreeSet<&'static str>,
    linked: Vec<BTreeSet<&'static str>>,
}

impl Interface {
    /// An interface without requirements.
    pub fn new(name: &'static str) -> Self {
        Self { name, required: BTreeSet::new(), linked: Vec::new() }
    }

    /// A sub-interface that inherits all requirements and linked groups.
    pub fn extend(&self, name: &'static str) -> Self {
        Self { name, ..self.clone() }
    }

    /// Require an operation.
    pub fn require(mut self, op: &'static str) -> Self {
        self.required.insert(op);
        self
    }

    /// Require a group of operations of which one implementation suffices.
    pub fn link(mut self, ops: impl IntoIterator<Item = &'static str>) -> Self {
        let group: BTreeSet<_> = ops.into_iter().collect();
        self.required.extend(group.iter().copied());
        self.linked.push(group);
        self
    }

    /// The interface's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Compute which operations still block instantiation of a concrete type.
    pub fn register(
        &self,
        type_name: &'static str,
        implemented: &[&'static str],
    ) -> Capabilities {
        let implemented: BTreeSet<_> = implemented.iter().copied().collect();
        let mut blocking: BTreeSet<_> =
            self.required.difference(&implemented).copied().collect();

        for group in &self.linked {
            let still_abstract = group.iter().filter(|op| blocking.contains(*op)).count();
            if still_abstract < group.len() {
                blocking.retain(|op| !group.contains(op));
            }
        }

        if !blocking.is_empty() {
            tracing::debug!(
                type_name,
                interface = self.name,
                blocking = ?blocking,
                "registered abstract type"
            );
        }

        Capabilities { type_name, blocking }
    }
}

/// The result of registering a concrete type against an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    type_name: &'static str,
    blocking: BTreeSet<&'static str>,
}

impl Capabilities {
    /// Whether the type can be instantiated.
    pub fn is_instantiable(&self) -> bool {
        self.blocking.is_empty()
    }

    /// The operations that must be implemented before instantiation.
    pub fn blocking(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.blocking.iter().copied()
    }

    /// Fail with [`Error::Abstract`] if any operation is missing.
    pub fn check(&self) -> Result<()> {
        if self.is_instantiable() {
            return Ok(());
        }
        Err(Error::Abstract {
            type_name: self.type_name,
            missing: self.blocking().collect(),
        })
    }
}

/// A concrete type of an interface with linked operations.
pub trait Linked: 'static {
    /// The operations this type implements.
    const IMPLEMENTED: &'static [&'static str];

    /// The interface the type implements.
    fn interface() -> Interface;
}

/// Capabilities of every registered type.
static CAPABILITIES: LazyLock<RwLock<FxHashMap<TypeId, &'static Capabilities>>> =
    LazyLock::new(|| RwLock::new(FxHashMap::default()));

/// The capabilities of `T`, computed on first request.
pub fn capabilities<T: Linked>() -> &'static Capabilities {
    let id = TypeId::of::<T>();
    if let Some(&capabilities) = CAPABILITIES.read().get(&id) {
        return capabilities;
    }

    *CAPABILITIES.write().entry(id).or_insert_with(|| {
        let capabilities = T::interface().register(type_name::<T>(), T::IMPLEMENTED);
        let leaked: &'static Capabilities = Box::leak(Box::new(capabilities));
        leaked
    })
}

/// Construct a value of `T` if none of its operations are abstract.
pub fn instantiate<T: Linked>(ctor: impl FnOnce() -> T) -> Result<T> {
    capabilities::<T>().check()?;
    Ok(ctor())
}
