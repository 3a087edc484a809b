//! Canonicalization of call arguments into cache keys.

use std::any::type_name;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;

use crate::error::{Error, Result};

/// A dynamically shaped argument to a cached computation.
///
/// Typed values are converted into this form through [`ToArg`]. Floats are
/// compared and hashed by their bit pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// An omitted optional argument.
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    /// An ordered sequence. Order is significant.
    Seq(Vec<Arg>),
    /// An unordered mapping. Sorted by key during canonicalization.
    Map(Vec<(String, Arg)>),
    /// A mapping whose insertion order is significant.
    OrderedMap(Vec<(String, Arg)>),
    /// The raw bytes of a flat numeric buffer.
    Buffer(Vec<u8>),
    /// The hash of a value that supports native hashing.
    Hashed(u128),
    /// A value that cannot be hashed, identified by its type name.
    Opaque(&'static str),
}

/// The canonical, hashable form of an [`Arg`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Canonical {
    None,
    Bool(bool),
    Int(i128),
    Float(u64),
    Str(String),
    Tuple(Vec<Canonical>),
    Bytes(Vec<u8>),
    Hashed(u128),
}

impl Arg {
    /// Normalize the argument recursively.
    ///
    /// Fails with [`Error::UnhashableType`] if any part of it is opaque.
    pub fn canonicalize(&self) -> Result<Canonical> {
        Ok(match self {
            Self::None => Canonical::None,
            Self::Bool(v) => Canonical::Bool(*v),
            Self::Int(v) => Canonical::Int(*v),
            Self::Float(v) => Canonical::Float(v.to_bits()),
            Self::Str(v) => Canonical::Str(v.clone()),
            Self::Seq(items) => Canonical::Tuple(
                items.iter().map(Arg::canonicalize).collect::<Result<_>>()?,
            ),
            Self::Map(pairs) => {
                let mut pairs = canonical_pairs(pairs)?;
                pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
                Canonical::Tuple(pairs.into_iter().map(pair).collect())
            }
            Self::OrderedMap(pairs) => Canonical::Tuple(
                canonical_pairs(pairs)?.into_iter().map(pair).collect(),
            ),
            Self::Buffer(bytes) => Canonical::Bytes(bytes.clone()),
            Self::Hashed(hash) => Canonical::Hashed(*hash),
            Self::Opaque(name) => return Err(Error::UnhashableType(*name)),
        })
    }

    /// Canonicalize and hash the argument.
    pub fn key(&self) -> Result<Key> {
        self.canonicalize().map(|canonical| Key::of(&canonical))
    }
}

fn canonical_pairs(pairs: &[(String, Arg)]) -> Result<Vec<(&str, Canonical)>> {
    pairs
        .iter()
        .map(|(k, v)| v.canonicalize().map(|c| (k.as_str(), c)))
        .collect()
}

fn pair((k, v): (&str, Canonical)) -> Canonical {
    Canonical::Tuple(vec![Canonical::Str(k.into()), v])
}

/// A process-scoped cache key.
///
/// Renders as 32 lowercase hexadecimal digits.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Key(u128);

impl Key {
    /// Hash a canonical argument.
    pub fn of(canonical: &Canonical) -> Self {
        Self(crate::hash::hash(canonical))
    }

    /// The raw 128-bit value.
    pub fn as_u128(self) -> u128 {
        self.0
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

/// Compute the key of any convertible value.
pub fn key<T: ToArg + ?Sized>(value: &T) -> Result<Key> {
    value.to_arg().key()
}

/// Conversion of typed values into arguments.
pub trait ToArg {
    /// Describe the value as an argument.
    fn to_arg(&self) -> Arg;
}

impl ToArg for Arg {
    fn to_arg(&self) -> Arg {
        self.clone()
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Arg {
        (**self).to_arg()
    }
}

macro_rules! int_arg {
    ($($ty:ty),*) => {
        $(impl ToArg for $ty {
            fn to_arg(&self) -> Arg {
                Arg::Int(*self as i128)
            }
        })*
    };
}

int_arg!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, usize);

impl ToArg for f32 {
    fn to_arg(&self) -> Arg {
        Arg::Float(f64::from(*self))
    }
}

impl ToArg for f64 {
    fn to_arg(&self) -> Arg {
        Arg::Float(*self)
    }
}

impl ToArg for bool {
    fn to_arg(&self) -> Arg {
        Arg::Bool(*self)
    }
}

impl ToArg for char {
    fn to_arg(&self) -> Arg {
        Arg::Str(self.to_string())
    }
}

impl ToArg for str {
    fn to_arg(&self) -> Arg {
        Arg::Str(self.into())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Arg {
        Arg::Str(self.clone())
    }
}

/// `None` stands for an omitted argument.
impl<T: ToArg> ToArg for Option<T> {
    fn to_arg(&self) -> Arg {
        self.as_ref().map_or(Arg::None, ToArg::to_arg)
    }
}

impl<T: ToArg> ToArg for [T] {
    fn to_arg(&self) -> Arg {
        Arg::Seq(self.iter().map(ToArg::to_arg).collect())
    }
}

impl<T: ToArg, const N: usize> ToArg for [T; N] {
    fn to_arg(&self) -> Arg {
        self.as_slice().to_arg()
    }
}

impl<T: ToArg> ToArg for Vec<T> {
    fn to_arg(&self) -> Arg {
        self.as_slice().to_arg()
    }
}

impl<K: AsRef<str>, V: ToArg, S> ToArg for HashMap<K, V, S> {
    fn to_arg(&self) -> Arg {
        Arg::Map(self.iter().map(|(k, v)| (k.as_ref().into(), v.to_arg())).collect())
    }
}

impl<K: AsRef<str>, V: ToArg> ToArg for BTreeMap<K, V> {
    fn to_arg(&self) -> Arg {
        Arg::Map(self.iter().map(|(k, v)| (k.as_ref().into(), v.to_arg())).collect())
    }
}

/// A mapping whose order is part of its identity.
pub struct Ordered<'a, K, V>(pub &'a [(K, V)]);

impl<K: AsRef<str>, V: ToArg> ToArg for Ordered<'_, K, V> {
    fn to_arg(&self) -> Arg {
        Arg::OrderedMap(
            self.0.iter().map(|(k, v)| (k.as_ref().into(), v.to_arg())).collect(),
        )
    }
}

/// A flat numeric buffer, keyed by its raw bytes instead of elementwise.
pub struct Buffer<'a, T>(pub &'a [T]);

/// Element types of a [`Buffer`].
pub trait Numeric: Copy {
    /// Append the native-endian bytes of the value.
    fn extend_bytes(self, out: &mut Vec<u8>);
}

macro_rules! numeric {
    ($($ty:ty),*) => {
        $(impl Numeric for $ty {
            #[inline]
            fn extend_bytes(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_ne_bytes());
            }
        })*
    };
}

numeric!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl<T: Numeric> ToArg for Buffer<'_, T> {
    fn to_arg(&self) -> Arg {
        let mut bytes = Vec::with_capacity(std::mem::size_of_val(self.0));
        for &item in self.0 {
            item.extend_bytes(&mut bytes);
        }
        Arg::Buffer(bytes)
    }
}

/// A value that is keyed by its own `Hash` implementation.
pub struct Hashed<T>(pub T);

impl<T: Hash> ToArg for Hashed<T> {
    fn to_arg(&self) -> Arg {
        Arg::Hashed(crate::hash::hash(&self.0))
    }
}

/// A value that takes part in a call but cannot be keyed, such as a handle
/// to an external solver.
pub struct Opaque<T>(pub T);

impl<T> ToArg for Opaque<T> {
    fn to_arg(&self) -> Arg {
        Arg::Opaque(type_name::<T>())
    }
}

/// Positional arguments of a call.
///
/// Implemented for tuples of [`ToArg`] values up to length twelve.
pub trait Params {
    /// Convert every argument, in order.
    fn args(&self) -> Vec<Arg>;
}

macro_rules! params {
    ($($param:tt $idx:tt),*) => {
        #[allow(unused_variables)]
        impl<$($param: ToArg),*> Params for ($($param,)*) {
            fn args(&self) -> Vec<Arg> {
                vec![$(self.$idx.to_arg()),*]
            }
        }

        #[allow(unused_parens)]
        impl<$($param: ToArg),*> ToArg for ($($param,)*) {
            fn to_arg(&self) -> Arg {
                Arg::Seq(Params::args(self))
            }
        }
    };
}

params! {}
params! { A 0 }
params! { A 0, B 1 }
params! { A 0, B 1, C 2 }
params! { A 0, B 1, C 2, D 3 }
params! { A 0, B 1, C 2, D 3, E 4 }
params! { A 0, B 1, C 2, D 3, E 4, F 5 }
params! { A 0, B 1, C 2, D 3, E 4, F 5, G 6 }
params! { A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7 }
params! { A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8 }
params! { A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9 }
params! { A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10 }
params! { A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10, L 11 }

/// The parameter list of a cached computation.
///
/// Declares parameter names in positional order and the default values of
/// optional parameters, so that omitting an optional argument and passing
/// its default explicitly produce the same key.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<(String, Option<Arg>)>,
}

impl Signature {
    /// A signature without parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required parameter.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push((name.into(), None));
        self
    }

    /// Add an optional parameter with its declared default.
    pub fn optional(mut self, name: impl Into<String>, default: impl ToArg) -> Self {
        self.params.push((name.into(), Some(default.to_arg())));
        self
    }

    /// The number of declared parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether no parameters are declared.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Merge positional arguments with the declared defaults.
    ///
    /// Omitted arguments take their default. Arguments beyond the declared
    /// parameters are named by position (`#3`).
    pub fn bind(&self, args: Vec<Arg>) -> Arg {
        let mut args = args.into_iter();
        let mut bound = Vec::with_capacity(self.params.len());
        for (name, default) in &self.params {
            let value = match (args.next(), default) {
                (None | Some(Arg::None), Some(default)) => default.clone(),
                (Some(arg), _) => arg,
                (None, None) => Arg::None,
            };
            bound.push((name.clone(), value));
        }

        let offset = self.params.len();
        bound.extend(args.enumerate().map(|(i, arg)| (format!("#{}", offset + i), arg)));
        Arg::Map(bound)
    }

    /// Compute the key of a call.
    pub fn key(&self, args: Vec<Arg>) -> Result<Key> {
        self.bind(args).key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_unify_across_widths() {
        assert_eq!(key(&3u8).unwrap(), key(&3i64).unwrap());
        assert_eq!(key(&0.5f32).unwrap(), key(&0.5f64).unwrap());
        assert_ne!(key(&1).unwrap(), key(&1.0).unwrap());
        assert_ne!(key("1").unwrap(), key(&1).unwrap());
    }

    #[test]
    fn test_sequences_are_ordered() {
        assert_eq!(key(&vec![1, 2, 3]).unwrap(), key(&[1, 2, 3]).unwrap());
        assert_ne!(key(&vec![1, 2, 3]).unwrap(), key(&vec![3, 2, 1]).unwrap());
        assert_ne!(key(&vec![vec![1], vec![2]]).unwrap(), key(&vec![vec![1, 2]]).unwrap());
    }

    #[test]
    fn test_mappings_are_sorted_unless_ordered() {
        let mut a = HashMap::new();
        a.insert("omega_c", 0.25);
        a.insert("omega_b", 0.05);
        let mut b = BTreeMap::new();
        b.insert("omega_b", 0.05);
        b.insert("omega_c", 0.25);
        assert_eq!(key(&a).unwrap(), key(&b).unwrap());

        let forward = [("omega_b", 0.05), ("omega_c", 0.25)];
        let backward = [("omega_c", 0.25), ("omega_b", 0.05)];
        assert_eq!(key(&Ordered(&forward)).unwrap(), key(&b).unwrap());
        assert_ne!(key(&Ordered(&forward)).unwrap(), key(&Ordered(&backward)).unwrap());
    }

    #[test]
    fn test_buffers_use_raw_bytes() {
        let data = [1.0f64, 2.0, 3.0];
        let arg = Buffer(&data).to_arg();
        assert_eq!(arg, Arg::Buffer(data.iter().flat_map(|v| v.to_ne_bytes()).collect()));
        assert_eq!(key(&Buffer(&data)).unwrap(), key(&Buffer(&data.to_vec())).unwrap());
        assert_ne!(key(&Buffer(&data)).unwrap(), key(&data).unwrap());
    }

    #[test]
    fn test_opaque_values_fail() {
        struct Solver;
        let err = key(&(1, Opaque(Solver))).unwrap_err();
        assert!(matches!(err, Error::UnhashableType(name) if name.ends_with("Solver")));
    }

    #[test]
    fn test_hashed_values() {
        #[derive(Hash)]
        struct MassDef(&'static str, u32);
        assert_eq!(
            key(&Hashed(MassDef("matter", 200))).unwrap(),
            key(&Hashed(MassDef("matter", 200))).unwrap(),
        );
        assert_ne!(
            key(&Hashed(MassDef("matter", 200))).unwrap(),
            key(&Hashed(MassDef("critical", 200))).unwrap(),
        );
    }

    #[test]
    fn test_signature_merges_defaults() {
        let sig = Signature::new().param("a").optional("n", 3);
        let omitted = sig.key((0.5, None::<i32>).args()).unwrap();
        let explicit = sig.key((0.5, Some(3)).args()).unwrap();
        let short = sig.key((0.5,).args()).unwrap();
        let other = sig.key((0.5, Some(4)).args()).unwrap();
        assert_eq!(omitted, explicit);
        assert_eq!(omitted, short);
        assert_ne!(omitted, other);
    }

    #[test]
    fn test_key_renders_fixed_width_hex() {
        let rendered = key(&1).unwrap().to_string();
        assert_eq!(rendered.len(), 32);
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
