extern crate proc_macro;

macro_rules! bail {
    ($item:expr, $fmt:literal $($tts:tt)*) => {
        return Err(Error::new_spanned(
            &$item,
            format!(concat!("ccl-base: ", $fmt) $($tts)*)
        ))
    }
}

mod memoize;
mod unlock;
mod utils;

use proc_macro::TokenStream;
use quote::quote;
use syn::{Error, Result, parse_quote};

/// Cache the results of a function in a bounded store.
///
/// The store is registered with the global registry under the function's
/// path. Arguments must implement `ToArg`, the return type `Clone + Send`.
///
/// - `capacity = N`: maximum number of cached results (default: the
///   registry's default capacity).
/// - `policy = "fifo" | "lru" | "lfu"`: eviction policy (default: the
///   registry's default policy).
/// - `persistent`: keep caching while the registry is disabled.
///
/// An `Option` parameter marked `#[default(expr)]` falls back to `expr`
/// when `None` is passed, before the call is keyed.
///
/// ```
/// # use ccl_base::memoize;
/// #[memoize(capacity = 64, policy = "lfu")]
/// fn sigma(mass: f64, #[default(0.0)] z: Option<f64>) -> f64 {
///     let z = z.unwrap();
///     mass.powf(0.2) / (1.0 + z)
/// }
/// ```
#[proc_macro_attribute]
pub fn memoize(args: TokenStream, stream: TokenStream) -> TokenStream {
    let meta = syn::parse_macro_input!(args as memoize::Meta);
    let func = syn::parse_macro_input!(stream as syn::ItemFn);
    memoize::expand(meta, func)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// Run a function inside a mutation scope on one of its arguments.
///
/// - `arg = N`: the argument whose guard to unlock, counting a receiver
///   as argument zero (default: `0`).
/// - `mutate = false`: declare the scope as non-mutating, which keeps the
///   cached representation (default: `true`).
///
/// ```
/// # use ccl_base::{Guarded, GuardedObject, Result, unlock};
/// struct Halo {
///     mass: f64,
/// }
///
/// impl GuardedObject for Halo {}
///
/// #[unlock]
/// fn rescale(halo: &Guarded<Halo>, factor: f64) -> Result<()> {
///     halo.assign(|halo| halo.mass *= factor)
/// }
///
/// let halo = Guarded::new(Halo { mass: 1e14 });
/// rescale(&halo, 2.0).unwrap();
/// assert!(halo.assign(|halo| halo.mass = 0.0).is_err());
/// ```
#[proc_macro_attribute]
pub fn unlock(args: TokenStream, stream: TokenStream) -> TokenStream {
    let meta = syn::parse_macro_input!(args as unlock::Meta);
    let func = syn::parse_macro_input!(stream as syn::ItemFn);
    unlock::expand(meta, func)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
