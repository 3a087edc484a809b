use thiserror::Error;

/// Everything that can go wrong when configuring caches, building keys or
/// touching guarded objects.
///
/// None of these are retried. They are deterministic rejections the caller
/// has to handle or avoid.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid cache configuration: a negative capacity or an unknown
    /// eviction policy. No state was changed.
    #[error("configuration error: {0}")]
    Config(String),

    /// An argument could not be turned into a cache key.
    #[error("hashing for `{0}` is not implemented")]
    UnhashableType(&'static str),

    /// A field was assigned on a locked object outside a mutation scope.
    #[error(
        "`{type_name}` objects can only be updated via `update_parameters`, \
         if implemented"
    )]
    Permission { type_name: &'static str },

    /// The default mutation entry point was called on a type without an
    /// override.
    #[error("`{type_name}` objects are immutable")]
    NotImplemented { type_name: &'static str },

    /// A type was instantiated while some of its operations are still
    /// abstract.
    #[error(
        "can't instantiate abstract type `{type_name}` with unimplemented \
         operations: {}", missing.join(", ")
    )]
    Abstract {
        type_name: &'static str,
        missing: Vec<&'static str>,
    },
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
