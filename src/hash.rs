use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::LazyLock;

use siphasher::sip128::{Hasher128, SipHasher13};

/// Keys for the process-wide SipHash instance.
///
/// Drawn once per process. Hashes are therefore only comparable within one
/// run and must never be persisted.
static SALT: LazyLock<(u64, u64)> = LazyLock::new(|| {
    let state = RandomState::new();
    (state.hash_one(0x5eed_u64), state.hash_one(!0x5eed_u64))
});

/// Produce a salted 128-bit hash of a value.
#[inline]
pub fn hash<T: Hash + ?Sized>(value: &T) -> u128 {
    let mut state = SipHasher13::new_with_keys(SALT.0, SALT.1);
    value.hash(&mut state);
    state.finish128().as_u128()
}
