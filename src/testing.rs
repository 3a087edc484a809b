use std::cell::Cell;

/// How a memoized call was served.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Outcome {
    /// A cached value was returned.
    Hit,
    /// The computation ran and its result was stored.
    Miss,
    /// The computation ran without consulting the cache, because caching
    /// was disabled or the arguments could not be keyed.
    Bypass,
}

thread_local! {
    static LAST: Cell<Option<Outcome>> = const { Cell::new(None) };
}

/// How the last memoized call on this thread was served.
pub fn last_outcome() -> Option<Outcome> {
    LAST.with(Cell::get)
}

/// Whether the last memoized call on this thread was a hit.
pub fn last_was_hit() -> bool {
    last_outcome() == Some(Outcome::Hit)
}

pub(crate) fn record(outcome: Outcome) {
    LAST.with(|last| last.set(Some(outcome)));
}
