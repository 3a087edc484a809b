use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::Error;

/// Decides which entry to discard when a store is full.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Policy {
    /// Evict the entry inserted earliest, regardless of access history.
    Fifo,
    /// Evict the entry least recently looked up.
    #[default]
    Lru,
    /// Evict the entry with the fewest retrievals. Ties go to the entry
    /// that comes first in table order.
    Lfu,
}

impl Policy {
    /// All recognized policies.
    pub const ALL: [Policy; 3] = [Self::Fifo, Self::Lru, Self::Lfu];

    /// The policy's configuration name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Fifo => "fifo",
            Self::Lru => "lru",
            Self::Lfu => "lfu",
        }
    }
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|policy| policy.name() == s)
            .ok_or_else(|| Error::Config(format!("cache retention policy `{s}` not recognized")))
    }
}

impl Display for Policy {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.pad(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy() {
        for policy in Policy::ALL {
            assert_eq!(policy.to_string().parse::<Policy>(), Ok(policy));
        }
        assert!(matches!("mru".parse::<Policy>(), Err(Error::Config(_))));
        assert!("LRU".parse::<Policy>().is_err());
    }
}
