//! Identifier types shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a feed in the run's feed list.
///
/// Feed 0 is the primary feed and drives callback cadence; every other
/// feed is a secondary that is only read for context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(pub usize);

impl FeedId {
    pub const PRIMARY: Self = Self(0);

    #[inline]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }

    #[inline]
    pub fn is_primary(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_id_display() {
        assert_eq!(FeedId::PRIMARY.to_string(), "data0");
        assert_eq!(FeedId::new(1).to_string(), "data1");
    }

    #[test]
    fn test_primary() {
        assert!(FeedId::PRIMARY.is_primary());
        assert!(!FeedId::new(2).is_primary());
    }
}
