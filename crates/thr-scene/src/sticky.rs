//! Monotone bookkeeping for the attachment predicates.
//!
//! Once a pair has been screwed it stays screwed, and once it has been
//! attached it stays attached, even if the geometry later drifts.  Only an
//! episode reset ([`StickyTracker::clear`]) forgets them.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

/// One attach point of a master/slave pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    pub master: String,
    pub slave: String,
    pub attach_point: usize,
}

impl PairKey {
    pub fn new(master: &str, slave: &str, attach_point: usize) -> Self {
        Self {
            master: master.to_string(),
            slave: slave.to_string(),
            attach_point,
        }
    }
}

#[derive(Debug, Default)]
pub struct StickyTracker {
    screwed: BTreeSet<PairKey>,
    attached: BTreeSet<PairKey>,
    // Keyed by (master, slave): attach points of one pair share a timer.
    first_touch: HashMap<(String, String), Instant>,
}

impl StickyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_screwed(&self, key: &PairKey) -> bool {
        self.screwed.contains(key)
    }

    pub fn is_attached(&self, key: &PairKey) -> bool {
        self.attached.contains(key)
    }

    /// Returns `true` if the pair was not screwed before.
    pub fn mark_screwed(&mut self, key: PairKey) -> bool {
        self.screwed.insert(key)
    }

    /// Returns `true` if the pair was not attached before.
    ///
    /// A pair must be screwed before it can be attached.
    pub fn mark_attached(&mut self, key: PairKey) -> bool {
        debug_assert!(self.screwed.contains(&key), "attaching unscrewed pair {key:?}");
        self.attached.insert(key)
    }

    pub fn first_touch(&self, master: &str, slave: &str) -> Option<Instant> {
        self.first_touch
            .get(&(master.to_string(), slave.to_string()))
            .copied()
    }

    /// Record a tool touch at `now` unless one is already recorded, and
    /// return the stamp in effect.
    pub fn touch(&mut self, master: &str, slave: &str, now: Instant) -> Instant {
        *self
            .first_touch
            .entry((master.to_string(), slave.to_string()))
            .or_insert(now)
    }

    /// Forget the touch stamp of a pair.  Returns `true` if one was recorded.
    pub fn release_touch(&mut self, master: &str, slave: &str) -> bool {
        self.first_touch
            .remove(&(master.to_string(), slave.to_string()))
            .is_some()
    }

    pub fn attached_pairs(&self) -> impl Iterator<Item = &PairKey> {
        self.attached.iter()
    }

    pub fn screwed_pairs(&self) -> impl Iterator<Item = &PairKey> {
        self.screwed.iter()
    }

    pub fn clear(&mut self) {
        self.screwed.clear();
        self.attached.clear();
        self.first_touch.clear();
    }
}
