//! The published snapshot, shared between the builder and query callers.

use std::sync::{Arc, RwLock};

use thr_types::SceneSnapshot;

/// Cloneable handle on the latest snapshot.
///
/// Readers get the published allocation itself: repeated reads between two
/// publishes are pointer-equal, and a read never waits for a build.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    latest: Arc<RwLock<Arc<SceneSnapshot>>>,
}

impl SnapshotStore {
    pub fn new(initial: SceneSnapshot) -> Self {
        Self {
            latest: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    pub fn latest(&self) -> Arc<SceneSnapshot> {
        let guard = self.latest.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the published snapshot and return the shared copy.
    pub fn publish(&self, snapshot: SceneSnapshot) -> Arc<SceneSnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut guard = self.latest.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::clone(&snapshot);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use thr_types::{Predicate, Side};

    #[test]
    fn reads_between_publishes_share_the_allocation() {
        let store = SnapshotStore::new(SceneSnapshot::empty(Utc::now()));
        let a = store.latest();
        let b = store.clone().latest();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_empty());
    }

    #[test]
    fn publish_replaces_for_every_handle() {
        let store = SnapshotStore::new(SceneSnapshot::empty(Utc::now()));
        let reader = store.clone();
        let before = reader.latest();

        let mut snapshot = SceneSnapshot::empty(Utc::now());
        snapshot.predicates.insert(Predicate::busy(Side::Left));
        let published = store.publish(snapshot);

        let after = reader.latest();
        assert!(Arc::ptr_eq(&published, &after));
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(after.contains(&Predicate::busy(Side::Left)));
        // earlier readers keep their copy
        assert!(before.is_empty());
    }
}
