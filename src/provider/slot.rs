//! Per-provider cache storage.

use std::sync::{Arc, Weak};

use crate::mode::Mode;

/// What a provider currently holds, tagged with the session epoch it was
/// built in. Providers that are not session-governed always use epoch 0.
pub(crate) struct Slot<V> {
    epoch: u64,
    cached: Cached<V>,
}

enum Cached<V> {
    Empty,
    Strong(Arc<V>),
    Weak(Weak<V>),
}

impl<V> Slot<V> {
    pub(crate) fn empty() -> Self {
        Self {
            epoch: 0,
            cached: Cached::Empty,
        }
    }

    /// Returns the stored value if it belongs to `epoch` and is still alive.
    ///
    /// A value from an older epoch is released on the spot.
    pub(crate) fn get(&mut self, epoch: u64) -> Option<Arc<V>> {
        if self.epoch != epoch {
            self.clear();
            return None;
        }
        match &self.cached {
            Cached::Empty => None,
            Cached::Strong(value) => Some(value.clone()),
            Cached::Weak(handle) => handle.upgrade(),
        }
    }

    /// Stores `value` built in `epoch` according to `mode` and returns the
    /// value every caller of this epoch should see.
    ///
    /// If another caller already stored a live value for the same epoch,
    /// that value wins and `value` is discarded.
    pub(crate) fn store(&mut self, mode: Mode, epoch: u64, value: Arc<V>) -> Arc<V> {
        if !mode.caches() {
            return value;
        }
        if self.epoch == epoch {
            if let Some(existing) = self.get(epoch) {
                return existing;
            }
        }
        self.epoch = epoch;
        self.cached = if mode.caches_strongly() {
            Cached::Strong(value.clone())
        } else {
            Cached::Weak(Arc::downgrade(&value))
        };
        value
    }

    /// Drops anything stored before `epoch`.
    pub(crate) fn invalidate_before(&mut self, epoch: u64) -> bool {
        if self.epoch < epoch && !matches!(self.cached, Cached::Empty) {
            self.clear();
            return true;
        }
        false
    }

    pub(crate) fn clear(&mut self) {
        self.cached = Cached::Empty;
    }

    pub(crate) fn is_live(&self, epoch: u64) -> bool {
        self.epoch == epoch
            && match &self.cached {
                Cached::Empty => false,
                Cached::Strong(_) => true,
                Cached::Weak(handle) => handle.strong_count() > 0,
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn many_never_stores() {
        let mut slot = Slot::empty();
        slot.store(Mode::Many, 0, Arc::new(1u8));
        assert!(slot.get(0).is_none());
    }

    #[test]
    fn first_store_wins_within_epoch() {
        let mut slot = Slot::empty();
        let first = slot.store(Mode::Lazy, 0, Arc::new(1u8));
        let second = slot.store(Mode::Lazy, 0, Arc::new(2u8));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, 1);
    }

    #[test]
    fn weak_slot_follows_external_owners() {
        let mut slot = Slot::empty();
        let held = slot.store(Mode::Weak, 0, Arc::new(5u8));
        assert!(slot.is_live(0));
        drop(held);
        assert!(!slot.is_live(0));
        assert!(slot.get(0).is_none());
    }

    #[test]
    fn newer_epoch_discards_old_value() {
        let mut slot = Slot::empty();
        slot.store(Mode::Lazy, 1, Arc::new(1u8));
        assert!(slot.get(2).is_none());
        assert!(!slot.is_live(1));
    }

    #[test]
    fn invalidate_only_hits_older_epochs() {
        let mut slot = Slot::empty();
        slot.store(Mode::AtOnce, 3, Arc::new(1u8));
        assert!(!slot.invalidate_before(3));
        assert!(slot.is_live(3));
        assert!(slot.invalidate_before(4));
        assert!(!slot.is_live(3));
    }
}
