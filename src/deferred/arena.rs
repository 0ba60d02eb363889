//! Generational arena holding deferred entries.

use std::any::{Any, TypeId};
use std::time::Instant;

use slab::Slab;

/// Slab key plus the sequence number of the entry it was issued for.
///
/// A handle outlives the entry it names without harm: once the slot is
/// vacated or reused the sequence number no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryHandle {
    key: usize,
    seq: u64,
}

/// Type-erased entity plus its retirement rules.
pub(crate) struct Entry {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    /// Always an `Arc<T>` for the `T` named by `type_id`
    pub(crate) value: Box<dyn Any + Send + Sync>,
    /// Registration order, larger is newer; doubles as the slot generation
    pub(crate) seq: u64,
    /// Retired by the first lookup or observer that takes it
    pub(crate) first_consumption: bool,
    pub(crate) deadline: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Default)]
pub(crate) struct Arena {
    entries: Slab<Entry>,
    next_seq: u64,
}

impl Arena {
    pub(crate) fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    pub(crate) fn insert(&mut self, entry: Entry) -> EntryHandle {
        let seq = entry.seq;
        let key = self.entries.insert(entry);
        EntryHandle { key, seq }
    }

    /// Vacates the slot named by `handle`. Safe to call any number of times.
    pub(crate) fn remove(&mut self, handle: EntryHandle) -> Option<Entry> {
        self.get(handle)?;
        self.entries.try_remove(handle.key)
    }

    pub(crate) fn get(&self, handle: EntryHandle) -> Option<&Entry> {
        self.entries
            .get(handle.key)
            .filter(|entry| entry.seq == handle.seq)
    }

    /// Newest unexpired entry of type `type_id`.
    pub(crate) fn newest(&self, type_id: TypeId, now: Instant) -> Option<EntryHandle> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.type_id == type_id && !entry.expired(now))
            .max_by_key(|(_, entry)| entry.seq)
            .map(|(key, entry)| EntryHandle { key, seq: entry.seq })
    }

    /// Removes every entry whose deadline has passed.
    pub(crate) fn take_expired(&mut self, now: Instant) -> Vec<Entry> {
        let expired: Vec<usize> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expired(now))
            .map(|(key, _)| key)
            .collect();
        expired
            .into_iter()
            .filter_map(|key| self.entries.try_remove(key))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
