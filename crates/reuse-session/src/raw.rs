//! Raw store: the persisted byte-level map of keys to envelope sequences.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::blob::OpaqueBlob;

/// Process-local identity of one raw envelope.
///
/// Two structurally identical envelopes get different slot ids, so disposal
/// removes exactly the entry that was handed out. Never persisted.
pub(crate) type SlotId = u64;

/// Non-owning pointer from a live entry back into the raw store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Locator {
    pub raw_key: OpaqueBlob,
    pub slot: SlotId,
}

#[derive(Debug, Clone)]
pub(crate) struct RawSlot {
    pub id: SlotId,
    pub blob: OpaqueBlob,
}

/// Envelope blobs stored under one key, oldest first.
#[derive(Debug, Default)]
pub(crate) struct RawSequence {
    slots: Vec<RawSlot>,
}

impl RawSequence {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Remove the slot with the given id, if still present.
    pub fn remove_slot(&mut self, id: SlotId) -> Option<OpaqueBlob> {
        let index = self.slots.iter().position(|slot| slot.id == id)?;
        Some(self.slots.remove(index).blob)
    }

    /// Keep only the slots for which `keep` returns true, preserving order.
    pub fn retain(&mut self, keep: impl FnMut(&RawSlot) -> bool) {
        self.slots.retain(keep);
    }

    fn blobs(&self) -> impl Iterator<Item = &OpaqueBlob> {
        self.slots.iter().map(|slot| &slot.blob)
    }
}

/// Map from encoded key to its envelope sequence.
///
/// This is the only state that survives a reload. Each sequence has its own
/// lock; callers always take it while already holding the store lock.
/// Sequences that become empty are kept.
#[derive(Debug, Default)]
pub(crate) struct RawStore {
    sequences: HashMap<OpaqueBlob, Mutex<RawSequence>>,
    next_slot: SlotId,
}

impl RawStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an envelope to the end of the key's sequence, creating it if absent.
    pub fn append(&mut self, raw_key: OpaqueBlob, envelope: OpaqueBlob) -> Locator {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.sequences
            .entry(raw_key.clone())
            .or_default()
            .get_mut()
            .slots
            .push(RawSlot { id: slot, blob: envelope });
        Locator { raw_key, slot }
    }

    /// Remove the envelope a live entry points at.
    ///
    /// Returns false when the slot is already gone.
    pub fn dispose(&self, locator: &Locator) -> bool {
        let Some(sequence) = self.sequences.get(&locator.raw_key) else {
            return false;
        };
        sequence.lock().remove_slot(locator.slot).is_some()
    }

    /// Mutable access to every `(key, sequence)` pair, for rebuilds.
    pub fn sequences_mut(&mut self) -> impl Iterator<Item = (&OpaqueBlob, &mut RawSequence)> {
        self.sequences
            .iter_mut()
            .map(|(key, sequence)| (key, sequence.get_mut()))
    }

    /// Number of envelopes stored under a key.
    pub fn sequence_len(&self, raw_key: &OpaqueBlob) -> Option<usize> {
        self.sequences.get(raw_key).map(|s| s.lock().len())
    }

    pub fn key_count(&self) -> usize {
        self.sequences.len()
    }

    pub fn entry_count(&self) -> usize {
        self.sequences.values().map(|s| s.lock().len()).sum()
    }

    /// Serialize the raw store as a JSON snapshot.
    ///
    /// Keys are sorted so equal stores produce equal snapshots.
    pub fn to_snapshot(&self) -> serde_json::Result<Vec<u8>> {
        let mut entries: Vec<SnapshotEntry> = self
            .sequences
            .iter()
            .map(|(key, sequence)| SnapshotEntry {
                key: key.clone(),
                sessions: sequence.lock().blobs().cloned().collect(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        serde_json::to_vec(&Snapshot { entries })
    }

    /// Rebuild a raw store from a snapshot produced by [`RawStore::to_snapshot`].
    ///
    /// Repeated keys have their sequences concatenated.
    pub fn from_snapshot(bytes: &[u8]) -> serde_json::Result<Self> {
        let snapshot: Snapshot = serde_json::from_slice(bytes)?;
        let mut raw = Self::new();
        for entry in snapshot.entries {
            // Keys with empty sequences are part of the persisted state too.
            raw.sequences.entry(entry.key.clone()).or_default();
            for session in entry.sessions {
                raw.append(entry.key.clone(), session);
            }
        }
        Ok(raw)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    key: OpaqueBlob,
    #[serde(default)]
    sessions: Vec<OpaqueBlob>,
}
