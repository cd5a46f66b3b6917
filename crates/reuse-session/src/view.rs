//! Live view: the decoded, in-memory projection of the raw store.
//!
//! The view is never patched incrementally. Every structural change to the
//! raw store is followed by [`regenerate`], which walks the whole raw store,
//! prunes expired envelopes as a side effect and returns a fresh view.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::blob::OpaqueBlob;
use crate::codec::Codec;
use crate::config::StoreConfig;
use crate::envelope::TimestampedEnvelope;
use crate::raw::{Locator, RawStore};

/// A decoded session that can be handed out by `pull`.
pub(crate) struct LiveEntry<S> {
    pub session: S,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub locator: Locator,
}

/// Canonical key bytes → live entries, oldest first.
///
/// Keys without live entries are absent, unlike in the raw store.
pub(crate) struct LiveView<S> {
    entries: HashMap<OpaqueBlob, Vec<LiveEntry<S>>>,
}

impl<S> Default for LiveView<S> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<S> LiveView<S> {
    /// Remove and return the newest entry for a key.
    pub fn pop_last(&mut self, key: &OpaqueBlob) -> Option<LiveEntry<S>> {
        let sequence = self.entries.get_mut(key)?;
        let entry = sequence.pop();
        if sequence.is_empty() {
            self.entries.remove(key);
        }
        entry
    }

    pub fn len_for(&self, key: &OpaqueBlob) -> usize {
        self.entries.get(key).map_or(0, Vec::len)
    }

    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Sorted `(key, locators)` pairs, for comparing two views.
    #[cfg(test)]
    pub fn layout(&self) -> Vec<(OpaqueBlob, Vec<Locator>)> {
        let mut layout: Vec<_> = self
            .entries
            .iter()
            .map(|(key, entries)| {
                let locators = entries.iter().map(|e| e.locator.clone()).collect();
                (key.clone(), locators)
            })
            .collect();
        layout.sort_by(|a, b| a.0.cmp(&b.0));
        layout
    }
}

/// Summary of one rebuild pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegenerateReport {
    /// Keys present in the new live view.
    pub live_keys: usize,
    /// Sessions available for `pull`.
    pub live_entries: usize,
    /// Envelopes removed because their TTL elapsed.
    pub expired: usize,
    /// Undecodable envelopes left in place for a future reader.
    pub inert: usize,
    /// Undecodable envelopes removed because `prune_undecodable` is set.
    pub discarded: usize,
    /// Raw keys that did not decode; their sequences were not inspected.
    pub skipped_keys: usize,
}

/// Rebuild the live view from the raw store.
///
/// Expired envelopes are removed from the raw store. Envelopes that fail to
/// decode, or whose session fails to decode, stay where they are unless
/// `config.prune_undecodable` is set. A key that fails to decode hides its
/// whole sequence without touching it.
///
/// Distinct raw keys that decode to the same key are merged into one live
/// sequence ordered by creation time.
pub(crate) fn regenerate<K, S, C>(
    raw: &mut RawStore,
    codec: &C,
    config: &StoreConfig,
    now: DateTime<Utc>,
) -> (LiveView<S>, RegenerateReport)
where
    K: Serialize + DeserializeOwned,
    S: DeserializeOwned,
    C: Codec,
{
    let ttl = config.ttl;
    let prune = config.prune_undecodable;
    let mut report = RegenerateReport::default();
    let mut entries: HashMap<OpaqueBlob, Vec<LiveEntry<S>>> = HashMap::new();
    let mut merged = HashSet::new();

    for (raw_key, sequence) in raw.sequences_mut() {
        let key: K = match raw_key.decode(codec) {
            Ok(key) => key,
            Err(e) => {
                debug!(
                    reason = "key_decode",
                    error = %e,
                    entries = sequence.len(),
                    "Skipping raw sequence with undecodable key"
                );
                report.skipped_keys += 1;
                continue;
            }
        };
        let canonical = match OpaqueBlob::encode(codec, &key) {
            Ok(canonical) => canonical,
            Err(e) => {
                debug!(reason = "key_encode", error = %e, "Decoded key does not re-encode");
                report.skipped_keys += 1;
                continue;
            }
        };

        let mut live = Vec::new();
        sequence.retain(|slot| {
            let envelope: TimestampedEnvelope = match slot.blob.decode(codec) {
                Ok(envelope) => envelope,
                Err(e) => {
                    debug!(
                        reason = "envelope_decode",
                        slot = slot.id,
                        error = %e,
                        "Envelope does not decode"
                    );
                    return keep_undecodable(&mut report, prune);
                }
            };

            if !envelope.is_valid_at(ttl, now) {
                trace!(
                    reason = "expired",
                    slot = slot.id,
                    created_at = %envelope.created_at(),
                    "Pruning expired session"
                );
                report.expired += 1;
                return false;
            }

            match envelope.session().decode::<C, S>(codec) {
                Ok(session) => {
                    live.push(LiveEntry {
                        session,
                        created_at: envelope.created_at(),
                        expires_at: envelope.expires_at(ttl),
                        locator: Locator {
                            raw_key: raw_key.clone(),
                            slot: slot.id,
                        },
                    });
                    true
                }
                Err(e) => {
                    debug!(
                        reason = "session_decode",
                        slot = slot.id,
                        error = %e,
                        "Session payload does not decode"
                    );
                    keep_undecodable(&mut report, prune)
                }
            }
        });

        if live.is_empty() {
            continue;
        }
        match entries.entry(canonical) {
            Entry::Occupied(mut existing) => {
                merged.insert(existing.key().clone());
                existing.get_mut().extend(live);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(live);
            }
        }
    }

    for key in merged {
        if let Some(sequence) = entries.get_mut(&key) {
            sequence.sort_by_key(|entry| entry.created_at);
        }
    }

    report.live_keys = entries.len();
    report.live_entries = entries.values().map(Vec::len).sum();
    (LiveView { entries }, report)
}

fn keep_undecodable(report: &mut RegenerateReport, prune: bool) -> bool {
    if prune {
        report.discarded += 1;
        false
    } else {
        report.inert += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use chrono::TimeDelta;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Key {
        browser: String,
    }

    fn raw_key(browser: &str) -> OpaqueBlob {
        OpaqueBlob::encode(
            &JsonCodec,
            &Key {
                browser: browser.to_string(),
            },
        )
        .unwrap()
    }

    fn envelope_blob<T: Serialize>(session: &T, created_at: DateTime<Utc>) -> OpaqueBlob {
        let session = OpaqueBlob::encode(&JsonCodec, session).unwrap();
        let envelope = TimestampedEnvelope::with_timestamp(session, created_at);
        OpaqueBlob::encode(&JsonCodec, &envelope).unwrap()
    }

    fn rebuild(raw: &mut RawStore, config: &StoreConfig) -> (LiveView<String>, RegenerateReport) {
        regenerate::<Key, String, _>(raw, &JsonCodec, config, Utc::now())
    }

    fn sessions(view: &mut LiveView<String>, key: &OpaqueBlob) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(entry) = view.pop_last(key) {
            out.push(entry.session);
        }
        out
    }

    #[test]
    fn test_builds_entries_in_order() {
        let mut raw = RawStore::new();
        let now = Utc::now();
        raw.append(raw_key("firefox"), envelope_blob(&"s1", now));
        raw.append(raw_key("firefox"), envelope_blob(&"s2", now));

        let (mut view, report) = rebuild(&mut raw, &StoreConfig::new());

        assert_eq!(report.live_keys, 1);
        assert_eq!(report.live_entries, 2);
        assert_eq!(view.len_for(&raw_key("firefox")), 2);
        assert_eq!(sessions(&mut view, &raw_key("firefox")), vec!["s2", "s1"]);
    }

    #[test]
    fn test_undecodable_key_is_skipped_but_retained() {
        let mut raw = RawStore::new();
        let garbage = OpaqueBlob::from_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        raw.append(garbage.clone(), envelope_blob(&"s1", Utc::now()));

        let (view, report) = rebuild(&mut raw, &StoreConfig::new().with_prune_undecodable(true));

        assert_eq!(report.skipped_keys, 1);
        assert_eq!(view.key_count(), 0);
        assert_eq!(raw.sequence_len(&garbage), Some(1));
    }

    #[test]
    fn test_expired_envelope_is_pruned() {
        let mut raw = RawStore::new();
        let old = Utc::now() - TimeDelta::hours(49);
        raw.append(raw_key("chrome"), envelope_blob(&"stale", old));
        raw.append(raw_key("chrome"), envelope_blob(&"fresh", Utc::now()));

        let (mut view, report) = rebuild(&mut raw, &StoreConfig::new());

        assert_eq!(report.expired, 1);
        assert_eq!(raw.sequence_len(&raw_key("chrome")), Some(1));
        assert_eq!(sessions(&mut view, &raw_key("chrome")), vec!["fresh"]);
    }

    #[test]
    fn test_fully_expired_key_is_absent_but_sequence_kept() {
        let mut raw = RawStore::new();
        let old = Utc::now() - TimeDelta::seconds(10);
        raw.append(raw_key("chrome"), envelope_blob(&"stale", old));

        let config = StoreConfig::new().with_ttl(Duration::from_secs(5));
        let (view, report) = rebuild(&mut raw, &config);

        assert_eq!(report.live_keys, 0);
        assert_eq!(view.key_count(), 0);
        assert_eq!(raw.key_count(), 1);
        assert_eq!(raw.sequence_len(&raw_key("chrome")), Some(0));
    }

    #[test]
    fn test_undecodable_envelope_stays_inert() {
        let mut raw = RawStore::new();
        raw.append(raw_key("edge"), OpaqueBlob::from_bytes(b"{broken".to_vec()));

        let (view, report) = rebuild(&mut raw, &StoreConfig::new());

        assert_eq!(report.inert, 1);
        assert_eq!(view.key_count(), 0);
        assert_eq!(raw.sequence_len(&raw_key("edge")), Some(1));
    }

    #[test]
    fn test_undecodable_session_stays_inert() {
        let mut raw = RawStore::new();
        // Valid envelope, but the payload is a number, not a String
        raw.append(raw_key("edge"), envelope_blob(&42u32, Utc::now()));

        let (view, report) = rebuild(&mut raw, &StoreConfig::new());

        assert_eq!(report.inert, 1);
        assert_eq!(report.expired, 0);
        assert_eq!(view.key_count(), 0);
        assert_eq!(raw.sequence_len(&raw_key("edge")), Some(1));
    }

    #[test]
    fn test_expired_undecodable_session_is_still_pruned() {
        let mut raw = RawStore::new();
        let old = Utc::now() - TimeDelta::hours(72);
        raw.append(raw_key("edge"), envelope_blob(&42u32, old));

        let (_, report) = rebuild(&mut raw, &StoreConfig::new());

        assert_eq!(report.expired, 1);
        assert_eq!(raw.sequence_len(&raw_key("edge")), Some(0));
    }

    #[test]
    fn test_prune_undecodable_discards() {
        let mut raw = RawStore::new();
        raw.append(raw_key("edge"), OpaqueBlob::from_bytes(b"{broken".to_vec()));
        raw.append(raw_key("edge"), envelope_blob(&42u32, Utc::now()));
        raw.append(raw_key("edge"), envelope_blob(&"ok", Utc::now()));

        let config = StoreConfig::new().with_prune_undecodable(true);
        let (view, report) = rebuild(&mut raw, &config);

        assert_eq!(report.discarded, 2);
        assert_eq!(report.inert, 0);
        assert_eq!(view.len_for(&raw_key("edge")), 1);
        assert_eq!(raw.sequence_len(&raw_key("edge")), Some(1));
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let mut raw = RawStore::new();
        let now = Utc::now();
        raw.append(raw_key("firefox"), envelope_blob(&"a", now));
        raw.append(raw_key("firefox"), envelope_blob(&"a", now));
        raw.append(raw_key("chrome"), envelope_blob(&"b", now));
        raw.append(raw_key("chrome"), envelope_blob(&7u8, now));

        let config = StoreConfig::new();
        let (first, first_report) = rebuild(&mut raw, &config);
        let (second, second_report) = rebuild(&mut raw, &config);

        assert_eq!(first.layout(), second.layout());
        assert_eq!(first_report, second_report);
    }

    #[test]
    fn test_equivalent_raw_keys_are_merged_by_age() {
        let mut raw = RawStore::new();
        let now = Utc::now();
        // An older writer added a field the current key type no longer has
        let legacy_key = OpaqueBlob::from_bytes(br#"{"browser":"firefox","grid":true}"#.to_vec());
        raw.append(legacy_key, envelope_blob(&"legacy", now - TimeDelta::minutes(5)));
        raw.append(raw_key("firefox"), envelope_blob(&"current", now));

        let (mut view, report) = rebuild(&mut raw, &StoreConfig::new());

        assert_eq!(report.live_keys, 1);
        assert_eq!(report.live_entries, 2);
        assert_eq!(
            sessions(&mut view, &raw_key("firefox")),
            vec!["current", "legacy"]
        );
    }

    #[test]
    fn test_pop_last_removes_exhausted_key() {
        let mut raw = RawStore::new();
        raw.append(raw_key("firefox"), envelope_blob(&"only", Utc::now()));
        let (mut view, _) = rebuild(&mut raw, &StoreConfig::new());

        assert!(view.pop_last(&raw_key("firefox")).is_some());
        assert_eq!(view.key_count(), 0);
        assert!(view.pop_last(&raw_key("firefox")).is_none());
        assert_eq!(view.entry_count(), 0);
    }
}
