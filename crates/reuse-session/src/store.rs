//! Session store with TTL expiry and version-tolerant storage.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, trace, warn};

use crate::blob::OpaqueBlob;
use crate::codec::{Codec, JsonCodec};
use crate::config::StoreConfig;
use crate::envelope::TimestampedEnvelope;
use crate::error::Result;
use crate::persistence::{NoPersistence, PersistenceHook};
use crate::raw::RawStore;
use crate::view::{self, LiveView, RegenerateReport};

/// State protected by the store lock.
struct StoreState<S> {
    /// Persisted source of truth.
    raw: RawStore,

    /// Decoded projection of `raw`, replaced wholesale on every rebuild.
    view: LiveView<S>,
}

impl<S: DeserializeOwned> StoreState<S> {
    fn regenerate<K, C>(&mut self, codec: &C, config: &StoreConfig) -> RegenerateReport
    where
        K: Serialize + DeserializeOwned,
        C: Codec,
    {
        let (view, report) = view::regenerate::<K, S, C>(&mut self.raw, codec, config, Utc::now());
        self.view = view;
        report
    }
}

struct Shared<S, C, P> {
    state: Mutex<StoreState<S>>,
    /// Orders snapshot-then-save pairs so an older snapshot never lands
    /// after a newer one. Never taken while `state` is held.
    flush: Mutex<()>,
    codec: C,
    persistence: P,
    config: StoreConfig,
}

/// Store of reusable sessions keyed by an initialization key.
///
/// Keys and sessions are kept as opaque bytes, so a snapshot written by a
/// build with different key or session types loads without error: entries
/// that don't decode are hidden from `pull` and left untouched.
///
/// - [`store`](Self::store) appends a session under its key.
/// - [`pull`](Self::pull) hands out the most recently stored live session for
///   a key and removes it from the store.
/// - Sessions older than the configured TTL are never handed out and are
///   pruned whenever the live view is rebuilt.
///
/// All operations are serialized through one lock. Cloning is cheap and
/// clones share state.
pub struct SessionStore<K, S, C = JsonCodec, P = NoPersistence> {
    shared: Arc<Shared<S, C, P>>,
    _key: PhantomData<fn(&K)>,
}

impl<K, S> SessionStore<K, S>
where
    K: Serialize + DeserializeOwned,
    S: Serialize + DeserializeOwned,
{
    /// Create an in-memory store using the JSON codec.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_codec(config, JsonCodec)
    }
}

impl<K, S, C> SessionStore<K, S, C, NoPersistence>
where
    K: Serialize + DeserializeOwned,
    S: Serialize + DeserializeOwned,
    C: Codec,
{
    /// Create an in-memory store with a custom codec.
    pub fn with_codec(config: StoreConfig, codec: C) -> Self {
        Self::from_parts(config, codec, NoPersistence, RawStore::new())
    }
}

impl<K, S, C, P> SessionStore<K, S, C, P>
where
    K: Serialize + DeserializeOwned,
    S: Serialize + DeserializeOwned,
    C: Codec,
    P: PersistenceHook,
{
    /// Open a store backed by a persistence hook.
    ///
    /// The last saved snapshot, if any, is loaded and the live view is
    /// rebuilt before the store is returned.
    pub fn open(config: StoreConfig, codec: C, persistence: P) -> Result<Self> {
        let raw = match persistence.load()? {
            Some(bytes) => RawStore::from_snapshot(&bytes)?,
            None => RawStore::new(),
        };
        let store = Self::from_parts(config, codec, persistence, raw);
        let report = store.regenerate();
        log_load(&report, "open");
        Ok(store)
    }

    fn from_parts(config: StoreConfig, codec: C, persistence: P, raw: RawStore) -> Self {
        let shared = Shared {
            state: Mutex::new(StoreState {
                raw,
                view: LiveView::default(),
            }),
            flush: Mutex::new(()),
            codec,
            persistence,
            config,
        };
        Self {
            shared: Arc::new(shared),
            _key: PhantomData,
        }
    }

    /// Get the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Store a session under `key`.
    ///
    /// Never fails: if the key or session cannot be encoded the failure is
    /// logged and nothing is written.
    pub fn store(&self, key: &K, session: &S) {
        let codec = &self.shared.codec;
        let mut state = self.shared.state.lock();

        let raw_key = match OpaqueBlob::encode(codec, key) {
            Ok(raw_key) => raw_key,
            Err(e) => {
                error!(
                    reason = "key_encode",
                    error = %e,
                    "Unable to store session: key does not encode"
                );
                return;
            }
        };
        let raw_session = match OpaqueBlob::encode(codec, session) {
            Ok(raw_session) => raw_session,
            Err(e) => {
                error!(
                    reason = "session_encode",
                    error = %e,
                    "Unable to store session: session does not encode"
                );
                return;
            }
        };
        let envelope = TimestampedEnvelope::new(raw_session);
        let raw_envelope = match OpaqueBlob::encode(codec, &envelope) {
            Ok(raw_envelope) => raw_envelope,
            Err(e) => {
                error!(
                    reason = "envelope_encode",
                    error = %e,
                    "Unable to store session: envelope does not encode"
                );
                return;
            }
        };

        let locator = state.raw.append(raw_key, raw_envelope);
        let report = state.regenerate::<K, C>(codec, &self.shared.config);

        debug!(
            slot = locator.slot,
            live_entries = report.live_entries,
            expired = report.expired,
            "Session stored"
        );
    }

    /// Take the most recently stored live session for `key`.
    ///
    /// The returned session is removed from the store. Returns `None` when
    /// nothing usable is stored, including when the key cannot be encoded.
    pub fn pull(&self, key: &K) -> Option<S> {
        let codec = &self.shared.codec;
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        let canonical = match OpaqueBlob::encode(codec, key) {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!(
                    reason = "key_encode",
                    error = %e,
                    "Unable to pull session: key does not encode"
                );
                return None;
            }
        };

        let now = Utc::now();
        while let Some(entry) = state.view.pop_last(&canonical) {
            // Nested lock on the raw sequence, taken under the store lock.
            let disposed = state.raw.dispose(&entry.locator);

            if entry.expires_at > now {
                debug!(slot = entry.locator.slot, disposed, "Session pulled");
                return Some(entry.session);
            }
            trace!(
                reason = "expired",
                slot = entry.locator.slot,
                created_at = %entry.created_at,
                "Pruned session that expired after the last rebuild"
            );
        }

        trace!("No live session for key");
        None
    }

    /// Rebuild the live view now, pruning expired entries.
    pub fn regenerate(&self) -> RegenerateReport {
        let mut state = self.shared.state.lock();
        state.regenerate::<K, C>(&self.shared.codec, &self.shared.config)
    }

    /// Snapshot the raw store as an opaque blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let state = self.shared.state.lock();
        Ok(state.raw.to_snapshot()?)
    }

    /// Replace the raw store with a snapshot and rebuild the live view.
    ///
    /// On error the current contents are left untouched.
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<RegenerateReport> {
        let raw = RawStore::from_snapshot(bytes)?;
        let mut state = self.shared.state.lock();
        state.raw = raw;
        let report = state.regenerate::<K, C>(&self.shared.codec, &self.shared.config);
        log_load(&report, "load_bytes");
        Ok(report)
    }

    /// Save the raw store through the persistence hook.
    ///
    /// The snapshot is taken under the store lock, but the hook runs after it
    /// is released, so `store` and `pull` are not blocked by slow I/O.
    /// Changes made while the hook runs are picked up by the next flush.
    pub fn flush(&self) -> Result<()> {
        let _flush = self.shared.flush.lock();
        let (snapshot, raw_keys, raw_entries) = {
            let state = self.shared.state.lock();
            (
                state.raw.to_snapshot()?,
                state.raw.key_count(),
                state.raw.entry_count(),
            )
        };
        self.shared.persistence.save(&snapshot)?;
        debug!(raw_keys, raw_entries, "Session store flushed");
        Ok(())
    }

    /// Re-read the raw store from the persistence hook and rebuild.
    ///
    /// If the hook has nothing saved, the current contents are kept.
    pub fn reload(&self) -> Result<RegenerateReport> {
        match self.shared.persistence.load()? {
            Some(bytes) => self.load_bytes(&bytes),
            None => Ok(self.regenerate()),
        }
    }

    /// Flush and release this handle.
    pub fn close(self) -> Result<()> {
        self.flush()
    }

    /// Current sizes of the raw store and live view.
    pub fn stats(&self) -> StoreStats {
        let state = self.shared.state.lock();
        StoreStats {
            raw_keys: state.raw.key_count(),
            raw_entries: state.raw.entry_count(),
            live_keys: state.view.key_count(),
            live_entries: state.view.entry_count(),
        }
    }

    /// Number of sessions `pull` could currently hand out for `key`.
    ///
    /// Entries that expired since the last rebuild are still counted.
    pub fn live_len(&self, key: &K) -> usize {
        match OpaqueBlob::encode(&self.shared.codec, key) {
            Ok(canonical) => self.shared.state.lock().view.len_for(&canonical),
            Err(_) => 0,
        }
    }

    /// Number of raw envelopes stored under `key`, decodable or not.
    pub fn raw_len(&self, key: &K) -> usize {
        match OpaqueBlob::encode(&self.shared.codec, key) {
            Ok(raw_key) => self
                .shared
                .state
                .lock()
                .raw
                .sequence_len(&raw_key)
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Whether no session is currently available for any key.
    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().view.key_count() == 0
    }
}

impl<K, S, C, P> Clone for SessionStore<K, S, C, P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            _key: PhantomData,
        }
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Keys in the raw store, including ones with empty sequences.
    pub raw_keys: usize,

    /// Envelopes in the raw store, including undecodable ones.
    pub raw_entries: usize,

    /// Keys with at least one live session.
    pub live_keys: usize,

    /// Sessions available for `pull`.
    pub live_entries: usize,
}

fn log_load(report: &RegenerateReport, source: &'static str) {
    if report.inert > 0 || report.skipped_keys > 0 {
        warn!(
            source = source,
            inert = report.inert,
            skipped_keys = report.skipped_keys,
            "Loaded entries that do not decode with the current key or session types"
        );
    }
    debug!(
        source = source,
        live_keys = report.live_keys,
        live_entries = report.live_entries,
        expired = report.expired,
        discarded = report.discarded,
        "Session store loaded"
    );
}
