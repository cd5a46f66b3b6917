//! Version-tolerant TTL store for reusable sessions.
//!
//! This crate keeps reusable session handles under an initialization key,
//! with:
//! - Opaque byte storage, so snapshots written with older key or session
//!   types load without error and incompatible entries are simply skipped
//! - TTL expiry decided from a timestamp envelope, pruned lazily on rebuild
//! - LIFO retrieval that removes the handed-out session from storage
//! - Persistence hooks for saving and restoring the raw store
//!
//! # Example
//!
//! ```rust,ignore
//! use reuse_session::{SessionStore, StoreConfig};
//!
//! let config = StoreConfig::default().with_ttl(Duration::from_secs(3600));
//! let store: SessionStore<Capabilities, RemoteSession> = SessionStore::new(config);
//!
//! store.store(&capabilities, &session);
//! let reused = store.pull(&capabilities);
//! ```

mod blob;
mod codec;
mod config;
mod envelope;
mod error;
mod persistence;
mod raw;
mod store;
mod view;

pub use blob::OpaqueBlob;
pub use codec::{Codec, CodecError, JsonCodec};
pub use config::{DEFAULT_TTL, StoreConfig};
pub use envelope::TimestampedEnvelope;
pub use error::{Error, Result};
pub use persistence::{FilePersistence, NoPersistence, PersistenceHook};
pub use store::{SessionStore, StoreStats};
pub use view::RegenerateReport;
