//! Timestamped wrapper deciding session expiry.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::blob::OpaqueBlob;

/// An encoded session plus the moment it was stored.
///
/// Expiry can be decided from the timestamp alone, so a session whose payload
/// no longer decodes can still be recognized as stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampedEnvelope {
    created_at: DateTime<Utc>,
    session: OpaqueBlob,
}

impl TimestampedEnvelope {
    /// Wrap an encoded session, stamping it with the current time.
    pub fn new(session: OpaqueBlob) -> Self {
        Self::with_timestamp(session, Utc::now())
    }

    /// Wrap an encoded session with an explicit creation time.
    pub fn with_timestamp(session: OpaqueBlob, created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            session,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn session(&self) -> &OpaqueBlob {
        &self.session
    }

    /// Instant after which the envelope is no longer valid.
    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        expiry(self.created_at, ttl)
    }

    /// Check whether the envelope is still within its TTL.
    pub fn is_valid(&self, ttl: Duration) -> bool {
        self.is_valid_at(ttl, Utc::now())
    }

    /// Check validity against a given instant.
    ///
    /// Valid iff `created_at + ttl > now`; once false for some `now`, it stays
    /// false for every later one.
    pub fn is_valid_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at(ttl) > now
    }
}

/// `created_at + ttl`, saturating at the largest representable instant.
pub(crate) fn expiry(created_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| created_at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
