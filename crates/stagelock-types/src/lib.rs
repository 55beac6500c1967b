//! # stagelock-types: Core types for `Stagelock`
//!
//! This crate contains shared types used across the `Stagelock` system:
//! - Identifiers ([`StageSlug`], [`SessionId`], [`ActorId`])
//! - Content versions ([`Revision`])
//! - Temporal types ([`Timestamp`] and the [`iso8601`] serde helpers)
//! - Coordinator tunables ([`PresenceConfig`])
//!
//! Identifiers are validated on construction. An empty identifier is a caller
//! programming error, so it is rejected at the boundary instead of deep inside
//! the coordinator.

use std::fmt::{Debug, Display};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Identifiers - Clone (heap strings, validated on construction)
// ============================================================================

/// Maximum identifier length in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 256;

/// Errors produced when constructing an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The identifier was empty or only whitespace.
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },

    /// The identifier exceeded [`MAX_IDENTIFIER_LEN`].
    #[error("{kind} is {len} bytes, maximum is {MAX_IDENTIFIER_LEN}")]
    TooLong { kind: &'static str, len: usize },
}

fn validate_identifier(kind: &'static str, value: &str) -> Result<(), IdentifierError> {
    if value.trim().is_empty() {
        return Err(IdentifierError::Empty { kind });
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(IdentifierError::TooLong {
            kind,
            len: value.len(),
        });
    }
    Ok(())
}

macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier, rejecting empty or oversized values.
            pub fn try_new(value: impl Into<String>) -> Result<Self, IdentifierError> {
                let value = value.into();
                validate_identifier($kind, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdentifierError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::try_new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = IdentifierError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::try_new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_identifier!(
    /// Opaque key of a coordinated stage (a shared document or workflow section).
    StageSlug,
    "stage slug"
);

string_identifier!(
    /// One client connection (browser tab) participating in presence.
    SessionId,
    "session id"
);

string_identifier!(
    /// The user identity behind one or more sessions.
    ActorId,
    "actor id"
);

// ============================================================================
// Revision - Copy (8-byte monotonic counter)
// ============================================================================

/// Version number of a stage's saved content.
///
/// Revisions only ever move forward on a stage; a session reporting a lower
/// revision than the stage's latest is looking at stale content.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Revision(u64);

impl Revision {
    pub fn new(revision: u64) -> Self {
        Self(revision)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Revision {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Revision> for u64 {
    fn from(revision: Revision) -> Self {
        revision.0
    }
}

// ============================================================================
// Timestamp - Copy (milliseconds since Unix epoch)
// ============================================================================

/// Wall-clock instant with millisecond precision.
///
/// Stored as milliseconds since the Unix epoch. Presence TTLs are expressed in
/// milliseconds, so arithmetic stays in the same unit end to end.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch (1970-01-01 00:00:00 UTC).
    pub const EPOCH: Timestamp = Timestamp(0);

    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns the current wall-clock time.
    ///
    /// A system clock set before the Unix epoch reads as [`Timestamp::EPOCH`].
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);
        Self(millis)
    }

    /// Returns `self + millis`, saturating at `u64::MAX`.
    pub fn saturating_add_millis(&self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Milliseconds elapsed from `earlier` to `self` (zero if `earlier` is later).
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Renders as ISO-8601 with millisecond precision, e.g. `2026-10-16T09:30:00.000Z`.
    pub fn to_iso8601(&self) -> String {
        let millis = i64::try_from(self.0).unwrap_or(i64::MAX);
        DateTime::<Utc>::from_timestamp_millis(millis)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Parses an RFC 3339 / ISO-8601 string. Instants before the epoch are rejected.
    pub fn parse_iso8601(value: &str) -> Result<Self, TimestampParseError> {
        let parsed = DateTime::parse_from_rfc3339(value)
            .map_err(|e| TimestampParseError::Malformed(e.to_string()))?;
        u64::try_from(parsed.timestamp_millis())
            .map(Self)
            .map_err(|_| TimestampParseError::BeforeEpoch)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_iso8601())
    }
}

impl From<u64> for Timestamp {
    fn from(millis: u64) -> Self {
        Self(millis)
    }
}

/// Errors produced by [`Timestamp::parse_iso8601`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampParseError {
    #[error("malformed ISO-8601 timestamp: {0}")]
    Malformed(String),

    #[error("timestamp is before the Unix epoch")]
    BeforeEpoch,
}

/// Serde helpers that encode [`Timestamp`] as an ISO-8601 string.
///
/// Use with `#[serde(with = "stagelock_types::iso8601")]`, or
/// `stagelock_types::iso8601::option` for `Option<Timestamp>`.
pub mod iso8601 {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    use super::Timestamp;

    pub fn serialize<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_iso8601())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse_iso8601(&raw).map_err(D::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

        use super::Timestamp;

        pub fn serialize<S: Serializer>(
            ts: &Option<Timestamp>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_some(&ts.to_iso8601()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Timestamp>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| Timestamp::parse_iso8601(&raw).map_err(D::Error::custom))
                .transpose()
        }
    }
}

// ============================================================================
// Presence Config - Copy (coordinator tunables)
// ============================================================================

/// Default liveness window for a session without a heartbeat.
pub const DEFAULT_PRESENCE_TTL_MS: u64 = 60_000;

/// Default validity of a granted write lock without renewal.
pub const DEFAULT_LOCK_TTL_MS: u64 = 20_000;

/// Smallest accepted per-stage session bound.
pub const MIN_SESSIONS_PER_STAGE: usize = 2;

/// Tunables for the presence coordinator.
///
/// Hosts should heartbeat well inside `presence_ttl_ms` (every 10-15s against
/// the 60s default) to keep peer lists fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// How long a session stays live without a heartbeat.
    pub presence_ttl_ms: u64,
    /// How long a granted write lock stays valid without renewal.
    pub lock_ttl_ms: u64,
    /// Upper bound on live sessions per stage. `None` means unbounded.
    pub max_sessions_per_stage: Option<usize>,
}

impl PresenceConfig {
    pub fn with_presence_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.presence_ttl_ms = ttl_ms;
        self
    }

    pub fn with_lock_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.lock_ttl_ms = ttl_ms;
        self
    }

    pub fn with_max_sessions_per_stage(mut self, max: usize) -> Self {
        self.max_sessions_per_stage = Some(max);
        self
    }

    /// Checks that every tunable is usable.
    pub fn validate(&self) -> Result<(), PresenceConfigError> {
        if self.presence_ttl_ms == 0 {
            return Err(PresenceConfigError::ZeroPresenceTtl);
        }
        if self.lock_ttl_ms == 0 {
            return Err(PresenceConfigError::ZeroLockTtl);
        }
        if self.max_sessions_per_stage.is_some_and(|max| max < MIN_SESSIONS_PER_STAGE) {
            return Err(PresenceConfigError::SessionBoundTooSmall);
        }
        Ok(())
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            presence_ttl_ms: DEFAULT_PRESENCE_TTL_MS,
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
            max_sessions_per_stage: None,
        }
    }
}

/// Reasons a [`PresenceConfig`] is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PresenceConfigError {
    #[error("presence_ttl_ms must be greater than zero")]
    ZeroPresenceTtl,

    #[error("lock_ttl_ms must be greater than zero")]
    ZeroLockTtl,

    /// The lock owner is never evicted, so a bound needs room for one more session.
    #[error("max_sessions_per_stage must be at least {MIN_SESSIONS_PER_STAGE} when set")]
    SessionBoundTooSmall,
}
