//! Request and snapshot payloads exchanged with the HTTP layer.
//!
//! Every type here serializes with camelCase field names and ISO-8601
//! timestamps so the host can hand it straight to a JSON encoder.

use serde::{Deserialize, Serialize};
use stagelock_types::{ActorId, Revision, SessionId, StageSlug, Timestamp, iso8601};

use crate::conflict::Conflict;
use crate::error::PresenceResult;

/// A periodic liveness call from one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub stage_slug: StageSlug,
    pub session_id: SessionId,
    pub actor_id: ActorId,
    /// Revision the caller believes it is viewing. `None` keeps the stored value.
    #[serde(default)]
    pub revision: Option<Revision>,
    /// "I want the exclusive write lock now."
    #[serde(default)]
    pub lock_request: bool,
}

impl HeartbeatRequest {
    pub fn new(stage_slug: StageSlug, session_id: SessionId, actor_id: ActorId) -> Self {
        Self {
            stage_slug,
            session_id,
            actor_id,
            revision: None,
            lock_request: false,
        }
    }

    /// Builds a request from raw identifiers, failing fast on empty ones.
    pub fn try_new(
        stage_slug: impl Into<String>,
        session_id: impl Into<String>,
        actor_id: impl Into<String>,
    ) -> PresenceResult<Self> {
        Ok(Self::new(
            StageSlug::try_new(stage_slug)?,
            SessionId::try_new(session_id)?,
            ActorId::try_new(actor_id)?,
        ))
    }

    pub fn with_revision(mut self, revision: impl Into<Revision>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_lock_request(mut self, lock_request: bool) -> Self {
        self.lock_request = lock_request;
        self
    }
}

/// One live session as seen by its peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSnapshot {
    pub session_id: SessionId,
    pub actor_id: ActorId,
    pub stage_slug: StageSlug,
    #[serde(with = "iso8601")]
    pub updated_at: Timestamp,
    pub revision: Option<Revision>,
    /// True only for the current lock owner while its lock is unexpired.
    pub locked: bool,
}

/// Everything a session needs after a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResult {
    pub session_id: SessionId,
    pub actor_id: ActorId,
    pub stage_slug: StageSlug,
    /// The session's recorded revision after this heartbeat.
    pub revision: Option<Revision>,
    pub peers: Vec<PeerSnapshot>,
    pub lock_owner: Option<SessionId>,
    #[serde(with = "iso8601::option")]
    pub lock_expires_at: Option<Timestamp>,
    /// The single active conflict for this session, if any.
    pub conflict: Option<Conflict>,
}

impl HeartbeatResult {
    /// Returns true if the requesting session currently holds the lock.
    pub fn holds_lock(&self) -> bool {
        self.lock_owner.as_ref() == Some(&self.session_id)
    }
}

/// Read-only view of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSnapshot {
    pub stage_slug: StageSlug,
    pub latest_revision: Option<Revision>,
    pub lock_owner: Option<SessionId>,
    #[serde(with = "iso8601::option")]
    pub lock_expires_at: Option<Timestamp>,
    pub peers: Vec<PeerSnapshot>,
}

/// Outcome of a full-table sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Stages dropped because they were empty and unlocked.
    pub stages_removed: usize,
    /// Sessions dropped for missing the presence TTL.
    pub sessions_pruned: usize,
    /// Locks released because they passed their expiry.
    pub locks_expired: usize,
}
