//! Conflict records surfaced to sessions.
//!
//! A conflict is advisory: it tells a client to block editing or prompt a
//! refresh. Each session has at most one outstanding conflict per stage.

use serde::{Deserialize, Serialize};
use stagelock_types::{ActorId, Revision, SessionId, StageSlug, Timestamp, iso8601};

use crate::error::PresenceResult;

/// Why a session is in conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// The session asked for the write lock while another session holds it.
    LockDenied,
    /// The session's revision is behind the stage's latest revision.
    StaleRevision,
    /// Registered by a caller outside the heartbeat flow.
    Explicit,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LockDenied => "lock_denied",
            Self::StaleRevision => "stale_revision",
            Self::Explicit => "explicit",
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outstanding conflict for one session.
///
/// This is also the `ConflictSnapshot` payload handed to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    #[serde(with = "iso8601")]
    pub detected_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub latest_revision: Option<Revision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_actor_id: Option<ActorId>,
}

impl Conflict {
    pub(crate) fn lock_denied(
        detected_at: Timestamp,
        latest_revision: Option<Revision>,
        owner: SessionId,
        owner_actor: Option<ActorId>,
    ) -> Self {
        let message = match &owner_actor {
            Some(actor) => format!("stage is being edited by {actor} (session {owner})"),
            None => format!("stage is being edited by session {owner}"),
        };
        Self {
            kind: ConflictKind::LockDenied,
            detected_at,
            message: Some(message),
            latest_revision,
            blocking_session_id: Some(owner),
            blocking_actor_id: owner_actor,
        }
    }

    pub(crate) fn stale_revision(detected_at: Timestamp, latest_revision: Revision) -> Self {
        Self {
            kind: ConflictKind::StaleRevision,
            detected_at,
            message: Some(format!(
                "revision {latest_revision} is available; reload before editing"
            )),
            latest_revision: Some(latest_revision),
            blocking_session_id: None,
            blocking_actor_id: None,
        }
    }

    /// Whether a heartbeat that found no staleness may drop this conflict.
    ///
    /// Explicit conflicts are only replaced or torn down with the session.
    pub(crate) fn is_resolved(&self, session_holds_lock: bool) -> bool {
        match self.kind {
            ConflictKind::StaleRevision => true,
            ConflictKind::LockDenied => session_holds_lock,
            ConflictKind::Explicit => false,
        }
    }
}

/// A conflict reported from outside the heartbeat flow.
///
/// Used when detection happens elsewhere, for example when a downstream write
/// fails a version check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub stage_slug: StageSlug,
    pub session_id: SessionId,
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub latest_revision: Option<Revision>,
    #[serde(default)]
    pub blocking_session_id: Option<SessionId>,
    #[serde(default)]
    pub blocking_actor_id: Option<ActorId>,
}

impl ConflictReport {
    pub fn new(stage_slug: StageSlug, session_id: SessionId, kind: ConflictKind) -> Self {
        Self {
            stage_slug,
            session_id,
            kind,
            message: None,
            latest_revision: None,
            blocking_session_id: None,
            blocking_actor_id: None,
        }
    }

    /// Builds a report from raw identifiers, failing fast on empty ones.
    pub fn try_new(
        stage_slug: impl Into<String>,
        session_id: impl Into<String>,
        kind: ConflictKind,
    ) -> PresenceResult<Self> {
        Ok(Self::new(
            StageSlug::try_new(stage_slug)?,
            SessionId::try_new(session_id)?,
            kind,
        ))
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_latest_revision(mut self, revision: Revision) -> Self {
        self.latest_revision = Some(revision);
        self
    }

    pub fn with_blocking_session(mut self, session: SessionId, actor: Option<ActorId>) -> Self {
        self.blocking_session_id = Some(session);
        self.blocking_actor_id = actor;
        self
    }

    pub(crate) fn into_conflict(self, detected_at: Timestamp) -> Conflict {
        Conflict {
            kind: self.kind,
            detected_at,
            message: self.message,
            latest_revision: self.latest_revision,
            blocking_session_id: self.blocking_session_id,
            blocking_actor_id: self.blocking_actor_id,
        }
    }
}
