//! Per-stage presence state.
//!
//! A [`Stage`] owns its sessions, its lock lease and its conflicts. The
//! coordinator drives it; nothing outside this crate mutates it.
//!
//! Lock owner and expiry live together in [`LockLease`], so "expiry is set
//! iff owner is set" holds by construction.

use std::collections::HashMap;

use stagelock_types::{ActorId, Revision, SessionId, StageSlug, Timestamp};
use tracing::{debug, info, warn};

use crate::conflict::{Conflict, ConflictKind};
use crate::snapshot::PeerSnapshot;

/// The exclusive write permission on a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LockLease {
    pub(crate) owner: SessionId,
    pub(crate) expires_at: Timestamp,
}

impl LockLease {
    /// A lease is live strictly before its expiry instant.
    pub(crate) fn is_active(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

/// One collaborator's live presence on a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Session {
    pub(crate) actor_id: ActorId,
    pub(crate) updated_at: Timestamp,
    pub(crate) revision: Option<Revision>,
    /// Mirrors "this session is the owner of an unexpired lease".
    pub(crate) locked: bool,
}

impl Session {
    fn new(actor_id: ActorId, now: Timestamp) -> Self {
        Self {
            actor_id,
            updated_at: now,
            revision: None,
            locked: false,
        }
    }

    /// A session is live while fewer than `ttl_ms` have passed since its last heartbeat.
    fn is_live(&self, now: Timestamp, ttl_ms: u64) -> bool {
        now.millis_since(self.updated_at) < ttl_ms
    }
}

/// Result of a lock request on a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LockOutcome {
    /// The stage was unlocked; the requester now owns it.
    Granted,
    /// The requester already owned it; expiry moved forward.
    Renewed,
    /// Another live session owns it.
    Denied { owner: SessionId },
}

/// Coordination state for one stage.
#[derive(Debug, Clone)]
pub(crate) struct Stage {
    pub(crate) slug: StageSlug,
    pub(crate) latest_revision: Option<Revision>,
    pub(crate) lock: Option<LockLease>,
    pub(crate) sessions: HashMap<SessionId, Session>,
    pub(crate) conflicts: HashMap<SessionId, Conflict>,
}

impl Stage {
    pub(crate) fn new(slug: StageSlug) -> Self {
        Self {
            slug,
            latest_revision: None,
            lock: None,
            sessions: HashMap::new(),
            conflicts: HashMap::new(),
        }
    }

    /// True once the stage has no sessions and no lock, i.e. it can be dropped.
    pub(crate) fn is_vacant(&self) -> bool {
        self.sessions.is_empty() && self.lock.is_none()
    }

    pub(crate) fn lock_owner(&self) -> Option<&SessionId> {
        self.lock.as_ref().map(|lease| &lease.owner)
    }

    pub(crate) fn lock_expires_at(&self) -> Option<Timestamp> {
        self.lock.as_ref().map(|lease| lease.expires_at)
    }

    pub(crate) fn owns_lock(&self, session_id: &SessionId) -> bool {
        self.lock_owner() == Some(session_id)
    }

    // ------------------------------------------------------------------------
    // Lazy reconciliation
    // ------------------------------------------------------------------------

    /// Drops sessions that missed the presence TTL, along with their conflicts.
    ///
    /// If the lock owner is among them the lock goes too: ownership only
    /// blocks others while the owner is still live.
    pub(crate) fn prune_expired(&mut self, now: Timestamp, presence_ttl_ms: u64) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.is_live(now, presence_ttl_ms));
        let pruned = before - self.sessions.len();
        if pruned == 0 {
            return 0;
        }

        let sessions = &self.sessions;
        self.conflicts.retain(|id, _| sessions.contains_key(id));

        if let Some(owner) = self.lock_owner().cloned() {
            if !self.sessions.contains_key(&owner) {
                self.lock = None;
                info!(stage = %self.slug, session = %owner, "Lock released, owner no longer present");
            }
        }

        debug!(stage = %self.slug, pruned, remaining = self.sessions.len(), "Pruned idle sessions");
        pruned
    }

    /// Releases the lock if it has passed its expiry. Returns whether it did.
    pub(crate) fn reconcile_lock(&mut self, now: Timestamp) -> bool {
        if self.lock.as_ref().is_none_or(|lease| lease.is_active(now)) {
            return false;
        }
        if let Some(owner) = self.release_lock() {
            info!(stage = %self.slug, session = %owner, "Lock expired");
        }
        true
    }

    /// Adopts a session whose `locked` flag survived without a recorded owner.
    ///
    /// The lowest session id wins so the repair is deterministic; any other
    /// stray flags are cleared.
    fn repair_orphaned_lock(&mut self, now: Timestamp, lock_ttl_ms: u64) {
        if self.lock.is_some() {
            return;
        }
        let Some(adopted) = self
            .sessions
            .iter()
            .filter(|(_, session)| session.locked)
            .map(|(id, _)| id)
            .min()
            .cloned()
        else {
            return;
        };

        for (id, session) in &mut self.sessions {
            session.locked = *id == adopted;
        }
        warn!(stage = %self.slug, session = %adopted, "Adopted orphaned lock flag as owner");
        self.lock = Some(LockLease {
            owner: adopted,
            expires_at: now.saturating_add_millis(lock_ttl_ms),
        });
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Records a heartbeat, creating the session on first sight.
    pub(crate) fn touch_session(
        &mut self,
        session_id: &SessionId,
        actor_id: ActorId,
        revision: Option<Revision>,
        now: Timestamp,
    ) -> Option<Revision> {
        let session = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| Session::new(actor_id.clone(), now));
        session.actor_id = actor_id;
        session.updated_at = now;
        if revision.is_some() {
            session.revision = revision;
        }
        session.revision
    }

    /// Evicts the least recently active non-owner until a new session fits.
    /// Returns the evicted sessions.
    ///
    /// Callers validate `max >= 2`, so a non-owner is always available.
    pub(crate) fn make_room_for(&mut self, incoming: &SessionId, max: usize) -> Vec<SessionId> {
        let mut evicted = Vec::new();
        if self.sessions.contains_key(incoming) {
            return evicted;
        }
        while self.sessions.len() >= max {
            let victim = self
                .sessions
                .iter()
                .filter(|(id, _)| !self.owns_lock(id))
                .min_by(|(a_id, a), (b_id, b)| {
                    a.updated_at.cmp(&b.updated_at).then_with(|| a_id.cmp(b_id))
                })
                .map(|(id, _)| id.clone());
            let Some(victim) = victim else {
                break;
            };
            self.sessions.remove(&victim);
            self.conflicts.remove(&victim);
            evicted.push(victim);
        }
        evicted
    }

    /// Removes a session and its conflict. Releases the lock if it held it.
    pub(crate) fn remove_session(&mut self, session_id: &SessionId) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        self.conflicts.remove(session_id);
        if self.owns_lock(session_id) {
            self.release_lock();
            info!(stage = %self.slug, session = %session_id, "Lock released on session teardown");
        }
        removed
    }

    // ------------------------------------------------------------------------
    // Revisions
    // ------------------------------------------------------------------------

    /// Raises the stage's latest revision. Returns whether it moved.
    pub(crate) fn raise_revision(&mut self, revision: Revision) -> bool {
        let previous = self.latest_revision;
        if previous.is_some_and(|latest| revision <= latest) {
            return false;
        }
        self.latest_revision = Some(revision);

        // Postcondition: the latest revision only moves forward
        debug_assert!(self.latest_revision > previous, "latest revision must not decrease");
        true
    }

    /// Records or clears this session's staleness after a heartbeat.
    ///
    /// A stale revision overrides whatever the lock request produced.
    pub(crate) fn evaluate_staleness(&mut self, session_id: &SessionId, now: Timestamp) {
        let session_revision = self.sessions.get(session_id).and_then(|s| s.revision);

        match (self.latest_revision, session_revision) {
            (Some(latest), Some(revision)) if revision < latest => {
                let same_detection = self.conflicts.get(session_id).is_some_and(|c| {
                    c.kind == ConflictKind::StaleRevision
                        && c.latest_revision == Some(latest)
                });
                if !same_detection {
                    self.conflicts
                        .insert(session_id.clone(), Conflict::stale_revision(now, latest));
                }
            }
            _ => {
                let holds_lock = self.owns_lock(session_id);
                if self
                    .conflicts
                    .get(session_id)
                    .is_some_and(|c| c.is_resolved(holds_lock))
                {
                    self.conflicts.remove(session_id);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Locking
    // ------------------------------------------------------------------------

    /// Runs the lock state machine for a requesting session.
    ///
    /// First come, first served: the stored owner wins until it expires,
    /// leaves or releases. A denied session retries on a later heartbeat.
    pub(crate) fn acquire_lock(
        &mut self,
        session_id: &SessionId,
        now: Timestamp,
        lock_ttl_ms: u64,
    ) -> LockOutcome {
        self.repair_orphaned_lock(now, lock_ttl_ms);
        let expires_at = now.saturating_add_millis(lock_ttl_ms);

        let outcome = match self.lock_owner().cloned() {
            None => {
                self.lock = Some(LockLease {
                    owner: session_id.clone(),
                    expires_at,
                });
                if let Some(session) = self.sessions.get_mut(session_id) {
                    session.locked = true;
                }
                self.conflicts.remove(session_id);
                LockOutcome::Granted
            }
            Some(owner) if owner == *session_id => {
                self.renew_lock(session_id, now, lock_ttl_ms);
                LockOutcome::Renewed
            }
            Some(owner) => {
                let owner_actor = self.sessions.get(&owner).map(|s| s.actor_id.clone());
                if let Some(session) = self.sessions.get_mut(session_id) {
                    session.locked = false;
                }
                self.conflicts.insert(
                    session_id.clone(),
                    Conflict::lock_denied(now, self.latest_revision, owner.clone(), owner_actor),
                );
                LockOutcome::Denied { owner }
            }
        };

        // Postcondition: a lease exists and only its owner is flagged
        debug_assert!(self.lock.is_some(), "lock request must leave a lease behind");
        debug_assert!(
            self.flags_match_lease(),
            "locked flags must name only the lease owner"
        );
        outcome
    }

    /// Pushes the lock expiry to `now + lock_ttl_ms` if `session_id` owns it.
    pub(crate) fn renew_lock(
        &mut self,
        session_id: &SessionId,
        now: Timestamp,
        lock_ttl_ms: u64,
    ) -> bool {
        match &mut self.lock {
            Some(lease) if lease.owner == *session_id => {
                lease.expires_at = now.saturating_add_millis(lock_ttl_ms);
                if let Some(session) = self.sessions.get_mut(session_id) {
                    session.locked = true;
                }
                debug!(stage = %self.slug, session = %session_id, expires_at = %lease.expires_at, "Lock renewed");
                true
            }
            _ => false,
        }
    }

    /// Drops the lease and clears the former owner's flag.
    pub(crate) fn release_lock(&mut self) -> Option<SessionId> {
        let lease = self.lock.take()?;
        if let Some(session) = self.sessions.get_mut(&lease.owner) {
            session.locked = false;
        }

        // Postcondition: no session keeps a flag without a lease
        debug_assert!(
            self.flags_match_lease(),
            "released lock must not leave a locked flag behind"
        );
        Some(lease.owner)
    }

    /// True when every session flagged `locked` is the lease owner.
    fn flags_match_lease(&self) -> bool {
        self.sessions
            .iter()
            .filter(|(_, session)| session.locked)
            .all(|(id, _)| self.owns_lock(id))
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    /// Live sessions, most recently active first; ties by session id.
    pub(crate) fn peers(&self, now: Timestamp) -> Vec<PeerSnapshot> {
        let active_owner = self
            .lock
            .as_ref()
            .filter(|lease| lease.is_active(now))
            .map(|lease| &lease.owner);

        let mut peers: Vec<PeerSnapshot> = self
            .sessions
            .iter()
            .map(|(id, session)| PeerSnapshot {
                session_id: id.clone(),
                actor_id: session.actor_id.clone(),
                stage_slug: self.slug.clone(),
                updated_at: session.updated_at,
                revision: session.revision,
                locked: active_owner == Some(id),
            })
            .collect();

        peers.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        peers
    }
}
