//! The presence coordinator.
//!
//! Owns the stage table and exposes every presence operation. Each call is a
//! bounded, synchronous computation over in-memory maps, and TTLs are
//! evaluated lazily whenever a stage is touched.

use std::collections::HashMap;

use stagelock_types::{PresenceConfig, Revision, SessionId, StageSlug, Timestamp};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::conflict::{Conflict, ConflictKind, ConflictReport};
use crate::error::PresenceResult;
use crate::snapshot::{HeartbeatRequest, HeartbeatResult, PeerSnapshot, StageSnapshot, SweepReport};
use crate::stage::{LockOutcome, Stage};

/// Tracks who is on each stage, who holds its write lock, and who is in conflict.
///
/// # Thread Safety
///
/// Operations take `&mut self` and run to completion. Multi-threaded hosts
/// wrap the coordinator in a [`SharedCoordinator`](crate::SharedCoordinator).
#[derive(Debug)]
pub struct PresenceCoordinator<C: Clock = SystemClock> {
    config: PresenceConfig,
    clock: C,
    pub(crate) stages: HashMap<StageSlug, Stage>,
}

impl PresenceCoordinator<SystemClock> {
    /// Creates a coordinator on wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::InvalidConfig`](crate::PresenceError::InvalidConfig)
    /// if a TTL is zero or the session bound is too small.
    pub fn new(config: PresenceConfig) -> PresenceResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> PresenceCoordinator<C> {
    /// Creates a coordinator with an injected time source.
    pub fn with_clock(config: PresenceConfig, clock: C) -> PresenceResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            stages: HashMap::new(),
        })
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ------------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------------

    /// Records a heartbeat and returns the session's view of the stage.
    ///
    /// In order: reconcile the stage, upsert the session, raise the stage
    /// revision, run the lock request (or renew an owned lock), then evaluate
    /// staleness. A stale revision is reported in preference to a lock denial.
    pub fn heartbeat(&mut self, request: HeartbeatRequest) -> HeartbeatResult {
        let now = self.clock.now();
        let PresenceConfig {
            presence_ttl_ms,
            lock_ttl_ms,
            max_sessions_per_stage,
        } = self.config;
        let HeartbeatRequest {
            stage_slug,
            session_id,
            actor_id,
            revision,
            lock_request,
        } = request;

        let stage = self
            .stages
            .entry(stage_slug.clone())
            .or_insert_with(|| Stage::new(stage_slug.clone()));
        stage.prune_expired(now, presence_ttl_ms);
        stage.reconcile_lock(now);

        if let Some(max) = max_sessions_per_stage {
            for evicted in stage.make_room_for(&session_id, max) {
                warn!(
                    stage = %stage_slug,
                    session = %evicted,
                    admitted = %session_id,
                    max,
                    "Evicted idle session to admit a new one"
                );
            }
        }
        let session_revision = stage.touch_session(&session_id, actor_id.clone(), revision, now);
        if let Some(revision) = session_revision {
            stage.raise_revision(revision);
        }

        if lock_request {
            match stage.acquire_lock(&session_id, now, lock_ttl_ms) {
                LockOutcome::Granted => {
                    info!(stage = %stage_slug, session = %session_id, actor = %actor_id, "Lock granted");
                }
                LockOutcome::Renewed => {}
                LockOutcome::Denied { owner } => {
                    debug!(
                        stage = %stage_slug,
                        session = %session_id,
                        actor = %actor_id,
                        owner = %owner,
                        "Lock denied"
                    );
                }
            }
        } else {
            stage.renew_lock(&session_id, now, lock_ttl_ms);
        }

        stage.evaluate_staleness(&session_id, now);

        HeartbeatResult {
            revision: session_revision,
            peers: stage.peers(now),
            lock_owner: stage.lock_owner().cloned(),
            lock_expires_at: stage.lock_expires_at(),
            conflict: stage.conflicts.get(&session_id).cloned(),
            session_id,
            actor_id,
            stage_slug,
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Returns live peers on a stage, pruning idle sessions first.
    ///
    /// An unknown stage yields an empty list.
    pub fn peers(&mut self, stage_slug: &StageSlug) -> Vec<PeerSnapshot> {
        let now = self.clock.now();
        self.refresh_stage(stage_slug, now)
            .map(|stage| stage.peers(now))
            .unwrap_or_default()
    }

    /// Returns a read-only view of a stage, or `None` if it is unknown.
    pub fn stage_snapshot(&mut self, stage_slug: &StageSlug) -> Option<StageSnapshot> {
        let now = self.clock.now();
        let stage = self.refresh_stage(stage_slug, now)?;
        Some(StageSnapshot {
            stage_slug: stage.slug.clone(),
            latest_revision: stage.latest_revision,
            lock_owner: stage.lock_owner().cloned(),
            lock_expires_at: stage.lock_expires_at(),
            peers: stage.peers(now),
        })
    }

    /// Number of stages currently tracked.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Slugs of the tracked stages, sorted.
    pub fn stage_slugs(&self) -> Vec<StageSlug> {
        let mut slugs: Vec<StageSlug> = self.stages.keys().cloned().collect();
        slugs.sort();
        slugs
    }

    // ------------------------------------------------------------------------
    // Out-of-band updates
    // ------------------------------------------------------------------------

    /// Advances a stage's latest revision without a heartbeat, e.g. after a save.
    ///
    /// If `session_id` owns the lock its expiry is renewed. Stale-revision
    /// conflicts whose recorded revision is covered by `revision` are dropped;
    /// the next heartbeat from those sessions re-evaluates them against the
    /// new revision. Unknown stages are ignored.
    pub fn register_revision(
        &mut self,
        stage_slug: &StageSlug,
        revision: Revision,
        session_id: Option<&SessionId>,
    ) {
        let now = self.clock.now();
        let lock_ttl_ms = self.config.lock_ttl_ms;
        let Some(stage) = self.refresh_stage(stage_slug, now) else {
            debug!(stage = %stage_slug, %revision, "Revision for unknown stage ignored");
            return;
        };

        if stage.raise_revision(revision) {
            debug!(stage = %stage_slug, %revision, "Latest revision advanced");
        }
        if let Some(session_id) = session_id {
            stage.renew_lock(session_id, now, lock_ttl_ms);
        }
        stage.conflicts.retain(|_, conflict| {
            conflict.kind != ConflictKind::StaleRevision
                || conflict
                    .latest_revision
                    .is_none_or(|recorded| recorded > revision)
        });
    }

    /// Injects a conflict for a session, replacing any existing one.
    ///
    /// Returns `None` if the stage or session is not currently present. A
    /// stale-revision report never records a revision below the stage's
    /// latest or the session's own, so a missing or lagging revision is raised.
    pub fn register_conflict(&mut self, report: ConflictReport) -> Option<Conflict> {
        let now = self.clock.now();
        let stage = self.refresh_stage(&report.stage_slug, now)?;
        let session_revision = stage.sessions.get(&report.session_id)?.revision;

        if report.kind == ConflictKind::LockDenied {
            if let Some(blocking) = &report.blocking_session_id {
                warn!(
                    stage = %report.stage_slug,
                    session = %report.session_id,
                    blocking_session = %blocking,
                    blocking_actor = ?report.blocking_actor_id.as_ref().map(|a| a.as_str()),
                    "Lock conflict reported"
                );
            }
        }

        let session_id = report.session_id.clone();
        let mut conflict = report.into_conflict(now);
        if conflict.kind == ConflictKind::StaleRevision {
            // Option orders None below any revision.
            conflict.latest_revision = conflict
                .latest_revision
                .max(stage.latest_revision)
                .max(session_revision);
        }
        stage.conflicts.insert(session_id, conflict.clone());
        Some(conflict)
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Removes a session immediately, releasing its lock without waiting for the TTL.
    pub fn clear_session(&mut self, stage_slug: &StageSlug, session_id: &SessionId) {
        let Some(stage) = self.stages.get_mut(stage_slug) else {
            return;
        };
        if stage.remove_session(session_id) {
            debug!(stage = %stage_slug, session = %session_id, "Session cleared");
        }
        self.collect_if_vacant(stage_slug);
    }

    /// Gives up the lock while staying on the stage. Returns whether a lock was released.
    ///
    /// Only the owner can release; anyone else is a no-op.
    pub fn release_lock(&mut self, stage_slug: &StageSlug, session_id: &SessionId) -> bool {
        let now = self.clock.now();
        let Some(stage) = self.refresh_stage(stage_slug, now) else {
            return false;
        };
        if !stage.owns_lock(session_id) {
            return false;
        }
        let Some(owner) = stage.release_lock() else {
            return false;
        };
        info!(stage = %stage_slug, session = %owner, "Lock released by owner");
        true
    }

    /// Reconciles every stage and drops the vacant ones.
    ///
    /// Lazy reconciliation already keeps touched stages tidy; a periodic sweep
    /// also reclaims stages nobody reads anymore.
    pub fn sweep(&mut self) -> SweepReport {
        let now = self.clock.now();
        let presence_ttl_ms = self.config.presence_ttl_ms;
        let mut report = SweepReport::default();

        for stage in self.stages.values_mut() {
            report.sessions_pruned += stage.prune_expired(now, presence_ttl_ms);
            if stage.reconcile_lock(now) {
                report.locks_expired += 1;
            }
        }

        let before = self.stages.len();
        self.stages.retain(|_, stage| !stage.is_vacant());
        report.stages_removed = before - self.stages.len();

        if report != SweepReport::default() {
            info!(
                stages_removed = report.stages_removed,
                sessions_pruned = report.sessions_pruned,
                locks_expired = report.locks_expired,
                "Presence sweep completed"
            );
        }
        report
    }

    /// Drops all state. Intended for test isolation.
    pub fn reset(&mut self) {
        self.stages.clear();
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Prunes and reconciles a known stage, removing it if that left it vacant.
    fn refresh_stage(&mut self, stage_slug: &StageSlug, now: Timestamp) -> Option<&mut Stage> {
        let presence_ttl_ms = self.config.presence_ttl_ms;
        let stage = self.stages.get_mut(stage_slug)?;
        stage.prune_expired(now, presence_ttl_ms);
        stage.reconcile_lock(now);

        if self.collect_if_vacant(stage_slug) {
            return None;
        }
        self.stages.get_mut(stage_slug)
    }

    fn collect_if_vacant(&mut self, stage_slug: &StageSlug) -> bool {
        if self.stages.get(stage_slug).is_some_and(Stage::is_vacant) {
            self.stages.remove(stage_slug);
            debug!(stage = %stage_slug, "Stage removed");
            return true;
        }
        false
    }
}
