//! Thread-safe handle to a presence coordinator.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use stagelock_types::{PresenceConfig, Revision, SessionId, StageSlug};

use crate::clock::{Clock, SystemClock};
use crate::conflict::{Conflict, ConflictReport};
use crate::coordinator::PresenceCoordinator;
use crate::error::{PresenceError, PresenceResult};
use crate::snapshot::{HeartbeatRequest, HeartbeatResult, PeerSnapshot, StageSnapshot, SweepReport};

/// Cloneable handle that serializes access to one [`PresenceCoordinator`].
///
/// Reads reconcile TTLs too, so nearly every call takes the write lock. Each
/// operation holds it for one bounded in-memory computation.
///
/// # Example
///
/// ```
/// use stagelock_presence::{HeartbeatRequest, SharedCoordinator};
/// use stagelock_types::PresenceConfig;
///
/// let presence = SharedCoordinator::new(PresenceConfig::default())?;
/// let worker = presence.clone();
///
/// let result = std::thread::spawn(move || {
///     worker.heartbeat(HeartbeatRequest::try_new("memo-1", "s1", "alice")?.with_lock_request(true))
/// })
/// .join()
/// .expect("heartbeat thread panicked")?;
///
/// assert!(result.holds_lock());
/// assert_eq!(presence.stage_count()?, 1);
/// # Ok::<(), stagelock_presence::PresenceError>(())
/// ```
pub struct SharedCoordinator<C: Clock = SystemClock> {
    inner: Arc<RwLock<PresenceCoordinator<C>>>,
}

impl<C: Clock> Clone for SharedCoordinator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock> std::fmt::Debug for SharedCoordinator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCoordinator").finish_non_exhaustive()
    }
}

impl SharedCoordinator<SystemClock> {
    /// Creates a shared coordinator on wall-clock time.
    pub fn new(config: PresenceConfig) -> PresenceResult<Self> {
        PresenceCoordinator::new(config).map(Self::from)
    }
}

impl<C: Clock> From<PresenceCoordinator<C>> for SharedCoordinator<C> {
    fn from(coordinator: PresenceCoordinator<C>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(coordinator)),
        }
    }
}

impl<C: Clock> SharedCoordinator<C> {
    pub fn with_clock(config: PresenceConfig, clock: C) -> PresenceResult<Self> {
        PresenceCoordinator::with_clock(config, clock).map(Self::from)
    }

    pub fn heartbeat(&self, request: HeartbeatRequest) -> PresenceResult<HeartbeatResult> {
        Ok(self.write()?.heartbeat(request))
    }

    pub fn peers(&self, stage_slug: &StageSlug) -> PresenceResult<Vec<PeerSnapshot>> {
        Ok(self.write()?.peers(stage_slug))
    }

    pub fn stage_snapshot(&self, stage_slug: &StageSlug) -> PresenceResult<Option<StageSnapshot>> {
        Ok(self.write()?.stage_snapshot(stage_slug))
    }

    pub fn register_revision(
        &self,
        stage_slug: &StageSlug,
        revision: Revision,
        session_id: Option<&SessionId>,
    ) -> PresenceResult<()> {
        self.write()?.register_revision(stage_slug, revision, session_id);
        Ok(())
    }

    pub fn register_conflict(&self, report: ConflictReport) -> PresenceResult<Option<Conflict>> {
        Ok(self.write()?.register_conflict(report))
    }

    pub fn clear_session(&self, stage_slug: &StageSlug, session_id: &SessionId) -> PresenceResult<()> {
        self.write()?.clear_session(stage_slug, session_id);
        Ok(())
    }

    pub fn release_lock(&self, stage_slug: &StageSlug, session_id: &SessionId) -> PresenceResult<bool> {
        Ok(self.write()?.release_lock(stage_slug, session_id))
    }

    pub fn sweep(&self) -> PresenceResult<SweepReport> {
        Ok(self.write()?.sweep())
    }

    pub fn reset(&self) -> PresenceResult<()> {
        self.write()?.reset();
        Ok(())
    }

    pub fn stage_count(&self) -> PresenceResult<usize> {
        Ok(self.read()?.stage_count())
    }

    pub fn stage_slugs(&self) -> PresenceResult<Vec<StageSlug>> {
        Ok(self.read()?.stage_slugs())
    }

    pub fn config(&self) -> PresenceResult<PresenceConfig> {
        Ok(*self.read()?.config())
    }

    fn read(&self) -> PresenceResult<RwLockReadGuard<'_, PresenceCoordinator<C>>> {
        self.inner.read().map_err(|_| PresenceError::LockPoisoned)
    }

    fn write(&self) -> PresenceResult<RwLockWriteGuard<'_, PresenceCoordinator<C>>> {
        self.inner.write().map_err(|_| PresenceError::LockPoisoned)
    }
}
