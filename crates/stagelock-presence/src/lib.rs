//! stagelock-presence: Session presence and optimistic locking for `Stagelock`
//!
//! Collaborators open the same stage from many sessions. This crate answers
//! three questions for each stage:
//!
//! - **Who is here?** Sessions heartbeat; any session silent for longer than
//!   the presence TTL drops out of the peer list.
//! - **Who may write?** At most one live session holds an exclusive write lock
//!   with its own TTL. Requests are first come, first served; the owner renews
//!   by heartbeating.
//! - **Who is behind?** Sessions report the revision they are viewing; anyone
//!   behind the stage's latest revision gets a stale-revision conflict.
//!
//! Conflicts are advisory data, not errors. State lives in memory and every
//! TTL is evaluated lazily against an injected [`Clock`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use stagelock_presence::{ConflictKind, HeartbeatRequest, ManualClock, PresenceCoordinator};
//! use stagelock_types::PresenceConfig;
//!
//! let clock = Arc::new(ManualClock::starting_at_millis(1_000));
//! let mut presence = PresenceCoordinator::with_clock(PresenceConfig::default(), Arc::clone(&clock))?;
//!
//! // alice takes the lock
//! let alice = presence.heartbeat(HeartbeatRequest::try_new("memo-1", "s1", "alice")?.with_lock_request(true));
//! assert!(alice.holds_lock());
//!
//! // bob is denied while alice holds it
//! let bob = presence.heartbeat(HeartbeatRequest::try_new("memo-1", "s2", "bob")?.with_lock_request(true));
//! assert_eq!(bob.conflict.map(|c| c.kind), Some(ConflictKind::LockDenied));
//!
//! // once alice stops renewing, her lock lapses and bob can take it
//! clock.advance_millis(presence.config().lock_ttl_ms);
//! let bob = presence.heartbeat(HeartbeatRequest::try_new("memo-1", "s2", "bob")?.with_lock_request(true));
//! assert!(bob.holds_lock());
//! # Ok::<(), stagelock_presence::PresenceError>(())
//! ```

mod clock;
mod conflict;
mod coordinator;
mod error;
mod shared;
mod snapshot;
mod stage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use conflict::{Conflict, ConflictKind, ConflictReport};
pub use coordinator::PresenceCoordinator;
pub use error::{PresenceError, PresenceResult};
pub use shared::SharedCoordinator;
pub use snapshot::{HeartbeatRequest, HeartbeatResult, PeerSnapshot, StageSnapshot, SweepReport};
