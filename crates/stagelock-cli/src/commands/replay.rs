//! Replay command implementation.
//!
//! Reads a JSON array of steps and runs them in order against a coordinator
//! driven by a [`ManualClock`]. Each step prints one JSON line:
//!
//! ```json
//! {"step":0,"op":"heartbeat","at":"1970-01-01T00:00:00.000Z","result":{...}}
//! ```

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stagelock_config::StagelockConfig;
use stagelock_presence::{Clock, ConflictReport, HeartbeatRequest, ManualClock, PresenceCoordinator};
use stagelock_types::{PresenceConfig, Revision, SessionId, StageSlug};
use tracing::info;

/// One scripted operation, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
    Heartbeat(HeartbeatRequest),
    Advance {
        ms: u64,
    },
    Peers {
        stage_slug: StageSlug,
    },
    Snapshot {
        stage_slug: StageSlug,
    },
    RegisterRevision {
        stage_slug: StageSlug,
        revision: Revision,
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    RegisterConflict(ConflictReport),
    ClearSession {
        stage_slug: StageSlug,
        session_id: SessionId,
    },
    ReleaseLock {
        stage_slug: StageSlug,
        session_id: SessionId,
    },
    Sweep,
    Reset,
}

impl Step {
    pub fn op(&self) -> &'static str {
        match self {
            Self::Heartbeat(_) => "heartbeat",
            Self::Advance { .. } => "advance",
            Self::Peers { .. } => "peers",
            Self::Snapshot { .. } => "snapshot",
            Self::RegisterRevision { .. } => "registerRevision",
            Self::RegisterConflict(_) => "registerConflict",
            Self::ClearSession { .. } => "clearSession",
            Self::ReleaseLock { .. } => "releaseLock",
            Self::Sweep => "sweep",
            Self::Reset => "reset",
        }
    }
}

#[derive(Debug, Serialize)]
struct StepOutput {
    step: usize,
    op: &'static str,
    at: String,
    result: Value,
}

/// Run a replay script from `script` (or stdin for "-").
pub fn run(project: &Path, script: &Path, start_ms: u64) -> Result<()> {
    let config = StagelockConfig::load_from_dir(project).context("Failed to load configuration")?;
    let raw = read_script(script)?;
    let steps = parse_script(&raw)
        .with_context(|| format!("Malformed replay script {}", script.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(&steps, config.presence, start_ms, &mut out)?;
    out.flush()?;

    info!(steps = steps.len(), script = %script.display(), "Replay finished");
    Ok(())
}

fn read_script(script: &Path) -> Result<String> {
    if script == Path::new("-") {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read replay script from stdin")?;
        return Ok(raw);
    }
    std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read replay script {}", script.display()))
}

pub fn parse_script(raw: &str) -> Result<Vec<Step>> {
    Ok(serde_json::from_str(raw)?)
}

/// Execute `steps` in order, writing one JSON line per step to `out`.
pub fn execute(
    steps: &[Step],
    config: PresenceConfig,
    start_ms: u64,
    out: &mut impl Write,
) -> Result<()> {
    let clock = Arc::new(ManualClock::starting_at_millis(start_ms));
    let mut presence = PresenceCoordinator::with_clock(config, Arc::clone(&clock))
        .context("Invalid presence configuration")?;

    for (index, step) in steps.iter().enumerate() {
        let result = match step.clone() {
            Step::Heartbeat(request) => serde_json::to_value(presence.heartbeat(request))?,
            Step::Advance { ms } => {
                clock.advance_millis(ms);
                Value::Null
            }
            Step::Peers { stage_slug } => serde_json::to_value(presence.peers(&stage_slug))?,
            Step::Snapshot { stage_slug } => {
                serde_json::to_value(presence.stage_snapshot(&stage_slug))?
            }
            Step::RegisterRevision {
                stage_slug,
                revision,
                session_id,
            } => {
                presence.register_revision(&stage_slug, revision, session_id.as_ref());
                Value::Null
            }
            Step::RegisterConflict(report) => {
                serde_json::to_value(presence.register_conflict(report))?
            }
            Step::ClearSession {
                stage_slug,
                session_id,
            } => {
                presence.clear_session(&stage_slug, &session_id);
                Value::Null
            }
            Step::ReleaseLock {
                stage_slug,
                session_id,
            } => Value::Bool(presence.release_lock(&stage_slug, &session_id)),
            Step::Sweep => serde_json::to_value(presence.sweep())?,
            Step::Reset => {
                presence.reset();
                Value::Null
            }
        };

        let line = StepOutput {
            step: index,
            op: step.op(),
            at: clock.now().to_iso8601(),
            result,
        };
        writeln!(out, "{}", serde_json::to_string(&line)?)?;
    }

    Ok(())
}
