//! The authoritative state machine behind the skillgrid service.
//!
//! All state lives in deterministically serializable in-memory containers
//! owned by a single [`Kernel`]. Every externally-invoked operation takes
//! the state lock for its whole duration and runs to completion, so the
//! claim/complete/fail/cancel protocols need no finer-grained locking: the
//! pop-and-update sequence of a claim is atomic with respect to any other
//! caller. Workers do their long-running external work entirely outside
//! the kernel and come back only for short request/response pairs.
//!
//! Persistence is snapshot-based: [`Kernel::open`] restores every region
//! from the state dir (running registered migrations in order) and
//! [`Kernel::save`] writes them back before shutdown.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use skillgrid_core::{AccessState, AnalysisJob, AnalysisPrompt, CoreError, EnrichmentJob,
    Identity, Result, Skill, UserProfile};

pub mod access;
pub mod enrich;
pub mod prompts;
pub mod queue;
pub mod query;
pub mod skills;
mod snapshot;
pub mod users;

/// FIFO queue state shared by both job classes: the record map plus the
/// ordered pending ids and the monotonic counter feeding job-id derivation.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct QueueState<J> {
    pub jobs: HashMap<String, J>,
    pub pending: VecDeque<String>,
    pub counter: u64,
}

impl<J> Default for QueueState<J> {
    fn default() -> Self {
        Self {
            jobs: HashMap::new(),
            pending: VecDeque::new(),
            counter: 0,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct CoreState {
    pub skills: HashMap<String, Skill>,
    pub users: HashMap<Identity, UserProfile>,
    pub prompts: HashMap<String, AnalysisPrompt>,
    pub access: AccessState,
    pub analysis: QueueState<AnalysisJob>,
    pub enrichment: QueueState<EnrichmentJob>,
}

/// Handle to the coordination core. Cheap to clone; all clones share the
/// same state.
#[derive(Clone)]
pub struct Kernel {
    state_dir: PathBuf,
    state: Arc<Mutex<CoreState>>,
}

impl Kernel {
    /// Restore state from `dir` (or start empty) and seed the built-in
    /// default prompt on first start. A failed region migration aborts
    /// startup.
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut state = snapshot::load(dir)?;
        prompts::seed_default_prompt(&mut state);
        Ok(Self {
            state_dir: dir.to_path_buf(),
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Write every region to the state dir (temp file + rename per region).
    pub fn save(&self) -> anyhow::Result<()> {
        let state = self.state();
        snapshot::save(&self.state_dir, &state)
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().expect("kernel state lock poisoned")
    }

    pub(crate) fn now() -> DateTime<Utc> {
        Utc::now()
    }
}

impl CoreState {
    pub(crate) fn require_admin(&self, caller: &Identity) -> Result<()> {
        if self.access.is_admin(caller) {
            Ok(())
        } else {
            Err(CoreError::unauthorized("admin role required"))
        }
    }

    pub(crate) fn require_worker(&self, caller: &Identity) -> Result<()> {
        if self.access.is_worker(caller) {
            Ok(())
        } else {
            Err(CoreError::unauthorized("worker or admin role required"))
        }
    }

    /// Resolve a caller-supplied skill id to the stored key: direct hit,
    /// the short form expanded, or the long form contracted when the name
    /// repeats the repo.
    pub(crate) fn resolve_skill_id(&self, id: &str) -> Option<String> {
        if self.skills.contains_key(id) {
            return Some(id.to_string());
        }
        if let Some(expanded) = skillgrid_core::id::expand_short_id(id) {
            if self.skills.contains_key(&expanded) {
                return Some(expanded);
            }
        }
        let segments: Vec<&str> = id.split('/').collect();
        if let [owner, repo, name] = segments.as_slice() {
            if repo == name {
                let short = format!("{owner}/{repo}");
                if self.skills.contains_key(&short) {
                    return Some(short);
                }
            }
        }
        None
    }

    pub(crate) fn skill(&self, id: &str) -> Result<&Skill> {
        let key = self
            .resolve_skill_id(id)
            .ok_or_else(|| CoreError::not_found(format!("skill not found: {id}")))?;
        Ok(&self.skills[&key])
    }
}
