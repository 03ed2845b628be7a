//! Respawn circuit breaker.
//!
//! Counts how many times each bead has been re-dispatched and blocks further
//! respawns once the count reaches [`RESPAWN_THRESHOLD`]. Counts live in one
//! JSON file per town root, shared by every witness process in the town.
//!
//! Every operation is a single load-modify-save cycle under an in-process
//! mutex plus an advisory lock on a sibling `.lock` file. Lock and disk
//! failures never fail the operation: the in-memory answer is returned in an
//! [`Outcome`] together with the error as a warning.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lockfile::{LockGuard, lock_path_for, write_atomic};
use crate::workspace::{TownLocator, resolve_root};

/// Respawns allowed before a bead is blocked.
pub const RESPAWN_THRESHOLD: u32 = 3;

/// State file location relative to the town root.
pub const STATE_FILE: &str = ".runtime/bead-respawns.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeadRespawnRecord {
    pub bead_id: String,
    pub count: u32,
    pub last_respawn: DateTime<Utc>,
}

impl BeadRespawnRecord {
    pub const fn is_blocked(&self) -> bool {
        self.count >= RESPAWN_THRESHOLD
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeadRespawnState {
    #[serde(default)]
    pub beads: BTreeMap<String, BeadRespawnRecord>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl BeadRespawnState {
    pub fn count(&self, bead_id: &str) -> u32 {
        self.beads.get(bead_id).map_or(0, |r| r.count)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize respawn state: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl StateError {
    fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result of a best-effort persisted operation: always a value, maybe a warning.
#[derive(Debug)]
#[must_use]
pub struct Outcome<T> {
    pub value: T,
    pub warning: Option<StateError>,
}

impl<T> Outcome<T> {
    const fn new(value: T, warning: Option<StateError>) -> Self {
        Self { value, warning }
    }

    /// Log any warning and return the value.
    pub fn logged(self, operation: &str, bead_id: &str) -> T {
        if let Some(err) = &self.warning {
            tracing::warn!(operation, bead_id, error = %err, "respawn state not persisted");
        }
        self.value
    }
}

/// Handle on one town's respawn state file.
#[derive(Debug)]
pub struct RespawnStore {
    state_path: PathBuf,
    lock_path: PathBuf,
    guard: Mutex<()>,
}

impl RespawnStore {
    /// Store rooted directly at `root`.
    pub fn new(root: &Path) -> Self {
        let state_path = root.join(STATE_FILE);
        Self {
            lock_path: lock_path_for(&state_path),
            state_path,
            guard: Mutex::new(()),
        }
    }

    /// Store for the town that contains `workdir`.
    pub fn for_workdir(locator: &dyn TownLocator, workdir: &Path) -> Self {
        Self::new(&resolve_root(locator, workdir))
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// True when the bead has been respawned [`RESPAWN_THRESHOLD`] times or more.
    pub fn should_block(&self, bead_id: &str) -> Outcome<bool> {
        self.with_state(false, |state| state.count(bead_id) >= RESPAWN_THRESHOLD)
    }

    /// Bump the bead's respawn count and return the new value.
    pub fn record_respawn(&self, bead_id: &str) -> Outcome<u32> {
        self.with_state(true, |state| {
            let now = Utc::now();
            let record = state
                .beads
                .entry(bead_id.to_string())
                .or_insert_with(|| BeadRespawnRecord {
                    bead_id: bead_id.to_string(),
                    count: 0,
                    last_respawn: now,
                });
            record.count = record.count.saturating_add(1);
            record.last_respawn = now;
            if record.count >= RESPAWN_THRESHOLD {
                tracing::warn!(bead_id, count = record.count, "bead reached respawn threshold");
            } else {
                tracing::debug!(bead_id, count = record.count, "recorded respawn");
            }
            record.count
        })
    }

    /// Forget a bead's history. Returns whether a record existed.
    pub fn reset(&self, bead_id: &str) -> Outcome<bool> {
        self.with_state(true, |state| {
            let existed = state.beads.remove(bead_id).is_some();
            if existed {
                tracing::info!(bead_id, "reset respawn count");
            }
            existed
        })
    }

    /// Full persisted state, for operator display.
    pub fn snapshot(&self) -> Outcome<BeadRespawnState> {
        self.with_state(false, |state| state.clone())
    }

    fn with_state<T>(
        &self,
        write: bool,
        f: impl FnOnce(&mut BeadRespawnState) -> T,
    ) -> Outcome<T> {
        let _in_process = self.guard.lock().unwrap_or_else(PoisonError::into_inner);

        let mut warning = None;
        let _file_lock = match self.acquire_lock() {
            Ok(lock) => Some(lock),
            Err(err) => {
                tracing::warn!(error = %err, "proceeding without respawn state file lock");
                None
            }
        };

        let mut state = match self.load() {
            Ok(state) => state,
            Err(err) => {
                warning = Some(err);
                BeadRespawnState::default()
            }
        };

        let value = f(&mut state);

        if write {
            state.last_updated = Some(Utc::now());
            if let Err(err) = self.save(&state) {
                warning.get_or_insert(err);
            }
        }

        Outcome::new(value, warning)
    }

    fn acquire_lock(&self) -> Result<LockGuard, StateError> {
        LockGuard::acquire(&self.lock_path)
            .map_err(|e| StateError::io("failed to lock", &self.lock_path, e))
    }

    fn load(&self) -> Result<BeadRespawnState, StateError> {
        let contents = match fs::read_to_string(&self.state_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BeadRespawnState::default()),
            Err(e) => return Err(StateError::io("failed to read", &self.state_path, e)),
        };
        if contents.trim().is_empty() {
            return Ok(BeadRespawnState::default());
        }
        serde_json::from_str(&contents).map_err(|source| StateError::Parse {
            path: self.state_path.clone(),
            source,
        })
    }

    fn save(&self, state: &BeadRespawnState) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(state).map_err(StateError::Serialize)?;
        write_atomic(&self.state_path, json.as_bytes())
            .map_err(|e| StateError::io("failed to write", &self.state_path, e))
    }
}
