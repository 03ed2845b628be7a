//! Worker identity allocation.
//!
//! Workers run under short names drawn from a themed list. Themed names are
//! reused once released; when the list is exhausted the pool hands out
//! numbered overflow names, which are never reused.
//!
//! Only the overflow counter is durable. Which themed names are in use is
//! always rebuilt from the live worker set via [`NamePool::reconcile`].

pub mod catalog;
pub mod themes;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::config::NamePoolConfig;
use crate::lockfile::{LockGuard, lock_path_for, write_atomic};

/// Themed names considered before switching to overflow numbering.
pub const DEFAULT_MAX_SIZE: usize = 50;

/// Pool state location relative to the rig root.
pub const STATE_FILE: &str = ".runtime/namepool-state.json";

/// Theme label used when names come from rig config instead of a catalog.
pub const CUSTOM_THEME: &str = "custom";

#[derive(Debug, thiserror::Error)]
pub enum NamePoolError {
    #[error("unknown theme {0:?}")]
    UnknownTheme(String),

    #[error("theme {0:?} has no usable names")]
    EmptyTheme(String),

    #[error("theme {theme:?} catalog has {lines} lines (max {max})")]
    CatalogTooLarge {
        theme: String,
        lines: usize,
        max: usize,
    },

    #[error("name pool I/O on {}: {source}", path.display())]
    Io {
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
}

/// What gets written to disk. In-use names are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PersistedPool {
    rig_name: String,
    overflow_next: u32,
    max_size: usize,
}

#[derive(Debug)]
struct PoolState {
    rig_name: String,
    theme: String,
    custom_names: Vec<String>,
    names: Vec<String>,
    in_use: HashSet<String>,
    overflow_next: u32,
    max_size: usize,
}

impl PoolState {
    /// Themed names eligible for allocation.
    fn candidates(&self) -> &[String] {
        &self.names[..self.names.len().min(self.max_size)]
    }

    fn is_themed(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn overflow_floor(&self) -> u32 {
        u32::try_from(self.max_size).map_or(u32::MAX, |m| m.saturating_add(1))
    }
}

#[derive(Debug)]
pub struct NamePool {
    rig_root: PathBuf,
    state: RwLock<PoolState>,
}

/// Snapshot of pool state for display.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub rig_name: String,
    pub theme: String,
    pub max_size: usize,
    pub overflow_next: u32,
    pub in_use: Vec<String>,
    pub available: Vec<String>,
}

impl NamePool {
    /// Pool using the rig's deterministic default theme.
    pub fn new(rig_root: &Path, rig_name: &str, max_size: usize) -> Self {
        let theme = themes::theme_for_rig(rig_name);
        let names = themes::builtin_theme(theme).unwrap_or_default();
        Self::build(rig_root, rig_name, theme, Vec::new(), names, max_size)
    }

    /// Pool drawing from an inline list of names (rig config `names`).
    ///
    /// Inline names follow the catalog rules, so numbered names can never
    /// shadow the overflow sequence.
    pub fn with_names<S: AsRef<str>>(
        rig_root: &Path,
        rig_name: &str,
        names: &[S],
        max_size: usize,
    ) -> Result<Self, NamePoolError> {
        let custom = catalog::normalize_names(CUSTOM_THEME, names.iter().map(|n| n.as_ref()))?;
        Ok(Self::build(
            rig_root,
            rig_name,
            CUSTOM_THEME,
            custom.clone(),
            custom,
            max_size,
        ))
    }

    fn build(
        rig_root: &Path,
        rig_name: &str,
        theme: &str,
        custom_names: Vec<String>,
        names: Vec<String>,
        max_size: usize,
    ) -> Self {
        let mut state = PoolState {
            rig_name: rig_name.to_string(),
            theme: theme.to_string(),
            custom_names,
            names,
            in_use: HashSet::new(),
            overflow_next: 0,
            max_size,
        };
        state.overflow_next = state.overflow_floor();
        Self {
            rig_root: rig_root.to_path_buf(),
            state: RwLock::new(state),
        }
    }

    /// Build a pool from rig config and load its durable state, if any.
    pub fn open(
        rig_root: &Path,
        rig_name: &str,
        config: &NamePoolConfig,
    ) -> Result<Self, NamePoolError> {
        let max_size = config.max_before_numbering;
        let pool = if config.names.is_empty() {
            let pool = Self::new(rig_root, rig_name, max_size);
            if let Some(style) = &config.style {
                pool.set_theme(style)?;
            }
            pool
        } else {
            Self::with_names(rig_root, rig_name, &config.names, max_size)?
        };
        pool.load()?;
        Ok(pool)
    }

    pub fn state_path(&self) -> PathBuf {
        self.rig_root.join(STATE_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        lock_path_for(&self.state_path())
    }

    /// Reload durable state, run `f`, and save, all under the rig's file lock.
    ///
    /// Other processes sharing the rig see each other's overflow numbers.
    /// If the lock cannot be taken the cycle still runs, unsynchronized.
    pub fn update<T>(&self, f: impl FnOnce(&Self) -> T) -> Result<T, NamePoolError> {
        let lock_path = self.lock_path();
        let _lock = match LockGuard::acquire(&lock_path) {
            Ok(lock) => Some(lock),
            Err(err) => {
                tracing::warn!(path = %lock_path.display(), error = %err, "proceeding without name pool lock");
                None
            }
        };
        self.load()?;
        let value = f(self);
        self.save()?;
        Ok(value)
    }

    fn read(&self) -> RwLockReadGuard<'_, PoolState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PoolState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand out the first free themed name, or the next overflow number.
    pub fn allocate(&self) -> String {
        let mut state = self.write();
        let free = state
            .candidates()
            .iter()
            .find(|n| !state.in_use.contains(*n) && !themes::is_reserved(n))
            .cloned();
        let name = if let Some(name) = free {
            state.in_use.insert(name.clone());
            name
        } else {
            let floor = state.overflow_floor();
            let number = state.overflow_next.max(floor);
            state.overflow_next = number.saturating_add(1);
            number.to_string()
        };
        tracing::debug!(rig = %state.rig_name, name, "allocated worker name");
        name
    }

    /// Return a themed name to the pool. Overflow and foreign names are ignored.
    pub fn release(&self, name: &str) {
        let mut state = self.write();
        if state.is_themed(name) && state.in_use.remove(name) {
            tracing::debug!(rig = %state.rig_name, name, "released worker name");
        }
    }

    /// Reset in-use tracking to the themed names among `live_names`.
    pub fn reconcile<S: AsRef<str>>(&self, live_names: &[S]) {
        let mut state = self.write();
        let in_use: HashSet<String> = live_names
            .iter()
            .map(|n| n.as_ref())
            .filter(|n| state.is_themed(n))
            .map(str::to_string)
            .collect();
        tracing::debug!(rig = %state.rig_name, in_use = in_use.len(), "reconciled name pool");
        state.in_use = in_use;
    }

    /// Switch to a built-in theme or a custom catalog under the rig's settings.
    pub fn set_theme(&self, theme: &str) -> Result<(), NamePoolError> {
        let names = match themes::builtin_theme(theme) {
            Some(names) => names,
            None => catalog::load_catalog(&self.rig_root, theme)?
                .ok_or_else(|| NamePoolError::UnknownTheme(theme.to_string()))?,
        };

        let mut state = self.write();
        state.in_use.retain(|n| names.contains(n));
        state.names = names;
        state.custom_names.clear();
        state.theme = theme.to_string();
        tracing::info!(rig = %state.rig_name, theme, "name pool theme set");
        Ok(())
    }

    /// Load the durable overflow counter. A missing file leaves defaults.
    pub fn load(&self) -> Result<(), NamePoolError> {
        let path = self.state_path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(NamePoolError::Io { path, source }),
        };
        let persisted: PersistedPool = serde_json::from_str(&contents)
            .map_err(|source| NamePoolError::Parse { path, source })?;

        let mut state = self.write();
        let floor = state.overflow_floor();
        state.overflow_next = persisted.overflow_next.max(state.overflow_next).max(floor);
        Ok(())
    }

    /// Persist the durable fields. In-use names are never written.
    pub fn save(&self) -> Result<(), NamePoolError> {
        let path = self.state_path();
        let persisted = {
            let state = self.read();
            PersistedPool {
                rig_name: state.rig_name.clone(),
                overflow_next: state.overflow_next,
                max_size: state.max_size,
            }
        };
        let json = serde_json::to_string_pretty(&persisted)
            .map_err(|source| NamePoolError::Parse { path: path.clone(), source })?;
        write_atomic(&path, json.as_bytes()).map_err(|source| NamePoolError::Io { path, source })
    }

    pub fn theme(&self) -> String {
        self.read().theme.clone()
    }

    pub fn rig_name(&self) -> String {
        self.read().rig_name.clone()
    }

    pub fn max_size(&self) -> usize {
        self.read().max_size
    }

    pub fn overflow_next(&self) -> u32 {
        self.read().overflow_next
    }

    /// Names of the active theme in declared order.
    pub fn active_names(&self) -> Vec<String> {
        self.read().names.clone()
    }

    /// Inline names from rig config; empty when a catalog theme is active.
    pub fn custom_names(&self) -> Vec<String> {
        self.read().custom_names.clone()
    }

    /// In-use themed names, sorted.
    pub fn in_use(&self) -> Vec<String> {
        let mut names: Vec<_> = self.read().in_use.iter().cloned().collect();
        names.sort();
        names
    }

    pub fn is_in_use(&self, name: &str) -> bool {
        self.read().in_use.contains(name)
    }

    /// Built-in themes plus custom catalogs found for this rig.
    pub fn available_themes(&self) -> Vec<String> {
        let mut all: Vec<String> = themes::builtin_theme_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        for custom in catalog::list_custom_themes(&self.rig_root) {
            if !all.contains(&custom) {
                all.push(custom);
            }
        }
        all
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.read();
        let mut in_use: Vec<_> = state.in_use.iter().cloned().collect();
        in_use.sort();
        let available = state
            .candidates()
            .iter()
            .filter(|n| !state.in_use.contains(*n))
            .cloned()
            .collect();
        PoolStatus {
            rig_name: state.rig_name.clone(),
            theme: state.theme.clone(),
            max_size: state.max_size,
            overflow_next: state.overflow_next,
            in_use,
            available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namepool::catalog::{THEMES_DIR, catalog_path};

    fn small_pool(dir: &Path) -> NamePool {
        NamePool::with_names(dir, "gastown", &["alpha", "bravo", "charlie"], 3).unwrap()
    }

    #[test]
    fn exhaustion_then_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let pool = small_pool(dir.path());
        assert_eq!(pool.overflow_next(), 4);

        let got: Vec<_> = (0..4).map(|_| pool.allocate()).collect();
        assert_eq!(got, vec!["alpha", "bravo", "charlie", "4"]);

        pool.release("alpha");
        assert_eq!(pool.allocate(), "alpha");

        pool.release("4");
        assert_eq!(pool.allocate(), "5");
    }

    #[test]
    fn max_size_caps_themed_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let pool = NamePool::with_names(dir.path(), "r", &["alpha", "bravo", "charlie"], 2).unwrap();
        assert_eq!(pool.allocate(), "alpha");
        assert_eq!(pool.allocate(), "bravo");
        assert_eq!(pool.allocate(), "3");
    }

    #[test]
    fn reserved_names_never_allocated_from_builtins() {
        let dir = tempfile::tempdir().unwrap();
        for theme in themes::builtin_theme_names() {
            let pool = NamePool::new(dir.path(), "gastown", DEFAULT_MAX_SIZE);
            pool.set_theme(theme).unwrap();
            for _ in 0..100 {
                let name = pool.allocate();
                assert!(!themes::is_reserved(&name), "{theme} allocated reserved {name}");
            }
        }
    }

    #[test]
    fn reserved_names_stripped_from_inline_list() {
        let dir = tempfile::tempdir().unwrap();
        let pool = NamePool::with_names(dir.path(), "r", &["witness", "delta", "Delta"], 5).unwrap();
        assert_eq!(pool.active_names(), vec!["delta"]);
        assert_eq!(pool.allocate(), "delta");
        assert_eq!(pool.allocate(), "6");
    }

    #[test]
    fn numeric_inline_names_cannot_collide_with_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let pool = NamePool::with_names(dir.path(), "r", &["alpha", "bravo", "4"], 3).unwrap();
        assert_eq!(pool.active_names(), vec!["alpha", "bravo"]);

        let got: Vec<_> = (0..4).map(|_| pool.allocate()).collect();
        assert_eq!(got, vec!["alpha", "bravo", "4", "5"]);
    }

    #[test]
    fn inline_names_with_nothing_usable_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            NamePool::with_names(dir.path(), "r", &["4", "abc", "mayor"], 3),
            Err(NamePoolError::EmptyTheme(_))
        ));

        let config = NamePoolConfig {
            style: None,
            names: vec!["12".into(), "witness".into()],
            max_before_numbering: 3,
        };
        assert!(matches!(
            NamePool::open(dir.path(), "r", &config),
            Err(NamePoolError::EmptyTheme(_))
        ));
    }

    #[test]
    fn handles_sharing_a_rig_never_repeat_overflow_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let a = small_pool(dir.path());
        let b = small_pool(dir.path());
        for pool in [&a, &b] {
            pool.reconcile(&["alpha", "bravo", "charlie"]);
        }

        assert_eq!(a.update(NamePool::allocate).unwrap(), "4");
        assert_eq!(b.update(NamePool::allocate).unwrap(), "5");
        assert_eq!(a.update(NamePool::allocate).unwrap(), "6");

        let reopened = small_pool(dir.path());
        reopened.load().unwrap();
        assert_eq!(reopened.overflow_next(), 7);
        assert!(a.lock_path().exists());
    }

    #[test]
    fn concurrent_updates_hand_out_distinct_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let root = root.clone();
                std::thread::spawn(move || {
                    let pool = NamePool::with_names(&root, "gastown", &["alpha"], 1).unwrap();
                    pool.reconcile(&["alpha"]);
                    (0..5)
                        .map(|_| pool.update(NamePool::allocate).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .map(|n| n.parse().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (2..32).collect::<Vec<u32>>());
    }

    #[test]
    fn release_ignores_foreign_names() {
        let dir = tempfile::tempdir().unwrap();
        let pool = small_pool(dir.path());
        pool.allocate();
        pool.release("zulu");
        pool.release("");
        assert_eq!(pool.in_use(), vec!["alpha"]);
    }

    #[test]
    fn reconcile_keeps_only_live_themed_names() {
        let dir = tempfile::tempdir().unwrap();
        let pool = small_pool(dir.path());
        pool.allocate();
        pool.allocate();

        pool.reconcile(&["bravo", "17", "stranger"]);
        assert_eq!(pool.in_use(), vec!["bravo"]);
        assert_eq!(pool.allocate(), "alpha");
        assert_eq!(pool.allocate(), "charlie");
    }

    #[test]
    fn set_theme_carries_overlapping_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(THEMES_DIR)).unwrap();
        std::fs::write(catalog_path(dir.path(), "mixed"), "bravo\necho\n").unwrap();

        let pool = small_pool(dir.path());
        pool.allocate();
        pool.allocate();
        pool.set_theme("mixed").unwrap();

        assert_eq!(pool.theme(), "mixed");
        assert_eq!(pool.in_use(), vec!["bravo"]);
        assert!(pool.custom_names().is_empty());
        assert_eq!(pool.allocate(), "echo");
    }

    #[test]
    fn set_theme_errors() {
        let dir = tempfile::tempdir().unwrap();
        let pool = small_pool(dir.path());
        assert!(matches!(pool.set_theme("nope"), Err(NamePoolError::UnknownTheme(_))));

        std::fs::create_dir_all(dir.path().join(THEMES_DIR)).unwrap();
        std::fs::write(catalog_path(dir.path(), "blank"), "# only comments\n").unwrap();
        assert!(matches!(pool.set_theme("blank"), Err(NamePoolError::EmptyTheme(_))));
        assert_eq!(pool.theme(), CUSTOM_THEME);
    }

    #[test]
    fn default_theme_comes_from_rig_name() {
        let dir = tempfile::tempdir().unwrap();
        let a = NamePool::new(dir.path(), "gastown", DEFAULT_MAX_SIZE);
        let b = NamePool::new(dir.path(), "gastown", DEFAULT_MAX_SIZE);
        assert_eq!(a.theme(), b.theme());
        assert_eq!(a.theme(), themes::theme_for_rig("gastown"));
    }

    #[test]
    fn overflow_counter_survives_restart_but_in_use_does_not() {
        let dir = tempfile::tempdir().unwrap();
        let pool = small_pool(dir.path());
        for _ in 0..5 {
            pool.allocate();
        }
        assert_eq!(pool.overflow_next(), 6);
        pool.save().unwrap();

        let raw = std::fs::read_to_string(pool.state_path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["overflow_next"], 6);
        assert_eq!(json["max_size"], 3);
        assert_eq!(json["rig_name"], "gastown");
        assert!(json.get("in_use").is_none());

        let reopened = small_pool(dir.path());
        reopened.load().unwrap();
        assert_eq!(reopened.overflow_next(), 6);
        assert!(reopened.in_use().is_empty());
        reopened.reconcile(&["alpha", "bravo", "charlie"]);
        assert_eq!(reopened.allocate(), "6");
    }

    #[test]
    fn load_clamps_stale_counter_to_floor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".runtime")).unwrap();
        std::fs::write(
            dir.path().join(STATE_FILE),
            r#"{"rig_name":"gastown","overflow_next":2,"max_size":1}"#,
        )
        .unwrap();
        let pool = small_pool(dir.path());
        pool.load().unwrap();
        assert_eq!(pool.overflow_next(), 4);
    }

    #[test]
    fn open_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = NamePoolConfig {
            style: Some("minerals".into()),
            names: Vec::new(),
            max_before_numbering: 2,
        };
        let pool = NamePool::open(dir.path(), "gastown", &config).unwrap();
        assert_eq!(pool.theme(), "minerals");
        assert_eq!(pool.allocate(), "obsidian");
        assert_eq!(pool.allocate(), "quartz");
        assert_eq!(pool.allocate(), "3");

        let bad = NamePoolConfig {
            style: Some("nope".into()),
            ..config
        };
        assert!(matches!(
            NamePool::open(dir.path(), "gastown", &bad),
            Err(NamePoolError::UnknownTheme(_))
        ));
    }

    #[test]
    fn status_lists_available_names() {
        let dir = tempfile::tempdir().unwrap();
        let pool = small_pool(dir.path());
        pool.allocate();
        let status = pool.status();
        assert_eq!(status.in_use, vec!["alpha"]);
        assert_eq!(status.available, vec!["bravo", "charlie"]);
        assert_eq!(status.theme, CUSTOM_THEME);
    }
}
