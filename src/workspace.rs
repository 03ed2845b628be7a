//! Resolve a rig-relative directory to the town root that owns shared state.

use std::path::{Path, PathBuf};

/// Relative path of the file that marks a town root.
pub const TOWN_MARKER: &str = "mayor/town.json";

/// Finds the supervision root for a working directory.
pub trait TownLocator {
    fn find_root(&self, dir: &Path) -> Option<PathBuf>;
}

/// Walks up from `dir` looking for [`TOWN_MARKER`], stopping at the user's
/// home directory.
#[derive(Debug, Clone, Default)]
pub struct MarkerLocator {
    stop_at: Option<PathBuf>,
}

impl MarkerLocator {
    pub fn new() -> Self {
        Self {
            stop_at: dirs::home_dir(),
        }
    }

    /// Locator that searches all the way to the filesystem root.
    pub const fn unbounded() -> Self {
        Self { stop_at: None }
    }
}

impl TownLocator for MarkerLocator {
    fn find_root(&self, dir: &Path) -> Option<PathBuf> {
        let start = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        for candidate in start.ancestors() {
            if candidate.join(TOWN_MARKER).is_file() {
                return Some(candidate.to_path_buf());
            }
            if self.stop_at.as_deref() == Some(candidate) {
                break;
            }
        }
        None
    }
}

/// Town root for `dir`, or `dir` itself when discovery fails.
pub fn resolve_root(locator: &dyn TownLocator, dir: &Path) -> PathBuf {
    locator.find_root(dir).unwrap_or_else(|| {
        tracing::debug!(dir = %dir.display(), "no town root found, using directory as root");
        dir.to_path_buf()
    })
}
