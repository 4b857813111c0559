//! Per-launch Chrome user-data directories, named uniquely so concurrent
//! pool instances never fight over a `SingletonLock`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// RAII handle on a profile directory. Removes the directory on drop unless
/// [`into_path`](BrowserProfile::into_path) has handed ownership elsewhere —
/// the browser pool takes ownership this way so the directory outlives the
/// `BrowserProfile` value and is cleaned up by the pooled wrapper instead.
#[derive(Debug)]
pub struct BrowserProfile {
    path: PathBuf,
    cleanup_on_drop: bool,
}

impl BrowserProfile {
    fn new(path: PathBuf) -> Self {
        Self { path, cleanup_on_drop: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path and disables the `Drop` cleanup, transferring
    /// responsibility for removing the directory to the caller.
    pub fn into_path(mut self) -> PathBuf {
        self.cleanup_on_drop = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for BrowserProfile {
    fn drop(&mut self) {
        if self.cleanup_on_drop && self.path.exists() {
            debug!(path = %self.path.display(), "removing browser profile directory");
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove profile directory");
            }
        }
    }
}

/// Creates a fresh profile directory named `iwsa_chrome_<uuid>`.
pub fn create_unique_profile() -> Result<BrowserProfile> {
    create_unique_profile_with_prefix("iwsa_chrome")
}

/// Creates a fresh profile directory named `<prefix>_<uuid>`, so different
/// callers (the pool, a one-off session) can be told apart by directory name.
pub fn create_unique_profile_with_prefix(prefix: &str) -> Result<BrowserProfile> {
    let path = std::env::temp_dir().join(format!("{prefix}_{}", Uuid::new_v4()));

    // create_dir, not create_dir_all: fail loudly on a UUID collision rather
    // than silently reusing an existing directory.
    std::fs::create_dir(&path).with_context(|| format!("failed to create profile directory: {}", path.display()))?;
    info!(path = %path.display(), "created browser profile directory");
    Ok(BrowserProfile::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_profile_creates_and_cleans_up_directory() {
        let profile = create_unique_profile().unwrap();
        let path = profile.path().to_path_buf();
        assert!(path.exists());
        assert!(path.to_string_lossy().contains("iwsa_chrome_"));
        drop(profile);
        assert!(!path.exists());
    }

    #[test]
    fn into_path_disables_cleanup() {
        let profile = create_unique_profile_with_prefix("iwsa_chrome_test").unwrap();
        let path = profile.into_path();
        assert!(path.exists());
        std::fs::remove_dir_all(&path).unwrap();
    }

    #[test]
    fn prefix_is_reflected_in_directory_name() {
        let profile = create_unique_profile_with_prefix("iwsa_chrome_pool").unwrap();
        assert!(profile.path().to_string_lossy().contains("iwsa_chrome_pool_"));
    }
}
