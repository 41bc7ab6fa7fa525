//! Startup check for the external data location.
//!
//! Data must live outside the application's own tree so that redeploying or
//! cleaning the application directory cannot touch it. The check runs once,
//! before the pool is created, and fails startup with a configuration error.

use crate::error::{StoreError, StoreResult};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

pub struct LocationGuard;

impl LocationGuard {
    /// Verify that `data_dir` is configured and not inside `app_root`.
    ///
    /// Relative paths are resolved against `app_root`. A missing directory only
    /// logs a warning. Returns the resolved data directory.
    pub fn check(data_dir: Option<&Path>, app_root: &Path) -> StoreResult<PathBuf> {
        let data_dir = data_dir.filter(|p| !p.as_os_str().is_empty()).ok_or_else(|| {
            StoreError::configuration(
                "DB_DATA_PATH is not set; configure a data directory outside the application",
            )
        })?;

        let app_root = absolute(app_root)?;
        let resolved = normalize_path(&app_root.join(data_dir));

        if is_within(&resolved, &app_root) {
            return Err(StoreError::configuration(format!(
                "Data directory {} is inside the application directory {}",
                resolved.display(),
                app_root.display()
            )));
        }

        // Symlinks can point back into the tree even when the lexical path does not
        if let (Ok(real_data), Ok(real_root)) = (resolved.canonicalize(), app_root.canonicalize()) {
            if is_within(&real_data, &real_root) {
                return Err(StoreError::configuration(format!(
                    "Data directory {} resolves to {}, inside the application directory {}",
                    resolved.display(),
                    real_data.display(),
                    real_root.display()
                )));
            }
        }

        if !resolved.exists() {
            warn!(
                data_dir = %resolved.display(),
                "Data directory does not exist"
            );
        }

        info!(data_dir = %resolved.display(), "Data directory outside the application tree");
        Ok(resolved)
    }

    /// Same as [`check`](Self::check) with the process working directory as the application root.
    pub fn check_current_dir(data_dir: Option<&Path>) -> StoreResult<PathBuf> {
        let cwd = std::env::current_dir().map_err(|e| {
            StoreError::configuration(format!("Cannot determine working directory: {}", e))
        })?;
        Self::check(data_dir, &cwd)
    }
}

fn absolute(path: &Path) -> StoreResult<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize_path(path));
    }
    let cwd = std::env::current_dir().map_err(|e| {
        StoreError::configuration(format!("Cannot determine working directory: {}", e))
    })?;
    Ok(normalize_path(&cwd.join(path)))
}

/// Component-wise containment; `/app-data` is not inside `/app`.
fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `/..` is `/`
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}
