//! File permission hardening for store files
//!
//! Store files can hold credential metadata, so on Unix the data directory is
//! created owner-only (0o700) and every store file is restricted to 0o600.
//! On other platforms these helpers only create directories.

use crate::error::{Error, Result};
use std::path::Path;

/// Restrict a store file to its owner (Unix: 0o600)
///
/// # Errors
///
/// Returns `Error::FileWrite` if the permissions cannot be changed.
#[cfg(unix)]
pub fn set_secure_file_permissions(path: &Path) -> Result<()> {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Restrict a data directory to its owner (Unix: 0o700)
///
/// # Errors
///
/// Returns `Error::FileWrite` if the permissions cannot be changed.
#[cfg(unix)]
pub fn set_secure_dir_permissions(path: &Path) -> Result<()> {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(|e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

/// No-op on Windows (permissions managed via ACLs)
#[cfg(not(unix))]
pub fn set_secure_file_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// No-op on Windows (permissions managed via ACLs)
#[cfg(not(unix))]
pub fn set_secure_dir_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Ensure a directory exists with secure permissions
///
/// Existing directories keep their permissions.
///
/// # Errors
///
/// Returns `Error::DirectoryCreate` if the directory cannot be created.
pub fn ensure_secure_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }

    crate::error::create_dir(path)?;
    set_secure_dir_permissions(path)
}
