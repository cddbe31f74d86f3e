//! Persistent stores for the `ndchunk` crate.
//!
//! - [`FilesystemStore`]: a directory where every key is a file.
//! - [`ContiguousFileStore`]: a single append-only file holding every key.
//!
//! ## Licence
//! `ndchunk_filesystem` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.

mod contiguous_store;
mod filesystem_store;

pub use contiguous_store::ContiguousFileStore;
pub use filesystem_store::FilesystemStore;

use std::path::{Path, PathBuf};

use thiserror::Error;

/// A filesystem store creation error.
#[derive(Debug, Error)]
pub enum FilesystemStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// The path is not valid on this system.
    #[error("base path {0} is not valid")]
    InvalidBasePath(PathBuf),
    /// The path already exists.
    #[error("path {0} already exists")]
    AlreadyExists(PathBuf),
    /// The path does not exist.
    #[error("path {0} does not exist")]
    NotFound(PathBuf),
    /// The path or its parent is not writable.
    #[error("path {0} is not writable")]
    ReadOnly(PathBuf),
    /// The file is not a valid contiguous store.
    #[error("{path} is not a valid contiguous store: {reason}")]
    InvalidFile {
        /// The path of the file.
        path: PathBuf,
        /// Why the file is invalid.
        reason: String,
    },
}

/// Check that a new store can be created at `path`.
///
/// Writability is checked by creating `path` (and any missing parents) as directories and removing
/// them again, so permissions held by other users are accounted for.
///
/// # Errors
/// Returns [`FilesystemStoreCreateError::AlreadyExists`] if `path` exists, or
/// [`FilesystemStoreCreateError::ReadOnly`] if it cannot be created in its nearest existing ancestor.
pub fn check_path_available(path: &Path) -> Result<(), FilesystemStoreCreateError> {
    if path.to_str().is_none() {
        return Err(FilesystemStoreCreateError::InvalidBasePath(path.to_path_buf()));
    }
    if path.symlink_metadata().is_ok() {
        return Err(FilesystemStoreCreateError::AlreadyExists(path.to_path_buf()));
    }
    let ancestor = path
        .ancestors()
        .skip(1)
        .find(|ancestor| ancestor.as_os_str().is_empty() || ancestor.exists())
        .unwrap_or(Path::new(""));
    match std::fs::create_dir_all(path) {
        Ok(()) => {
            for created in path.ancestors().take_while(|created| *created != ancestor) {
                std::fs::remove_dir(created)?;
            }
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(FilesystemStoreCreateError::ReadOnly(ancestor.to_path_buf()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Remove a file or directory (recursively) at `path`.
///
/// Succeeds if `path` does not exist.
///
/// # Errors
/// Returns an [`std::io::Error`] if the removal fails.
pub fn remove_path(path: &Path) -> std::io::Result<()> {
    let result = match path.symlink_metadata() {
        Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(err) => Err(err),
    };
    match result {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_available() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("array.nd");
        assert!(check_path_available(&path).is_ok());
        assert!(check_path_available(&path.join("nested/deeper")).is_ok());
        std::fs::write(&path, b"x").unwrap();
        assert!(matches!(
            check_path_available(&path),
            Err(FilesystemStoreCreateError::AlreadyExists(_))
        ));
        remove_path(&path).unwrap();
        assert!(check_path_available(&path).is_ok());
        remove_path(&path).unwrap();

        // the writability check leaves nothing behind
        assert!(check_path_available(&path.join("nested/deeper")).is_ok());
        assert!(!path.exists());

        std::fs::create_dir_all(path.join("a/b")).unwrap();
        std::fs::write(path.join("a/b/c"), b"x").unwrap();
        remove_path(&path).unwrap();
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn path_available_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        // writable by group and others, but not the owner
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o577)).unwrap();
        let result = check_path_available(&locked.join("array.nd"));
        let privileged = std::fs::create_dir(locked.join("scratch")).is_ok();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        if privileged {
            // permissions are not enforced for this user
            return;
        }
        assert!(matches!(
            result,
            Err(FilesystemStoreCreateError::ReadOnly(path)) if path == locked
        ));
        assert!(!locked.join("array.nd").exists());
    }
}
