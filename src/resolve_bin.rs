//! Executable lookup for allowlisted command names.
//!
//! Runs once per name while the registry is built, never per request.

use crate::error::RegistryError;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Resolve a command name to a canonical executable path.
///
/// Bare names are searched for in each directory of `search_path`
/// (colon-separated, empty entries skipped). Names containing `/` must be
/// absolute and are canonicalized directly.
///
/// # Errors
///
/// - `InvalidName` for empty, `.`, `..`, or NUL-containing names
/// - `NotAbsolute` for relative names containing `/`
/// - `NotFound` if no candidate exists
/// - `NotExecutable` if an explicit path is not an executable regular file
pub fn resolve_executable(name: &str, search_path: &str) -> Result<PathBuf, RegistryError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
        });
    }

    if name.contains('/') {
        let path = Path::new(name);
        if !path.is_absolute() {
            return Err(RegistryError::NotAbsolute {
                name: name.to_string(),
            });
        }
        let canonical = canonicalize(name, path)?;
        check_executable(&canonical)?;
        return Ok(canonical);
    }

    for dir in search_path.split(':').filter(|d| !d.is_empty()) {
        let dir = Path::new(dir);
        // Relative PATH entries would make resolution depend on the cwd
        if !dir.is_absolute() {
            continue;
        }
        let candidate = dir.join(name);
        let Ok(canonical) = std::fs::canonicalize(&candidate) else {
            continue;
        };
        if check_executable(&canonical).is_ok() {
            return Ok(canonical);
        }
    }

    Err(RegistryError::NotFound {
        name: name.to_string(),
    })
}

fn canonicalize(name: &str, path: &Path) -> Result<PathBuf, RegistryError> {
    std::fs::canonicalize(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RegistryError::NotFound {
            name: name.to_string(),
        },
        _ => RegistryError::ResolveFailed {
            name: name.to_string(),
            reason: e.to_string(),
        },
    })
}

/// Check that a canonical path is a regular file the current user may execute.
pub fn check_executable(path: &Path) -> Result<(), RegistryError> {
    let metadata = std::fs::metadata(path).map_err(|_| RegistryError::NotExecutable {
        path: path.to_path_buf(),
    })?;

    if !metadata.is_file() || !is_executable(&metadata) {
        return Err(RegistryError::NotExecutable {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn is_executable(metadata: &Metadata) -> bool {
    let mode = metadata.permissions().mode();

    let uid = unsafe { libc::getuid() };
    let gid = unsafe { libc::getgid() };

    if uid == 0 {
        return mode & 0o111 != 0;
    }
    if uid == metadata.uid() {
        return mode & 0o100 != 0;
    }
    if gid == metadata.gid() {
        return mode & 0o010 != 0;
    }
    mode & 0o001 != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", ".", "..", "ec\0ho"] {
            assert!(matches!(
                resolve_executable(name, "/bin"),
                Err(RegistryError::InvalidName { .. })
            ));
        }
    }

    #[test]
    fn test_relative_path_rejected() {
        assert!(matches!(
            resolve_executable("bin/echo", "/"),
            Err(RegistryError::NotAbsolute { .. })
        ));
        assert!(matches!(
            resolve_executable("./echo", "/bin"),
            Err(RegistryError::NotAbsolute { .. })
        ));
    }

    #[test]
    fn test_found_on_search_path() {
        let tmp = TempDir::new().unwrap();
        let tool = write_file(tmp.path(), "tool", 0o755);
        let search = format!("/nonexistent:{}", tmp.path().display());

        let resolved = resolve_executable("tool", &search).unwrap();
        assert_eq!(resolved, std::fs::canonicalize(tool).unwrap());
    }

    #[test]
    fn test_first_match_wins() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let first = write_file(a.path(), "tool", 0o755);
        write_file(b.path(), "tool", 0o755);
        let search = format!("{}:{}", a.path().display(), b.path().display());

        assert_eq!(
            resolve_executable("tool", &search).unwrap(),
            std::fs::canonicalize(first).unwrap()
        );
    }

    #[test]
    fn test_non_executable_skipped() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        write_file(a.path(), "tool", 0o644);
        let good = write_file(b.path(), "tool", 0o755);
        let search = format!("{}:{}", a.path().display(), b.path().display());

        // Root can execute anything with an x bit, but 0o644 has none
        assert_eq!(
            resolve_executable("tool", &search).unwrap(),
            std::fs::canonicalize(good).unwrap()
        );
    }

    #[test]
    fn test_relative_search_dirs_ignored() {
        assert!(matches!(
            resolve_executable("echo", "bin:."),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_not_found() {
        assert!(matches!(
            resolve_executable("definitely-not-a-command-xyz", "/bin:/usr/bin"),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_absolute_path_resolves_symlink() {
        let tmp = TempDir::new().unwrap();
        let real = write_file(tmp.path(), "real", 0o755);
        let link = tmp.path().join("link");
        symlink(&real, &link).unwrap();

        let resolved = resolve_executable(link.to_str().unwrap(), "").unwrap();
        assert_eq!(resolved, std::fs::canonicalize(real).unwrap());
    }

    #[test]
    fn test_directory_not_executable() {
        let tmp = TempDir::new().unwrap();
        let name = tmp.path().to_str().unwrap().to_string();
        assert!(matches!(
            resolve_executable(&name, ""),
            Err(RegistryError::NotExecutable { .. })
        ));
    }
}
