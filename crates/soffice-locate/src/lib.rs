//! # soffice-locate
//!
//! Find the LibreOffice `soffice` executable so a caller can run headless
//! conversions without hard-coding an install prefix.
//!
//! ## How it works
//!
//! On the first call to [`locate_soffice`]:
//!
//! 1. If `SOFFICE_PATH` is set, that file is used. An override that is
//!    missing, a directory or not executable is an error rather than a silent
//!    fall-through, so a typo in deployment configuration surfaces at startup.
//! 2. Otherwise every directory on `PATH` is searched for `soffice`, then
//!    `libreoffice`.
//! 3. Otherwise the platform's well-known install locations are checked.
//!
//! The first match wins and is cached for the lifetime of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! match soffice_locate::locate_soffice() {
//!     Ok(path) => println!("using {}", path.display()),
//!     Err(e) => eprintln!("local conversion disabled: {e}"),
//! }
//! ```
//!
//! ## Fallback locations
//!
//! | OS      | Location                                                   |
//! |---------|------------------------------------------------------------|
//! | macOS   | `/Applications/LibreOffice.app/Contents/MacOS/soffice`     |
//! | Linux   | `/usr/bin/soffice`, `/usr/lib/libreoffice/program/soffice`, `/opt/libreoffice/program/soffice`, `/snap/bin/libreoffice` |
//! | Windows | `C:\Program Files\LibreOffice\program\soffice.exe` (and the x86 variant) |

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable that pins the binary to an explicit path.
pub const SOFFICE_PATH_ENV: &str = "SOFFICE_PATH";

/// Executable names searched on `PATH`, in priority order.
pub const BINARY_NAMES: &[&str] = &["soffice", "libreoffice"];

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned while locating the office binary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    /// The explicit override is missing, a directory, or not executable.
    #[error("SOFFICE_PATH points to '{}', which is not an executable file", .path.display())]
    OverrideMissing { path: PathBuf },

    /// Nothing matched on `PATH` or in the fallback locations.
    #[error("LibreOffice soffice not found (searched PATH for {names} and {count} fallback locations)",
        names = BINARY_NAMES.join(", "),
        count = .searched.len())]
    NotFound { searched: Vec<PathBuf> },
}

// ── Platform fallbacks ───────────────────────────────────────────────────────

/// Well-known install locations for the current platform.
pub fn fallback_locations() -> Vec<PathBuf> {
    let candidates: &[&str] = match std::env::consts::OS {
        "macos" => &["/Applications/LibreOffice.app/Contents/MacOS/soffice"],
        "windows" => &[
            r"C:\Program Files\LibreOffice\program\soffice.exe",
            r"C:\Program Files (x86)\LibreOffice\program\soffice.exe",
        ],
        _ => &[
            "/usr/bin/soffice",
            "/usr/local/bin/soffice",
            "/usr/lib/libreoffice/program/soffice",
            "/opt/libreoffice/program/soffice",
            "/snap/bin/libreoffice",
        ],
    };
    candidates.iter().map(PathBuf::from).collect()
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Locate `soffice` from the process environment.
///
/// Successful lookups are cached; failures are not, so a binary installed
/// after a failed lookup is picked up on the next call.
pub fn locate_soffice() -> Result<PathBuf, LocateError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let override_path = std::env::var_os(SOFFICE_PATH_ENV);
    let path_var = std::env::var_os("PATH");
    let path = resolve_from(
        override_path.as_deref(),
        path_var.as_deref(),
        &fallback_locations(),
    )?;

    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Resolve the binary from explicit inputs instead of the live environment.
///
/// An empty override is treated as unset.
pub fn resolve_from(
    override_path: Option<&OsStr>,
    path_var: Option<&OsStr>,
    fallbacks: &[PathBuf],
) -> Result<PathBuf, LocateError> {
    // 1. Explicit override.
    if let Some(raw) = override_path.filter(|p| !p.is_empty()) {
        let path = PathBuf::from(raw);
        if is_executable(&path) {
            return Ok(path);
        }
        return Err(LocateError::OverrideMissing { path });
    }

    // 2. PATH search.
    if let Some(path_var) = path_var {
        for name in BINARY_NAMES {
            if let Some(found) = search_path(name, path_var) {
                return Ok(found);
            }
        }
    }

    // 3. Fixed install locations.
    if let Some(found) = fallbacks.iter().find(|p| is_executable(p)) {
        return Ok(found.clone());
    }

    Err(LocateError::NotFound {
        searched: fallbacks.to_vec(),
    })
}

/// Search every directory of a `PATH`-style value for `name`.
pub fn search_path(name: &str, path_var: &OsStr) -> Option<PathBuf> {
    let file_name: OsString = format!("{name}{}", std::env::consts::EXE_SUFFIX).into();
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(&file_name))
        .find(|candidate| is_executable(candidate))
}

/// Returns `true` if `path` is a regular file the current user may execute.
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_binary(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(format!("{name}{}", std::env::consts::EXE_SUFFIX));
        std::fs::write(&path, b"#!/bin/sh\nexit 0\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    #[test]
    fn override_wins_over_path() {
        let dir = TempDir::new().unwrap();
        let pinned = fake_binary(dir.path(), "pinned-soffice");
        let on_path = TempDir::new().unwrap();
        fake_binary(on_path.path(), "soffice");

        let found = resolve_from(
            Some(pinned.as_os_str()),
            Some(on_path.path().as_os_str()),
            &[],
        )
        .unwrap();
        assert_eq!(found, pinned);
    }

    #[test]
    fn missing_override_is_an_error() {
        let err = resolve_from(Some(OsStr::new("/nonexistent/soffice")), None, &[]).unwrap_err();
        assert_eq!(
            err,
            LocateError::OverrideMissing {
                path: PathBuf::from("/nonexistent/soffice")
            }
        );
        assert!(err.to_string().contains(SOFFICE_PATH_ENV));
    }

    #[test]
    fn directory_override_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = resolve_from(Some(dir.path().as_os_str()), None, &[]).unwrap_err();
        assert_eq!(
            err,
            LocateError::OverrideMissing {
                path: dir.path().to_path_buf()
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_override_is_an_error() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("soffice");
        std::fs::write(&path, b"not a program").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let on_path = TempDir::new().unwrap();
        fake_binary(on_path.path(), "soffice");
        let err = resolve_from(
            Some(path.as_os_str()),
            Some(on_path.path().as_os_str()),
            &[],
        )
        .unwrap_err();
        assert_eq!(err, LocateError::OverrideMissing { path });
    }

    #[test]
    fn empty_override_is_ignored() {
        let on_path = TempDir::new().unwrap();
        let expected = fake_binary(on_path.path(), "soffice");
        let found =
            resolve_from(Some(OsStr::new("")), Some(on_path.path().as_os_str()), &[]).unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn path_search_prefers_soffice_over_libreoffice() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fake_binary(first.path(), "libreoffice");
        let expected = fake_binary(second.path(), "soffice");

        let joined = std::env::join_paths([first.path(), second.path()]).unwrap();
        let found = resolve_from(None, Some(joined.as_os_str()), &[]).unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn fallback_used_when_path_is_empty() {
        let dir = TempDir::new().unwrap();
        let fallback = fake_binary(dir.path(), "soffice-fallback");
        let found = resolve_from(
            None,
            Some(OsStr::new("")),
            &[dir.path().join("missing"), fallback.clone()],
        )
        .unwrap();
        assert_eq!(found, fallback);
    }

    #[test]
    fn not_found_lists_fallbacks() {
        let dir = TempDir::new().unwrap();
        let missing = vec![dir.path().join("a"), dir.path().join("b")];
        let err = resolve_from(None, None, &missing).unwrap_err();
        assert_eq!(err, LocateError::NotFound { searched: missing });
        assert!(err.to_string().contains("2 fallback locations"));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_files_are_skipped() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("soffice");
        std::fs::write(&path, b"not a program").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(!is_executable(&path));
        assert!(search_path("soffice", dir.path().as_os_str()).is_none());
    }

    #[test]
    fn fallback_locations_nonempty() {
        assert!(!fallback_locations().is_empty());
    }
}
