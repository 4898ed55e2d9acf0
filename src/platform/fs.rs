//! Filesystem helpers used by the privileged setup sequence: symbolic
//! permission parsing, interrupt-safe chmod, and recursive directory
//! creation with optional ownership assignment.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Uid, chown};

use crate::core::errors::{Result, TaError};

/// Parse a symbolic permission spec such as `u=rwx,g=rx,o=rx` into mode bits.
///
/// Recognized classes are `u`, `g` and `o`; recognized permissions are
/// `r`, `w`, `x`, plus `s` (setuid/setgid) for `u`/`g` and `t` (sticky)
/// for `o`. An empty permission list (`g=`) is valid.
pub fn parse_mode_string(spec: &str) -> Result<u32> {
    let invalid = |details: String| TaError::InvalidConfig { details };
    let mut mode = 0u32;
    for clause in spec.split(',') {
        let Some((who, perms)) = clause.split_once('=') else {
            return Err(invalid(format!(
                "permission clause {clause:?} in {spec:?} is missing '='"
            )));
        };
        let (read, write, exec, special) = match who {
            "u" => (0o400, 0o200, 0o100, 0o4000),
            "g" => (0o040, 0o020, 0o010, 0o2000),
            "o" => (0o004, 0o002, 0o001, 0o1000),
            _ => {
                return Err(invalid(format!(
                    "unknown permission class {who:?} in {spec:?}"
                )));
            }
        };
        for ch in perms.chars() {
            mode |= match ch {
                'r' => read,
                'w' => write,
                'x' => exec,
                's' if who != "o" => special,
                't' if who == "o" => special,
                _ => {
                    return Err(invalid(format!(
                        "unknown permission {ch:?} for class {who:?} in {spec:?}"
                    )));
                }
            };
        }
    }
    Ok(mode)
}

/// chmod that transparently retries on interrupted-syscall conditions.
pub fn chmod_retrying(path: &Path, mode: u32) -> io::Result<()> {
    loop {
        match fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            other => return other,
        }
    }
}

/// Create `path` and any missing ancestors with the given mode, assigning
/// ownership of each directory this call creates when `owner` is given.
///
/// There is an accepted TOCTOU window between the existence check and the
/// creation of each component; a concurrent `AlreadyExists` is tolerated.
pub fn make_dir_tree(path: &Path, mode: u32, owner: Option<(Uid, Gid)>) -> Result<()> {
    let dir_error = |path: &Path, source: io::Error| TaError::DirCreate {
        path: path.to_path_buf(),
        source,
    };

    let mut missing: Vec<PathBuf> = Vec::new();
    let mut cursor = path;
    while !cursor.exists() {
        missing.push(cursor.to_path_buf());
        match cursor.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => cursor = parent,
            _ => break,
        }
    }

    for dir in missing.iter().rev() {
        match fs::create_dir(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(dir_error(dir, e)),
        }
        // create_dir honors the umask, so apply the requested mode explicitly.
        chmod_retrying(dir, mode).map_err(|e| dir_error(dir, e))?;
        if let Some((uid, gid)) = owner {
            chown(dir.as_path(), Some(uid), Some(gid))
                .map_err(|errno| dir_error(dir, io::Error::from(errno)))?;
        }
    }
    Ok(())
}
