//! Heuristic, cached container detection.
//!
//! An ordered list of independent checks, each short-circuiting on a
//! definitive answer (adapted from systemd's virt detection). The result is
//! computed at most once per process and memoized behind a `OnceLock`; the
//! probe is pure from the caller's perspective, so a single guarded
//! initialization is sufficient.

use std::path::Path;
use std::sync::OnceLock;

/// First line of `/proc/1/sched` as the init process reports itself on a
/// regular (non-containerized) host.
const INIT_SCHED_PREFIX: &str = "(1,";

/// Whether this process appears to be running inside an OS-level container.
///
/// Memoized: repeated calls return the cached result without re-probing.
/// Non-Linux systems short-circuit to `false` without running any check.
pub fn is_running_in_container() -> bool {
    static CACHE: OnceLock<bool> = OnceLock::new();
    *CACHE.get_or_init(probe)
}

#[cfg(target_os = "linux")]
fn probe() -> bool {
    detect(
        Path::new("/"),
        std::process::id() == 1,
        std::env::var("container").ok().as_deref(),
    )
}

#[cfg(not(target_os = "linux"))]
fn probe() -> bool {
    false
}

/// The ordered heuristic checks, parameterised for testability.
///
/// `is_init_process` is whether the calling process is PID 1;
/// `container_env` is the value of the `container` environment variable.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn detect(root: &Path, is_init_process: bool, container_env: Option<&str>) -> bool {
    // Docker leaves a well-known marker file at the filesystem root.
    if root.join(".dockerenv").exists() {
        return true;
    }

    // OpenVZ guests see /proc/vz but not /proc/bc; hosts see both.
    if root.join("proc/vz").exists() && !root.join("proc/bc").exists() {
        return true;
    }

    // As PID 1 the manager set the `container` variable for us (or did not).
    // This check is definitive either way and must not fall through.
    if is_init_process {
        return container_env.is_some_and(|value| !value.is_empty());
    }

    // systemd-nspawn and friends record the container type here.
    let systemd_marker = root.join("run/systemd/container");
    if systemd_marker.exists() {
        let content = std::fs::read_to_string(&systemd_marker).unwrap_or_default();
        return !content.is_empty();
    }

    // Last resort: the scheduling info of PID 1. An empty file means no
    // container; content not carrying init's expected self-identification
    // prefix means we are looking at a namespaced PID 1; the expected
    // prefix falls through to the default.
    let sched = root.join("proc/1/sched");
    if sched.exists() {
        let content = std::fs::read_to_string(&sched).unwrap_or_default();
        if content.is_empty() {
            return false;
        }
        if !content.starts_with(INIT_SCHED_PREFIX) {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::detect;
    use std::fs;
    use std::path::Path;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("fixture dirs");
        }
        fs::write(path, b"").expect("fixture file");
    }

    #[test]
    fn empty_root_is_not_a_container() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(!detect(dir.path(), false, None));
    }

    #[test]
    fn dockerenv_marker_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(&dir.path().join(".dockerenv"));
        assert!(detect(dir.path(), false, None));
    }

    #[test]
    fn vz_without_bc_is_a_container() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(&dir.path().join("proc/vz"));
        assert!(detect(dir.path(), false, None));
    }

    #[test]
    fn vz_with_bc_is_a_host() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(&dir.path().join("proc/vz"));
        touch(&dir.path().join("proc/bc"));
        assert!(!detect(dir.path(), false, None));
    }

    #[test]
    fn pid1_env_check_is_definitive_both_ways() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A later check would say "container"; PID 1 must not reach it.
        fs::create_dir_all(dir.path().join("run/systemd")).expect("dirs");
        fs::write(dir.path().join("run/systemd/container"), b"docker").expect("marker");

        assert!(detect(dir.path(), true, Some("lxc")));
        assert!(!detect(dir.path(), true, Some("")));
        assert!(!detect(dir.path(), true, None));
    }

    #[test]
    fn systemd_marker_content_decides() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("run/systemd")).expect("dirs");
        let marker = dir.path().join("run/systemd/container");

        fs::write(&marker, b"nspawn").expect("marker");
        assert!(detect(dir.path(), false, None));

        fs::write(&marker, b"").expect("marker");
        assert!(!detect(dir.path(), false, None));
    }

    #[test]
    fn sched_three_way_branch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sched = dir.path().join("proc/1/sched");
        fs::create_dir_all(sched.parent().expect("parent")).expect("dirs");

        // Empty content: definitively not a container.
        fs::write(&sched, b"").expect("sched");
        assert!(!detect(dir.path(), false, None));

        // Unexpected self-identification: container.
        fs::write(&sched, b"agent (7421, #threads: 1)").expect("sched");
        assert!(detect(dir.path(), false, None));

        // Expected init prefix: fall through to the default.
        fs::write(&sched, b"(1, #threads: 1)").expect("sched");
        assert!(!detect(dir.path(), false, None));
    }

    #[test]
    fn cached_result_is_stable() {
        let first = super::is_running_in_container();
        for _ in 0..3 {
            assert_eq!(super::is_running_in_container(), first);
        }
    }
}
