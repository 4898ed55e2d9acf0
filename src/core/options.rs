//! Validated startup option set.
//!
//! Parsing and validation of raw configuration happens upstream (in the
//! binary's CLI/TOML layer); the bootstrap core consumes this struct as an
//! immutable, already-validated value.

use std::fmt;
use std::path::PathBuf;

use crate::core::listen::ListenAddress;
use crate::platform::container::is_running_in_container;

/// Default symbolic permission spec for the log directory.
pub const DEFAULT_LOG_PERMISSIONS: &str = "u=rwx,g=rx,o=rx";

/// Immutable, validated startup configuration for one daemon run.
#[derive(Clone)]
pub struct OptionSet {
    /// Where to listen for client connections.
    pub listen: ListenAddress,
    /// Directory receiving collected telemetry logs.
    pub log_dir: PathBuf,
    /// Operator-supplied shared secret for the service credential.
    pub password: String,
    /// Unprivileged user to drop to; `None` means the current user.
    pub user: Option<String>,
    /// Group owning the log directory; `None` means the user's default group.
    pub group: Option<String>,
    /// Symbolic permission spec (`u=rwx,g=rx,o=rx` style) for the log dir.
    pub log_permissions: String,
}

impl OptionSet {
    /// Container-aware default log directory.
    ///
    /// Inside a container `/var/log` is frequently a read-only or ephemeral
    /// overlay, so fall back to a world-reachable tmp location there.
    #[must_use]
    pub fn default_log_dir() -> PathBuf {
        if is_running_in_container() {
            PathBuf::from("/tmp/telemetry-agent/logs")
        } else {
            PathBuf::from("/var/log/telemetry-agent")
        }
    }
}

impl fmt::Debug for OptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionSet")
            .field("listen", &self.listen)
            .field("log_dir", &self.log_dir)
            .field("password", &"<redacted>")
            .field("user", &self.user)
            .field("group", &self.group)
            .field("log_permissions", &self.log_permissions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_LOG_PERMISSIONS, OptionSet};
    use crate::core::listen::ListenAddress;

    fn sample() -> OptionSet {
        OptionSet {
            listen: ListenAddress::Unix("/tmp/a.sock".into()),
            log_dir: "/tmp/logs".into(),
            password: "topsecret".to_string(),
            user: None,
            group: None,
            log_permissions: DEFAULT_LOG_PERMISSIONS.to_string(),
        }
    }

    #[test]
    fn debug_output_redacts_password() {
        let rendered = format!("{:?}", sample());
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("topsecret"));
    }

    #[test]
    fn default_log_dir_is_absolute() {
        assert!(OptionSet::default_log_dir().is_absolute());
    }
}
