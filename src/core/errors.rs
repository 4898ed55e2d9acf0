//! TA-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, TaError>;

/// Top-level error type for the telemetry agent.
///
/// Every variant is a one-shot startup or runtime failure; nothing in the
/// bootstrap core retries. Privilege-drop failures are deliberately *not*
/// represented here — they are logged warnings, because an agent that keeps
/// super-user privilege is worse than one that continues unprivileged.
#[derive(Debug, Error)]
pub enum TaError {
    #[error("[TA-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[TA-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[TA-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[TA-2001] no usable event-loop backend could be constructed")]
    NoReactorBackend,

    #[error("[TA-2002] cannot bind listening socket at {address}: {source}")]
    SocketBind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[TA-2003] cannot create directory {path}: {source}")]
    DirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[TA-2004] cannot set permissions on socket {path}: {source}")]
    SocketPermissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "[TA-2101] the configured telemetry user '{user}' does not exist; \
         fix the `user` setting"
    )]
    NonExistentUser { user: String },

    #[error(
        "[TA-2102] the configured telemetry group '{group}' does not exist; \
         fix the `group` setting"
    )]
    NonExistentGroup { group: String },

    #[error(
        "[TA-2103] no `group` was configured, so the default group of user \
         '{user}' (GID {gid}) was tried, but that GID does not exist; set \
         `group` explicitly to a group that exists"
    )]
    NonExistentDefaultGroup { user: String, gid: u32 },

    #[error(
        "[TA-2104] the current user, UID {uid}, has no entry in the system's \
         user database; fix the user database or configure `user` explicitly"
    )]
    UnknownCurrentUser { uid: u32 },

    #[error("[TA-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[TA-3002] reactor state violation: {details}")]
    ReactorState { details: String },

    #[error("[TA-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl TaError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "TA-1001",
            Self::MissingConfig { .. } => "TA-1002",
            Self::ConfigParse { .. } => "TA-1003",
            Self::NoReactorBackend => "TA-2001",
            Self::SocketBind { .. } => "TA-2002",
            Self::DirCreate { .. } => "TA-2003",
            Self::SocketPermissions { .. } => "TA-2004",
            Self::NonExistentUser { .. } => "TA-2101",
            Self::NonExistentGroup { .. } => "TA-2102",
            Self::NonExistentDefaultGroup { .. } => "TA-2103",
            Self::UnknownCurrentUser { .. } => "TA-2104",
            Self::Io { .. } => "TA-3001",
            Self::ReactorState { .. } => "TA-3002",
            Self::Runtime { .. } => "TA-3900",
        }
    }

    /// Whether the failure names an account-resolution problem (the error
    /// family that can leave a created socket behind, see
    /// `daemon::bootstrap`).
    #[must_use]
    pub const fn is_account_resolution(&self) -> bool {
        matches!(
            self,
            Self::NonExistentUser { .. }
                | Self::NonExistentGroup { .. }
                | Self::NonExistentDefaultGroup { .. }
                | Self::UnknownCurrentUser { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<toml::de::Error> for TaError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for TaError {
    fn from(value: serde_json::Error) -> Self {
        Self::Runtime {
            details: format!("serde_json: {value}"),
        }
    }
}

#[cfg(unix)]
impl From<nix::errno::Errno> for TaError {
    fn from(value: nix::errno::Errno) -> Self {
        Self::Runtime {
            details: format!("system call failed: {value}"),
        }
    }
}
