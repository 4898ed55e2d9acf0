//! Privileged setup sequencer.
//!
//! Runs once at startup, strictly ordered: reactor construction, accounts
//! database, listening socket (plus permission bits for Unix addresses),
//! account resolution, log directory creation, privilege drop, service
//! credential registration.
//!
//! Ordering note: the listening socket is created and permission-set
//! *before* the target user/group are validated. A resolution failure at
//! that point leaves a created, permissioned socket file on disk. That is
//! the upstream contract and is preserved here rather than silently fixed;
//! callers treating it as a defect should clean up the socket themselves.

use std::ffi::CString;

use nix::unistd::{Group, User, geteuid, initgroups, setgid, setuid};
use tracing::{debug, info, warn};

use crate::core::accounts::AccountsDatabase;
use crate::core::errors::{Result, TaError};
use crate::core::listen::{ListenAddress, Listener};
use crate::core::options::OptionSet;
use crate::platform::fs::{chmod_retrying, make_dir_tree, parse_mode_string};
use crate::reactor::Reactor;

/// Fixed name of the single service credential.
pub const SERVICE_ACCOUNT: &str = "telemetry";

/// Permission mode for Unix-domain socket files: sticky (restricted
/// deletion) plus read-write-execute for owner, group and other.
pub const SOCKET_MODE: u32 = 0o1777;

/// Everything the privileged setup produces, handed onward to the
/// lifecycle controller and the telemetry server.
pub struct SetupArtifacts {
    /// The reactor, still idle; watchers are registered by the caller.
    pub reactor: Reactor,
    /// The bound listening socket.
    pub listener: Listener,
    /// The log directory (created if it was missing).
    pub log_dir: std::path::PathBuf,
    /// Accounts database holding exactly the service credential.
    pub accounts: AccountsDatabase,
}

impl std::fmt::Debug for SetupArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupArtifacts")
            .field("log_dir", &self.log_dir)
            .field("accounts", &self.accounts)
            .finish_non_exhaustive()
    }
}

/// Run the full privileged setup sequence for the given options.
pub fn run(options: &OptionSet) -> Result<SetupArtifacts> {
    let reactor = Reactor::new()?;
    debug!(backend = reactor.backend_name(), "reactor constructed");

    let mut accounts = AccountsDatabase::new();

    let listener = options.listen.bind()?;
    info!(address = %options.listen, "listening socket bound");

    if let ListenAddress::Unix(path) = &options.listen {
        chmod_retrying(path, SOCKET_MODE).map_err(|source| TaError::SocketPermissions {
            path: path.clone(),
            source,
        })?;
    }

    // Sanity-check the target accounts. This runs after socket creation
    // (see the module-level ordering note).
    let username = match &options.user {
        Some(name) => name.clone(),
        None => current_user_name()?,
    };
    let user = User::from_name(&username)?.ok_or_else(|| TaError::NonExistentUser {
        user: username.clone(),
    })?;
    let group = resolve_group(options.group.as_deref(), &user)?;

    let mode = parse_mode_string(&options.log_permissions)?;
    if !options.log_dir.exists() {
        let owner = geteuid().is_root().then_some((user.uid, group.gid));
        make_dir_tree(&options.log_dir, mode, owner)?;
        info!(path = %options.log_dir.display(), "log directory created");
    }

    // Now is a good time to lower the privilege.
    if geteuid().is_root() {
        lower_privilege(&username, &user, &group);
    }

    accounts.add(SERVICE_ACCOUNT, &options.password, false);

    Ok(SetupArtifacts {
        reactor,
        listener,
        log_dir: options.log_dir.clone(),
        accounts,
    })
}

/// Name of the current effective user, for the default when no `user`
/// option was configured.
fn current_user_name() -> Result<String> {
    let uid = geteuid();
    let user = User::from_uid(uid)?.ok_or(TaError::UnknownCurrentUser { uid: uid.as_raw() })?;
    Ok(user.name)
}

fn resolve_group(configured: Option<&str>, user: &User) -> Result<Group> {
    match configured {
        Some(name) => Group::from_name(name)?.ok_or_else(|| TaError::NonExistentGroup {
            group: name.to_string(),
        }),
        None => Group::from_gid(user.gid)?.ok_or_else(|| TaError::NonExistentDefaultGroup {
            user: user.name.clone(),
            gid: user.gid.as_raw(),
        }),
    }
}

/// Drop from root to the resolved user/group: supplementary groups, then
/// group ID, then user ID. Each failing sub-step is logged and skipped;
/// an agent that keeps super-user privilege is worse than one that logs a
/// warning and continues as close to unprivileged as it got.
fn lower_privilege(username: &str, user: &User, group: &Group) {
    match CString::new(username) {
        Ok(name) => {
            if let Err(errno) = initgroups(&name, group.gid) {
                warn!(
                    user = username,
                    %errno,
                    "unable to set supplementary groups; continuing"
                );
            }
        }
        Err(_) => warn!(
            user = username,
            "user name contains an interior NUL; skipping supplementary groups"
        ),
    }
    if let Err(errno) = setgid(group.gid) {
        warn!(
            user = username,
            gid = group.gid.as_raw(),
            %errno,
            "unable to lower privilege: cannot set group ID; continuing"
        );
    }
    if let Err(errno) = setuid(user.uid) {
        warn!(
            user = username,
            uid = user.uid.as_raw(),
            %errno,
            "unable to lower privilege: cannot set user ID; continuing"
        );
    }
}

/// Whether this process currently holds elevated privilege.
#[must_use]
pub fn running_privileged() -> bool {
    geteuid().is_root()
}

#[cfg(test)]
mod tests {
    use super::{SERVICE_ACCOUNT, run};
    use crate::core::errors::TaError;
    use crate::core::listen::ListenAddress;
    use crate::core::options::{DEFAULT_LOG_PERMISSIONS, OptionSet};
    use crate::reactor::ReactorState;
    use std::os::unix::fs::MetadataExt;
    use std::path::Path;

    fn options(dir: &Path, user: Option<&str>) -> OptionSet {
        OptionSet {
            listen: ListenAddress::Unix(dir.join("agent.sock")),
            log_dir: dir.join("logs/collected"),
            password: "pw".to_string(),
            user: user.map(str::to_string),
            group: None,
            log_permissions: DEFAULT_LOG_PERMISSIONS.to_string(),
        }
    }

    #[test]
    fn happy_path_produces_all_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let opts = options(dir.path(), None);
        let artifacts = run(&opts).expect("setup succeeds");

        // Idle reactor, bound socket, created dir, one credential.
        assert_eq!(artifacts.reactor.state(), ReactorState::Idle);
        assert_eq!(artifacts.accounts.len(), 1);
        assert!(artifacts.accounts.get(SERVICE_ACCOUNT).is_some());
        assert!(artifacts.log_dir.is_dir());

        let socket_path = dir.path().join("agent.sock");
        let socket_mode = socket_path.metadata().expect("socket metadata").mode() & 0o7777;
        assert_eq!(socket_mode, super::SOCKET_MODE);

        let dir_mode = artifacts.log_dir.metadata().expect("dir metadata").mode() & 0o7777;
        assert_eq!(dir_mode, 0o755);
    }

    #[test]
    fn nonexistent_user_fails_but_leaves_the_socket_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let opts = options(dir.path(), Some("no-such-user-telemetry"));
        let err = run(&opts).expect_err("resolution must fail");

        assert!(matches!(err, TaError::NonExistentUser { .. }));
        assert!(err.is_account_resolution());
        assert!(err.to_string().contains("no-such-user-telemetry"));
        // Documented ordering property: the socket was already created
        // and permission-set before resolution ran.
        assert!(dir.path().join("agent.sock").exists());
    }

    #[test]
    fn nonexistent_group_is_a_distinct_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut opts = options(dir.path(), None);
        opts.group = Some("no-such-group-telemetry".to_string());
        let err = run(&opts).expect_err("resolution must fail");
        assert!(matches!(err, TaError::NonExistentGroup { .. }));
        assert!(err.to_string().contains("no-such-group-telemetry"));
    }

    #[test]
    fn existing_log_dir_is_not_touched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut opts = options(dir.path(), None);
        opts.log_dir = dir.path().join("already-there");
        std::fs::create_dir(&opts.log_dir).expect("pre-create");
        let before = opts.log_dir.metadata().expect("metadata").mode();
        run(&opts).expect("setup succeeds");
        assert_eq!(opts.log_dir.metadata().expect("metadata").mode(), before);
    }
}
