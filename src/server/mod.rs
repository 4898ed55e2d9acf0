//! Telemetry server handoff seam.
//!
//! The wire protocol, storage format and remote-ingestion relay live
//! outside the bootstrap core; this component receives the artifacts the
//! core produces (socket, accounts database, log directory, directory
//! permission spec), accepts pending connections without blocking, and
//! renders the diagnostic state dump.

use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, warn};

use crate::core::accounts::AccountsDatabase;
use crate::core::listen::Listener;

/// The connection-facing component the bootstrap core hands off to.
pub struct TelemetryServer {
    listener: Listener,
    accounts: AccountsDatabase,
    log_dir: PathBuf,
    dir_permissions: String,
    connections_accepted: u64,
    started_at: Instant,
}

impl TelemetryServer {
    /// Construct the server from the setup artifacts.
    ///
    /// The accounts database must already hold the service credential;
    /// the bootstrap sequence guarantees that.
    #[must_use]
    pub fn new(
        listener: Listener,
        accounts: AccountsDatabase,
        log_dir: PathBuf,
        dir_permissions: String,
    ) -> Self {
        debug_assert!(!accounts.is_empty(), "accounts handed off unpopulated");
        Self {
            listener,
            accounts,
            log_dir,
            dir_permissions,
            connections_accepted: 0,
            started_at: Instant::now(),
        }
    }

    /// The listening socket, for watcher registration.
    #[must_use]
    pub const fn socket(&self) -> &Listener {
        &self.listener
    }

    /// Directory receiving collected telemetry.
    #[must_use]
    pub fn log_dir(&self) -> &std::path::Path {
        &self.log_dir
    }

    /// Total connections accepted so far.
    #[must_use]
    pub const fn connections_accepted(&self) -> u64 {
        self.connections_accepted
    }

    /// Accept every pending connection without blocking.
    pub fn accept_pending(&mut self) {
        loop {
            match self.listener.try_accept() {
                Ok(true) => {
                    self.connections_accepted += 1;
                    debug!(
                        total = self.connections_accepted,
                        "accepted telemetry connection"
                    );
                }
                Ok(false) => break,
                Err(error) => {
                    warn!(%error, "accept failed");
                    break;
                }
            }
        }
    }

    /// Write the current internal state as one JSON object.
    pub fn dump<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let state = serde_json::json!({
            "timestamp": chrono::Local::now().to_rfc3339(),
            "listening": self.listener.address().to_string(),
            "log_dir": self.log_dir.display().to_string(),
            "dir_permissions": self.dir_permissions,
            "accounts": self.accounts.len(),
            "connections_accepted": self.connections_accepted,
            "uptime_secs": self.started_at.elapsed().as_secs(),
        });
        writeln!(out, "{state}")
    }
}

#[cfg(test)]
mod tests {
    use super::TelemetryServer;
    use crate::core::accounts::AccountsDatabase;
    use crate::core::listen::ListenAddress;
    use std::os::unix::net::UnixStream;

    fn server(dir: &std::path::Path) -> TelemetryServer {
        let listener = ListenAddress::Unix(dir.join("srv.sock"))
            .bind()
            .expect("bind");
        let mut accounts = AccountsDatabase::new();
        accounts.add("telemetry", "pw", false);
        TelemetryServer::new(
            listener,
            accounts,
            dir.join("logs"),
            "u=rwx,g=rx,o=rx".to_string(),
        )
    }

    #[test]
    fn accepts_pending_connections_and_counts_them() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut server = server(dir.path());
        let path = dir.path().join("srv.sock");

        let _c1 = UnixStream::connect(&path).expect("connect");
        let _c2 = UnixStream::connect(&path).expect("connect");
        server.accept_pending();
        assert_eq!(server.connections_accepted(), 2);

        // Idle listener: the count must not move.
        server.accept_pending();
        assert_eq!(server.connections_accepted(), 2);
    }

    #[test]
    fn dump_renders_json_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server = server(dir.path());
        let mut out = Vec::new();
        server.dump(&mut out).expect("dump");
        let parsed: serde_json::Value =
            serde_json::from_slice(&out).expect("dump is one JSON object");
        assert_eq!(parsed["accounts"], 1);
        assert_eq!(parsed["connections_accepted"], 0);
        assert!(
            parsed["listening"]
                .as_str()
                .expect("listening is a string")
                .starts_with("unix:")
        );
    }
}
