//! Supervision channel: the dead man's switch toward the parent server.
//!
//! When the daemon is spawned by its supervising parent, descriptor 3 is
//! an inherited one-way channel. The daemon writes a single `initialized`
//! handshake after setup succeeds; after that, the only meaningful event
//! is the descriptor becoming readable (bytes or EOF), which means the
//! parent closed its end or died.

use std::os::fd::{AsFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use crate::core::errors::{Result, TaError};

/// Descriptor number the supervising parent passes the channel on.
pub const SUPERVISION_FD: RawFd = 3;

/// Handshake message, written exactly once. Unframed.
pub const HANDSHAKE: &str = "initialized";

/// The inherited supervision descriptor.
pub struct SupervisionChannel {
    fd: OwnedFd,
    handshake_sent: bool,
}

impl SupervisionChannel {
    /// Adopt the inherited descriptor if the parent passed one.
    ///
    /// Probes descriptor 3 with `fcntl(F_GETFD)`; when it is not open the
    /// daemon is running unsupervised and the channel is absent.
    ///
    /// Must be called before the process opens any other file: an
    /// unsupervised process has descriptor 3 free, and whatever gets
    /// opened first would occupy it and be misidentified (and later
    /// double-closed) as the channel.
    #[allow(unsafe_code)]
    pub fn inherit() -> Option<Self> {
        // SAFETY: F_GETFD on an arbitrary descriptor number only reads the
        // close-on-exec flag; it cannot invalidate other handles.
        let flags = unsafe { libc::fcntl(SUPERVISION_FD, libc::F_GETFD) };
        if flags < 0 {
            return None;
        }
        // SAFETY: the descriptor is open, was inherited for exactly this
        // purpose, and nothing else in the process adopts it.
        let fd = unsafe { OwnedFd::from_raw_fd(SUPERVISION_FD) };
        Some(Self::from_fd(fd))
    }

    /// Wrap an explicit descriptor (used by tests and alternate spawners).
    #[must_use]
    pub fn from_fd(fd: OwnedFd) -> Self {
        Self {
            fd,
            handshake_sent: false,
        }
    }

    /// Write the startup handshake. Idempotent: only the first call writes.
    pub fn send_handshake(&mut self) -> Result<()> {
        if self.handshake_sent {
            return Ok(());
        }
        let written =
            nix::unistd::write(&self.fd, HANDSHAKE.as_bytes()).map_err(|errno| TaError::Runtime {
                details: format!("cannot write supervision handshake: {errno}"),
            })?;
        // The message is far below PIPE_BUF, so a partial write means the
        // channel is broken, not congested.
        if written != HANDSHAKE.len() {
            return Err(TaError::Runtime {
                details: format!(
                    "short supervision handshake write: {written} of {} bytes",
                    HANDSHAKE.len()
                ),
            });
        }
        self.handshake_sent = true;
        Ok(())
    }

    /// Whether the handshake has been written.
    #[must_use]
    pub const fn handshake_sent(&self) -> bool {
        self.handshake_sent
    }
}

impl AsFd for SupervisionChannel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
