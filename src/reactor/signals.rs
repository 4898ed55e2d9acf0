//! Signal watchers: OS signals surfaced to the reactor through a
//! self-pipe, using signal-hook's async-signal-safe pipe registration.

use std::io::Read;
use std::os::raw::c_int;
use std::os::unix::net::UnixStream;

use signal_hook::SigId;
use signal_hook::low_level::pipe;

use crate::core::errors::{Result, TaError};
use crate::reactor::{Reactor, ReactorCtl, WatchKind, WatcherId};

/// Signal requesting a non-terminating diagnostic state dump.
///
/// SIGINFO where the platform has it; SIGUSR1 elsewhere.
#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub const DUMP_SIGNAL: c_int = libc::SIGINFO;
/// Signal requesting a non-terminating diagnostic state dump.
#[cfg(not(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
pub const DUMP_SIGNAL: c_int = libc::SIGUSR1;

/// One OS signal bound to a readable descriptor.
///
/// The signal handler writes a byte into the pipe; the reactor sees the
/// read end become readable and runs the registered action on the normal
/// control thread, outside signal-handler context.
pub struct SignalWatcher {
    rx: UnixStream,
    sig_id: SigId,
}

impl SignalWatcher {
    /// Install a handler for `signal` and wrap its delivery pipe.
    pub fn new(signal: c_int) -> Result<Self> {
        let wrap = |e: std::io::Error| TaError::Runtime {
            details: format!("cannot install handler for signal {signal}: {e}"),
        };
        let (rx, tx) = UnixStream::pair().map_err(wrap)?;
        rx.set_nonblocking(true).map_err(wrap)?;
        // The write end must be non-blocking: a full pipe inside the
        // handler must drop the byte rather than block the process.
        tx.set_nonblocking(true).map_err(wrap)?;
        let sig_id = pipe::register(signal, tx).map_err(wrap)?;
        Ok(Self { rx, sig_id })
    }

    /// Register this watcher on the reactor; `action` runs once per
    /// readiness event after pending signal bytes are drained.
    pub fn register<F>(self, reactor: &mut Reactor, mut action: F) -> Result<WatcherId>
    where
        F: FnMut(&mut ReactorCtl) + 'static,
    {
        let source = self.rx.try_clone().map_err(|e| TaError::Runtime {
            details: format!("cannot clone signal pipe: {e}"),
        })?;
        reactor.register_io(
            &source,
            WatchKind::Signal,
            Box::new(move |ctl| {
                self.drain();
                action(ctl);
            }),
        )
    }

    /// Consume queued notification bytes so level-triggered backends do
    /// not re-fire for signals already handled.
    fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            match (&self.rx).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(_) => break,
            }
        }
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        signal_hook::low_level::unregister(self.sig_id);
    }
}
