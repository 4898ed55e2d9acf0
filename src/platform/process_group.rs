//! Process-group abstraction for cascading termination.

use nix::sys::signal::{Signal, killpg};
use nix::unistd::{Pid, getpgrp};

/// Identifier of a process group, used to take down the daemon together
/// with any children it spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGroup(Pid);

impl ProcessGroup {
    /// The process group of the calling process.
    #[must_use]
    pub fn current() -> Self {
        Self(getpgrp())
    }

    /// Raw process-group id.
    #[must_use]
    pub fn id(&self) -> i32 {
        self.0.as_raw()
    }

    /// Terminate this daemon and all of its descendants, then exit with
    /// the given status code.
    ///
    /// SIGKILL is sent to the whole group; if the caller belongs to it
    /// (the only intended use) that kill normally takes this process down
    /// too, and the trailing exit only runs when killpg failed.
    pub fn terminate_all(&self, exit_code: i32) -> ! {
        let _ = killpg(self.0, Signal::SIGKILL);
        std::process::exit(exit_code);
    }
}

#[cfg(test)]
mod tests {
    use super::ProcessGroup;

    #[test]
    fn current_group_has_positive_id() {
        assert!(ProcessGroup::current().id() > 0);
    }
}
