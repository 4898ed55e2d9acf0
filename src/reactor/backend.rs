//! I/O multiplexing backends and the prioritized fallback chain.
//!
//! The preferred OS-specific backend is tried first (epoll on Linux,
//! kqueue on the BSDs), falling back to portable `poll(2)`. The rest of
//! the crate only sees the [`Backend`] trait through the [`create`]
//! factory, so it stays backend-agnostic.

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use tracing::debug;

use crate::core::errors::{Result, TaError};

/// Readiness backend: registered descriptors are watched for readability.
pub trait Backend {
    /// Short backend identifier for logs.
    fn name(&self) -> &'static str;

    /// Start watching `fd` for readability under the given token.
    ///
    /// The backend duplicates the descriptor, so the caller keeps ownership
    /// of the original.
    fn register(&mut self, fd: BorrowedFd<'_>, token: u64) -> Result<()>;

    /// Block until at least one descriptor is readable, pushing the ready
    /// tokens. An interrupted wait returns with no tokens.
    fn wait(&mut self, ready: &mut Vec<u64>) -> Result<()>;
}

type Constructor = fn() -> Result<Box<dyn Backend>>;

/// Construct the best available backend, trying the prioritized chain.
pub fn create() -> Result<Box<dyn Backend>> {
    let mut chain: Vec<(&'static str, Constructor)> = Vec::new();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    chain.push(("epoll", epoll_backend as Constructor));
    #[cfg(any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    ))]
    chain.push(("kqueue", kqueue_backend as Constructor));
    chain.push(("poll", poll_backend as Constructor));

    for (name, construct) in chain {
        match construct() {
            Ok(backend) => {
                debug!(backend = name, "selected event-loop backend");
                return Ok(backend);
            }
            Err(error) => {
                debug!(backend = name, %error, "backend unavailable, trying next");
            }
        }
    }
    Err(TaError::NoReactorBackend)
}

fn dup_watched(fd: BorrowedFd<'_>) -> Result<OwnedFd> {
    fd.try_clone_to_owned().map_err(|e| TaError::Runtime {
        details: format!("cannot duplicate watched descriptor: {e}"),
    })
}

// ---------------------------------------------------------------------------
// epoll (Linux)
// ---------------------------------------------------------------------------

#[cfg(any(target_os = "linux", target_os = "android"))]
fn epoll_backend() -> Result<Box<dyn Backend>> {
    Ok(Box::new(epoll::EpollBackend::new()?))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll {
    use super::{Backend, Result, dup_watched};
    use nix::errno::Errno;
    use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
    use std::os::fd::{BorrowedFd, OwnedFd};

    const EVENT_BATCH: usize = 32;

    pub struct EpollBackend {
        epoll: Epoll,
        // Keeps the duplicated registrations alive for the epoll's lifetime.
        fds: Vec<OwnedFd>,
    }

    impl EpollBackend {
        pub fn new() -> Result<Self> {
            let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
            Ok(Self {
                epoll,
                fds: Vec::new(),
            })
        }
    }

    impl Backend for EpollBackend {
        fn name(&self) -> &'static str {
            "epoll"
        }

        fn register(&mut self, fd: BorrowedFd<'_>, token: u64) -> Result<()> {
            let owned = dup_watched(fd)?;
            self.epoll
                .add(&owned, EpollEvent::new(EpollFlags::EPOLLIN, token))?;
            self.fds.push(owned);
            Ok(())
        }

        fn wait(&mut self, ready: &mut Vec<u64>) -> Result<()> {
            let mut events = [EpollEvent::empty(); EVENT_BATCH];
            match self.epoll.wait(&mut events, EpollTimeout::NONE) {
                Ok(count) => {
                    for event in &events[..count] {
                        ready.push(event.data());
                    }
                    Ok(())
                }
                Err(Errno::EINTR) => Ok(()),
                Err(errno) => Err(errno.into()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// kqueue (BSDs)
// ---------------------------------------------------------------------------

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
fn kqueue_backend() -> Result<Box<dyn Backend>> {
    Ok(Box::new(kqueue::KqueueBackend::new()?))
}

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
mod kqueue {
    use super::{Backend, Result, dup_watched};
    use nix::errno::Errno;
    use nix::sys::event::{EventFilter, EventFlag, FilterFlag, KEvent, Kqueue};
    use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};

    const EVENT_BATCH: usize = 32;

    pub struct KqueueBackend {
        kqueue: Kqueue,
        fds: Vec<OwnedFd>,
    }

    impl KqueueBackend {
        pub fn new() -> Result<Self> {
            let kqueue = Kqueue::new()?;
            Ok(Self {
                kqueue,
                fds: Vec::new(),
            })
        }
    }

    impl Backend for KqueueBackend {
        fn name(&self) -> &'static str {
            "kqueue"
        }

        fn register(&mut self, fd: BorrowedFd<'_>, token: u64) -> Result<()> {
            let owned = dup_watched(fd)?;
            let change = KEvent::new(
                owned.as_raw_fd() as usize,
                EventFilter::EVFILT_READ,
                EventFlag::EV_ADD,
                FilterFlag::empty(),
                0,
                token as isize,
            );
            self.kqueue.kevent(&[change], &mut [], None)?;
            self.fds.push(owned);
            Ok(())
        }

        fn wait(&mut self, ready: &mut Vec<u64>) -> Result<()> {
            let placeholder = KEvent::new(
                0,
                EventFilter::EVFILT_READ,
                EventFlag::empty(),
                FilterFlag::empty(),
                0,
                0,
            );
            let mut events = [placeholder; EVENT_BATCH];
            match self.kqueue.kevent(&[], &mut events, None) {
                Ok(count) => {
                    for event in &events[..count] {
                        ready.push(event.udata() as u64);
                    }
                    Ok(())
                }
                Err(Errno::EINTR) => Ok(()),
                Err(errno) => Err(errno.into()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// poll (portable default)
// ---------------------------------------------------------------------------

fn poll_backend() -> Result<Box<dyn Backend>> {
    Ok(Box::new(PollBackend::default()))
}

#[derive(Default)]
struct PollBackend {
    entries: Vec<(u64, OwnedFd)>,
}

impl Backend for PollBackend {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn register(&mut self, fd: BorrowedFd<'_>, token: u64) -> Result<()> {
        let owned = dup_watched(fd)?;
        self.entries.push((token, owned));
        Ok(())
    }

    fn wait(&mut self, ready: &mut Vec<u64>) -> Result<()> {
        use nix::errno::Errno;
        use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

        let mut pollfds: Vec<PollFd<'_>> = self
            .entries
            .iter()
            .map(|(_, fd)| PollFd::new(fd.as_fd(), PollFlags::POLLIN))
            .collect();
        match poll(&mut pollfds, PollTimeout::NONE) {
            Ok(_) => {
                for (pollfd, (token, _)) in pollfds.iter().zip(&self.entries) {
                    let fired = pollfd.revents().is_some_and(|r| !r.is_empty());
                    if fired {
                        ready.push(*token);
                    }
                }
                Ok(())
            }
            Err(Errno::EINTR) => Ok(()),
            Err(errno) => Err(errno.into()),
        }
    }
}
