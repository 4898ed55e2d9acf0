//! Single-threaded cooperative reactor and watcher registry.
//!
//! Exactly one control thread runs every watcher callback; suspension
//! happens only inside the backend's wait primitive. Callbacks must not
//! block for unbounded durations, since doing so starves every other
//! registered watcher.

pub mod backend;
#[cfg(feature = "daemon")]
pub mod signals;

use std::os::fd::AsFd;

use crate::core::errors::{Result, TaError};

/// Identifier of a registered watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

/// What kind of event source a watcher is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    /// Socket or descriptor readability.
    Io,
    /// OS signal delivery (surfaced through a self-pipe descriptor).
    Signal,
}

/// Reactor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorState {
    /// Created; watchers may be registered.
    Idle,
    /// Inside `run`; registration is closed.
    Running,
    /// `run` returned after a cooperative stop.
    Stopped,
}

/// Handle passed to watcher callbacks; its only mutation is a cooperative
/// stop request, honored after the current dispatch iteration completes.
pub struct ReactorCtl {
    stop: bool,
}

impl ReactorCtl {
    /// Request a graceful stop: the current iteration finishes, no new
    /// iteration begins, and `run` returns `Ok`.
    pub fn stop(&mut self) {
        self.stop = true;
    }
}

type Callback = Box<dyn FnMut(&mut ReactorCtl)>;

struct Watcher {
    id: WatcherId,
    kind: WatchKind,
    callback: Callback,
}

/// The event multiplexer. Owns every registered watcher and the selected
/// readiness backend.
pub struct Reactor {
    backend: Box<dyn backend::Backend>,
    watchers: Vec<Watcher>,
    state: ReactorState,
}

impl Reactor {
    /// Construct a reactor on the best available readiness backend.
    pub fn new() -> Result<Self> {
        Ok(Self {
            backend: backend::create()?,
            watchers: Vec::new(),
            state: ReactorState::Idle,
        })
    }

    /// Name of the selected backend, for logs.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ReactorState {
        self.state
    }

    /// Number of registered watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Register a readability watcher. All registration must happen before
    /// `run`; the reactor duplicates the descriptor internally, so the
    /// caller keeps ownership of `source`.
    pub fn register_io(
        &mut self,
        source: &impl AsFd,
        kind: WatchKind,
        callback: Callback,
    ) -> Result<WatcherId> {
        if self.state != ReactorState::Idle {
            return Err(TaError::ReactorState {
                details: format!(
                    "watchers must be registered before the reactor runs (state: {:?})",
                    self.state
                ),
            });
        }
        let id = WatcherId(self.watchers.len() as u64);
        self.backend.register(source.as_fd(), id.0)?;
        self.watchers.push(Watcher { id, kind, callback });
        Ok(id)
    }

    /// Run the dispatch loop until a callback requests a stop.
    ///
    /// Ready watchers execute strictly sequentially on the calling thread.
    /// An interrupted wait is retried; a stop request ends the loop after
    /// the current iteration, transitioning to `Stopped`.
    pub fn run(&mut self) -> Result<()> {
        if self.state != ReactorState::Idle {
            return Err(TaError::ReactorState {
                details: format!("run called in state {:?}", self.state),
            });
        }
        self.state = ReactorState::Running;

        let mut ready: Vec<u64> = Vec::new();
        loop {
            ready.clear();
            if let Err(e) = self.backend.wait(&mut ready) {
                self.state = ReactorState::Stopped;
                return Err(e);
            }

            let mut ctl = ReactorCtl { stop: false };
            for token in &ready {
                if let Some(watcher) = self.watchers.iter_mut().find(|w| w.id.0 == *token) {
                    (watcher.callback)(&mut ctl);
                }
            }
            if ctl.stop {
                break;
            }
        }

        self.state = ReactorState::Stopped;
        Ok(())
    }

    /// Kinds of the registered watchers, in registration order.
    #[must_use]
    pub fn watcher_kinds(&self) -> Vec<WatchKind> {
        self.watchers.iter().map(|w| w.kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Reactor, ReactorState, WatchKind};
    use crate::core::errors::TaError;
    use std::cell::RefCell;
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::rc::Rc;

    #[test]
    fn starts_idle_with_no_watchers() {
        let reactor = Reactor::new().expect("backend available");
        assert_eq!(reactor.state(), ReactorState::Idle);
        assert_eq!(reactor.watcher_count(), 0);
    }

    #[test]
    fn dispatches_ready_watchers_sequentially_then_stops() {
        let mut reactor = Reactor::new().expect("backend available");
        let (mut tx_a, rx_a) = UnixStream::pair().expect("socketpair");
        let (mut tx_b, rx_b) = UnixStream::pair().expect("socketpair");

        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
        let order_a = Rc::clone(&order);
        reactor
            .register_io(
                &rx_a,
                WatchKind::Io,
                Box::new(move |_ctl| order_a.borrow_mut().push("a")),
            )
            .expect("register a");
        let order_b = Rc::clone(&order);
        reactor
            .register_io(
                &rx_b,
                WatchKind::Io,
                Box::new(move |ctl| {
                    order_b.borrow_mut().push("b");
                    ctl.stop();
                }),
            )
            .expect("register b");

        // Both become readable before the first wait; one iteration must
        // run both callbacks, then honor the stop.
        tx_a.write_all(b"x").expect("write a");
        tx_b.write_all(b"y").expect("write b");
        reactor.run().expect("run returns after stop");

        assert_eq!(*order.borrow(), vec!["a", "b"]);
        assert_eq!(reactor.state(), ReactorState::Stopped);
    }

    #[test]
    fn registration_after_run_is_rejected() {
        let mut reactor = Reactor::new().expect("backend available");
        let (mut tx, rx) = UnixStream::pair().expect("socketpair");
        reactor
            .register_io(&rx, WatchKind::Io, Box::new(|ctl| ctl.stop()))
            .expect("register");
        tx.write_all(b"x").expect("write");
        reactor.run().expect("run");

        let err = reactor
            .register_io(&rx, WatchKind::Io, Box::new(|_| {}))
            .expect_err("registration must be closed after run");
        assert!(matches!(err, TaError::ReactorState { .. }));
    }

    #[test]
    fn run_twice_is_rejected() {
        let mut reactor = Reactor::new().expect("backend available");
        let (mut tx, rx) = UnixStream::pair().expect("socketpair");
        reactor
            .register_io(&rx, WatchKind::Io, Box::new(|ctl| ctl.stop()))
            .expect("register");
        tx.write_all(b"x").expect("write");
        reactor.run().expect("first run");
        assert!(matches!(
            reactor.run(),
            Err(TaError::ReactorState { .. })
        ));
    }

    #[test]
    fn watcher_kinds_are_recorded_in_order() {
        let mut reactor = Reactor::new().expect("backend available");
        let (_tx, rx) = UnixStream::pair().expect("socketpair");
        reactor
            .register_io(&rx, WatchKind::Signal, Box::new(|_| {}))
            .expect("register");
        reactor
            .register_io(&rx, WatchKind::Io, Box::new(|_| {}))
            .expect("register");
        assert_eq!(
            reactor.watcher_kinds(),
            vec![WatchKind::Signal, WatchKind::Io]
        );
    }
}
