//! Lifecycle controller: composes setup, supervision, signals and the
//! reactor into one daemon run, and defines the termination policy.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{debug, error, info};

use crate::core::errors::Result;
use crate::core::options::OptionSet;
use crate::daemon::bootstrap::{self, SetupArtifacts};
use crate::daemon::supervision::SupervisionChannel;
use crate::platform::process_group::ProcessGroup;
use crate::reactor::WatchKind;
use crate::reactor::signals::{DUMP_SIGNAL, SignalWatcher};
use crate::server::TelemetryServer;

/// Normal graceful shutdown.
pub const EXIT_SUCCESS: i32 = 0;
/// Unhandled internal failure (diagnostic printed by the caller).
pub const EXIT_FAILURE: i32 = 1;
/// Dead-man's-switch termination: the supervising parent died.
pub const EXIT_SUPERVISION_LOST: i32 = 2;

/// Run the daemon to completion.
///
/// `Ok(())` means a graceful stop (interrupt or terminate signal). Fatal
/// setup errors propagate to the caller, which prints the diagnostic and
/// exits with [`EXIT_FAILURE`]. Supervision loss never returns: it
/// terminates the whole process group from inside its watcher callback.
pub fn run(options: &OptionSet) -> Result<()> {
    // Adopt the inherited supervision descriptor before anything else
    // opens a file. Setup allocates descriptors (the reactor backend, the
    // listening socket), and in an unsupervised run the first of those
    // would land on the probed descriptor number and be misidentified as
    // the channel.
    let mut supervision = SupervisionChannel::inherit();

    let SetupArtifacts {
        mut reactor,
        listener,
        log_dir,
        accounts,
    } = bootstrap::run(options)?;
    info!(
        privileged = bootstrap::running_privileged(),
        backend = reactor.backend_name(),
        "setup complete"
    );

    let server = Rc::new(RefCell::new(TelemetryServer::new(
        listener,
        accounts,
        log_dir,
        options.log_permissions.clone(),
    )));

    // Dead man's switch: readability means the supervising parent closed
    // its end or died. Hard termination, no graceful path; without the
    // parent this daemon is an unreachable, resource-holding orphan.
    if let Some(channel) = &supervision {
        reactor.register_io(
            channel,
            WatchKind::Io,
            Box::new(|_ctl| {
                error!("supervision channel became readable: parent is gone, terminating process group");
                ProcessGroup::current().terminate_all(EXIT_SUPERVISION_LOST);
            }),
        )?;
    } else {
        debug!("no supervision descriptor inherited; running unsupervised");
    }

    SignalWatcher::new(SIGINT)?.register(&mut reactor, |ctl| {
        info!("caught interrupt signal, exiting");
        ctl.stop();
    })?;
    SignalWatcher::new(SIGTERM)?.register(&mut reactor, |ctl| {
        info!("caught termination signal, exiting");
        ctl.stop();
    })?;

    let dump_server = Rc::clone(&server);
    SignalWatcher::new(DUMP_SIGNAL)?.register(&mut reactor, move |_ctl| {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        if let Err(error) = dump_server.borrow().dump(&mut out) {
            error!(%error, "diagnostic state dump failed");
        }
        let _ = out.flush();
    })?;

    {
        let accept_server = Rc::clone(&server);
        let guard = server.borrow();
        reactor.register_io(
            guard.socket(),
            WatchKind::Io,
            Box::new(move |_ctl| accept_server.borrow_mut().accept_pending()),
        )?;
    }

    // Handshake strictly after full setup and registration, strictly
    // before the reactor starts processing events.
    if let Some(channel) = supervision.as_mut() {
        channel.send_handshake()?;
        debug!("supervision handshake sent");
    }

    info!("entering main loop");
    reactor.run()
}
