//! Daemon subsystem: privileged bootstrap, supervision channel, and the
//! lifecycle controller tying them to the reactor.

pub mod bootstrap;
#[cfg(feature = "daemon")]
pub mod lifecycle;
pub mod supervision;
