//! Bootstrap-and-supervision core of a supervised telemetry-collection
//! daemon.
//!
//! The daemon is spawned and supervised by a parent server process. This
//! crate covers the privileged startup sequence (socket, log directory,
//! service credential, privilege drop), the dead-man's-switch supervision
//! channel toward the parent, the single-threaded reactor multiplexing
//! sockets and signals, and a cached container-environment probe used for
//! default selection. The telemetry wire protocol and storage live in
//! external collaborators behind the [`server`] handoff seam.

#[cfg(feature = "cli")]
pub mod cli_app;
pub mod core;
pub mod daemon;
pub mod platform;
pub mod reactor;
pub mod server;
