//! OS-facing plumbing: container detection, filesystem permission helpers,
//! and process-group termination.

pub mod container;
pub mod fs;
pub mod process_group;
