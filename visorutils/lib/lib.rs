//! `visorutils` is a library containing general utilities for the dhcpvisor project.
//!
//! Nothing in here knows about DHCP. The crate provides:
//! - [`ChildSupervisor`]: owns exactly one child process and stops it gracefully
//! - [`ProcessMonitor`]: a hook that receives the child's output streams
//! - [`RotatingLog`]: a size-bounded log file for captured child output
//! - [`sweep_by_name`] and [`terminate_pid`]: bounded cleanup of stale processes

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod error;
pub mod log;
pub mod path;
pub mod runtime;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use error::*;
pub use log::*;
pub use path::*;
pub use runtime::*;
