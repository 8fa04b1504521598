//! `visorutils::log` is a module containing log file utilities for the dhcpvisor project.

mod rotating;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use rotating::*;
