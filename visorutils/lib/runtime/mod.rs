//! `visorutils::runtime` is a module containing process supervision utilities for the dhcpvisor project.

mod monitor;
mod supervisor;
mod sweep;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use monitor::*;
pub use supervisor::*;
pub use sweep::*;
