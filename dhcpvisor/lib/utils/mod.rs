//! Utility constants and helpers for dhcpvisor.

mod env;
mod path;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use env::*;
pub use path::*;
