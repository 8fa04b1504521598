//! Command-line arguments of the dhcpvisor binaries.

mod args;
mod logging;
pub mod styles;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use args::*;
pub use logging::*;
