//! Supervision of the managed DHCP service.

mod command;
mod monitor;
mod recovery;
mod state;
mod supervisor;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use command::*;
pub use monitor::*;
pub use recovery::*;
pub use state::*;
pub use supervisor::*;
