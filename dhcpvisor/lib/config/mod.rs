//! Configuration of the dhcpvisor daemon itself.
//!
//! This is the daemon's own setup (paths, timeouts, how dnsmasq is invoked). The DHCP
//! configuration it enforces comes from the [configuration store](crate::store).

mod daemon;
mod defaults;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use daemon::*;
pub use defaults::*;
