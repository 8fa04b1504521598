//! The lease record store and the hook adapter that feeds it.
//!
//! dnsmasq runs the lease hook on every lease event. The hook turns the event into exactly one
//! call on a [`LeaseStore`] and, on `init`, prints the stored leases back so dnsmasq can restore
//! them after a restart.

mod event;
mod memory;
mod sqlite;
mod store;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use event::*;
pub use memory::*;
pub use sqlite::*;
pub use store::*;
