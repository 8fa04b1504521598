//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable overriding the path of the dnsmasq executable.
pub const DNSMASQ_EXE_ENV_VAR: &str = "DHCPVISOR_DNSMASQ_EXE";

/// Environment variable naming the lease database. Passed on to the managed service so the lease
/// hook it spawns finds the same database.
pub const LEASE_DB_ENV_VAR: &str = "DHCPVISOR_LEASE_DB";

/// Environment variable naming the control socket.
pub const CONTROL_SOCKET_ENV_VAR: &str = "DHCPVISOR_CONTROL_SOCKET";

/// Environment variable dnsmasq sets to the absolute lease expiry, in epoch seconds.
pub const DNSMASQ_LEASE_EXPIRES_ENV_VAR: &str = "DNSMASQ_LEASE_EXPIRES";

/// Environment variable dnsmasq sets to the lease length, in seconds.
pub const DNSMASQ_LEASE_LENGTH_ENV_VAR: &str = "DNSMASQ_LEASE_LENGTH";

/// Environment variable dnsmasq sets to the client identifier.
pub const DNSMASQ_CLIENT_ID_ENV_VAR: &str = "DNSMASQ_CLIENT_ID";
