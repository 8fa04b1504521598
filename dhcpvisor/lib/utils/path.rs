//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The directory runtime state such as pid files and the control socket lives in.
pub const DHCPVISOR_RUN_DIR: &str = "/var/run/dhcpvisor";

/// The directory persistent databases live in.
pub const DHCPVISOR_STATE_DIR: &str = "/var/lib/dhcpvisor";

/// The directory captured service output is written to.
pub const DHCPVISOR_LOG_DIR: &str = "/var/log/dhcpvisor";

/// The filename of the configuration store database.
pub const CONFIG_DB_FILENAME: &str = "config.db";

/// The filename of the lease store database.
pub const LEASE_DB_FILENAME: &str = "leases.db";

/// The filename of the administrative control socket.
pub const CONTROL_SOCKET_FILENAME: &str = "dhcpvisord.ctl";

/// The stem of the managed service's pid file.
pub const SERVICE_PID_STEM: &str = "dnsmasq";

/// Prefix of the managed service's output logs.
pub const SERVICE_LOG_PREFIX: &str = "service";
