use std::{path::PathBuf, sync::LazyLock};

use crate::utils::{
    CONFIG_DB_FILENAME, CONTROL_SOCKET_FILENAME, DHCPVISOR_LOG_DIR, DHCPVISOR_RUN_DIR,
    DHCPVISOR_STATE_DIR, LEASE_DB_FILENAME,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The default dnsmasq executable.
pub const DEFAULT_DNSMASQ_EXE: &str = "/usr/sbin/dnsmasq";

/// The default location of the lease hook dnsmasq runs on every lease event.
pub const DEFAULT_LEASE_HOOK_EXE: &str = "/usr/bin/dhcp_leases";

/// Flag that names the lease hook script.
pub const LEASE_HOOK_FLAG: &str = "--dhcp-script";

/// Flag that introduces an address range.
///
/// dnsmasq's own spelling, which renders ranges as `--dhcp-range=10.0.0.10,10.0.0.20` rather than
/// `--range=10.0.0.10-10.0.0.20`. See "Flag spelling" in `DESIGN.md`. Override it through
/// [`ServiceTemplate`](super::ServiceTemplate) to drive a service with other option names.
pub const DEFAULT_RANGE_FLAG: &str = "--dhcp-range";

/// Flag that introduces a static host.
pub const DEFAULT_HOST_FLAG: &str = "--dhcp-host";

/// Flag that introduces a DHCP option.
pub const DEFAULT_OPTION_FLAG: &str = "--dhcp-option";

/// Flag that restricts the service to an interface.
pub const DEFAULT_INTERFACE_FLAG: &str = "--interface";

/// How long a stopping service gets between `SIGTERM` and `SIGKILL`, in milliseconds.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 5_000;

/// How many times connecting to the configuration store is attempted.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

/// Pause between configuration store connection attempts, in milliseconds.
pub const DEFAULT_CONNECT_RETRY_INTERVAL_MS: u64 = 1_000;

/// Pause between bring-up polls, in milliseconds.
pub const DEFAULT_BRING_UP_POLL_INTERVAL_MS: u64 = 2_000;

/// How many bring-up polls are made before giving up.
pub const DEFAULT_BRING_UP_MAX_ATTEMPTS: u32 = 150;

/// How often the SQLite configuration store is checked for changes, in milliseconds.
pub const DEFAULT_CHANGE_POLL_INTERVAL_MS: u64 = 500;

/// The most stale service processes a startup sweep will terminate.
pub const DEFAULT_SWEEP_LIMIT: usize = 8;

/// Largest captured service log before it is rotated, in bytes.
pub const DEFAULT_SERVICE_LOG_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// The default configuration store database.
pub static DEFAULT_CONFIG_DB_PATH: LazyLock<PathBuf> =
    LazyLock::new(|| PathBuf::from(DHCPVISOR_STATE_DIR).join(CONFIG_DB_FILENAME));

/// The default lease store database.
pub static DEFAULT_LEASE_DB_PATH: LazyLock<PathBuf> =
    LazyLock::new(|| PathBuf::from(DHCPVISOR_STATE_DIR).join(LEASE_DB_FILENAME));

/// The default control socket.
pub static DEFAULT_CONTROL_SOCKET_PATH: LazyLock<PathBuf> =
    LazyLock::new(|| PathBuf::from(DHCPVISOR_RUN_DIR).join(CONTROL_SOCKET_FILENAME));

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The arguments every dnsmasq invocation starts with.
///
/// dnsmasq stays in the foreground so it can be supervised, DNS is switched off, and leases are
/// reported to the lease hook instead of a lease file.
pub fn default_base_args() -> Vec<String> {
    vec![
        "--keep-in-foreground".to_string(),
        "--port=0".to_string(),
        "--user=root".to_string(),
        format!("{}={}", LEASE_HOOK_FLAG, DEFAULT_LEASE_HOOK_EXE),
        "--leasefile-ro".to_string(),
    ]
}

/// The default directory for runtime state.
pub fn default_run_dir() -> PathBuf {
    PathBuf::from(DHCPVISOR_RUN_DIR)
}

/// The default directory for service logs.
pub fn default_log_dir() -> PathBuf {
    PathBuf::from(DHCPVISOR_LOG_DIR)
}
