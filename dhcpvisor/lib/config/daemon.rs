use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use visorutils::PID_SUFFIX;

use super::{
    default_base_args, default_log_dir, default_run_dir, DEFAULT_BRING_UP_MAX_ATTEMPTS,
    DEFAULT_BRING_UP_POLL_INTERVAL_MS, DEFAULT_CHANGE_POLL_INTERVAL_MS, DEFAULT_CONFIG_DB_PATH,
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_RETRY_INTERVAL_MS, DEFAULT_CONTROL_SOCKET_PATH,
    DEFAULT_DNSMASQ_EXE, DEFAULT_HOST_FLAG, DEFAULT_INTERFACE_FLAG, DEFAULT_LEASE_DB_PATH,
    DEFAULT_OPTION_FLAG, DEFAULT_RANGE_FLAG, DEFAULT_SERVICE_LOG_MAX_SIZE,
    DEFAULT_STOP_TIMEOUT_MS, DEFAULT_SWEEP_LIMIT, LEASE_HOOK_FLAG,
};
use crate::{utils::SERVICE_PID_STEM, DhcpvisorResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How the managed DHCP service is invoked.
///
/// The flag spellings are kept here rather than hard-coded so a service with different option
/// names can be driven by the same rendering.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default, deny_unknown_fields)]
pub struct ServiceTemplate {
    /// The service executable.
    #[builder(default = PathBuf::from(DEFAULT_DNSMASQ_EXE), setter(into))]
    pub(crate) program: PathBuf,

    /// Arguments that start every invocation.
    #[builder(default = default_base_args())]
    pub(crate) base_args: Vec<String>,

    /// Flag an address range is passed with.
    #[builder(default = DEFAULT_RANGE_FLAG.to_string(), setter(into))]
    pub(crate) range_flag: String,

    /// Flag a static host is passed with.
    #[builder(default = DEFAULT_HOST_FLAG.to_string(), setter(into))]
    pub(crate) host_flag: String,

    /// Flag a DHCP option is passed with.
    #[builder(default = DEFAULT_OPTION_FLAG.to_string(), setter(into))]
    pub(crate) option_flag: String,

    /// Flag a TFTP interface is passed with.
    #[builder(default = DEFAULT_INTERFACE_FLAG.to_string(), setter(into))]
    pub(crate) interface_flag: String,
}

/// The daemon's own configuration, optionally loaded from a TOML file.
///
/// Every field has a default, so a file only needs to name what it changes:
///
/// ```toml
/// config_database = "/tmp/config.db"
/// stop_timeout_ms = 2000
///
/// [service]
/// program = "/usr/local/sbin/dnsmasq"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// The configuration store database.
    #[builder(default = DEFAULT_CONFIG_DB_PATH.clone(), setter(into))]
    pub(crate) config_database: PathBuf,

    /// The lease store database.
    #[builder(default = DEFAULT_LEASE_DB_PATH.clone(), setter(into))]
    pub(crate) lease_database: PathBuf,

    /// The administrative control socket.
    #[builder(default = DEFAULT_CONTROL_SOCKET_PATH.clone(), setter(into))]
    pub(crate) control_socket: PathBuf,

    /// Where the service pid file is kept.
    #[builder(default = default_run_dir(), setter(into))]
    pub(crate) run_dir: PathBuf,

    /// Where captured service output is written.
    #[builder(default = default_log_dir(), setter(into))]
    pub(crate) log_dir: PathBuf,

    /// How the service is invoked.
    #[builder(default)]
    pub(crate) service: ServiceTemplate,

    /// Grace period between `SIGTERM` and `SIGKILL`.
    #[builder(default = DEFAULT_STOP_TIMEOUT_MS)]
    pub(crate) stop_timeout_ms: u64,

    /// Connection attempts made against the configuration store.
    #[builder(default = DEFAULT_CONNECT_ATTEMPTS)]
    pub(crate) connect_attempts: u32,

    /// Pause between connection attempts.
    #[builder(default = DEFAULT_CONNECT_RETRY_INTERVAL_MS)]
    pub(crate) connect_retry_interval_ms: u64,

    /// Pause between bring-up polls.
    #[builder(default = DEFAULT_BRING_UP_POLL_INTERVAL_MS)]
    pub(crate) bring_up_poll_interval_ms: u64,

    /// Bring-up polls made before giving up.
    #[builder(default = DEFAULT_BRING_UP_MAX_ATTEMPTS)]
    pub(crate) bring_up_max_attempts: u32,

    /// How often the SQLite configuration store is checked for changes.
    #[builder(default = DEFAULT_CHANGE_POLL_INTERVAL_MS)]
    pub(crate) change_poll_interval_ms: u64,

    /// Whether stale service processes are swept at startup.
    ///
    /// Only processes carrying this daemon's lease hook argument are swept, see
    /// [`ServiceTemplate::instance_marker`].
    #[builder(default = true)]
    pub(crate) sweep_stale_processes: bool,

    /// The most processes a startup sweep terminates.
    #[builder(default = DEFAULT_SWEEP_LIMIT)]
    pub(crate) sweep_limit: usize,

    /// Largest captured service log before rotation, in bytes.
    #[builder(default = DEFAULT_SERVICE_LOG_MAX_SIZE)]
    pub(crate) service_log_max_size: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServiceTemplate {
    /// The executable's file name, which is what its processes are named.
    pub fn program_name(&self) -> Option<String> {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// The base argument that tells instances started by this daemon apart from other processes
    /// running the same executable: the lease hook argument.
    pub fn instance_marker(&self) -> Option<&str> {
        let prefix = format!("{}=", LEASE_HOOK_FLAG);
        self.base_args
            .iter()
            .find(|arg| arg.starts_with(&prefix))
            .map(String::as_str)
    }
}

impl DaemonConfig {
    /// Reads the configuration from a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> DhcpvisorResult<Self> {
        let contents = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::parse(&contents)
    }

    /// Parses the configuration from TOML text.
    pub fn parse(contents: &str) -> DhcpvisorResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// The pid file recording the running service.
    pub fn service_pid_file(&self) -> PathBuf {
        self.run_dir
            .join(format!("{}.{}", SERVICE_PID_STEM, PID_SUFFIX))
    }

    /// Grace period between `SIGTERM` and `SIGKILL`.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Pause between configuration store connection attempts.
    pub fn connect_retry_interval(&self) -> Duration {
        Duration::from_millis(self.connect_retry_interval_ms)
    }

    /// Pause between bring-up polls.
    pub fn bring_up_poll_interval(&self) -> Duration {
        Duration::from_millis(self.bring_up_poll_interval_ms)
    }

    /// How often the SQLite configuration store is checked for changes.
    pub fn change_poll_interval(&self) -> Duration {
        Duration::from_millis(self.change_poll_interval_ms)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ServiceTemplate {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
