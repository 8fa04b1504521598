use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::styles;
use crate::{
    config::{DaemonConfig, DEFAULT_CONTROL_SOCKET_PATH, DEFAULT_LEASE_DB_PATH},
    daemon::ControlCommand,
    utils::{CONTROL_SOCKET_ENV_VAR, LEASE_DB_ENV_VAR},
    DhcpvisorResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// dhcpvisord - keeps a DHCP server in line with a configuration database
#[derive(Debug, Parser)]
#[command(name = "dhcpvisord", author, about, version, styles=styles::styles())]
pub struct DhcpvisordArgs {
    /// Daemon configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration store database
    #[arg(short, long, value_name = "DB")]
    pub database: Option<PathBuf>,

    /// Lease store database
    #[arg(long, value_name = "DB")]
    pub lease_database: Option<PathBuf>,

    /// Administrative control socket
    #[arg(long, value_name = "PATH")]
    pub control_socket: Option<PathBuf>,

    /// Directory for captured service output
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// dhcp_leases - records lease events reported by the DHCP server
#[derive(Debug, Parser)]
#[command(name = "dhcp_leases", author, about, version, styles=styles::styles())]
pub struct DhcpLeasesArgs {
    /// Event reported by the server (add, old, del, init, tftp)
    #[arg(value_name = "COMMAND")]
    pub command: String,

    /// Client hardware address
    #[arg(value_name = "MAC")]
    pub mac_address: Option<String>,

    /// Leased address
    #[arg(value_name = "IP")]
    pub ip_address: Option<String>,

    /// Client hostname
    #[arg(value_name = "HOSTNAME")]
    pub hostname: Option<String>,

    /// Client identifier
    #[arg(value_name = "CLIENT_ID")]
    pub client_id: Option<String>,

    /// Lease store database
    #[arg(long, value_name = "DB", env = LEASE_DB_ENV_VAR, default_value_os_t = DEFAULT_LEASE_DB_PATH.clone())]
    pub lease_database: PathBuf,

    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// dhcpvisorctl - administers a running dhcpvisord
#[derive(Debug, Parser)]
#[command(name = "dhcpvisorctl", author, about, version, styles=styles::styles())]
pub struct DhcpvisorctlArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: DhcpvisorctlSubcommand,

    /// Administrative control socket
    #[arg(long, value_name = "PATH", env = CONTROL_SOCKET_ENV_VAR, default_value_os_t = DEFAULT_CONTROL_SOCKET_PATH.clone())]
    pub control_socket: PathBuf,
}

/// Commands understood by the daemon
#[derive(Debug, Subcommand)]
pub enum DhcpvisorctlSubcommand {
    /// Stop the DHCP server and exit the daemon
    #[command(name = "exit")]
    Exit,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DhcpvisordArgs {
    /// Builds the daemon configuration: the file given with `--config` if any, else defaults,
    /// with command-line options taking precedence.
    pub async fn load_config(&self) -> DhcpvisorResult<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::load(path).await?,
            None => DaemonConfig::default(),
        };

        if let Some(database) = &self.database {
            config.config_database = database.clone();
        }

        if let Some(lease_database) = &self.lease_database {
            config.lease_database = lease_database.clone();
        }

        if let Some(control_socket) = &self.control_socket {
            config.control_socket = control_socket.clone();
        }

        if let Some(log_dir) = &self.log_dir {
            config.log_dir = log_dir.clone();
        }

        Ok(config)
    }
}

impl DhcpLeasesArgs {
    /// The positional arguments after the command, in order, up to the last one given.
    pub fn positional(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            &self.mac_address,
            &self.ip_address,
            &self.hostname,
            &self.client_id,
        ]
        .into_iter()
        .map(|arg| arg.clone().unwrap_or_default())
        .collect();

        while args.last().is_some_and(|arg| arg.is_empty()) {
            args.pop();
        }

        args
    }
}

impl DhcpvisorctlSubcommand {
    /// The control command sent to the daemon.
    pub fn control_command(&self) -> ControlCommand {
        match self {
            DhcpvisorctlSubcommand::Exit => ControlCommand::Exit,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_arg_definitions_are_valid() {
        DhcpvisordArgs::command().debug_assert();
        DhcpLeasesArgs::command().debug_assert();
        DhcpvisorctlArgs::command().debug_assert();
    }

    #[tokio::test]
    async fn test_command_line_overrides_config_file() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let file = temp_dir.path().join("dhcpvisord.toml");
        tokio::fs::write(
            &file,
            "config_database = \"/from/file.db\"\nlog_dir = \"/from/file/log\"\nstop_timeout_ms = 250\n",
        )
        .await?;

        let args = DhcpvisordArgs::try_parse_from([
            "dhcpvisord",
            "--config",
            file.to_str().unwrap(),
            "-d",
            "/from/cli.db",
            "-vv",
        ])?;
        let config = args.load_config().await?;

        assert_eq!(args.verbose, 2);
        assert_eq!(config.get_config_database(), &PathBuf::from("/from/cli.db"));
        assert_eq!(config.get_log_dir(), &PathBuf::from("/from/file/log"));
        assert_eq!(*config.get_stop_timeout_ms(), 250);
        Ok(())
    }

    #[test]
    fn test_hook_positional_arguments() -> anyhow::Result<()> {
        let args = DhcpLeasesArgs::try_parse_from([
            "dhcp_leases",
            "--lease-database",
            "/tmp/leases.db",
            "add",
            "AA:BB:CC:DD:EE:FF",
            "10.0.0.5",
        ])?;

        assert_eq!(args.command, "add");
        assert_eq!(args.positional(), vec!["AA:BB:CC:DD:EE:FF", "10.0.0.5"]);
        assert_eq!(args.lease_database, PathBuf::from("/tmp/leases.db"));

        let args = DhcpLeasesArgs::try_parse_from(["dhcp_leases", "init"])?;
        assert!(args.positional().is_empty());
        Ok(())
    }

    #[test]
    fn test_ctl_exit_subcommand() -> anyhow::Result<()> {
        let args = DhcpvisorctlArgs::try_parse_from([
            "dhcpvisorctl",
            "--control-socket",
            "/tmp/ctl.sock",
            "exit",
        ])?;

        assert_eq!(args.subcommand.control_command(), ControlCommand::Exit);
        assert_eq!(args.control_socket, PathBuf::from("/tmp/ctl.sock"));
        Ok(())
    }
}
