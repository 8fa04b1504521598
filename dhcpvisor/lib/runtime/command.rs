use std::{
    fmt::{self, Display},
    path::PathBuf,
};

use crate::{config::ServiceTemplate, models::ConfigurationSnapshot};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Flag that turns on the built-in TFTP server.
pub const TFTP_ENABLE_FLAG: &str = "--enable-tftp";

/// Flag that sets the TFTP root directory.
pub const TFTP_ROOT_FLAG: &str = "--tftp-root";

/// Flag that restricts TFTP to files owned by the service user.
pub const TFTP_SECURE_FLAG: &str = "--tftp-secure";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An executable and the arguments it is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// The executable.
    pub program: PathBuf,

    /// Arguments, not including the executable.
    pub args: Vec<String>,
}

/// What the managed service should be doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCommand {
    /// No instance should run.
    DoNotRun,

    /// Exactly one instance should run with this command line.
    Run(CommandLine),
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Renders a snapshot into the service command.
///
/// The result only depends on the inputs. Base arguments come first, then one range flag per
/// address range and one host flag per static host in snapshot order, then one option flag per
/// option, then the TFTP flags when TFTP is enabled. A disabled service, or a snapshot taken
/// before bring-up, renders to [`ServiceCommand::DoNotRun`].
pub fn render_command(template: &ServiceTemplate, snapshot: &ConfigurationSnapshot) -> ServiceCommand {
    if !snapshot.bring_up_complete || !snapshot.service_enabled {
        return ServiceCommand::DoNotRun;
    }

    let mut args = template.base_args.clone();

    args.extend(
        snapshot
            .address_ranges
            .iter()
            .map(|range| format!("{}={}", template.range_flag, range)),
    );

    args.extend(
        snapshot
            .static_hosts
            .iter()
            .map(|host| format!("{}={}", template.host_flag, host)),
    );

    args.extend(
        snapshot
            .options
            .iter()
            .map(|option| format!("{}={}", template.option_flag, option)),
    );

    if snapshot.tftp.enabled {
        args.push(TFTP_ENABLE_FLAG.to_string());

        if let Some(root) = &snapshot.tftp.root_path {
            args.push(format!("{}={}", TFTP_ROOT_FLAG, root));
        }

        if snapshot.tftp.secure {
            args.push(TFTP_SECURE_FLAG.to_string());
        }

        args.extend(
            snapshot
                .tftp_interfaces
                .iter()
                .map(|interface| format!("{}={}", template.interface_flag, interface)),
        );
    }

    ServiceCommand::Run(CommandLine {
        program: template.program.clone(),
        args,
    })
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
