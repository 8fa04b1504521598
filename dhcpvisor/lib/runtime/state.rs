use chrono::{DateTime, Utc};
use getset::Getters;

use super::CommandLine;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The lifecycle state of the managed service.
///
/// `Starting` and `Stopping` only last for the duration of a start or stop. At most one instance
/// is ever `Running`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// No instance is running.
    Stopped,

    /// An instance is being launched.
    Starting,

    /// An instance is running.
    Running,

    /// The running instance is being stopped.
    Stopping,

    /// The instance exited without being asked to.
    Exited {
        /// The exit code, if it exited normally.
        exit_code: Option<i32>,
    },

    /// The last launch failed.
    Failed {
        /// The error that occurred.
        error: String,
    },
}

/// The running instance of the managed service.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ProcessHandle {
    /// The instance's process ID.
    pid: u32,

    /// The command line it was started with.
    command_line: CommandLine,

    /// When it was started.
    started_at: DateTime<Utc>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServiceStatus {
    /// Whether an instance is running.
    pub fn is_running(&self) -> bool {
        matches!(self, ServiceStatus::Running)
    }
}

impl ProcessHandle {
    /// Records an instance started just now.
    pub fn new(pid: u32, command_line: CommandLine) -> Self {
        Self {
            pid,
            command_line,
            started_at: Utc::now(),
        }
    }
}
