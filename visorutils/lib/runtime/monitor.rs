use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::ChildStderr;
use tokio::process::ChildStdout;

use crate::VisorutilsResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A trait for monitoring supervised processes.
///
/// The supervisor hands over the child's output streams right after spawning it and calls
/// [`stop`](ProcessMonitor::stop) once the child has been reaped.
#[async_trait]
pub trait ProcessMonitor {
    /// Start monitoring a process
    async fn start(
        &mut self,
        pid: u32,
        stdout: ChildStdout,
        stderr: ChildStderr,
        log_path: PathBuf,
    ) -> VisorutilsResult<()>;

    /// Stop monitoring
    async fn stop(&mut self) -> VisorutilsResult<()>;
}
