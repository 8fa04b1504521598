use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::process::{ExitStatus, Stdio};
use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::fs::create_dir_all;
use tokio::process::{Child, Command};

use crate::path::LOG_SUFFIX;
use crate::{ProcessMonitor, VisorutilsError, VisorutilsResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A supervisor that owns at most one child process and its output monitoring.
///
/// Unlike a fire-and-forget spawn, the supervisor keeps the [`Child`] handle so the child can be
/// stopped, reaped and replaced. Starting while a child is still owned is refused; callers stop
/// first.
pub struct ChildSupervisor<M>
where
    M: ProcessMonitor + Send,
{
    /// Name of the child process
    child_name: String,

    /// Prefix for the child's log file
    child_log_prefix: String,

    /// Path to the supervisor's log directory
    log_dir: PathBuf,

    /// Environment variables for the child process
    child_envs: Vec<(String, String)>,

    /// The output monitor
    process_monitor: M,

    /// The managed child
    child: Option<Child>,

    /// The managed child process ID
    child_pid: Option<u32>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<M> ChildSupervisor<M>
where
    M: ProcessMonitor + Send,
{
    /// Creates a new supervisor instance with no child.
    ///
    /// ## Arguments
    ///
    /// * `child_name` - Name of the child process, used in log file names
    /// * `child_log_prefix` - Prefix for the child's log file
    /// * `log_dir` - Directory the child's output log is written to
    /// * `child_envs` - Environment variables for the child process
    /// * `process_monitor` - The process monitor to use
    pub fn new(
        child_name: impl Into<String>,
        child_log_prefix: impl Into<String>,
        log_dir: impl AsRef<Path>,
        child_envs: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
        process_monitor: M,
    ) -> Self {
        Self {
            child_name: child_name.into(),
            child_log_prefix: child_log_prefix.into(),
            log_dir: log_dir.as_ref().to_path_buf(),
            child_envs: child_envs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            process_monitor,
            child: None,
            child_pid: None,
        }
    }

    /// The pid of the owned child, if any.
    pub fn child_pid(&self) -> Option<u32> {
        self.child_pid
    }

    /// Whether a child is currently owned. An owned child may have exited without being reaped yet.
    pub fn has_child(&self) -> bool {
        self.child.is_some()
    }

    /// The monitor receiving the child's output.
    pub fn process_monitor(&self) -> &M {
        &self.process_monitor
    }

    /// Generates a unique child ID using name, process ID, and current timestamp.
    ///
    /// The ID format is: "{name}-{pid}-{timestamp}"
    fn generate_child_id(&self, child_pid: u32) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        format!("{}-{}-{}", self.child_name, child_pid, timestamp)
    }

    /// Spawns the child and hands its output to the process monitor.
    ///
    /// Returns the pid of the new child. Fails with [`VisorutilsError::ChildAlreadyRunning`] if a
    /// child is still owned.
    pub async fn start(
        &mut self,
        child_exe: impl AsRef<Path>,
        child_args: &[String],
    ) -> VisorutilsResult<u32> {
        if let Some(pid) = self.child_pid {
            return Err(VisorutilsError::ChildAlreadyRunning(pid));
        }

        create_dir_all(&self.log_dir).await?;

        let mut child = Command::new(child_exe.as_ref())
            .args(child_args)
            .envs(self.child_envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let Some(child_pid) = child.id() else {
            return Err(VisorutilsError::MissingChildPid);
        };

        let child_id = self.generate_child_id(child_pid);
        let child_log_name = format!("{}-{}.{}", self.child_log_prefix, child_id, LOG_SUFFIX);
        let child_log_path = self.log_dir.join(child_log_name);

        // Record the handle before monitoring so a monitor failure still leaves a stoppable child
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        self.child = Some(child);
        self.child_pid = Some(child_pid);

        if let (Some(stdout), Some(stderr)) = (stdout, stderr) {
            self.process_monitor
                .start(child_pid, stdout, stderr, child_log_path)
                .await?;
        }

        tracing::info!(pid = child_pid, name = %self.child_name, "started child process");
        Ok(child_pid)
    }

    /// Reaps the child if it has already exited on its own.
    ///
    /// Returns the exit status when the child was found dead; the handle is cleared in that case.
    pub async fn reap_exited(&mut self) -> VisorutilsResult<Option<ExitStatus>> {
        let status = match self.child.as_mut() {
            Some(child) => child.try_wait()?,
            None => return Ok(None),
        };

        if status.is_some() {
            self.child = None;
            self.child_pid = None;
            self.process_monitor.stop().await?;
        }

        Ok(status)
    }

    /// Stops the owned child.
    ///
    /// Sends `SIGTERM`, waits up to `grace` for the child to exit, then sends `SIGKILL` and reaps
    /// it. Returns `None` if no child was owned. The handle is cleared even when signalling fails.
    pub async fn stop(&mut self, grace: Duration) -> VisorutilsResult<Option<ExitStatus>> {
        let Some(mut child) = self.child.take() else {
            return Ok(None);
        };
        let child_pid = self.child_pid.take();

        let status = match child.try_wait()? {
            Some(status) => {
                tracing::info!(pid = ?child_pid, %status, "child process had already exited");
                status
            }
            None => terminate_child(&mut child, child_pid, grace).await?,
        };

        self.process_monitor.stop().await?;
        Ok(Some(status))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

async fn terminate_child(
    child: &mut Child,
    child_pid: Option<u32>,
    grace: Duration,
) -> VisorutilsResult<ExitStatus> {
    if let Some(pid) = child_pid {
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::error!("failed to send SIGTERM to process {}: {}", pid, e);
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => {
            let status = status?;
            tracing::info!(pid = ?child_pid, %status, "child process stopped");
            Ok(status)
        }
        Err(_) => {
            tracing::warn!(
                pid = ?child_pid,
                grace_ms = grace.as_millis() as u64,
                "child process ignored SIGTERM, sending SIGKILL"
            );
            child.kill().await?;
            let status = child.wait().await?;
            Ok(status)
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
