use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{ChildStderr, ChildStdout},
    task::JoinHandle,
};
use visorutils::{ProcessMonitor, RotatingLog, SyncChannelWriter, VisorutilsResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long output pumps get to drain after the service has exited.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Watches the managed DHCP service while it runs.
///
/// Records the service pid in a pid file for startup recovery, copies its output line by line
/// into a rotating log, and forwards each line to `tracing` at debug level.
pub struct ServiceMonitor {
    /// Where the running service's pid is recorded
    pid_file: PathBuf,

    /// Largest log file before rotation
    log_max_size: u64,

    /// The log of the current instance
    log: Option<RotatingLog>,

    /// Output pump tasks of the current instance
    pumps: Vec<JoinHandle<()>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServiceMonitor {
    /// Creates a monitor that records pids in `pid_file`.
    pub fn new(pid_file: impl Into<PathBuf>, log_max_size: u64) -> Self {
        Self {
            pid_file: pid_file.into(),
            log_max_size,
            log: None,
            pumps: Vec::new(),
        }
    }

    /// The pid file this monitor maintains.
    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    /// The log of the instance being monitored, if any.
    pub fn log_path(&self) -> Option<&Path> {
        self.log.as_ref().map(|log| log.path())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ProcessMonitor for ServiceMonitor {
    async fn start(
        &mut self,
        pid: u32,
        stdout: ChildStdout,
        stderr: ChildStderr,
        log_path: PathBuf,
    ) -> VisorutilsResult<()> {
        let log = RotatingLog::with_max_size(&log_path, self.log_max_size).await?;

        self.pumps = vec![
            spawn_pump(stdout, log.get_sync_writer(), pid, "stdout"),
            spawn_pump(stderr, log.get_sync_writer(), pid, "stderr"),
        ];
        self.log = Some(log);

        visorutils::write_pid_file(&self.pid_file, pid).await?;
        tracing::debug!(pid, log = %log_path.display(), "monitoring service output");

        Ok(())
    }

    async fn stop(&mut self) -> VisorutilsResult<()> {
        let pumps = std::mem::take(&mut self.pumps);
        let aborts: Vec<_> = pumps.iter().map(|pump| pump.abort_handle()).collect();

        // A grandchild can keep the pipes open after the service itself is gone
        if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, futures::future::join_all(pumps))
            .await
            .is_err()
        {
            tracing::debug!("service output still open after exit, detaching");
            aborts.iter().for_each(|abort| abort.abort());
        }

        if let Some(log) = self.log.take() {
            log.close().await;
        }

        visorutils::remove_pid_file(&self.pid_file).await
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn spawn_pump(
    stream: impl AsyncRead + Unpin + Send + 'static,
    mut writer: SyncChannelWriter,
    pid: u32,
    name: &'static str,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(pid, stream = name, "failed to read service output: {}", e);
                    break;
                }
            }

            let text = String::from_utf8_lossy(&line);
            tracing::debug!(pid, stream = name, "{}", text.trim_end());

            if let Err(e) = writer.write_all(&line).and_then(|_| writer.flush()) {
                tracing::error!(pid, stream = name, "failed to write service log: {}", e);
            }
        }
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::process::Stdio;

    use tempfile::TempDir;
    use tokio::process::Command;

    use super::*;

    #[tokio::test]
    async fn test_output_is_logged_and_pid_file_cleaned_up() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let pid_file = temp_dir.path().join("run").join("dnsmasq.pid");
        let log_path = temp_dir.path().join("service.log");

        let mut child = Command::new("/bin/sh")
            .args(["-c", "echo out-line; echo err-line >&2"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let pid = child.id().expect("child has a pid");
        let stdout = child.stdout.take().expect("stdout is piped");
        let stderr = child.stderr.take().expect("stderr is piped");

        let mut monitor = ServiceMonitor::new(&pid_file, 1024 * 1024);
        monitor.start(pid, stdout, stderr, log_path.clone()).await?;
        assert_eq!(visorutils::read_pid_file(&pid_file).await, Some(pid));
        assert_eq!(monitor.log_path(), Some(log_path.as_path()));

        child.wait().await?;
        monitor.stop().await?;

        let contents = tokio::fs::read_to_string(&log_path).await?;
        assert!(contents.contains("out-line\n"));
        assert!(contents.contains("err-line\n"));
        assert!(!pid_file.exists());
        assert_eq!(monitor.log_path(), None);
        Ok(())
    }
}
