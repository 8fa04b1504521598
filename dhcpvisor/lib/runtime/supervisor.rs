use std::{path::Path, process::ExitStatus, time::Duration};

use async_trait::async_trait;
use visorutils::ChildSupervisor;

use super::{CommandLine, ProcessHandle, ServiceCommand, ServiceMonitor, ServiceStatus};
use crate::{
    config::DaemonConfig,
    utils::{LEASE_DB_ENV_VAR, SERVICE_LOG_PREFIX},
    DhcpvisorError, DhcpvisorResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Control over the managed service, as used by the change-reaction loop.
#[async_trait]
pub trait ServiceControl: Send {
    /// Brings the service in line with `command`.
    ///
    /// A running instance is always stopped first, so two instances never overlap. For
    /// [`ServiceCommand::DoNotRun`] nothing is started afterwards.
    async fn apply(&mut self, command: &ServiceCommand) -> DhcpvisorResult<()>;

    /// Stops the running instance, if any. Must be called before the daemon exits.
    async fn shutdown(&mut self) -> DhcpvisorResult<()>;

    /// Notices an instance that exited on its own. The instance is not restarted.
    async fn check(&mut self) -> DhcpvisorResult<()> {
        Ok(())
    }
}

/// Supervises the managed DHCP service process.
///
/// Owns the single child process through a [`ChildSupervisor`] and tracks its lifecycle as a
/// [`ServiceStatus`].
pub struct ServiceSupervisor {
    /// The owned child process
    child: ChildSupervisor<ServiceMonitor>,

    /// Lifecycle state
    status: ServiceStatus,

    /// The running instance
    handle: Option<ProcessHandle>,

    /// Grace period between `SIGTERM` and `SIGKILL`
    stop_timeout: Duration,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServiceSupervisor {
    /// Creates a supervisor with nothing running.
    ///
    /// The service inherits the daemon's environment, plus the lease database location so the
    /// lease hook it runs writes to the right store.
    pub fn new(config: &DaemonConfig) -> Self {
        let monitor = ServiceMonitor::new(config.service_pid_file(), config.service_log_max_size);
        let child_name = config
            .service
            .program_name()
            .unwrap_or_else(|| "service".to_string());
        let child_envs = [(
            LEASE_DB_ENV_VAR,
            config.lease_database.display().to_string(),
        )];

        Self {
            child: ChildSupervisor::new(
                child_name,
                SERVICE_LOG_PREFIX,
                &config.log_dir,
                child_envs,
                monitor,
            ),
            status: ServiceStatus::Stopped,
            handle: None,
            stop_timeout: config.stop_timeout(),
        }
    }

    /// The current lifecycle state.
    pub fn status(&self) -> &ServiceStatus {
        &self.status
    }

    /// The running instance, if any.
    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.handle.as_ref()
    }

    /// The pid file recording the running instance.
    pub fn pid_file(&self) -> &Path {
        self.child.process_monitor().pid_file()
    }

    /// Reaps the instance if it has exited on its own.
    pub async fn reap(&mut self) -> Option<ExitStatus> {
        match self.child.reap_exited().await {
            Ok(Some(status)) => {
                let pid = self.handle.as_ref().map(|handle| *handle.get_pid());
                tracing::error!(?pid, %status, "service exited unexpectedly, waiting for the next configuration change");
                self.handle = None;
                self.status = ServiceStatus::Exited {
                    exit_code: status.code(),
                };
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("failed to check on service: {}", e);
                None
            }
        }
    }

    async fn stop_current(&mut self) -> DhcpvisorResult<()> {
        if !self.child.has_child() {
            self.handle = None;
            if self.status.is_running() {
                self.status = ServiceStatus::Stopped;
            }
            return Ok(());
        }

        self.status = ServiceStatus::Stopping;
        let result = self.child.stop(self.stop_timeout).await;
        self.handle = None;
        self.status = ServiceStatus::Stopped;

        if let Some(status) = result? {
            tracing::info!(%status, "service stopped");
        }

        Ok(())
    }

    async fn start(&mut self, command_line: &CommandLine) -> DhcpvisorResult<()> {
        self.status = ServiceStatus::Starting;

        match self
            .child
            .start(&command_line.program, &command_line.args)
            .await
        {
            Ok(pid) => {
                tracing::info!(pid, command = %command_line, "service started");
                self.handle = Some(ProcessHandle::new(pid, command_line.clone()));
                self.status = ServiceStatus::Running;
                Ok(())
            }
            Err(e) => {
                // The process may be up even though monitoring it failed
                if self.child.has_child() {
                    if let Err(stop_error) = self.child.stop(self.stop_timeout).await {
                        tracing::warn!("failed to stop unmonitored service: {}", stop_error);
                    }
                }

                let error = format!("{}: {}", command_line.program.display(), e);
                self.status = ServiceStatus::Failed {
                    error: error.clone(),
                };
                Err(DhcpvisorError::ServiceLaunch(error))
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ServiceControl for ServiceSupervisor {
    async fn apply(&mut self, command: &ServiceCommand) -> DhcpvisorResult<()> {
        self.reap().await;
        self.stop_current().await?;

        match command {
            ServiceCommand::DoNotRun => {
                tracing::info!("service disabled, nothing to run");
                Ok(())
            }
            ServiceCommand::Run(command_line) => self.start(command_line).await,
        }
    }

    async fn shutdown(&mut self) -> DhcpvisorResult<()> {
        self.reap().await;
        self.stop_current().await
    }

    async fn check(&mut self) -> DhcpvisorResult<()> {
        self.reap().await;
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;
    use crate::config::ServiceTemplate;

    fn config(temp_dir: &TempDir) -> DaemonConfig {
        DaemonConfig::builder()
            .run_dir(temp_dir.path().join("run"))
            .log_dir(temp_dir.path().join("log"))
            .lease_database(temp_dir.path().join("leases.db"))
            .service(ServiceTemplate::builder().program("/bin/sh").build())
            .stop_timeout_ms(2_000)
            .build()
    }

    fn shell(script: &str) -> ServiceCommand {
        ServiceCommand::Run(CommandLine {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
        })
    }

    #[tokio::test]
    async fn test_apply_replaces_running_instance() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let mut supervisor = ServiceSupervisor::new(&config(&temp_dir));

        supervisor.apply(&shell("exec sleep 30")).await?;
        let first = *supervisor.handle().expect("running").get_pid();
        assert!(supervisor.status().is_running());
        assert_eq!(visorutils::read_pid_file(supervisor.pid_file()).await, Some(first));

        supervisor.apply(&shell("exec sleep 30")).await?;
        let second = *supervisor.handle().expect("running").get_pid();
        assert_ne!(first, second);
        assert!(visorutils::process_name(first).is_none());

        supervisor.shutdown().await?;
        assert_eq!(supervisor.status(), &ServiceStatus::Stopped);
        assert!(supervisor.handle().is_none());
        assert!(!supervisor.pid_file().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_do_not_run_stops_instance() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let mut supervisor = ServiceSupervisor::new(&config(&temp_dir));

        supervisor.apply(&shell("exec sleep 30")).await?;
        supervisor.apply(&ServiceCommand::DoNotRun).await?;

        assert_eq!(supervisor.status(), &ServiceStatus::Stopped);
        assert!(supervisor.handle().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let mut supervisor = ServiceSupervisor::new(&config(&temp_dir));

        let missing = ServiceCommand::Run(CommandLine {
            program: temp_dir.path().join("no-such-dnsmasq"),
            args: vec![],
        });

        let result = supervisor.apply(&missing).await;
        assert!(matches!(result, Err(DhcpvisorError::ServiceLaunch(_))));
        assert!(matches!(supervisor.status(), ServiceStatus::Failed { .. }));
        assert!(supervisor.handle().is_none());

        // The next apply starts normally
        supervisor.apply(&shell("exec sleep 30")).await?;
        assert!(supervisor.status().is_running());
        supervisor.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_unexpected_exit_is_noticed() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let mut supervisor = ServiceSupervisor::new(&config(&temp_dir));

        supervisor.apply(&shell("exit 7")).await?;

        let mut status = None;
        for _ in 0..50 {
            status = supervisor.reap().await;
            if status.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(status.and_then(|status| status.code()), Some(7));
        assert_eq!(
            supervisor.status(),
            &ServiceStatus::Exited { exit_code: Some(7) }
        );
        assert!(supervisor.handle().is_none());

        supervisor.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_stubborn_instance_is_killed() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let config = DaemonConfig {
            stop_timeout_ms: 200,
            ..config(&temp_dir)
        };
        let mut supervisor = ServiceSupervisor::new(&config);

        supervisor
            .apply(&shell("trap '' TERM; while true; do sleep 1; done"))
            .await?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = tokio::time::Instant::now();
        supervisor.shutdown().await?;
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(supervisor.status(), &ServiceStatus::Stopped);
        Ok(())
    }
}
