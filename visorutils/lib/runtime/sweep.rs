//! Bounded cleanup of stale processes left behind by a previous run.
//!
//! This is a startup-only recovery routine. Steady-state stopping always goes through the
//! [`ChildSupervisor`](crate::ChildSupervisor) handle.

use std::{ffi::OsStr, time::Duration};

use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use sysinfo::{Pid as SysPid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use crate::VisorutilsResult;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How often a signalled process is checked for exit.
const LIVENESS_POLL_INTERVAL: Duration = Duration::from_millis(50);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What a sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pids that were sent `SIGTERM`.
    pub terminated: Vec<u32>,

    /// Pids that ignored `SIGTERM` and were sent `SIGKILL`.
    pub killed: Vec<u32>,

    /// Matching pids left alone because the limit was reached.
    pub skipped: Vec<u32>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the executable name of `pid`, or `None` if no such process exists.
pub fn process_name(pid: u32) -> Option<String> {
    let sys_pid = SysPid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
    system
        .process(sys_pid)
        .map(|process| process.name().to_string_lossy().into_owned())
}

/// Terminates processes named exactly `name` that were started with the argument `marker`, up to
/// `limit` processes.
///
/// The calling process and any pid in `exclude` are never touched. The name must match exactly,
/// never as a substring, and `marker` must appear as a whole argument. A process of the same
/// name started by someone else, without the marker, survives.
pub async fn sweep_by_name(
    name: &str,
    marker: &str,
    exclude: &[u32],
    limit: usize,
    grace: Duration,
) -> VisorutilsResult<SweepReport> {
    let own_pid = std::process::id();
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );

    let mut candidates: Vec<u32> = system
        .processes_by_exact_name(OsStr::new(name))
        .filter(|process| process.cmd().iter().any(|arg| arg == marker))
        .map(|process| process.pid().as_u32())
        .filter(|pid| *pid != own_pid && !exclude.contains(pid))
        .collect();
    candidates.sort_unstable();

    let mut report = SweepReport::default();
    if candidates.len() > limit {
        report.skipped = candidates.split_off(limit);
        tracing::warn!(
            name,
            limit,
            skipped = report.skipped.len(),
            "more stale processes than the sweep limit allows"
        );
    }

    for pid in candidates {
        match terminate_pid(pid, grace).await {
            Ok(true) => {
                report.terminated.push(pid);
                report.killed.push(pid);
            }
            Ok(false) => report.terminated.push(pid),
            Err(e) => tracing::warn!(pid, error = %e, "failed to terminate stale process"),
        }
    }

    Ok(report)
}

/// Sends `SIGTERM` to `pid`, waits up to `grace`, then sends `SIGKILL` if it is still alive.
///
/// Returns `true` if `SIGKILL` was needed. A pid that is already gone counts as terminated.
pub async fn terminate_pid(pid: u32, grace: Duration) -> VisorutilsResult<bool> {
    let target = Pid::from_raw(pid as i32);

    match signal::kill(target, Signal::SIGTERM) {
        Err(Errno::ESRCH) => return Ok(false),
        other => other?,
    }

    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if !is_alive(pid) {
            return Ok(false);
        }
        tokio::time::sleep(LIVENESS_POLL_INTERVAL).await;
    }

    if !is_alive(pid) {
        return Ok(false);
    }

    match signal::kill(target, Signal::SIGKILL) {
        Err(Errno::ESRCH) => Ok(false),
        other => other.map(|_| true).map_err(Into::into),
    }
}

/// Whether `pid` still exists and is not a zombie.
fn is_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    let sys_pid = SysPid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
    match system.process(sys_pid) {
        Some(process) => !matches!(process.status(), sysinfo::ProcessStatus::Zombie),
        None => false,
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[test]
    fn test_process_name_of_self() {
        let name = process_name(std::process::id());
        assert!(name.is_some());
    }

    #[tokio::test]
    async fn test_terminate_pid_gone_process() -> anyhow::Result<()> {
        let mut child = Command::new("/bin/sh")
            .args(["-c", "exit 0"])
            .stdout(Stdio::null())
            .spawn()?;
        let pid = child.id().unwrap();
        child.wait().await?;

        assert!(!terminate_pid(pid, Duration::from_millis(100)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_without_matches_is_empty() -> anyhow::Result<()> {
        let report = sweep_by_name(
            "visorutils-no-such-process-name",
            "--visorutils-marker",
            &[],
            4,
            Duration::from_millis(100),
        )
        .await?;
        assert_eq!(report, SweepReport::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_spares_same_name_without_marker() -> anyhow::Result<()> {
        let marker = format!("--visorutils-sweep-{}", std::process::id());
        let mut unrelated = Command::new("/bin/sh")
            .args(["-c", "sleep 10; :", "sh"])
            .stdout(Stdio::null())
            .spawn()?;
        let mut stale = Command::new("/bin/sh")
            .args(["-c", "sleep 10; :", "sh", marker.as_str()])
            .stdout(Stdio::null())
            .spawn()?;
        let unrelated_pid = unrelated.id().unwrap();
        let stale_pid = stale.id().unwrap();

        let report = sweep_by_name("sh", &marker, &[], 4, Duration::from_secs(2)).await?;
        assert_eq!(report.terminated, vec![stale_pid]);
        assert!(!stale.wait().await?.success());

        assert!(unrelated.try_wait()?.is_none());
        assert!(is_alive(unrelated_pid));

        unrelated.kill().await?;
        Ok(())
    }
}
