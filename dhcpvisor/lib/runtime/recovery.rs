use visorutils::SweepReport;

use crate::{config::DaemonConfig, DhcpvisorResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Cleans up service instances left behind by a previous daemon that did not shut down cleanly.
///
/// Runs once at startup, before anything is launched. The pid recorded in the service pid file
/// is terminated if it still names the service executable. Then, if enabled, processes with
/// exactly the service's executable name that also carry this daemon's
/// [instance marker](crate::config::ServiceTemplate::instance_marker) are terminated, up to the
/// configured limit. Same-name processes started by anything else, and the daemon itself, are
/// never touched.
pub async fn recover_stale_service(config: &DaemonConfig) -> DhcpvisorResult<SweepReport> {
    let mut report = SweepReport::default();
    let pid_file = config.service_pid_file();
    let program_name = config.service.program_name();
    let grace = config.stop_timeout();

    if let Some(pid) = visorutils::read_pid_file(&pid_file).await {
        match visorutils::process_name(pid) {
            Some(name) if Some(&name) == program_name.as_ref() => {
                tracing::warn!(pid, name = %name, "terminating service left running by a previous run");
                if visorutils::terminate_pid(pid, grace).await? {
                    report.killed.push(pid);
                }
                report.terminated.push(pid);
            }
            Some(name) => {
                tracing::debug!(pid, name = %name, "recorded pid now belongs to another process");
            }
            None => tracing::debug!(pid, "recorded service pid is gone"),
        }

        visorutils::remove_pid_file(&pid_file).await?;
    }

    if !config.sweep_stale_processes {
        return Ok(report);
    }

    let Some(name) = program_name else {
        return Ok(report);
    };

    let Some(marker) = config.service.instance_marker() else {
        tracing::warn!(
            name = %name,
            "service arguments carry no lease hook, skipping stale process sweep"
        );
        return Ok(report);
    };

    let swept = visorutils::sweep_by_name(
        &name,
        marker,
        &report.terminated,
        config.sweep_limit,
        grace,
    )
    .await?;
    if !swept.terminated.is_empty() {
        tracing::warn!(name = %name, pids = ?swept.terminated, "terminated stale service processes");
    }

    report.terminated.extend(swept.terminated);
    report.killed.extend(swept.killed);
    report.skipped.extend(swept.skipped);

    Ok(report)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
