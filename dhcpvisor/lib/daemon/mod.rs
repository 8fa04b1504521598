//! The `dhcpvisord` daemon.
//!
//! [`run_daemon`] ties the pieces together: it opens the control channel, cleans up after a
//! previous run, connects to the configuration store and hands control to the
//! [`ChangeReactor`] until an exit is requested.

mod control;
mod reactor;

use tokio::{
    signal::unix::{signal, Signal, SignalKind},
    task::JoinHandle,
};

use crate::{
    config::DaemonConfig,
    runtime::{recover_stale_service, ServiceControl, ServiceSupervisor},
    store::SqliteConfigStore,
    utils::DNSMASQ_EXE_ENV_VAR,
    DhcpvisorError, DhcpvisorResult,
};

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use control::*;
pub use reactor::*;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Runs the daemon until an exit is requested over the control channel or by a signal.
///
/// Returns an error only for the fatal cases: the control channel cannot be created, or the
/// configuration store stays unreachable after every connection attempt. The managed service is
/// stopped before this returns, whatever the outcome.
pub async fn run_daemon(mut config: DaemonConfig) -> DhcpvisorResult<()> {
    match visorutils::resolve_env_path(DNSMASQ_EXE_ENV_VAR, &config.service.program) {
        Ok(program) => config.service.program = program,
        Err(e) => tracing::error!("service executable not found, launches will fail: {}", e),
    }

    let (exit, mut exit_signal) = exit_channel();

    let control = ControlServer::bind(&config.control_socket).await?;
    let control_path = control.path().to_path_buf();
    let control_task = tokio::spawn(control.serve(exit.clone()));

    let signal_task = match forward_signals(exit.clone()) {
        Ok(task) => Some(task),
        Err(e) => {
            tracing::warn!("failed to install signal handlers: {}", e);
            None
        }
    };

    match recover_stale_service(&config).await {
        Ok(report) if !report.terminated.is_empty() => {
            tracing::info!(terminated = ?report.terminated, killed = ?report.killed, "recovered stale service processes");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("failed to clean up after previous run: {}", e),
    }

    let mut service = ServiceSupervisor::new(&config);
    let result = match connect_with_retry(&config, &mut exit_signal).await {
        Ok(Some(store)) => {
            ChangeReactor::new(
                store,
                service,
                config.service.clone(),
                BringUpPolicy::from(&config),
            )
            .run(exit_signal)
            .await
        }
        Ok(None) => {
            tracing::info!("exit requested while connecting to configuration store");
            service.shutdown().await
        }
        Err(e) => {
            if let Err(stop_error) = service.shutdown().await {
                tracing::error!("failed to stop service: {}", stop_error);
            }
            Err(e)
        }
    };

    control_task.abort();
    if let Some(task) = signal_task {
        task.abort();
    }

    match tokio::fs::remove_file(&control_path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %control_path.display(), "failed to remove control socket: {}", e);
        }
        _ => {}
    }

    result
}

/// Connects to the configuration store, retrying a bounded number of times.
///
/// Returns `None` if exit was requested while waiting between attempts.
async fn connect_with_retry(
    config: &DaemonConfig,
    exit: &mut ExitSignal,
) -> DhcpvisorResult<Option<SqliteConfigStore>> {
    let attempts = config.connect_attempts.max(1);

    for attempt in 1..=attempts {
        match SqliteConfigStore::connect(&config.config_database, config.change_poll_interval())
            .await
        {
            Ok(store) => {
                tracing::info!(database = %config.config_database.display(), "connected to configuration store");
                return Ok(Some(store));
            }
            Err(e) => {
                tracing::info!(attempt, attempts, "configuration store not reachable yet: {}", e);
            }
        }

        if attempt < attempts {
            tokio::select! {
                biased;
                _ = exit.requested() => return Ok(None),
                _ = tokio::time::sleep(config.connect_retry_interval()) => {}
            }
        }
    }

    Err(DhcpvisorError::StoreUnreachable {
        endpoint: config.config_database.display().to_string(),
        attempts,
    })
}

/// Turns `SIGTERM` and `SIGINT` into exit requests.
fn forward_signals(exit: ExitHandle) -> DhcpvisorResult<JoinHandle<()>> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        let name = wait_for_either(&mut terminate, &mut interrupt).await;
        tracing::info!(signal = name, "received signal, exiting");
        exit.request_exit();
    }))
}

async fn wait_for_either(terminate: &mut Signal, interrupt: &mut Signal) -> &'static str {
    tokio::select! {
        _ = terminate.recv() => "SIGTERM",
        _ = interrupt.recv() => "SIGINT",
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
