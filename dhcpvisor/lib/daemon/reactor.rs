use std::time::Duration;

use crate::{
    config::{DaemonConfig, ServiceTemplate},
    models::ConfigurationSnapshot,
    runtime::{render_command, ServiceControl},
    store::{read_snapshot, ConfigStore},
    ConfigStoreError, DhcpvisorResult,
};

use super::ExitSignal;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How long the loop waits for the store to finish bring-up before it starts acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BringUpPolicy {
    /// Pause between polls.
    pub poll_interval: Duration,

    /// Polls made before giving up on waiting.
    pub max_attempts: u32,
}

/// What a wake of the loop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// The store has not finished bring-up. Nothing was done.
    NotReady,

    /// The configuration matches what was last applied. Nothing was done.
    Unchanged,

    /// A new configuration was applied.
    Applied,

    /// Applying a new configuration failed. It is still recorded as applied.
    ApplyFailed(String),
}

enum BringUp {
    Complete(ConfigurationSnapshot),
    Exhausted,
    ExitRequested,
}

/// The change-reaction loop.
///
/// Waits for the configuration store to finish bring-up, starts the service, then keeps the
/// service in line with the store until exit is requested. The service is always shut down
/// before [`run`](ChangeReactor::run) returns.
pub struct ChangeReactor<S, C> {
    store: S,
    service: C,
    template: ServiceTemplate,
    bring_up: BringUpPolicy,
    last_applied: Option<ConfigurationSnapshot>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<S, C> ChangeReactor<S, C>
where
    S: ConfigStore,
    C: ServiceControl,
{
    /// Creates a loop over `store` driving `service`. Nothing has been applied yet.
    pub fn new(store: S, service: C, template: ServiceTemplate, bring_up: BringUpPolicy) -> Self {
        Self {
            store,
            service,
            template,
            bring_up,
            last_applied: None,
        }
    }

    /// The configuration most recently handed to the service.
    pub fn last_applied(&self) -> Option<&ConfigurationSnapshot> {
        self.last_applied.as_ref()
    }

    /// The service being driven.
    pub fn service(&self) -> &C {
        &self.service
    }

    /// The configuration store being watched.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs until exit is requested or the store closes, then shuts the service down.
    pub async fn run(mut self, mut exit: ExitSignal) -> DhcpvisorResult<()> {
        let result = self.drive(&mut exit).await;

        if let Err(e) = self.service.shutdown().await {
            tracing::error!("failed to stop service on exit: {}", e);
        }

        tracing::info!("change-reaction loop stopped");
        result
    }

    /// Re-reads the store and applies the result if it differs from what was last applied.
    pub async fn react(&mut self) -> Reaction {
        let snapshot = read_snapshot(&self.store).await;

        if !snapshot.bring_up_complete {
            tracing::debug!("configuration store is not ready, ignoring change");
            return Reaction::NotReady;
        }

        if self.last_applied.as_ref() == Some(&snapshot) {
            tracing::debug!("configuration unchanged");
            return Reaction::Unchanged;
        }

        self.apply_snapshot(snapshot).await
    }

    async fn drive(&mut self, exit: &mut ExitSignal) -> DhcpvisorResult<()> {
        match self.wait_for_bring_up(exit).await {
            BringUp::Complete(snapshot) => {
                tracing::info!("configuration store bring-up complete");
                self.apply_snapshot(snapshot).await;
            }
            BringUp::Exhausted => {
                tracing::warn!(
                    attempts = self.bring_up.max_attempts,
                    "configuration store bring-up still incomplete, waiting for changes"
                );
            }
            BringUp::ExitRequested => {
                tracing::info!("exit requested during bring-up");
                return Ok(());
            }
        }

        loop {
            tokio::select! {
                biased;

                _ = exit.requested() => {
                    tracing::info!("exit requested");
                    return Ok(());
                }

                changed = self.store.changed() => match changed {
                    Ok(seqno) => {
                        tracing::debug!(seqno, "configuration store changed");
                        if let Err(e) = self.service.check().await {
                            tracing::warn!("failed to check on service: {}", e);
                        }
                        self.react().await;
                    }
                    Err(ConfigStoreError::Closed) => {
                        tracing::error!("configuration store closed");
                        return Err(ConfigStoreError::Closed.into());
                    }
                    Err(e) => tracing::warn!("failed to wait for configuration changes: {}", e),
                },
            }
        }
    }

    async fn wait_for_bring_up(&mut self, exit: &mut ExitSignal) -> BringUp {
        for attempt in 1..=self.bring_up.max_attempts.max(1) {
            let snapshot = read_snapshot(&self.store).await;
            if snapshot.bring_up_complete {
                return BringUp::Complete(snapshot);
            }

            tracing::info!(attempt, "waiting for configuration store bring-up");

            tokio::select! {
                biased;
                _ = exit.requested() => return BringUp::ExitRequested,
                _ = tokio::time::sleep(self.bring_up.poll_interval) => {}
            }
        }

        BringUp::Exhausted
    }

    async fn apply_snapshot(&mut self, snapshot: ConfigurationSnapshot) -> Reaction {
        let command = render_command(&self.template, &snapshot);
        let result = self.service.apply(&command).await;

        // Recorded even on failure, so a bad configuration is retried only once it changes
        self.last_applied = Some(snapshot);

        match result {
            Ok(()) => {
                tracing::info!("applied new configuration");
                Reaction::Applied
            }
            Err(e) => {
                tracing::error!("failed to apply configuration: {}", e);
                Reaction::ApplyFailed(e.to_string())
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl From<&DaemonConfig> for BringUpPolicy {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            poll_interval: config.bring_up_poll_interval(),
            max_attempts: config.bring_up_max_attempts,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
