use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use dhcpvisor::{
    config::ServiceTemplate,
    daemon::{exit_channel, BringUpPolicy, ChangeReactor, ExitHandle},
    runtime::{ServiceCommand, ServiceControl},
    store::{MemoryConfigState, MemoryConfigStore, RangeRow, StaticHostRow, SystemRow},
    DhcpvisorResult,
};
use tokio::task::JoinHandle;

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_change_reaction_starts_after_bring_up() -> anyhow::Result<()> {
    let store = MemoryConfigStore::new(helper::state(0, vec![]));
    let harness = helper::Harness::start(store.clone());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.calls().is_empty());

    store.update(|state| {
        state.system = Some(helper::system(1));
        state.ranges = vec![helper::range("10.0.0.10", "10.0.0.20")];
    });
    harness.wait_for_applies(1).await?;

    let args = helper::applied_args(&harness.calls()[0]);
    let ranges: Vec<_> = args
        .iter()
        .filter(|arg| arg.starts_with("--dhcp-range="))
        .collect();
    assert_eq!(ranges, vec!["--dhcp-range=10.0.0.10,10.0.0.20"]);

    harness.exit().await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_change_reaction_bring_up_gates_service() -> anyhow::Result<()> {
    let store = MemoryConfigStore::new(helper::state(
        0,
        vec![helper::range("10.0.0.10", "10.0.0.20")],
    ));
    let harness = helper::Harness::start(store.clone());

    // Outlasts the bring-up polls, then keeps changing without completing bring-up
    tokio::time::sleep(Duration::from_millis(100)).await;
    for end in ["10.0.0.30", "10.0.0.40"] {
        store.update(|state| state.ranges.push(helper::range("10.0.1.10", end)));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    store.update(|state| state.system = None);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(harness.calls().is_empty());

    let calls = harness.exit().await?;
    assert_eq!(calls, vec![helper::Call::Shutdown]);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_change_reaction_identical_snapshot_is_not_reapplied() -> anyhow::Result<()> {
    let store = MemoryConfigStore::new(helper::state(
        1,
        vec![helper::range("10.0.0.10", "10.0.0.20")],
    ));
    let harness = helper::Harness::start(store.clone());
    harness.wait_for_applies(1).await?;

    // A change that re-reads to the same configuration
    store.update(|_| {});
    store.update(|state| {
        state.ranges = vec![helper::range("10.0.0.10", "10.0.0.20")];
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.calls().len(), 1);

    let calls = harness.exit().await?;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], helper::Call::Shutdown);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_change_reaction_range_change_restarts_service() -> anyhow::Result<()> {
    let store = MemoryConfigStore::new(helper::state(
        1,
        vec![helper::range("10.0.0.10", "10.0.0.20")],
    ));
    let harness = helper::Harness::start(store.clone());
    harness.wait_for_applies(1).await?;

    store.update(|state| {
        state.ranges = vec![helper::range("10.0.0.10", "10.0.0.50")];
    });
    harness.wait_for_applies(2).await?;

    let calls = harness.calls();
    assert!(helper::applied_args(&calls[0]).contains(&"--dhcp-range=10.0.0.10,10.0.0.20".to_string()));
    assert!(helper::applied_args(&calls[1]).contains(&"--dhcp-range=10.0.0.10,10.0.0.50".to_string()));

    harness.exit().await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_change_reaction_reordered_ranges_restart_service() -> anyhow::Result<()> {
    let store = MemoryConfigStore::new(helper::state(
        1,
        vec![
            helper::range("10.0.0.10", "10.0.0.20"),
            helper::range("10.0.1.10", "10.0.1.20"),
        ],
    ));
    let harness = helper::Harness::start(store.clone());
    harness.wait_for_applies(1).await?;

    store.update(|state| state.ranges.swap(0, 1));
    harness.wait_for_applies(2).await?;

    let calls = harness.calls();
    let ranges = |call: &helper::Call| -> Vec<String> {
        helper::applied_args(call)
            .into_iter()
            .filter(|arg| arg.starts_with("--dhcp-range="))
            .collect()
    };
    assert_eq!(
        ranges(&calls[0]),
        vec![
            "--dhcp-range=10.0.0.10,10.0.0.20",
            "--dhcp-range=10.0.1.10,10.0.1.20"
        ]
    );
    assert_eq!(
        ranges(&calls[1]),
        vec![
            "--dhcp-range=10.0.1.10,10.0.1.20",
            "--dhcp-range=10.0.0.10,10.0.0.20"
        ]
    );

    harness.exit().await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_change_reaction_coalesces_pending_changes() -> anyhow::Result<()> {
    let store = MemoryConfigStore::new(helper::state(
        1,
        vec![helper::range("10.0.0.10", "10.0.0.20")],
    ));
    let harness = helper::Harness::start(store.clone());
    harness.wait_for_applies(1).await?;

    // Both land before the loop gets to run again
    store.update(|state| {
        state.static_hosts = vec![StaticHostRow {
            mac_addresses: Some("aa:bb:cc:dd:ee:ff".into()),
            ip_address: Some("10.0.0.5".into()),
            ..Default::default()
        }];
    });
    store.update(|state| {
        state.ranges.push(helper::range("10.0.1.10", "10.0.1.20"));
    });

    harness.wait_for_applies(2).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let calls = harness.calls();
    assert_eq!(calls.len(), 2);

    let args = helper::applied_args(&calls[1]);
    assert!(args.contains(&"--dhcp-host=aa:bb:cc:dd:ee:ff,10.0.0.5".to_string()));
    assert!(args.contains(&"--dhcp-range=10.0.1.10,10.0.1.20".to_string()));

    harness.exit().await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_change_reaction_disabled_service_is_stopped() -> anyhow::Result<()> {
    let store = MemoryConfigStore::new(helper::state(
        1,
        vec![helper::range("10.0.0.10", "10.0.0.20")],
    ));
    let harness = helper::Harness::start(store.clone());
    harness.wait_for_applies(1).await?;

    store.update(|state| {
        state.system = Some(SystemRow {
            cur_cfg: Some(1),
            dhcp_enabled: Some(false),
        });
    });
    harness.wait_for_applies(2).await?;

    assert_eq!(
        harness.calls()[1],
        helper::Call::Apply(ServiceCommand::DoNotRun)
    );

    harness.exit().await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_change_reaction_exit_wakes_idle_loop() -> anyhow::Result<()> {
    let store = MemoryConfigStore::new(helper::state(
        1,
        vec![helper::range("10.0.0.10", "10.0.0.20")],
    ));
    let harness = helper::Harness::start(store);
    harness.wait_for_applies(1).await?;

    let calls = harness.exit().await?;
    assert_eq!(calls.last(), Some(&helper::Call::Shutdown));
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Helpers
//--------------------------------------------------------------------------------------------------

mod helper {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Apply(ServiceCommand),
        Shutdown,
    }

    /// Records every call instead of running anything.
    #[derive(Clone, Default)]
    pub struct RecordingService {
        pub calls: Arc<Mutex<Vec<Call>>>,
    }

    #[async_trait]
    impl ServiceControl for RecordingService {
        async fn apply(&mut self, command: &ServiceCommand) -> DhcpvisorResult<()> {
            self.calls.lock().unwrap().push(Call::Apply(command.clone()));
            Ok(())
        }

        async fn shutdown(&mut self) -> DhcpvisorResult<()> {
            self.calls.lock().unwrap().push(Call::Shutdown);
            Ok(())
        }
    }

    /// A change-reaction loop running in the background over a memory store.
    pub struct Harness {
        calls: Arc<Mutex<Vec<Call>>>,
        exit: ExitHandle,
        running: JoinHandle<DhcpvisorResult<()>>,
    }

    impl Harness {
        pub fn start(store: MemoryConfigStore) -> Self {
            let service = RecordingService::default();
            let calls = service.calls.clone();
            let (exit, signal) = exit_channel();

            let reactor = ChangeReactor::new(
                store,
                service,
                ServiceTemplate::default(),
                BringUpPolicy {
                    poll_interval: Duration::from_millis(10),
                    max_attempts: 3,
                },
            );

            Self {
                calls,
                exit,
                running: tokio::spawn(reactor.run(signal)),
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub async fn wait_for_applies(&self, count: usize) -> anyhow::Result<()> {
            let applies = || {
                self.calls()
                    .iter()
                    .filter(|call| matches!(call, Call::Apply(_)))
                    .count()
            };

            tokio::time::timeout(Duration::from_secs(5), async {
                while applies() < count {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await?;

            Ok(())
        }

        /// Requests exit and returns every call made.
        pub async fn exit(self) -> anyhow::Result<Vec<Call>> {
            self.exit.request_exit();
            tokio::time::timeout(Duration::from_secs(5), self.running).await???;

            let calls = self.calls.lock().unwrap().clone();
            Ok(calls)
        }
    }

    pub fn system(cur_cfg: i64) -> SystemRow {
        SystemRow {
            cur_cfg: Some(cur_cfg),
            dhcp_enabled: Some(true),
        }
    }

    pub fn range(start: &str, end: &str) -> RangeRow {
        RangeRow {
            start_ip_address: Some(start.into()),
            end_ip_address: Some(end.into()),
            ..Default::default()
        }
    }

    pub fn state(cur_cfg: i64, ranges: Vec<RangeRow>) -> MemoryConfigState {
        MemoryConfigState {
            system: Some(system(cur_cfg)),
            ranges,
            ..Default::default()
        }
    }

    pub fn applied_args(call: &Call) -> Vec<String> {
        match call {
            Call::Apply(ServiceCommand::Run(command_line)) => command_line.args.clone(),
            other => panic!("expected a started service, got {:?}", other),
        }
    }
}
