use std::{
    collections::BTreeSet,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use tokio::sync::watch;

use super::{
    ConfigStore, ConfigTable, OptionRow, RangeRow, StaticHostRow, SystemRow, TableRows,
    TftpInterfaceRow, TftpSettingsRow,
};
use crate::{ConfigStoreError, ConfigStoreResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The contents of a [`MemoryConfigStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryConfigState {
    /// The system row.
    pub system: Option<SystemRow>,

    /// Address range rows.
    pub ranges: Vec<RangeRow>,

    /// Static host rows.
    pub static_hosts: Vec<StaticHostRow>,

    /// DHCP option rows.
    pub options: Vec<OptionRow>,

    /// TFTP interface rows.
    pub tftp_interfaces: Vec<TftpInterfaceRow>,

    /// The TFTP settings row.
    pub tftp_settings: Option<TftpSettingsRow>,

    /// Tables whose reads fail.
    pub failing: BTreeSet<ConfigTable>,
}

/// A configuration store held in memory.
///
/// Clones share contents. Every [`update`](MemoryConfigStore::update) counts as one change, and
/// each clone tracks on its own which changes it has seen.
#[derive(Debug, Clone)]
pub struct MemoryConfigStore {
    state: Arc<RwLock<MemoryConfigState>>,
    changes: Arc<watch::Sender<u64>>,
    seen: watch::Receiver<u64>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MemoryConfigStore {
    /// Creates a store with the given contents.
    pub fn new(state: MemoryConfigState) -> Self {
        let (changes, seen) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(state)),
            changes: Arc::new(changes),
            seen,
        }
    }

    /// Modifies the contents and notifies every clone of the change.
    pub fn update(&self, modify: impl FnOnce(&mut MemoryConfigState)) {
        match self.state.write() {
            Ok(mut state) => modify(&mut state),
            Err(poisoned) => modify(&mut poisoned.into_inner()),
        }

        self.changes.send_modify(|seqno| *seqno += 1);
    }

    /// The number of updates made so far.
    pub fn seqno(&self) -> u64 {
        *self.changes.borrow()
    }

    fn read<T>(
        &self,
        table: ConfigTable,
        select: impl FnOnce(&MemoryConfigState) -> T,
    ) -> ConfigStoreResult<T> {
        let state = self.state.read().map_err(|_| ConfigStoreError::TableUnavailable {
            table: table.table_name(),
            reason: "store lock poisoned".to_string(),
        })?;

        select_from(&state, table, select)
    }

    /// Every table read under one lock, or `None` if the lock is poisoned.
    fn locked_table_rows(&self) -> Option<TableRows> {
        let state = self.state.read().ok()?;

        Some(TableRows {
            system: select_from(&state, ConfigTable::System, |state| state.system.clone()),
            ranges: select_from(&state, ConfigTable::Ranges, |state| state.ranges.clone()),
            static_hosts: select_from(&state, ConfigTable::StaticHosts, |state| {
                state.static_hosts.clone()
            }),
            options: select_from(&state, ConfigTable::Options, |state| state.options.clone()),
            tftp_interfaces: select_from(&state, ConfigTable::TftpInterfaces, |state| {
                state.tftp_interfaces.clone()
            }),
            tftp_settings: select_from(&state, ConfigTable::TftpSettings, |state| {
                state.tftp_settings.clone()
            }),
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn select_from<T>(
    state: &MemoryConfigState,
    table: ConfigTable,
    select: impl FnOnce(&MemoryConfigState) -> T,
) -> ConfigStoreResult<T> {
    if state.failing.contains(&table) {
        return Err(ConfigStoreError::TableUnavailable {
            table: table.table_name(),
            reason: "read refused".to_string(),
        });
    }

    Ok(select(state))
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new(MemoryConfigState::default())
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn system(&self) -> ConfigStoreResult<Option<SystemRow>> {
        self.read(ConfigTable::System, |state| state.system.clone())
    }

    async fn ranges(&self) -> ConfigStoreResult<Vec<RangeRow>> {
        self.read(ConfigTable::Ranges, |state| state.ranges.clone())
    }

    async fn static_hosts(&self) -> ConfigStoreResult<Vec<StaticHostRow>> {
        self.read(ConfigTable::StaticHosts, |state| state.static_hosts.clone())
    }

    async fn options(&self) -> ConfigStoreResult<Vec<OptionRow>> {
        self.read(ConfigTable::Options, |state| state.options.clone())
    }

    async fn tftp_interfaces(&self) -> ConfigStoreResult<Vec<TftpInterfaceRow>> {
        self.read(ConfigTable::TftpInterfaces, |state| {
            state.tftp_interfaces.clone()
        })
    }

    async fn tftp_settings(&self) -> ConfigStoreResult<Option<TftpSettingsRow>> {
        self.read(ConfigTable::TftpSettings, |state| {
            state.tftp_settings.clone()
        })
    }

    async fn read_tables(&self) -> TableRows {
        match self.locked_table_rows() {
            Some(rows) => rows,
            None => TableRows::read_each(self).await,
        }
    }

    async fn changed(&mut self) -> ConfigStoreResult<u64> {
        self.seen
            .changed()
            .await
            .map_err(|_| ConfigStoreError::Closed)?;

        Ok(*self.seen.borrow_and_update())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
