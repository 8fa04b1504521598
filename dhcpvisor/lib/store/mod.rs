//! Access to the configuration store the daemon enforces.
//!
//! A [`ConfigStore`] hands out raw rows, exactly as written by whoever administers the store, and
//! signals when anything changed. [`read_snapshot`] turns those rows into a validated
//! [`ConfigurationSnapshot`](crate::models::ConfigurationSnapshot).

mod memory;
mod snapshot;
mod sqlite;
mod validate;

use async_trait::async_trait;

use crate::ConfigStoreResult;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use memory::*;
pub use snapshot::*;
pub use sqlite::*;
pub use validate::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The tables of the configuration store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigTable {
    /// System-wide state such as bring-up progress.
    System,

    /// Dynamic address pools.
    Ranges,

    /// Fixed address bindings.
    StaticHosts,

    /// DHCP options.
    Options,

    /// Interfaces TFTP is served on.
    TftpInterfaces,

    /// TFTP server settings.
    TftpSettings,
}

/// The system row.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct SystemRow {
    /// Configuration generation. Bring-up is complete once this is positive.
    pub cur_cfg: Option<i64>,

    /// Whether the DHCP service should run. Missing means enabled.
    pub dhcp_enabled: Option<bool>,
}

/// An address range row.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct RangeRow {
    /// Range name.
    pub name: Option<String>,

    /// First address.
    pub start_ip_address: Option<String>,

    /// Last address.
    pub end_ip_address: Option<String>,

    /// Netmask.
    pub netmask: Option<String>,

    /// Broadcast address.
    pub broadcast: Option<String>,

    /// Lease duration in minutes, `0` for infinite.
    pub lease_duration: Option<i64>,

    /// Tag set on served clients.
    pub set_tag: Option<String>,

    /// Comma-separated tags a client must carry.
    pub match_tags: Option<String>,
}

/// A static host row.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct StaticHostRow {
    /// Comma-separated hardware addresses.
    pub mac_addresses: Option<String>,

    /// Bound address.
    pub ip_address: Option<String>,

    /// Hostname given to the client.
    pub client_hostname: Option<String>,

    /// Lease duration in minutes, `0` for infinite.
    pub lease_duration: Option<i64>,

    /// Tag set on the client.
    pub set_tag: Option<String>,
}

/// A DHCP option row.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct OptionRow {
    /// Option number.
    pub option_number: Option<i64>,

    /// Option name.
    pub option_name: Option<String>,

    /// Option value.
    pub option_value: Option<String>,

    /// Comma-separated tags a client must carry.
    pub match_tags: Option<String>,

    /// Whether this is a DHCPv6 option.
    pub is_ipv6: Option<bool>,
}

/// A TFTP interface row.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct TftpInterfaceRow {
    /// Interface name.
    pub name: Option<String>,
}

/// The TFTP settings row.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct TftpSettingsRow {
    /// Whether TFTP is served.
    pub enabled: Option<bool>,

    /// Directory files are served from.
    pub root_path: Option<String>,

    /// Only serve files owned by the service user.
    pub secure: Option<bool>,
}

/// Every table of the store, read as one view.
///
/// Each table keeps its own result, so one unreadable table does not hide the others.
#[derive(Debug)]
pub struct TableRows {
    /// The system row.
    pub system: ConfigStoreResult<Option<SystemRow>>,

    /// The address range rows in store order.
    pub ranges: ConfigStoreResult<Vec<RangeRow>>,

    /// The static host rows in store order.
    pub static_hosts: ConfigStoreResult<Vec<StaticHostRow>>,

    /// The DHCP option rows in store order.
    pub options: ConfigStoreResult<Vec<OptionRow>>,

    /// The TFTP interface rows.
    pub tftp_interfaces: ConfigStoreResult<Vec<TftpInterfaceRow>>,

    /// The TFTP settings row.
    pub tftp_settings: ConfigStoreResult<Option<TftpSettingsRow>>,
}

/// A source of configuration rows that can report changes.
///
/// Reads return the store's current contents. [`changed`](ConfigStore::changed) resolves once the
/// store has changed since the previous call returned, at least once per change; several changes
/// may be coalesced into one notification. It is cancel safe.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Reads the system row, if the store has one.
    async fn system(&self) -> ConfigStoreResult<Option<SystemRow>>;

    /// Reads the address range rows in store order.
    async fn ranges(&self) -> ConfigStoreResult<Vec<RangeRow>>;

    /// Reads the static host rows in store order.
    async fn static_hosts(&self) -> ConfigStoreResult<Vec<StaticHostRow>>;

    /// Reads the DHCP option rows in store order.
    async fn options(&self) -> ConfigStoreResult<Vec<OptionRow>>;

    /// Reads the TFTP interface rows.
    async fn tftp_interfaces(&self) -> ConfigStoreResult<Vec<TftpInterfaceRow>>;

    /// Reads the TFTP settings row, if the store has one.
    async fn tftp_settings(&self) -> ConfigStoreResult<Option<TftpSettingsRow>>;

    /// Reads every table as one view of the store.
    ///
    /// By default the tables are read one after another, so a write landing in between shows up
    /// in some tables and not in others. Stores that can isolate a read override this.
    async fn read_tables(&self) -> TableRows {
        TableRows::read_each(self).await
    }

    /// Waits for the next change and returns the store's change sequence number.
    async fn changed(&mut self) -> ConfigStoreResult<u64>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TableRows {
    /// Reads the tables of `store` one call at a time.
    pub async fn read_each<S>(store: &S) -> Self
    where
        S: ConfigStore + ?Sized,
    {
        Self {
            system: store.system().await,
            ranges: store.ranges().await,
            static_hosts: store.static_hosts().await,
            options: store.options().await,
            tftp_interfaces: store.tftp_interfaces().await,
            tftp_settings: store.tftp_settings().await,
        }
    }
}

impl ConfigTable {
    /// The table's name in the store.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigTable::System => "system",
            ConfigTable::Ranges => "dhcp_ranges",
            ConfigTable::StaticHosts => "dhcp_static_hosts",
            ConfigTable::Options => "dhcp_options",
            ConfigTable::TftpInterfaces => "tftp_interfaces",
            ConfigTable::TftpSettings => "tftp_settings",
        }
    }
}
