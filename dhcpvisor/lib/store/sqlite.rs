use std::{path::Path, time::Duration};

use async_trait::async_trait;
use sqlx::{Executor, Pool, Row, Sqlite};
use tokio::time::{self, Interval, MissedTickBehavior};

use super::{
    ConfigStore, OptionRow, RangeRow, StaticHostRow, SystemRow, TableRows, TftpInterfaceRow,
    TftpSettingsRow,
};
use crate::{
    management::{self, CONFIG_DB_MIGRATOR},
    ConfigStoreResult, DhcpvisorResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A configuration store kept in an SQLite database.
///
/// Every write to a configuration table bumps a sequence number through triggers. Changes are
/// detected by polling that number.
#[derive(Debug)]
pub struct SqliteConfigStore {
    pool: Pool<Sqlite>,
    poll: Interval,
    last_seqno: i64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SqliteConfigStore {
    /// Opens the store at `db_path`, creating and migrating it if needed.
    ///
    /// Changes made before this call are not reported by [`changed`](ConfigStore::changed).
    pub async fn connect(db_path: impl AsRef<Path>, poll_interval: Duration) -> DhcpvisorResult<Self> {
        let pool = management::get_or_create_db_pool(db_path, &CONFIG_DB_MIGRATOR).await?;
        Ok(Self::from_pool(pool, poll_interval).await?)
    }

    /// Wraps an already migrated pool.
    pub async fn from_pool(pool: Pool<Sqlite>, poll_interval: Duration) -> ConfigStoreResult<Self> {
        let last_seqno = read_seqno(&pool).await?;
        let mut poll = time::interval(poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            pool,
            poll,
            last_seqno,
        })
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn system(&self) -> ConfigStoreResult<Option<SystemRow>> {
        fetch_system(&self.pool).await
    }

    async fn ranges(&self) -> ConfigStoreResult<Vec<RangeRow>> {
        fetch_ranges(&self.pool).await
    }

    async fn static_hosts(&self) -> ConfigStoreResult<Vec<StaticHostRow>> {
        fetch_static_hosts(&self.pool).await
    }

    async fn options(&self) -> ConfigStoreResult<Vec<OptionRow>> {
        fetch_options(&self.pool).await
    }

    async fn tftp_interfaces(&self) -> ConfigStoreResult<Vec<TftpInterfaceRow>> {
        fetch_tftp_interfaces(&self.pool).await
    }

    async fn tftp_settings(&self) -> ConfigStoreResult<Option<TftpSettingsRow>> {
        fetch_tftp_settings(&self.pool).await
    }

    /// Reads every table inside one read transaction, so writers committing meanwhile are
    /// either fully visible or not at all.
    async fn read_tables(&self) -> TableRows {
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!(
                    "failed to begin read transaction, reading tables one by one: {}",
                    e
                );
                return TableRows::read_each(self).await;
            }
        };

        let rows = TableRows {
            system: fetch_system(&mut *tx).await,
            ranges: fetch_ranges(&mut *tx).await,
            static_hosts: fetch_static_hosts(&mut *tx).await,
            options: fetch_options(&mut *tx).await,
            tftp_interfaces: fetch_tftp_interfaces(&mut *tx).await,
            tftp_settings: fetch_tftp_settings(&mut *tx).await,
        };

        if let Err(e) = tx.rollback().await {
            tracing::debug!("failed to end read transaction: {}", e);
        }

        rows
    }

    async fn changed(&mut self) -> ConfigStoreResult<u64> {
        loop {
            self.poll.tick().await;

            match read_seqno(&self.pool).await {
                Ok(seqno) if seqno != self.last_seqno => {
                    self.last_seqno = seqno;
                    return Ok(seqno as u64);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("failed to poll configuration store for changes: {}", e);
                }
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

async fn read_seqno(pool: &Pool<Sqlite>) -> ConfigStoreResult<i64> {
    let seqno = sqlx::query("SELECT seqno FROM store_changes WHERE id = 1")
        .fetch_optional(pool)
        .await?
        .map(|row| row.get::<i64, _>("seqno"))
        .unwrap_or_default();

    Ok(seqno)
}

async fn fetch_system<'e, E>(executor: E) -> ConfigStoreResult<Option<SystemRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, SystemRow>(
        "SELECT cur_cfg, dhcp_enabled FROM system ORDER BY id LIMIT 1",
    )
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

async fn fetch_ranges<'e, E>(executor: E) -> ConfigStoreResult<Vec<RangeRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, RangeRow>(
        r#"
        SELECT name, start_ip_address, end_ip_address, netmask, broadcast,
               lease_duration, set_tag, match_tags
        FROM dhcp_ranges
        ORDER BY id
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

async fn fetch_static_hosts<'e, E>(executor: E) -> ConfigStoreResult<Vec<StaticHostRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, StaticHostRow>(
        r#"
        SELECT mac_addresses, ip_address, client_hostname, lease_duration, set_tag
        FROM dhcp_static_hosts
        ORDER BY id
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

async fn fetch_options<'e, E>(executor: E) -> ConfigStoreResult<Vec<OptionRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, OptionRow>(
        r#"
        SELECT option_number, option_name, option_value, match_tags, is_ipv6
        FROM dhcp_options
        ORDER BY id
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

async fn fetch_tftp_interfaces<'e, E>(executor: E) -> ConfigStoreResult<Vec<TftpInterfaceRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows =
        sqlx::query_as::<_, TftpInterfaceRow>("SELECT name FROM tftp_interfaces ORDER BY id")
            .fetch_all(executor)
            .await?;

    Ok(rows)
}

async fn fetch_tftp_settings<'e, E>(executor: E) -> ConfigStoreResult<Option<TftpSettingsRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, TftpSettingsRow>(
        "SELECT enabled, root_path, secure FROM tftp_settings ORDER BY id LIMIT 1",
    )
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
