use std::path::Path;

use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

use super::{DeleteOutcome, LeaseStore, UpsertOutcome};
use crate::{
    management::{self, LEASE_DB_MIGRATOR},
    models::{ExpiryTime, LeaseRecord, LeaseUpdate},
    DhcpvisorResult, LeaseStoreError, LeaseStoreResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A lease store backed by an SQLite database.
///
/// The database is shared between every lease hook invocation, so all writes go through
/// transactions and rely on the primary key for uniqueness.
#[derive(Debug, Clone)]
pub struct SqliteLeaseStore {
    pool: Pool<Sqlite>,
}

#[derive(Debug, sqlx::FromRow)]
struct LeaseRow {
    mac_address: String,
    ip_address: String,
    expiry_time: i64,
    client_hostname: Option<String>,
    client_id: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SqliteLeaseStore {
    /// Opens the lease database at `db_path`, creating and migrating it if needed.
    pub async fn open(db_path: impl AsRef<Path>) -> DhcpvisorResult<Self> {
        let pool = management::get_or_create_db_pool(db_path, &LEASE_DB_MIGRATOR).await?;
        Ok(Self { pool })
    }

    /// Wraps an already migrated pool.
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl LeaseStore for SqliteLeaseStore {
    async fn find(&self, mac_address: &str) -> LeaseStoreResult<Option<LeaseRecord>> {
        let row = sqlx::query_as::<_, LeaseRow>(
            r#"
            SELECT mac_address, ip_address, expiry_time, client_hostname, client_id
            FROM dhcp_leases
            WHERE mac_address = ?
            "#,
        )
        .bind(mac_address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(LeaseRecord::from))
    }

    async fn list(&self) -> LeaseStoreResult<Vec<LeaseRecord>> {
        let rows = sqlx::query_as::<_, LeaseRow>(
            r#"
            SELECT mac_address, ip_address, expiry_time, client_hostname, client_id
            FROM dhcp_leases
            ORDER BY mac_address
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LeaseRecord::from).collect())
    }

    async fn insert(&self, record: &LeaseRecord) -> LeaseStoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO dhcp_leases (mac_address, ip_address, expiry_time, client_hostname, client_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.mac_address)
        .bind(&record.ip_address)
        .bind(record.expiry_time.as_epoch())
        .bind(&record.client_hostname)
        .bind(&record.client_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(LeaseStoreError::AlreadyExists(record.mac_address.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(
        &self,
        mac_address: &str,
        update: &LeaseUpdate,
    ) -> LeaseStoreResult<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE dhcp_leases
            SET ip_address = COALESCE(?, ip_address),
                expiry_time = COALESCE(?, expiry_time),
                client_hostname = COALESCE(?, client_hostname),
                client_id = COALESCE(?, client_id),
                modified_at = CURRENT_TIMESTAMP
            WHERE mac_address = ?
            "#,
        )
        .bind(&update.ip_address)
        .bind(update.expiry_time.map(|expiry| expiry.as_epoch()))
        .bind(&update.client_hostname)
        .bind(&update.client_id)
        .bind(mac_address)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let outcome = if updated > 0 {
            UpsertOutcome::Updated
        } else {
            let record = update.clone().into_record(mac_address);
            sqlx::query(
                r#"
                INSERT INTO dhcp_leases (mac_address, ip_address, expiry_time, client_hostname, client_id)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.mac_address)
            .bind(&record.ip_address)
            .bind(record.expiry_time.as_epoch())
            .bind(&record.client_hostname)
            .bind(&record.client_id)
            .execute(&mut *tx)
            .await?;

            UpsertOutcome::Inserted
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn delete(&self, mac_address: &str) -> LeaseStoreResult<DeleteOutcome> {
        let deleted = sqlx::query("DELETE FROM dhcp_leases WHERE mac_address = ?")
            .bind(mac_address)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted > 0 {
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::NotFound)
        }
    }
}

impl From<LeaseRow> for LeaseRecord {
    fn from(row: LeaseRow) -> Self {
        LeaseRecord {
            mac_address: row.mac_address,
            ip_address: row.ip_address,
            expiry_time: ExpiryTime::from_epoch(row.expiry_time),
            client_hostname: row.client_hostname,
            client_id: row.client_id,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
