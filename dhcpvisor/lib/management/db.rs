use std::{path::Path, time::Duration};

use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use tokio::fs;

use crate::DhcpvisorResult;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Migrator for the configuration store database
pub static CONFIG_DB_MIGRATOR: Migrator = sqlx::migrate!("lib/management/migrations/config");

/// Migrator for the lease store database
pub static LEASE_DB_MIGRATOR: Migrator = sqlx::migrate!("lib/management/migrations/leases");

/// How long a connection waits for another process's write lock.
const DB_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Initializes a new SQLite database if it doesn't already exist at the specified path.
///
/// ## Arguments
///
/// * `db_path` - Path where the SQLite database file should be created
/// * `migrator` - SQLx migrator containing database schema migrations to run
pub async fn init_db(
    db_path: impl AsRef<Path>,
    migrator: &Migrator,
) -> DhcpvisorResult<Pool<Sqlite>> {
    let db_path = db_path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let pool = get_db_pool(db_path).await?;

    // Run migrations
    migrator.run(&pool).await?;

    Ok(pool)
}

/// Creates and returns a connection pool for SQLite database operations.
///
/// The database file is created if missing. Both stores are shared with other processes (the lease
/// hook, an administrator editing configuration), so connections wait on a busy database instead
/// of failing right away.
pub async fn get_db_pool(db_path: impl AsRef<Path>) -> DhcpvisorResult<Pool<Sqlite>> {
    let options = SqliteConnectOptions::new()
        .filename(db_path.as_ref())
        .create_if_missing(true)
        .busy_timeout(DB_BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Gets an existing database connection pool or creates a new one if the database doesn't exist.
///
/// ## Arguments
///
/// * `db_path` - Path to the SQLite database file
/// * `migrator` - SQLx migrator containing database schema migrations to run
pub async fn get_or_create_db_pool(
    db_path: impl AsRef<Path>,
    migrator: &Migrator,
) -> DhcpvisorResult<Pool<Sqlite>> {
    init_db(&db_path, migrator).await
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use sqlx::Row;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_init_db_creates_config_schema() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("nested").join("config.db");

        let pool = init_db(&db_path, &CONFIG_DB_MIGRATOR).await?;
        assert!(db_path.exists());

        let tables: Vec<String> =
            sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await?
                .iter()
                .map(|row| row.get::<String, _>("name"))
                .collect();

        for table in [
            "dhcp_options",
            "dhcp_ranges",
            "dhcp_static_hosts",
            "store_changes",
            "system",
            "tftp_interfaces",
            "tftp_settings",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_writes_bump_change_seqno() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let pool = init_db(temp_dir.path().join("config.db"), &CONFIG_DB_MIGRATOR).await?;

        let seqno = |pool: Pool<Sqlite>| async move {
            sqlx::query("SELECT seqno FROM store_changes WHERE id = 1")
                .fetch_one(&pool)
                .await
                .map(|row| row.get::<i64, _>("seqno"))
        };

        let before = seqno(pool.clone()).await?;
        sqlx::query("INSERT INTO tftp_interfaces (name) VALUES ('eth0')")
            .execute(&pool)
            .await?;
        sqlx::query("UPDATE system SET cur_cfg = 1 WHERE id = 1")
            .execute(&pool)
            .await?;
        let after = seqno(pool.clone()).await?;

        assert_eq!(after, before + 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_init_db_is_repeatable() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("leases.db");

        init_db(&db_path, &LEASE_DB_MIGRATOR).await?;
        let pool = get_or_create_db_pool(&db_path, &LEASE_DB_MIGRATOR).await?;

        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM dhcp_leases")
            .fetch_one(&pool)
            .await?
            .get("count");
        assert_eq!(count, 0);
        Ok(())
    }
}
