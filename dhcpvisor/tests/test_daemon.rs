use std::{path::Path, time::Duration};

use dhcpvisor::{
    config::{DaemonConfig, ServiceTemplate},
    daemon::{self, ControlCommand},
    management::{self, CONFIG_DB_MIGRATOR},
};
use tempfile::tempdir;

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_daemon_follows_config_store_until_exit() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let config_db = temp_dir.path().join("config.db");
    let pool = management::get_or_create_db_pool(&config_db, &CONFIG_DB_MIGRATOR).await?;

    sqlx::query("INSERT INTO dhcp_ranges (start_ip_address, end_ip_address) VALUES (?, ?)")
        .bind("10.0.0.10")
        .bind("10.0.0.20")
        .execute(&pool)
        .await?;
    sqlx::query("UPDATE system SET cur_cfg = 1").execute(&pool).await?;

    // `sh -c` ignores the rendered flags, which land in its positional parameters
    let service = ServiceTemplate::builder()
        .program("/bin/sh")
        .base_args(vec![
            "-c".to_string(),
            "exec sleep 30".to_string(),
            "dnsmasq".to_string(),
        ])
        .build();

    let config = DaemonConfig::builder()
        .config_database(&config_db)
        .lease_database(temp_dir.path().join("leases.db"))
        .control_socket(temp_dir.path().join("dhcpvisord.ctl"))
        .run_dir(temp_dir.path().join("run"))
        .log_dir(temp_dir.path().join("log"))
        .service(service)
        .stop_timeout_ms(2_000)
        .bring_up_poll_interval_ms(20)
        .change_poll_interval_ms(20)
        .sweep_stale_processes(false)
        .build();

    let pid_file = config.service_pid_file();
    let control_socket = config.get_control_socket().clone();
    let running = tokio::spawn(daemon::run_daemon(config));

    let first = helper::wait_for_pid(&pid_file, None).await?;

    sqlx::query("UPDATE dhcp_ranges SET end_ip_address = ?")
        .bind("10.0.0.50")
        .execute(&pool)
        .await?;

    let second = helper::wait_for_pid(&pid_file, Some(first)).await?;
    assert!(visorutils::process_name(first).is_none());
    assert!(visorutils::process_name(second).is_some());

    let reply = daemon::send_command(&control_socket, &ControlCommand::Exit).await?;
    assert_eq!(reply, daemon::CONTROL_REPLY_OK);

    tokio::time::timeout(Duration::from_secs(10), running).await???;
    assert!(visorutils::process_name(second).is_none());
    assert!(!pid_file.exists());
    assert!(!control_socket.exists());

    pool.close().await;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_daemon_fails_without_control_channel() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let occupied = temp_dir.path().join("occupied");
    std::fs::write(&occupied, "not a socket")?;

    let config = DaemonConfig::builder()
        .config_database(temp_dir.path().join("config.db"))
        .control_socket(&occupied)
        .run_dir(temp_dir.path().join("run"))
        .log_dir(temp_dir.path().join("log"))
        .service(ServiceTemplate::builder().program("/bin/sh").build())
        .sweep_stale_processes(false)
        .build();

    let result = daemon::run_daemon(config).await;
    assert!(matches!(
        result,
        Err(dhcpvisor::DhcpvisorError::ControlChannel(_))
    ));
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Helpers
//--------------------------------------------------------------------------------------------------

mod helper {
    use super::*;

    /// Waits until the pid file names a running process other than `previous`.
    pub async fn wait_for_pid(pid_file: &Path, previous: Option<u32>) -> anyhow::Result<u32> {
        let pid = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Some(pid) = visorutils::read_pid_file(pid_file).await {
                    if Some(pid) != previous {
                        return pid;
                    }
                }

                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await?;

        Ok(pid)
    }
}
