use chrono::{TimeZone, Utc};
use dhcpvisor::{
    lease::{
        handle_event, write_lease_lines, DeleteOutcome, EventOutcome, HookEnvironment, LeaseEvent,
        LeaseStore, SqliteLeaseStore, UpsertOutcome,
    },
    models::ExpiryTime,
};
use tempfile::tempdir;

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_lease_hook_add_then_delete() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SqliteLeaseStore::open(temp_dir.path().join("leases.db")).await?;
    let env = helper::expires("1700000000");

    let add = helper::event("add", &["aa:bb:cc:dd:ee:ff", "10.0.0.5", "host1"], &env);
    assert_eq!(
        handle_event(&store, &add).await,
        EventOutcome::Recorded(UpsertOutcome::Inserted)
    );

    let records = store.list().await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].mac_address, "aa:bb:cc:dd:ee:ff");
    assert_eq!(records[0].ip_address, "10.0.0.5");
    assert_eq!(records[0].client_hostname.as_deref(), Some("host1"));
    assert_eq!(records[0].expiry_time, ExpiryTime::At(1_700_000_000));

    let delete = helper::event("delete", &["aa:bb:cc:dd:ee:ff"], &HookEnvironment::default());
    assert_eq!(
        handle_event(&store, &delete).await,
        EventOutcome::Removed(DeleteOutcome::Deleted)
    );
    assert!(store.find("aa:bb:cc:dd:ee:ff").await?.is_none());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_lease_hook_renew_updates_single_record() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SqliteLeaseStore::open(temp_dir.path().join("leases.db")).await?;

    let add = helper::event(
        "add",
        &["AA:BB:CC:DD:EE:FF", "10.0.0.5", "host1"],
        &helper::expires("1700000000"),
    );
    handle_event(&store, &add).await;

    let renew = helper::event(
        "old",
        &["aa:bb:cc:dd:ee:ff", "10.0.0.6"],
        &helper::expires("1700003600"),
    );
    assert_eq!(
        handle_event(&store, &renew).await,
        EventOutcome::Recorded(UpsertOutcome::Updated)
    );

    let records = store.list().await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].ip_address, "10.0.0.6");
    assert_eq!(records[0].expiry_time, ExpiryTime::At(1_700_003_600));
    assert_eq!(records[0].client_hostname.as_deref(), Some("host1"));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_lease_hook_delete_missing_changes_nothing() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SqliteLeaseStore::open(temp_dir.path().join("leases.db")).await?;

    let add = helper::event(
        "add",
        &["aa:bb:cc:dd:ee:01", "10.0.0.7"],
        &helper::expires("0"),
    );
    handle_event(&store, &add).await;
    let before = store.list().await?;

    let delete = helper::event("del", &["aa:bb:cc:dd:ee:02"], &HookEnvironment::default());
    assert_eq!(
        handle_event(&store, &delete).await,
        EventOutcome::Removed(DeleteOutcome::NotFound)
    );
    assert_eq!(store.list().await?, before);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_lease_hook_init_prints_lease_file() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SqliteLeaseStore::open(temp_dir.path().join("leases.db")).await?;

    handle_event(
        &store,
        &helper::event(
            "add",
            &["aa:bb:cc:dd:ee:ff", "10.0.0.5", "host1", "01:aa:bb:cc:dd:ee:ff"],
            &helper::expires("1700000000"),
        ),
    )
    .await;
    handle_event(
        &store,
        &helper::event("add", &["aa:bb:cc:dd:ee:00", "10.0.0.9"], &helper::expires("0")),
    )
    .await;

    let EventOutcome::Listed(records) =
        handle_event(&store, &helper::event("init", &[], &HookEnvironment::default())).await
    else {
        panic!("init should list leases");
    };

    let mut out = Vec::new();
    write_lease_lines(&mut out, &records)?;
    let text = String::from_utf8(out)?;

    let mut lines: Vec<_> = text.lines().collect();
    lines.sort();
    assert_eq!(
        lines,
        vec![
            "0 aa:bb:cc:dd:ee:00 10.0.0.9 * *",
            "1700000000 aa:bb:cc:dd:ee:ff 10.0.0.5 host1 01:aa:bb:cc:dd:ee:ff",
        ]
    );
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Helpers
//--------------------------------------------------------------------------------------------------

mod helper {
    use super::*;

    pub fn expires(epoch: &str) -> HookEnvironment {
        HookEnvironment {
            lease_expires: Some(epoch.to_string()),
            ..Default::default()
        }
    }

    pub fn event(command: &str, args: &[&str], env: &HookEnvironment) -> LeaseEvent {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        LeaseEvent::from_hook(command, &args, env, now)
    }
}
