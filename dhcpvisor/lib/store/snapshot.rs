use std::fmt::Debug;

use super::{
    is_valid_mac_address, is_valid_name, non_empty, parse_ip_address, parse_lease_duration,
    parse_optional_ip_address, split_list, ConfigStore, ConfigTable, OptionRow, RangeRow,
    StaticHostRow, SystemRow, TftpInterfaceRow, TftpSettingsRow,
};
use crate::{
    models::{
        AddressRange, ConfigurationSnapshot, DhcpOption, OptionKey, StaticHost, TftpSettings,
    },
    ConfigStoreResult,
};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Reads the current configuration into a fresh snapshot.
///
/// Until the store's configuration counter is nonzero the result is
/// [`ConfigurationSnapshot::not_ready`] and no other table is read. After that, every table is
/// read in full through [`ConfigStore::read_tables`], as one view where the store supports it.
/// A row that fails validation is logged and left out, and a table that cannot be read at all
/// leaves its field empty. The read never fails and never writes to the store.
pub async fn read_snapshot<S>(store: &S) -> ConfigurationSnapshot
where
    S: ConfigStore + ?Sized,
{
    if completed_system(store.system().await).is_none() {
        return ConfigurationSnapshot::not_ready();
    }

    let rows = store.read_tables().await;

    // Checked again within the same view as the other tables
    let Some(system) = completed_system(rows.system) else {
        return ConfigurationSnapshot::not_ready();
    };

    let tftp_interfaces = convert_rows(
        ConfigTable::TftpInterfaces,
        rows.tftp_interfaces,
        interface_from_row,
    );

    ConfigurationSnapshot {
        bring_up_complete: true,
        service_enabled: system.dhcp_enabled.unwrap_or(true),
        address_ranges: convert_rows(ConfigTable::Ranges, rows.ranges, range_from_row),
        static_hosts: convert_rows(ConfigTable::StaticHosts, rows.static_hosts, host_from_row),
        options: convert_rows(ConfigTable::Options, rows.options, option_from_row),
        tftp_interfaces: tftp_interfaces.into_iter().collect(),
        tftp: tftp_from_row(rows.tftp_settings),
    }
}

/// The system row, if it says bring-up has completed.
fn completed_system(system: ConfigStoreResult<Option<SystemRow>>) -> Option<SystemRow> {
    match system {
        Ok(Some(system)) if system.cur_cfg.unwrap_or_default() != 0 => Some(system),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("failed to read system state, treating bring-up as incomplete: {}", e);
            None
        }
    }
}

fn convert_rows<R, T>(
    table: ConfigTable,
    rows: ConfigStoreResult<Vec<R>>,
    convert: fn(&R) -> Result<T, String>,
) -> Vec<T>
where
    R: Debug,
{
    let rows = match rows {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(table = table.table_name(), "failed to read table, using no entries: {}", e);
            return Vec::new();
        }
    };

    rows.iter()
        .filter_map(|row| match convert(row) {
            Ok(value) => Some(value),
            Err(reason) => {
                tracing::warn!(table = table.table_name(), ?row, "skipping invalid row: {}", reason);
                None
            }
        })
        .collect()
}

fn range_from_row(row: &RangeRow) -> Result<AddressRange, String> {
    let start = match row.start_ip_address.as_deref() {
        Some(start) => parse_ip_address("start address", start)?,
        None => return Err("missing start address".to_string()),
    };
    let end = parse_optional_ip_address("end address", row.end_ip_address.as_deref())?;
    let netmask = parse_optional_ip_address("netmask", row.netmask.as_deref())?;
    let broadcast = parse_optional_ip_address("broadcast address", row.broadcast.as_deref())?;

    if let Some(end) = end {
        if end.is_ipv4() != start.is_ipv4() {
            return Err(format!("{} and {} are different address families", start, end));
        }
    }

    if broadcast.is_some() && netmask.is_none() {
        return Err("broadcast address given without a netmask".to_string());
    }

    Ok(AddressRange {
        name: non_empty(row.name.as_deref()).unwrap_or_default(),
        start,
        end,
        netmask,
        broadcast,
        lease_duration: parse_lease_duration(row.lease_duration)?,
        set_tag: parse_tag(row.set_tag.as_deref())?,
        match_tags: parse_tags(row.match_tags.as_deref())?,
    })
}

fn host_from_row(row: &StaticHostRow) -> Result<StaticHost, String> {
    let mac_addresses = split_list(row.mac_addresses.as_deref());
    if mac_addresses.is_empty() {
        return Err("missing MAC address".to_string());
    }

    if let Some(mac) = mac_addresses.iter().find(|mac| !is_valid_mac_address(mac)) {
        return Err(format!("{} is an invalid MAC address", mac));
    }

    let ip_address = match row.ip_address.as_deref() {
        Some(ip) => parse_ip_address("address", ip)?,
        None => return Err("missing address".to_string()),
    };

    let hostname = non_empty(row.client_hostname.as_deref());
    if let Some(hostname) = hostname.as_deref().filter(|name| !is_valid_name(name)) {
        return Err(format!("{:?} is not a usable hostname", hostname));
    }

    Ok(StaticHost {
        mac_addresses: mac_addresses
            .into_iter()
            .map(|mac| mac.to_ascii_lowercase())
            .collect(),
        ip_address,
        hostname,
        lease_duration: parse_lease_duration(row.lease_duration)?,
        set_tag: parse_tag(row.set_tag.as_deref())?,
    })
}

fn option_from_row(row: &OptionRow) -> Result<DhcpOption, String> {
    let ipv6 = row.is_ipv6.unwrap_or(false);
    let max_number = if ipv6 { u16::MAX as i64 } else { u8::MAX as i64 };

    let key = match (row.option_number, non_empty(row.option_name.as_deref())) {
        (Some(number), _) if (0..=max_number).contains(&number) => OptionKey::Number(number as u16),
        (Some(number), _) => return Err(format!("option number {} is out of range", number)),
        (None, Some(name)) if is_valid_name(&name) => OptionKey::Name(name),
        (None, Some(name)) => return Err(format!("{:?} is not a usable option name", name)),
        (None, None) => return Err("missing option number or name".to_string()),
    };

    Ok(DhcpOption {
        key,
        value: row.option_value.as_deref().unwrap_or_default().trim().to_string(),
        match_tags: parse_tags(row.match_tags.as_deref())?,
        ipv6,
    })
}

fn interface_from_row(row: &TftpInterfaceRow) -> Result<String, String> {
    match non_empty(row.name.as_deref()) {
        Some(name) if is_valid_name(&name) => Ok(name),
        Some(name) => Err(format!("{:?} is not a usable interface name", name)),
        None => Err("missing interface name".to_string()),
    }
}

fn tftp_from_row(row: ConfigStoreResult<Option<TftpSettingsRow>>) -> TftpSettings {
    match row {
        Ok(Some(row)) => TftpSettings {
            enabled: row.enabled.unwrap_or(false),
            root_path: non_empty(row.root_path.as_deref()),
            secure: row.secure.unwrap_or(false),
        },
        Ok(None) => TftpSettings::default(),
        Err(e) => {
            tracing::warn!("failed to read TFTP settings, using defaults: {}", e);
            TftpSettings::default()
        }
    }
}

fn parse_tag(tag: Option<&str>) -> Result<Option<String>, String> {
    match non_empty(tag) {
        Some(tag) if !is_valid_name(&tag) => Err(format!("{:?} is not a usable tag", tag)),
        tag => Ok(tag),
    }
}

fn parse_tags(tags: Option<&str>) -> Result<Vec<String>, String> {
    let tags = split_list(tags);
    match tags.iter().find(|tag| !is_valid_name(tag)) {
        Some(tag) => Err(format!("{:?} is not a usable tag", tag)),
        None => Ok(tags),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use super::*;
    use crate::{
        models::LeaseDuration,
        store::{MemoryConfigState, MemoryConfigStore, SystemRow},
    };

    fn brought_up() -> MemoryConfigState {
        MemoryConfigState {
            system: Some(SystemRow {
                cur_cfg: Some(1),
                dhcp_enabled: None,
            }),
            ..Default::default()
        }
    }

    fn range(start: &str, end: &str) -> RangeRow {
        RangeRow {
            name: Some("lan".into()),
            start_ip_address: Some(start.into()),
            end_ip_address: Some(end.into()),
            ..Default::default()
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_not_ready_ignores_other_tables() {
        let store = MemoryConfigStore::new(MemoryConfigState {
            system: Some(SystemRow {
                cur_cfg: Some(0),
                dhcp_enabled: Some(true),
            }),
            ranges: vec![range("10.0.0.10", "10.0.0.20")],
            ..Default::default()
        });

        assert_eq!(read_snapshot(&store).await, ConfigurationSnapshot::not_ready());
        assert_eq!(
            read_snapshot(&MemoryConfigStore::default()).await,
            ConfigurationSnapshot::not_ready()
        );
    }

    #[tokio::test]
    async fn test_reads_all_tables() {
        let store = MemoryConfigStore::new(MemoryConfigState {
            ranges: vec![range("10.0.0.10", "10.0.0.20")],
            static_hosts: vec![StaticHostRow {
                mac_addresses: Some("AA:BB:CC:DD:EE:01, aa:bb:cc:dd:ee:02".into()),
                ip_address: Some("10.0.0.7".into()),
                client_hostname: Some("printer".into()),
                lease_duration: Some(0),
                set_tag: None,
            }],
            options: vec![OptionRow {
                option_name: Some("router".into()),
                option_value: Some("10.0.0.1".into()),
                ..Default::default()
            }],
            tftp_interfaces: vec![
                TftpInterfaceRow {
                    name: Some("eth1".into()),
                },
                TftpInterfaceRow {
                    name: Some("eth0".into()),
                },
            ],
            tftp_settings: Some(TftpSettingsRow {
                enabled: Some(true),
                root_path: Some("/srv/tftp".into()),
                secure: None,
            }),
            ..brought_up()
        });

        let snapshot = read_snapshot(&store).await;
        assert!(snapshot.bring_up_complete);
        assert!(snapshot.service_enabled);
        assert_eq!(snapshot.address_ranges.len(), 1);
        assert_eq!(snapshot.address_ranges[0].end, Some(ip("10.0.0.20")));
        assert_eq!(
            snapshot.static_hosts[0].mac_addresses,
            vec!["aa:bb:cc:dd:ee:01", "aa:bb:cc:dd:ee:02"]
        );
        assert_eq!(
            snapshot.static_hosts[0].lease_duration,
            Some(LeaseDuration::Infinite)
        );
        assert_eq!(snapshot.options[0].key, OptionKey::Name("router".into()));
        assert_eq!(
            snapshot.tftp_interfaces.iter().collect::<Vec<_>>(),
            vec!["eth0", "eth1"]
        );
        assert!(snapshot.tftp.enabled);
        assert_eq!(snapshot.tftp.root_path.as_deref(), Some("/srv/tftp"));
    }

    #[tokio::test]
    async fn test_invalid_rows_are_skipped() {
        let store = MemoryConfigStore::new(MemoryConfigState {
            ranges: vec![
                range("10.0.0.300", "10.0.0.20"),
                RangeRow {
                    lease_duration: Some(1),
                    ..range("10.0.1.10", "10.0.1.20")
                },
                range("10.0.2.10", "2001:db8::1"),
                range("10.0.3.10", "10.0.3.20"),
            ],
            static_hosts: vec![StaticHostRow {
                mac_addresses: Some("not-a-mac".into()),
                ip_address: Some("10.0.0.7".into()),
                ..Default::default()
            }],
            options: vec![OptionRow {
                option_number: Some(300),
                option_value: Some("x".into()),
                ..Default::default()
            }],
            ..brought_up()
        });

        let snapshot = read_snapshot(&store).await;
        assert_eq!(snapshot.address_ranges.len(), 1);
        assert_eq!(snapshot.address_ranges[0].start, ip("10.0.3.10"));
        assert!(snapshot.static_hosts.is_empty());
        assert!(snapshot.options.is_empty());
    }

    #[tokio::test]
    async fn test_failed_table_reads_as_empty() {
        let mut state = MemoryConfigState {
            ranges: vec![range("10.0.0.10", "10.0.0.20")],
            options: vec![OptionRow {
                option_number: Some(3),
                option_value: Some("10.0.0.1".into()),
                ..Default::default()
            }],
            ..brought_up()
        };
        state.failing.insert(ConfigTable::Ranges);
        let store = MemoryConfigStore::new(state);

        let snapshot = read_snapshot(&store).await;
        assert!(snapshot.bring_up_complete);
        assert!(snapshot.address_ranges.is_empty());
        assert_eq!(snapshot.options.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_service() {
        let store = MemoryConfigStore::new(MemoryConfigState {
            system: Some(SystemRow {
                cur_cfg: Some(3),
                dhcp_enabled: Some(false),
            }),
            ..Default::default()
        });

        let snapshot = read_snapshot(&store).await;
        assert!(snapshot.bring_up_complete);
        assert!(!snapshot.service_enabled);
    }

    #[tokio::test]
    async fn test_reading_twice_is_equal() {
        let store = MemoryConfigStore::new(MemoryConfigState {
            ranges: vec![range("10.0.0.10", "10.0.0.20")],
            ..brought_up()
        });

        assert_eq!(read_snapshot(&store).await, read_snapshot(&store).await);
    }
}
