//! Field checks applied to configuration rows as they are read.

use std::net::IpAddr;

use crate::models::{LeaseDuration, MAX_LEASE_MINUTES, MIN_LEASE_MINUTES};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Parses an IPv4 or IPv6 address.
pub fn parse_ip_address(field: &str, value: &str) -> Result<IpAddr, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("{} {:?} is not a valid IP address", field, value))
}

/// Parses an optional address field. An empty value counts as absent.
pub fn parse_optional_ip_address(field: &str, value: Option<&str>) -> Result<Option<IpAddr>, String> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_ip_address(field, value).map(Some),
        None => Ok(None),
    }
}

/// Whether `value` is a hardware address of six hex octets separated by `:` or `-`.
pub fn is_valid_mac_address(value: &str) -> bool {
    let separator = if value.contains('-') { '-' } else { ':' };
    let octets: Vec<&str> = value.split(separator).collect();

    octets.len() == 6
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Checks a lease duration in minutes: `0` for infinite, otherwise within the allowed bounds.
pub fn parse_lease_duration(minutes: Option<i64>) -> Result<Option<LeaseDuration>, String> {
    match minutes {
        None => Ok(None),
        Some(minutes) => LeaseDuration::from_minutes(minutes).map(Some).ok_or_else(|| {
            format!(
                "lease duration {} must be 0 for infinite or between {} and {} minutes",
                minutes, MIN_LEASE_MINUTES, MAX_LEASE_MINUTES
            )
        }),
    }
}

/// Whether `value` can be used as a tag or interface name on the service command line.
pub fn is_valid_name(value: &str) -> bool {
    !value.is_empty() && !value.chars().any(|c| c == ',' || c.is_whitespace())
}

/// Splits a comma-separated list, dropping empty entries.
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalizes an optional text field: trims it and drops it when empty.
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
