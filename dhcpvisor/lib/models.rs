//! Records shared by the lease hook and the daemon.
//!
//! The `Display` implementations of the configuration records produce the value syntax dnsmasq
//! expects after `--dhcp-range=`, `--dhcp-host=` and `--dhcp-option=`.

use std::{
    collections::BTreeSet,
    fmt::{self, Display},
    net::IpAddr,
    num::ParseIntError,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Placeholder printed and stored for an unknown lease field.
pub const WILDCARD: &str = "*";

/// Smallest finite lease duration, in minutes.
pub const MIN_LEASE_MINUTES: i64 = 2;

/// Largest finite lease duration, in minutes.
pub const MAX_LEASE_MINUTES: i64 = 65535;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// When a lease expires.
///
/// Stored and printed as seconds since the Unix epoch, with `0` standing for a lease that never
/// expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpiryTime {
    /// The lease never expires.
    Infinite,

    /// The lease expires at this many seconds since the Unix epoch.
    At(i64),
}

/// One DHCP lease as recorded in the lease store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Client hardware address, the record key.
    pub mac_address: String,

    /// Leased address, or [`WILDCARD`] when unknown.
    pub ip_address: String,

    /// When the lease ends.
    pub expiry_time: ExpiryTime,

    /// Hostname the client asked for.
    pub client_hostname: Option<String>,

    /// Client identifier the client sent.
    pub client_id: Option<String>,
}

/// A partial lease. `None` leaves the stored field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaseUpdate {
    /// New leased address.
    pub ip_address: Option<String>,

    /// New expiry.
    pub expiry_time: Option<ExpiryTime>,

    /// New client hostname.
    pub client_hostname: Option<String>,

    /// New client identifier.
    pub client_id: Option<String>,
}

/// A lease duration handed to the DHCP service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseDuration {
    /// The lease never expires.
    Infinite,

    /// The lease lasts this many minutes.
    Minutes(u16),
}

/// A pool of addresses handed out dynamically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRange {
    /// Administrative name of the range.
    pub name: String,

    /// First address of the pool.
    pub start: IpAddr,

    /// Last address of the pool. A range without one only serves static hosts.
    pub end: Option<IpAddr>,

    /// Netmask of the served network.
    pub netmask: Option<IpAddr>,

    /// Broadcast address of the served network. Only meaningful with a netmask.
    pub broadcast: Option<IpAddr>,

    /// How long leases from this pool last.
    pub lease_duration: Option<LeaseDuration>,

    /// Tag set on clients served from this pool.
    pub set_tag: Option<String>,

    /// Tags a client must carry to be served from this pool.
    pub match_tags: Vec<String>,
}

/// A fixed address binding for one or more hardware addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticHost {
    /// Hardware addresses the binding applies to. Never empty.
    pub mac_addresses: Vec<String>,

    /// The address handed out.
    pub ip_address: IpAddr,

    /// Hostname given to the client.
    pub hostname: Option<String>,

    /// How long the lease lasts.
    pub lease_duration: Option<LeaseDuration>,

    /// Tag set on the client.
    pub set_tag: Option<String>,
}

/// How a DHCP option is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionKey {
    /// By its option number.
    Number(u16),

    /// By its dnsmasq option name, e.g. `router`.
    Name(String),
}

/// A DHCP option handed to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpOption {
    /// Which option this is.
    pub key: OptionKey,

    /// The option value, in dnsmasq syntax.
    pub value: String,

    /// Tags a client must carry to receive the option.
    pub match_tags: Vec<String>,

    /// Whether this is a DHCPv6 option.
    pub ipv6: bool,
}

/// Settings of the built-in TFTP server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TftpSettings {
    /// Whether TFTP is served at all.
    pub enabled: bool,

    /// Directory files are served from.
    pub root_path: Option<String>,

    /// Only serve files owned by the service user.
    pub secure: bool,
}

/// Everything the DHCP service is configured from, read at one point in time.
///
/// Two snapshots are equal when every field is equal. Ranges, hosts and options keep store order,
/// so a reordering counts as a change. TFTP interfaces are a set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationSnapshot {
    /// Whether system bring-up has completed. Nothing else is read until it has.
    pub bring_up_complete: bool,

    /// Whether the DHCP service should run.
    pub service_enabled: bool,

    /// Dynamic address pools.
    pub address_ranges: Vec<AddressRange>,

    /// Fixed address bindings.
    pub static_hosts: Vec<StaticHost>,

    /// Options handed to clients.
    pub options: Vec<DhcpOption>,

    /// Interfaces TFTP is served on.
    pub tftp_interfaces: BTreeSet<String>,

    /// TFTP server settings.
    pub tftp: TftpSettings,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ExpiryTime {
    /// Interprets epoch seconds, with `0` meaning infinite.
    pub fn from_epoch(secs: i64) -> Self {
        if secs == 0 {
            ExpiryTime::Infinite
        } else {
            ExpiryTime::At(secs)
        }
    }

    /// The expiry as epoch seconds, with `0` meaning infinite.
    pub fn as_epoch(&self) -> i64 {
        match self {
            ExpiryTime::Infinite => 0,
            ExpiryTime::At(secs) => *secs,
        }
    }
}

impl LeaseRecord {
    /// Overwrites the fields `update` carries and keeps the rest.
    pub fn apply(&mut self, update: &LeaseUpdate) {
        if let Some(ip_address) = &update.ip_address {
            self.ip_address = ip_address.clone();
        }

        if let Some(expiry_time) = update.expiry_time {
            self.expiry_time = expiry_time;
        }

        if let Some(client_hostname) = &update.client_hostname {
            self.client_hostname = Some(client_hostname.clone());
        }

        if let Some(client_id) = &update.client_id {
            self.client_id = Some(client_id.clone());
        }
    }

    /// Formats the record the way dnsmasq reads lease lines from its script on `init`.
    ///
    /// The format is `<expiry> <mac> <ip> <hostname> <client_id>` with [`WILDCARD`] for missing
    /// fields and `0` for an infinite expiry.
    pub fn lease_line(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.expiry_time.as_epoch(),
            self.mac_address,
            self.ip_address,
            self.client_hostname.as_deref().unwrap_or(WILDCARD),
            self.client_id.as_deref().unwrap_or(WILDCARD),
        )
    }
}

impl LeaseUpdate {
    /// Builds a fresh record for `mac_address`.
    ///
    /// A missing address becomes [`WILDCARD`] and a missing expiry becomes infinite.
    pub fn into_record(self, mac_address: impl Into<String>) -> LeaseRecord {
        LeaseRecord {
            mac_address: mac_address.into(),
            ip_address: self.ip_address.unwrap_or_else(|| WILDCARD.to_string()),
            expiry_time: self.expiry_time.unwrap_or(ExpiryTime::Infinite),
            client_hostname: self.client_hostname,
            client_id: self.client_id,
        }
    }
}

impl LeaseDuration {
    /// Interprets a stored duration: `0` is infinite, `2..=65535` are minutes, anything else is
    /// rejected.
    pub fn from_minutes(minutes: i64) -> Option<Self> {
        match minutes {
            0 => Some(LeaseDuration::Infinite),
            MIN_LEASE_MINUTES..=MAX_LEASE_MINUTES => u16::try_from(minutes)
                .ok()
                .map(LeaseDuration::Minutes),
            _ => None,
        }
    }
}

impl ConfigurationSnapshot {
    /// The snapshot read while bring-up is still in progress. Every other field is empty.
    pub fn not_ready() -> Self {
        Self::default()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for ExpiryTime {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("infinite") {
            return Ok(ExpiryTime::Infinite);
        }

        s.parse::<i64>().map(ExpiryTime::from_epoch)
    }
}

impl Display for ExpiryTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryTime::Infinite => write!(f, "infinite"),
            ExpiryTime::At(secs) => write!(f, "{}", secs),
        }
    }
}

impl Display for LeaseDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseDuration::Infinite => write!(f, "infinite"),
            LeaseDuration::Minutes(minutes) => write!(f, "{}m", minutes),
        }
    }
}

impl Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tag in &self.match_tags {
            write!(f, "tag:{},", tag)?;
        }

        if let Some(tag) = &self.set_tag {
            write!(f, "set:{},", tag)?;
        }

        write!(f, "{}", self.start)?;
        match &self.end {
            Some(end) => write!(f, ",{}", end)?,
            None => write!(f, ",static")?,
        }

        if let Some(netmask) = &self.netmask {
            write!(f, ",{}", netmask)?;
            if let Some(broadcast) = &self.broadcast {
                write!(f, ",{}", broadcast)?;
            }
        }

        if let Some(lease) = &self.lease_duration {
            write!(f, ",{}", lease)?;
        }

        Ok(())
    }
}

impl Display for StaticHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mac_addresses.join(","))?;

        if let Some(tag) = &self.set_tag {
            write!(f, ",set:{}", tag)?;
        }

        write!(f, ",{}", self.ip_address)?;

        if let Some(hostname) = &self.hostname {
            write!(f, ",{}", hostname)?;
        }

        if let Some(lease) = &self.lease_duration {
            write!(f, ",{}", lease)?;
        }

        Ok(())
    }
}

impl Display for DhcpOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tag in &self.match_tags {
            write!(f, "tag:{},", tag)?;
        }

        let family = if self.ipv6 { "option6" } else { "option" };
        match (&self.key, self.ipv6) {
            (OptionKey::Number(number), false) => write!(f, "{}", number)?,
            (OptionKey::Number(number), true) => write!(f, "{}:{}", family, number)?,
            (OptionKey::Name(name), _) => write!(f, "{}:{}", family, name)?,
        }

        if !self.value.is_empty() {
            write!(f, ",{}", self.value)?;
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
