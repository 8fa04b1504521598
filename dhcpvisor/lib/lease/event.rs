use chrono::{DateTime, Utc};

use super::{DeleteOutcome, LeaseStore, UpsertOutcome};
use crate::{
    models::{ExpiryTime, LeaseRecord, LeaseUpdate},
    utils::{
        DNSMASQ_CLIENT_ID_ENV_VAR, DNSMASQ_LEASE_EXPIRES_ENV_VAR, DNSMASQ_LEASE_LENGTH_ENV_VAR,
    },
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The lease event dnsmasq reports to its script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseCommand {
    /// A lease was granted (`add`).
    Add,

    /// An existing lease was renewed or changed (`old`).
    Renew,

    /// A lease was released or expired (`del`).
    Delete,

    /// dnsmasq is starting and wants the known leases (`init`, or `show` by hand).
    Init,

    /// A TFTP transfer finished (`tftp`).
    Tftp,

    /// Anything else.
    Unknown(String),
}

/// The environment dnsmasq sets for its script, captured so events can be built without touching
/// the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookEnvironment {
    /// `DNSMASQ_LEASE_EXPIRES`: absolute expiry in epoch seconds.
    pub lease_expires: Option<String>,

    /// `DNSMASQ_LEASE_LENGTH`: lease length in seconds.
    pub lease_length: Option<String>,

    /// `DNSMASQ_CLIENT_ID`: the client identifier.
    pub client_id: Option<String>,
}

/// One invocation of the lease hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseEvent {
    /// What happened.
    pub command: LeaseCommand,

    /// The client's hardware address, lowercased.
    pub mac_address: Option<String>,

    /// The leased address.
    pub ip_address: Option<String>,

    /// The client's hostname.
    pub hostname: Option<String>,

    /// The client identifier.
    pub client_id: Option<String>,

    /// When the lease ends.
    pub expiry_time: Option<ExpiryTime>,
}

/// What handling a lease event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// An `add` or `old` event was recorded.
    Recorded(UpsertOutcome),

    /// A `del` event was applied.
    Removed(DeleteOutcome),

    /// An `init` event listed these records.
    Listed(Vec<LeaseRecord>),

    /// The event needs no store call.
    Ignored,

    /// The event lacked something it needs. Nothing was stored.
    Rejected(String),

    /// The store call failed.
    Failed(String),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl HookEnvironment {
    /// Captures the dnsmasq variables from the process environment.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());
        Self {
            lease_expires: var(DNSMASQ_LEASE_EXPIRES_ENV_VAR),
            lease_length: var(DNSMASQ_LEASE_LENGTH_ENV_VAR),
            client_id: var(DNSMASQ_CLIENT_ID_ENV_VAR),
        }
    }

    /// The lease expiry the environment describes.
    ///
    /// `DNSMASQ_LEASE_EXPIRES` wins. dnsmasq builds without a real-time clock report
    /// `DNSMASQ_LEASE_LENGTH` instead, which is added to `now`.
    pub fn expiry_time(&self, now: DateTime<Utc>) -> Option<ExpiryTime> {
        if let Some(expires) = &self.lease_expires {
            return expires.parse().ok();
        }

        let length: i64 = self.lease_length.as_ref()?.trim().parse().ok()?;
        if length == 0 {
            return Some(ExpiryTime::Infinite);
        }

        Some(ExpiryTime::from_epoch(now.timestamp() + length))
    }
}

impl LeaseEvent {
    /// Builds an event from the hook's command line and environment.
    ///
    /// `args` are the positional arguments after the command: MAC address, IP address, hostname
    /// and client identifier, each optional. They are only interpreted for lease changes; a `tftp`
    /// event passes unrelated values in the same positions.
    pub fn from_hook(
        command: &str,
        args: &[String],
        env: &HookEnvironment,
        now: DateTime<Utc>,
    ) -> Self {
        let command = LeaseCommand::from(command);
        if !command.changes_lease() {
            return Self {
                command,
                mac_address: None,
                ip_address: None,
                hostname: None,
                client_id: None,
                expiry_time: None,
            };
        }

        let arg = |index: usize| args.get(index).filter(|value| !value.is_empty()).cloned();
        Self {
            command,
            mac_address: arg(0).map(|mac| mac.to_ascii_lowercase()),
            ip_address: arg(1),
            hostname: arg(2),
            client_id: arg(3).or_else(|| env.client_id.clone()),
            expiry_time: env.expiry_time(now),
        }
    }

    /// Whether handling the event touches the lease store.
    pub fn needs_store(&self) -> bool {
        self.command.changes_lease() || self.command == LeaseCommand::Init
    }
}

impl LeaseCommand {
    /// Whether this command adds, renews or removes a lease.
    pub fn changes_lease(&self) -> bool {
        matches!(
            self,
            LeaseCommand::Add | LeaseCommand::Renew | LeaseCommand::Delete
        )
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Applies one lease event to the store.
///
/// Each event results in at most one store call: `add` and `old` upsert, `del` deletes, `init`
/// lists. Failures are logged and returned as an outcome, never as an error, so the hook can always
/// exit cleanly for dnsmasq.
pub async fn handle_event<L>(store: &L, event: &LeaseEvent) -> EventOutcome
where
    L: LeaseStore + ?Sized,
{
    match &event.command {
        LeaseCommand::Add | LeaseCommand::Renew => {
            let Some(mac_address) = &event.mac_address else {
                return reject(event, "missing MAC address");
            };
            let Some(expiry_time) = event.expiry_time else {
                return reject(event, "missing lease expiry");
            };

            let update = LeaseUpdate {
                ip_address: event.ip_address.clone(),
                expiry_time: Some(expiry_time),
                client_hostname: event.hostname.clone(),
                client_id: event.client_id.clone(),
            };

            match store.upsert(mac_address, &update).await {
                Ok(outcome) => {
                    tracing::info!(mac = %mac_address, ip = ?event.ip_address, %expiry_time, ?outcome, "recorded lease");
                    EventOutcome::Recorded(outcome)
                }
                Err(e) => fail(event, e),
            }
        }
        LeaseCommand::Delete => {
            let Some(mac_address) = &event.mac_address else {
                return reject(event, "missing MAC address");
            };

            match store.delete(mac_address).await {
                Ok(DeleteOutcome::Deleted) => {
                    tracing::info!(mac = %mac_address, "removed lease");
                    EventOutcome::Removed(DeleteOutcome::Deleted)
                }
                Ok(DeleteOutcome::NotFound) => {
                    tracing::warn!(mac = %mac_address, "no lease to remove");
                    EventOutcome::Removed(DeleteOutcome::NotFound)
                }
                Err(e) => fail(event, e),
            }
        }
        LeaseCommand::Init => match store.list().await {
            Ok(records) => EventOutcome::Listed(records),
            Err(e) => fail(event, e),
        },
        LeaseCommand::Tftp => EventOutcome::Ignored,
        LeaseCommand::Unknown(command) => {
            tracing::warn!(command = %command, "ignoring unknown lease hook command");
            EventOutcome::Ignored
        }
    }
}

/// Prints one lease line per record to `out`, in the format dnsmasq reads back on `init`.
pub fn write_lease_lines(
    out: &mut impl std::io::Write,
    records: &[LeaseRecord],
) -> std::io::Result<()> {
    for record in records {
        writeln!(out, "{}", record.lease_line())?;
    }

    Ok(())
}

fn reject(event: &LeaseEvent, reason: &str) -> EventOutcome {
    tracing::error!(command = ?event.command, "rejected lease event: {}", reason);
    EventOutcome::Rejected(reason.to_string())
}

fn fail(event: &LeaseEvent, error: impl std::fmt::Display) -> EventOutcome {
    tracing::error!(command = ?event.command, "lease store call failed: {}", error);
    EventOutcome::Failed(error.to_string())
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl From<&str> for LeaseCommand {
    fn from(command: &str) -> Self {
        match command {
            "add" => LeaseCommand::Add,
            "old" | "renew" => LeaseCommand::Renew,
            "del" | "delete" => LeaseCommand::Delete,
            "init" | "show" => LeaseCommand::Init,
            "tftp" => LeaseCommand::Tftp,
            other => LeaseCommand::Unknown(other.to_string()),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
