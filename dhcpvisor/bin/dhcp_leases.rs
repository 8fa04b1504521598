use std::io::Write;

use chrono::Utc;
use clap::Parser;
use dhcpvisor::{
    cli::{self, DhcpLeasesArgs},
    lease::{self, EventOutcome, HookEnvironment, LeaseCommand, LeaseEvent, SqliteLeaseStore},
};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

/// Lease hook run by dnsmasq.
///
/// Always exits successfully once its arguments parse, so a lease store problem never holds up
/// the DHCP server. Problems are logged to stderr instead.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = DhcpLeasesArgs::parse();
    cli::init_tracing(args.verbose);

    let event = LeaseEvent::from_hook(
        &args.command,
        &args.positional(),
        &HookEnvironment::from_env(),
        Utc::now(),
    );
    tracing::debug!(?event, "lease hook invoked");

    if !event.needs_store() {
        match &event.command {
            LeaseCommand::Unknown(command) => {
                tracing::warn!(command = %command, "ignoring unknown lease hook command")
            }
            command => tracing::debug!(?command, "nothing to record"),
        }
        return;
    }

    let store = match SqliteLeaseStore::open(&args.lease_database).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(database = %args.lease_database.display(), "failed to open lease store: {}", e);
            return;
        }
    };

    if let EventOutcome::Listed(records) = lease::handle_event(&store, &event).await {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = lease::write_lease_lines(&mut stdout, &records).and_then(|_| stdout.flush()) {
            tracing::error!("failed to print leases: {}", e);
        }
    }
}
