//! `dhcpvisor` keeps a dnsmasq DHCP/TFTP service in step with a configuration database.
//!
//! # Overview
//!
//! The daemon, `dhcpvisord`, waits until the configuration database has finished bring-up, starts
//! dnsmasq with a command line rendered from the current configuration, and restarts it whenever
//! the configuration it renders from changes. dnsmasq in turn reports every lease change to the
//! `dhcp_leases` hook, which records it in the lease database. `dhcpvisorctl exit` stops the
//! daemon and its service cleanly.
//!
//! # Architecture
//!
//! - **Configuration store**: typed rows and a change notification, backed by SQLite
//! - **Snapshot reader**: validates rows into a [`ConfigurationSnapshot`](models::ConfigurationSnapshot)
//! - **Service supervisor**: renders the command line and owns the single service process
//! - **Change-reaction loop**: applies a snapshot only when it differs from the last one
//! - **Control channel**: a Unix socket accepting the `exit` command
//! - **Lease store**: per-MAC lease records with upsert semantics
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use dhcpvisor::{config::DaemonConfig, daemon};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DaemonConfig::builder()
//!         .config_database("/var/lib/dhcpvisor/config.db")
//!         .build();
//!
//!     daemon::run_daemon(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`cli`] - Command-line arguments and logging setup for the binaries
//! - [`config`] - Daemon configuration and defaults
//! - [`daemon`] - The change-reaction loop and control channel
//! - [`lease`] - Lease stores and the lease hook's event handling
//! - [`management`] - Database creation and migrations
//! - [`models`] - Snapshot and lease types
//! - [`runtime`] - Command rendering and service supervision
//! - [`store`] - Configuration store access and snapshot reading
//! - [`utils`] - Well-known paths and environment variables

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod cli;
pub mod config;
pub mod daemon;
pub mod lease;
pub mod management;
pub mod models;
pub mod runtime;
pub mod store;
pub mod utils;

pub use error::*;
