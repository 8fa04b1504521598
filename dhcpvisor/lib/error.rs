use std::{
    error::Error,
    fmt::{self, Display},
};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a dhcpvisor-related operation.
pub type DhcpvisorResult<T> = Result<T, DhcpvisorError>;

/// The result of a lease store operation.
pub type LeaseStoreResult<T> = Result<T, LeaseStoreError>;

/// The result of a configuration store operation.
pub type ConfigStoreResult<T> = Result<T, ConfigStoreError>;

/// An error that occurred while running the daemon or one of its helpers.
#[derive(pretty_error_debug::Debug, Error)]
pub enum DhcpvisorError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error from the process supervision utilities.
    #[error("process supervision error: {0}")]
    Visorutils(#[from] visorutils::VisorutilsError),

    /// An error that occurred during a database operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An error that occurred while migrating a database schema.
    #[error("database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An error raised by the lease store.
    #[error("lease store error: {0}")]
    LeaseStore(#[from] LeaseStoreError),

    /// An error raised by the configuration store.
    #[error("configuration store error: {0}")]
    ConfigStore(#[from] ConfigStoreError),

    /// The daemon configuration file could not be parsed.
    #[error("invalid daemon configuration: {0}")]
    InvalidDaemonConfig(#[from] toml::de::Error),

    /// The configuration store could not be reached within the allowed attempts.
    #[error("configuration store at {endpoint} unreachable after {attempts} attempts")]
    StoreUnreachable {
        /// Where the store was expected.
        endpoint: String,

        /// How many connection attempts were made.
        attempts: u32,
    },

    /// The administrative control channel failed.
    #[error("control channel error: {0}")]
    ControlChannel(String),

    /// The managed service could not be launched.
    #[error("failed to launch service: {0}")]
    ServiceLaunch(String),

    /// A join handle returned an error.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

/// An error raised by a [`LeaseStore`](crate::lease::LeaseStore).
#[derive(Debug, Error)]
pub enum LeaseStoreError {
    /// A record for the MAC address already exists.
    #[error("lease for {0} already exists")]
    AlreadyExists(String),

    /// The backing database failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store's lock was poisoned by a panicking writer.
    #[error("lease store lock poisoned")]
    Poisoned,
}

/// An error raised by a [`ConfigStore`](crate::store::ConfigStore).
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    /// The backing database failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A read of one table was refused.
    #[error("failed to read table {table}: {reason}")]
    TableUnavailable {
        /// The table that could not be read.
        table: &'static str,

        /// Why the read failed.
        reason: String,
    },

    /// The store will never report another change.
    #[error("configuration store closed")]
    Closed,
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DhcpvisorError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> DhcpvisorError {
        DhcpvisorError::Custom(AnyError {
            error: error.into(),
        })
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `DhcpvisorResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> DhcpvisorResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}
