//! `visorutils::error` is a module containing error utilities for the dhcpvisor project.

use std::{
    error::Error,
    fmt::{self, Display},
};

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a visorutils-related operation.
pub type VisorutilsResult<T> = Result<T, VisorutilsError>;

/// An error that occurred while supervising or cleaning up processes.
#[derive(pretty_error_debug::Debug, Error)]
pub enum VisorutilsError {
    /// An error that occurred when resolving a binary
    #[error("binary not found at: {0}\nSource: {1}")]
    BinaryNotFound(String, String),

    /// A child was started while another one is still owned by the supervisor
    #[error("child process {0} is still running")]
    ChildAlreadyRunning(u32),

    /// The child was spawned but the OS did not report a pid for it
    #[error("spawned child has no process id")]
    MissingChildPid,

    /// An error that occurred when performing an IO operation
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// An error returned by a signal or process syscall
    #[error("process syscall error: {0}")]
    Nix(#[from] nix::Error),

    /// Custom error.
    #[error("Custom error: {0}")]
    Custom(#[from] AnyError),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl VisorutilsError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> VisorutilsError {
        VisorutilsError::Custom(AnyError {
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

/// Creates an `Ok` `VisorutilsResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> VisorutilsResult<T> {
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
