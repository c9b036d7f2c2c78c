//! Server error types with error codes and recovery suggestions.

use std::io;

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Error raised while binding or running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address.
    #[error("Failed to bind to {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Runtime server error.
    #[error("Runtime error: {0}")]
    Runtime(#[source] io::Error),
}

impl ServerError {
    /// Creates a bind error with address context.
    pub fn bind_error(address: &str, source: io::Error) -> Self {
        Self::BindError {
            address: address.to_owned(),
            source,
        }
    }

    /// Returns a unique error code for this error type.
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BindError { .. } => "E002",
            Self::Runtime(_) => "E003",
        }
    }

    fn io_error(&self) -> &io::Error {
        match self {
            Self::BindError { source, .. } => source,
            Self::Runtime(err) => err,
        }
    }

    /// Returns whether retrying or changing the environment may help.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.io_error().kind(),
            io::ErrorKind::PermissionDenied
                | io::ErrorKind::AddrInUse
                | io::ErrorKind::AddrNotAvailable
                | io::ErrorKind::Interrupted
                | io::ErrorKind::TimedOut
        )
    }

    /// Provides a human-readable suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self.io_error().kind() {
            io::ErrorKind::PermissionDenied => {
                Some("Try using a port above 1024 or run with appropriate privileges")
            }
            io::ErrorKind::AddrInUse => Some(
                "The port is already in use. Try a different port or stop the conflicting service",
            ),
            io::ErrorKind::AddrNotAvailable => {
                Some("The address is not available. Check network interface configuration")
            }
            io::ErrorKind::TimedOut => {
                Some("The operation timed out, consider increasing timeout values")
            }
            _ => None,
        }
    }
}
