use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures that abort startup before the application is built.
///
/// Losing the race for the instance flag is not one of them; that is
/// [`crate::instance::Startup::Secondary`].
#[derive(Debug, Error)]
pub enum StartupError {
    /// The lock file could not be created or locked for a reason other than
    /// another process already holding it.
    #[error("Failed to acquire instance flag {}: {source}", path.display())]
    FlagAcquisition {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// This process owns the flag but cannot serve handoffs.
    #[error("Failed to bind instance endpoint {endpoint}: {source}")]
    ListenerBind {
        endpoint: String,
        #[source]
        source: io::Error,
    },
}

/// Transport failures while a secondary instance forwards its argument.
/// These are logged and never escalate.
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("Timed out after {timeout:?} connecting to {endpoint}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    #[error("Failed to write launch argument: {0}")]
    Write(#[source] io::Error),

    #[error("Timed out after {0:?} writing launch argument")]
    WriteTimeout(Duration),
}
