//! Defines the unified error surface for worker launch.

use std::io;

use thiserror::Error;

use hostwire_config::{ConfigError, SocketDirError};

use crate::bootstrap::BootstrapError;
use crate::registry::RegistryError;
use crate::transport::ListenerError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the worker.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the worker failed.
    #[error("worker bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// Preparing the socket filesystem failed.
    #[error("failed to prepare worker socket: {source}")]
    Socket {
        /// Underlying filesystem error.
        #[source]
        source: SocketDirError,
    },
    /// The driver could not be loaded for `--describe`.
    #[error("failed to load driver: {source}")]
    Load {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
    /// Writing to standard output failed.
    #[error("failed to write output: {source}")]
    Output {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The controller thread could not be started.
    #[error("failed to spawn controller thread: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Installing or forwarding shutdown signals failed.
    #[error("failed to set up shutdown handling: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// Socket listener startup failed.
    #[error("worker socket listener failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
}

impl LaunchError {
    /// The command-line parse error, when that is what stopped the launch.
    ///
    /// Help and version requests surface here too and should be printed
    /// with [`clap::Error::print`] rather than reported as failures.
    #[must_use]
    pub fn cli_error(&self) -> Option<&clap::Error> {
        match self {
            Self::Bootstrap {
                source:
                    BootstrapError::Configuration {
                        source: ConfigError::Cli(error),
                    },
            } => Some(error),
            _ => None,
        }
    }
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<SocketDirError> for LaunchError {
    fn from(source: SocketDirError) -> Self {
        Self::Socket { source }
    }
}

impl From<RegistryError> for LaunchError {
    fn from(source: RegistryError) -> Self {
        Self::Load { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}

impl From<ListenerError> for LaunchError {
    fn from(source: ListenerError) -> Self {
        Self::Listener { source }
    }
}
