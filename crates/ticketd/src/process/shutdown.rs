use std::ffi::c_int;
use std::io;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use signal_hook::low_level::signal_name;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Signals that stop the server.
pub const TERMINATION_SIGNALS: [c_int; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Blocks the supervising thread until the server should stop.
pub trait ShutdownSignal: Send + Sync {
    /// Returns once shutdown should proceed.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Waits for the first of a fixed set of Unix signals.
#[derive(Debug, Clone, Copy)]
pub struct SystemShutdownSignal {
    signals: &'static [c_int],
}

impl Default for SystemShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemShutdownSignal {
    /// Listens for [`TERMINATION_SIGNALS`].
    #[must_use]
    pub const fn new() -> Self {
        Self::with_signals(&TERMINATION_SIGNALS)
    }

    /// Listens for an explicit signal set.
    #[must_use]
    pub const fn with_signals(signals: &'static [c_int]) -> Self {
        Self { signals }
    }

    /// Signals this listener reacts to.
    #[must_use]
    pub const fn signals(&self) -> &'static [c_int] {
        self.signals
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals =
            Signals::new(self.signals).map_err(|source| ShutdownError::Install { source })?;
        if let Some(signal) = signals.forever().next() {
            info!(
                target: PROCESS_TARGET,
                signal,
                name = signal_name(signal).unwrap_or("unknown"),
                "shutdown signal received"
            );
        }
        Ok(())
    }
}
