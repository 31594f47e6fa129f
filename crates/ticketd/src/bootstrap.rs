//! Server bootstrap orchestration.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use ticket_config::Config;

use crate::dispatch::TicketLogSubscriber;
use crate::health::HealthReporter;
use crate::server::{ServerHandle, TicketServer};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::ListenerError;

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the server configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    server: TicketServer,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The configured server; subscribe here before calling [`Daemon::start`].
    #[must_use]
    pub const fn server(&self) -> &TicketServer {
        &self.server
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Starts listening on the configured port.
    pub fn start(&self) -> Result<ServerHandle, ListenerError> {
        let handle = self.server.start(self.config.listen_port)?;
        if let Some(addr) = handle.local_addr() {
            self.reporter.listener_ready(addr);
        }
        Ok(handle)
    }

    /// Stops a running server and reports the outcome.
    pub fn stop(&self, handle: ServerHandle) -> Result<(), ListenerError> {
        let result = handle.stop();
        self.reporter.listener_stopped();
        result
    }
}

/// Bootstraps the server using the supplied collaborators.
///
/// The returned daemon already logs every framed ticket through
/// [`TicketLogSubscriber`].
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let server = TicketServer::from_config(&config);
    server.subscribe(TicketLogSubscriber);
    reporter.bootstrap_succeeded(&config);

    Ok(Daemon {
        config,
        server,
        telemetry,
        reporter,
    })
}
