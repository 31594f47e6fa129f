//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::OrthoError;
use ticket_config::{Config, LogFormat};

use crate::bootstrap::ConfigLoader;

/// Configuration bound to an ephemeral loopback port.
#[must_use]
pub fn loopback_config() -> Config {
    Config {
        listen_host: "127.0.0.1".to_owned(),
        listen_port: 0,
        log_format: LogFormat::Compact,
        ..Config::default()
    }
}

/// Loader returning [`loopback_config`].
#[derive(Debug, Default)]
pub struct TestConfigLoader;

impl TestConfigLoader {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(loopback_config())
    }
}

/// Loader that resolves configuration from an explicit argument list.
pub struct ArgsConfigLoader {
    args: Vec<OsString>,
}

impl ArgsConfigLoader {
    /// `args` includes the program name.
    pub fn new<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConfigLoader for ArgsConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter(self.args.clone())
    }
}

/// Loader that intentionally fails by passing a non-numeric port.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        ArgsConfigLoader::new(["ticketd", "--listen-port", "not-a-port"]).load()
    }
}
