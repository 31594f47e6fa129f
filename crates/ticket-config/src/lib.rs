//! Shared configuration for the ticket line server.
//!
//! Settings are layered by [`ortho_config`]: built-in defaults, then an
//! optional configuration file, then `TICKETD_*` environment variables and
//! finally command-line flags such as `--listen-port`.

mod defaults;
mod logging;

use std::ffi::OsString;
use std::num::NonZeroUsize;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LISTEN_HOST, DEFAULT_LISTEN_PORT, DEFAULT_LOG_FILTER, DEFAULT_MAX_LINE_BYTES,
    DEFAULT_READ_CHUNK_BYTES, default_listen_host, default_listen_port, default_log_filter,
    default_log_filter_string, default_log_format, default_max_line_bytes,
    default_read_chunk_bytes,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TICKETD")]
pub struct Config {
    /// Interface the listener binds.
    #[serde(default = "default_listen_host")]
    #[ortho_config(default = default_listen_host())]
    pub listen_host: String,
    /// TCP port accepting client connections.
    #[serde(default = "default_listen_port")]
    #[ortho_config(default = default_listen_port())]
    pub listen_port: u16,
    /// Bytes requested from a socket per read.
    #[serde(default = "default_read_chunk_bytes")]
    #[ortho_config(default = default_read_chunk_bytes())]
    pub read_chunk_bytes: usize,
    /// Maximum bytes in one line before the connection is dropped; zero means unlimited.
    #[serde(default = "default_max_line_bytes")]
    #[ortho_config(default = default_max_line_bytes())]
    pub max_line_bytes: usize,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            read_chunk_bytes: default_read_chunk_bytes(),
            max_line_bytes: default_max_line_bytes(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

/// Result type returned by the configuration loaders.
pub type ConfigResult = Result<Config, Arc<OrthoError>>;

impl Config {
    /// Loads configuration from the process arguments and environment.
    pub fn load() -> ConfigResult {
        <Self as OrthoConfig>::load()
    }

    /// Loads configuration from an explicit argument list; the first item is
    /// the program name.
    pub fn load_from_iter<I, T>(args: I) -> ConfigResult
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Host and port pair handed to the listener.
    #[must_use]
    pub fn listen_address(&self) -> (&str, u16) {
        (self.listen_host.as_str(), self.listen_port)
    }

    /// Bytes requested per read. A configured zero falls back to the default,
    /// since an empty read request cannot be told apart from a disconnect.
    #[must_use]
    pub fn read_chunk_bytes(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.read_chunk_bytes)
            .or_else(|| NonZeroUsize::new(DEFAULT_READ_CHUNK_BYTES))
            .unwrap_or(NonZeroUsize::MIN)
    }

    /// Line length cap, if one is configured.
    #[must_use]
    pub fn max_line_bytes(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.max_line_bytes)
    }

    /// Active log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Active log format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_listen_on_telnet_port() {
        let config = Config::default();
        assert_eq!(config.listen_address(), ("0.0.0.0", 23));
        assert_eq!(config.read_chunk_bytes().get(), 512);
        assert!(config.max_line_bytes().is_none());
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Json);
    }

    #[rstest]
    #[case(0, 512)]
    #[case(1, 1)]
    #[case(4096, 4096)]
    fn zero_chunk_size_falls_back_to_default(#[case] configured: usize, #[case] expected: usize) {
        let config = Config {
            read_chunk_bytes: configured,
            ..Config::default()
        };
        assert_eq!(config.read_chunk_bytes().get(), expected);
    }

    #[test]
    fn program_name_alone_resolves_to_defaults() {
        let config = Config::load_from_iter(["ticketd"]).expect("defaults should load");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn cli_flag_overrides_a_single_default() {
        let config = Config::load_from_iter(["ticketd", "--listen-port", "4000"])
            .expect("flag should load");
        assert_eq!(config.listen_port, 4000);
        assert_eq!(config.listen_host, DEFAULT_LISTEN_HOST);
        assert_eq!(config.read_chunk_bytes().get(), DEFAULT_READ_CHUNK_BYTES);
    }

    #[test]
    fn non_zero_line_cap_is_reported() {
        let config = Config {
            max_line_bytes: 80,
            ..Config::default()
        };
        assert_eq!(config.max_line_bytes().map(NonZeroUsize::get), Some(80));
    }
}
