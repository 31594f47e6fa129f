//! Structured telemetry initialisation for the server.
//!
//! Events carry the emitting thread's name. The accept loop runs on
//! `ticketd-accept` and each client on `ticketd-conn`, so a connection's
//! whole lifetime can be followed in the log stream.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

use ticket_config::{Config, LogFormat};

static INSTALLED_FORMAT: OnceCell<LogFormat> = OnceCell::new();

/// Proof that the global subscriber is installed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format of the subscriber that is actually installed. This is the
    /// format requested by the first successful call, whatever later callers
    /// asked for.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression did not parse.
    #[error("invalid log filter {expression:?}: {message}")]
    Filter {
        /// Expression as configured.
        expression: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Another global subscriber was already installed.
    #[error("failed to install telemetry subscriber: {source}")]
    Subscriber {
        /// Error reported by `tracing`.
        #[source]
        source: SetGlobalDefaultError,
    },
}

/// Installs the global tracing subscriber on first use.
///
/// Later calls do not touch global state and return a handle describing the
/// subscriber installed by the first call.
///
/// # Examples
///
/// ```rust
/// use ticket_config::{Config, LogFormat};
/// use ticketd::telemetry;
///
/// # fn main() -> Result<(), ticketd::telemetry::TelemetryError> {
/// let handle = telemetry::initialise(&Config::default())?;
/// let compact = Config {
///     log_format: LogFormat::Compact,
///     ..Config::default()
/// };
/// assert_eq!(telemetry::initialise(&compact)?.format(), handle.format());
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED_FORMAT
        .get_or_try_init(|| {
            install_subscriber(config)?;
            Ok(config.log_format())
        })
        .map(|format| TelemetryHandle { format: *format })
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = parse_filter(config.log_filter())?;
    let subscriber = build_subscriber(config.log_format(), filter);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|source| TelemetryError::Subscriber { source })
}

fn parse_filter(expression: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(expression).map_err(|error| TelemetryError::Filter {
        expression: expression.to_owned(),
        message: error.to_string(),
    })
}

fn build_subscriber(format: LogFormat, filter: EnvFilter) -> Box<dyn Subscriber + Send + Sync> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());

    match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("info")]
    #[case("ticketd::transport=debug,warn")]
    #[case("ticketd=trace")]
    fn accepts_target_filters(#[case] expression: &str) {
        assert!(parse_filter(expression).is_ok());
    }

    #[test]
    fn rejects_malformed_filter_with_its_expression() {
        let error = parse_filter("ticketd=loud").expect_err("filter should be rejected");
        assert!(matches!(
            &error,
            TelemetryError::Filter { expression, .. } if expression == "ticketd=loud"
        ));
        assert!(error.to_string().contains("\"ticketd=loud\""));
    }
}
