/// Telnet's well-known port; ticket printers connect here unless told otherwise.
pub const DEFAULT_LISTEN_PORT: u16 = 23;

/// Interface the listener binds when none is configured.
pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";

/// Bytes requested from the socket on each read.
pub const DEFAULT_READ_CHUNK_BYTES: usize = 512;

/// Line length cap; zero disables the limit.
pub const DEFAULT_MAX_LINE_BYTES: usize = 0;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default listening port.
#[must_use]
pub const fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

/// Owned listen host used where allocation is required (e.g. serde).
#[must_use]
pub fn default_listen_host() -> String {
    DEFAULT_LISTEN_HOST.to_owned()
}

/// Default read chunk size.
#[must_use]
pub const fn default_read_chunk_bytes() -> usize {
    DEFAULT_READ_CHUNK_BYTES
}

/// Default line length cap (unlimited).
#[must_use]
pub const fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}
