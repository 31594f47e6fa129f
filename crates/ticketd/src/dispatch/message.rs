use crate::registry::ConnectionId;

/// One newline-terminated unit of client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    connection: ConnectionId,
    payload: String,
}

impl Message {
    /// Pairs a trimmed payload with the connection it arrived on.
    #[must_use]
    pub fn new(connection: ConnectionId, payload: impl Into<String>) -> Self {
        Self {
            connection,
            payload: payload.into(),
        }
    }

    /// Originating connection.
    #[must_use]
    pub const fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Payload with surrounding whitespace and the terminator removed.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Consumes the message, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> String {
        self.payload
    }
}
