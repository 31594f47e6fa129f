//! Test suites for the ticket server.

mod support;
