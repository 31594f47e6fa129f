use std::process::ExitCode;

use ticket_config::Config;

fn main() -> ExitCode {
    match ticketd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Startup may fail before telemetry exists; fall back to defaults
            // so the failure is still recorded.
            let _ = ticketd::telemetry::initialise(&Config::default());
            tracing::error!(
                target: concat!(env!("CARGO_PKG_NAME"), "::process"),
                error = %error,
                "server exited with an error"
            );
            ExitCode::FAILURE
        }
    }
}
