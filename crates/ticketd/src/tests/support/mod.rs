//! Test harness utilities shared by the server suites.

mod config_loader;
mod recorder;
mod reporter;

pub use config_loader::{ArgsConfigLoader, FailingConfigLoader, TestConfigLoader};
pub use recorder::{MessageRecorder, wait_until};
pub use reporter::{HealthEvent, RecordingHealthReporter};
