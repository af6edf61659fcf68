use std::path::PathBuf;

use crate::config::Config;
use crate::instance::DEFAULT_LAUNCH_ARGUMENT;

/// Notifications carried by the [`SignalBus`](crate::bus::SignalBus).
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// A secondary instance forwarded its launch argument.
    AppMessage(String),
    /// The error boundary caught a failure that nothing else handled.
    AppError(ErrorReport),
    /// A settings change only takes effect after a restart.
    AppRestart,
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; the application should clean up and exit.
    Shutdown,
}

/// Structured description of an unhandled failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    /// Name of the task or operation that failed.
    pub context: String,
    /// Error message including its full cause chain, or the panic payload.
    pub message: String,
}

/// What a launch argument asks the running application to do.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchRequest {
    /// Bring the main window to the front.
    ShowWindow,
    /// Open (and play) a media file.
    Open(PathBuf),
}

impl LaunchRequest {
    pub fn parse(message: &str) -> Self {
        let message = message.trim();
        if message.is_empty() || message == DEFAULT_LAUNCH_ARGUMENT {
            LaunchRequest::ShowWindow
        } else {
            LaunchRequest::Open(PathBuf::from(message))
        }
    }
}
