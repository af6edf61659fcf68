use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::instance::{LaunchArgument, DEFAULT_TIMEOUT};
use crate::paths;

#[derive(Debug, Parser)]
#[command(name = "groove-player", version)]
#[command(about = "Groove music player", long_about = None)]
pub struct Cli {
    /// Media file to open, or `show` to bring the running window to front
    pub argument: Option<String>,

    /// Path to the config file (defaults to the per-user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding the instance lock and socket
    #[arg(long, env = "GROOVE_RUNTIME_DIR")]
    pub runtime_dir: Option<PathBuf>,

    /// Timeout in milliseconds for each step of an instance handoff
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_millis() as u64)]
    pub timeout_ms: u64,
}

impl Cli {
    pub fn launch_argument(&self) -> LaunchArgument {
        LaunchArgument::from_arg(self.argument.clone())
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(paths::config_file_path)
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.runtime_dir.clone().unwrap_or_else(paths::runtime_dir)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
