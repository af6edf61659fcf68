/// Canonical locations for Groove data files.
///
/// Persistent files live under the per-user config directory:
///   - config.toml  Typed settings, written by the settings store.
///   - Log/         One `<component>.log` file per logging component.
///
/// The single-instance lock file and the unix socket live in the runtime
/// directory, which is `$XDG_RUNTIME_DIR` when set and `<app_data_dir>/run`
/// otherwise. Both are private to the user. The command line can override it.
use std::path::PathBuf;

pub const APP_DIR_NAME: &str = "Groove";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const LOG_DIR_NAME: &str = "Log";
pub const DOWNLOAD_DIR_NAME: &str = "download";
pub const RUNTIME_DIR_NAME: &str = "run";

/// Returns the Groove application data directory.
///
/// | Platform | Value                                          |
/// | -------- | ---------------------------------------------- |
/// | Linux    | `$XDG_CONFIG_HOME/Groove` or `$HOME/.config/Groove` |
/// | macOS    | `$HOME/Library/Application Support/Groove`     |
/// | Windows  | `%APPDATA%\Groove`                             |
///
/// Falls back to `./AppData` when none of the variables are set.
pub fn app_data_dir() -> PathBuf {
    platform_config_root()
        .map(|root| root.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("AppData"))
}

/// Returns the full path to the config file: `<app_data_dir>/config.toml`
pub fn config_file_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE_NAME)
}

/// Returns the directory holding per-component log files: `<app_data_dir>/Log`
pub fn log_dir() -> PathBuf {
    app_data_dir().join(LOG_DIR_NAME)
}

/// Returns the default download directory: `<app_data_dir>/download`
pub fn download_dir() -> PathBuf {
    app_data_dir().join(DOWNLOAD_DIR_NAME)
}

/// Returns the user's music directory (`$HOME/Music`, `%USERPROFILE%\Music`).
pub fn music_dir() -> Option<PathBuf> {
    non_empty_var("HOME")
        .or_else(|| non_empty_var("USERPROFILE"))
        .map(|home| PathBuf::from(home).join("Music"))
}

/// Returns the directory for the instance lock file and local socket.
pub fn runtime_dir() -> PathBuf {
    runtime_dir_from(non_empty_var("XDG_RUNTIME_DIR"))
}

// Never the shared temp directory: the lock file must be private to the user.
fn runtime_dir_from(xdg_runtime_dir: Option<String>) -> PathBuf {
    xdg_runtime_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| app_data_dir().join(RUNTIME_DIR_NAME))
}

#[cfg(windows)]
fn platform_config_root() -> Option<PathBuf> {
    non_empty_var("APPDATA").map(PathBuf::from)
}

#[cfg(target_os = "macos")]
fn platform_config_root() -> Option<PathBuf> {
    non_empty_var("HOME").map(|home| PathBuf::from(home).join("Library").join("Application Support"))
}

#[cfg(all(unix, not(target_os = "macos")))]
fn platform_config_root() -> Option<PathBuf> {
    non_empty_var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| non_empty_var("HOME").map(|home| PathBuf::from(home).join(".config")))
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
