/// `log` backend: console output through `env_logger` plus one append-only
/// file per component under the log directory.
///
/// The component is the last path segment of a record's target, so
/// `groove_player::instance` lands in `instance.log` and records from the
/// crate root in `application.log`. Open file handles are cached in a
/// [`LogFileRegistry`] owned by the entry point, which closes them on
/// shutdown.
use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use log::{Level, Log, Metadata, Record};

pub const DEFAULT_FILTER: &str = "groove_player=info";
const ROOT_COMPONENT: &str = "application";

/// Formats one log line: `2024-01-31 12:00:00 - INFO - message`.
pub fn format_line(time: DateTime<Local>, level: Level, message: impl fmt::Display) -> String {
    format!("{} - {level} - {message}", time.format("%Y-%m-%d %H:%M:%S"))
}

/// Maps a record target to the name of its log file (without `.log`).
pub fn component_of(target: &str) -> String {
    let component = match target.rsplit_once("::") {
        Some((_, last)) => last,
        None if target == env!("CARGO_CRATE_NAME") => ROOT_COMPONENT,
        None => target,
    };
    component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Cache of open log files keyed by component name.
#[derive(Debug)]
pub struct LogFileRegistry {
    dir: PathBuf,
    files: Mutex<HashMap<String, LineWriter<File>>>,
}

impl LogFileRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Appends `line` to `<dir>/<component>.log`, opening the file on first use.
    pub fn write_line(&self, component: &str, line: &str) -> io::Result<()> {
        let mut files = self.lock();
        if !files.contains_key(component) {
            std::fs::create_dir_all(&self.dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(format!("{component}.log")))?;
            files.insert(component.to_string(), LineWriter::new(file));
        }
        match files.get_mut(component) {
            Some(writer) => writeln!(writer, "{line}"),
            None => Ok(()),
        }
    }

    pub fn flush(&self) {
        for writer in self.lock().values_mut() {
            let _ = writer.flush();
        }
    }

    /// Flushes and evicts every cached file. Later writes reopen them.
    pub fn close_all(&self) {
        for (_, mut writer) in self.lock().drain() {
            let _ = writer.flush();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LineWriter<File>>> {
        // A panic while holding the lock leaves the map intact.
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct AppLogger {
    console: env_logger::Logger,
    files: Arc<LogFileRegistry>,
}

impl Log for AppLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.console.matches(record) {
            return;
        }
        self.console.log(record);
        let line = format_line(Local::now(), record.level(), record.args());
        // File logging is best effort; the console already has the record.
        let _ = self.files.write_line(&component_of(record.target()), &line);
    }

    fn flush(&self) {
        self.console.flush();
        self.files.flush();
    }
}

/// Installs the logger. The filter comes from `RUST_LOG`, defaulting to
/// [`DEFAULT_FILTER`]. Calling it again keeps the first logger and returns a
/// registry that nothing writes to.
pub fn init(log_dir: impl Into<PathBuf>) -> Arc<LogFileRegistry> {
    let console = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(DEFAULT_FILTER),
    )
    .format(|buf, record| {
        writeln!(buf, "{}", format_line(Local::now(), record.level(), record.args()))
    })
    .build();

    let files = Arc::new(LogFileRegistry::new(log_dir));
    let max_level = console.filter();
    let logger = AppLogger {
        console,
        files: Arc::clone(&files),
    };
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(max_level);
    }
    files
}
