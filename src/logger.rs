//! Per-run session log.
//!
//! `main` opens the log once with [`init`]; everything else reports through
//! `log_info!`, `log_warn!` and `log_err!`.  Until a log is opened those
//! macros only reach stderr, and only when `--verbose` turned the mirror on,
//! so library and test code need no setup.
//!
//! The default file is `StrataPaint/stratapaint.log` under [`data_dir`] and is
//! replaced on every run.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static SESSION: OnceLock<SessionLog> = OnceLock::new();
static MIRROR_TO_STDERR: AtomicBool = AtomicBool::new(false);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        })
    }
}

/// An open log file.  Lines from concurrent jobs are serialised by the lock.
pub struct SessionLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl SessionLog {
    /// Create `path` (and its parent directories), discarding older contents.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line.  A failed write is dropped; logging never fails an edit.
    pub fn append(&self, line: &str) {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(file, "{line}");
    }
}

/// Copy every line to stderr as well.  Used by `--verbose`.
pub fn set_echo_stderr(on: bool) {
    MIRROR_TO_STDERR.store(on, Ordering::Relaxed);
}

/// Log `msg` at `level`.  The `log_*!` macros expand to this.
pub fn record(level: Level, msg: &str) {
    emit(&format_line(level, seconds_into_day(), msg));
}

fn emit(line: &str) {
    if MIRROR_TO_STDERR.load(Ordering::Relaxed) {
        eprintln!("{line}");
    }
    if let Some(log) = SESSION.get() {
        log.append(line);
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::record($crate::logger::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::record($crate::logger::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::record($crate::logger::Level::Error, &format!($($arg)*))
    };
}

/// Open the log at its default location.
pub fn init() {
    init_at(&default_log_path());
}

/// Open the log at `path` and route panics into it.  Later calls are ignored.
pub fn init_at(path: &Path) {
    if SESSION.get().is_some() {
        return;
    }
    let log = match SessionLog::create(path) {
        Ok(log) => log,
        Err(e) => {
            // Editing still works without a log file.
            eprintln!("stratapaint: cannot open log {}: {}", path.display(), e);
            return;
        }
    };
    if SESSION.set(log).is_err() {
        return;
    }

    let started = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "?".to_string());
    emit(&format!("--- StrataPaint session, unix time {started} ---"));
    emit(&format!("log: {}", path.display()));

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        record(Level::Panic, &info.to_string());
        previous(info);
    }));
}

fn default_log_path() -> PathBuf {
    data_dir().join("StrataPaint").join("stratapaint.log")
}

/// Per-user data directory, without the application folder.  Falls back to
/// the working directory when no home is known.
pub(crate) fn data_dir() -> PathBuf {
    let env_dir = |key: &str| std::env::var_os(key).map(PathBuf::from);

    #[cfg(target_os = "windows")]
    {
        if let Some(dir) = env_dir("APPDATA") {
            return dir;
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = env_dir("HOME") {
            return home.join("Library").join("Application Support");
        }
    }

    env_dir("XDG_DATA_HOME")
        .or_else(|| env_dir("HOME").map(|home| home.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn seconds_into_day() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs() % 86_400)
}

/// `[HH:MM:SS] [LEVEL] message`, UTC.
fn format_line(level: Level, secs: Option<u64>, msg: &str) -> String {
    let clock = match secs {
        Some(s) => format!("{:02}:{:02}:{:02}", s / 3600, (s / 60) % 60, s % 60),
        None => "--:--:--".to_string(),
    };
    format!("[{clock}] [{level}] {msg}")
}
