//! Job log reporting.
//!
//! Jobs log with syslog-style priorities. Each registration opens a
//! [`LogSink`] named after the job; records are emitted as `tracing` events
//! under the `collect_agent` target, and [`init`] chooses where they go.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Syslog priority of a job log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl Priority {
    /// Priority for a raw syslog level, ignoring any facility bits.
    #[must_use]
    pub fn from_level(level: i32) -> Self {
        match level & 0x07 {
            0 => Priority::Emergency,
            1 => Priority::Alert,
            2 => Priority::Critical,
            3 => Priority::Error,
            4 => Priority::Warning,
            5 => Priority::Notice,
            6 => Priority::Info,
            _ => Priority::Debug,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Emergency => "emerg",
            Priority::Alert => "alert",
            Priority::Critical => "crit",
            Priority::Error => "err",
            Priority::Warning => "warning",
            Priority::Notice => "notice",
            Priority::Info => "info",
            Priority::Debug => "debug",
        }
    }
}

/// Syslog `openlog` option flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions(pub i32);

impl LogOptions {
    pub const PID: Self = Self(0x01);
    pub const CONS: Self = Self(0x02);
    pub const ODELAY: Self = Self(0x04);
    pub const NDELAY: Self = Self(0x08);
    pub const NOWAIT: Self = Self(0x10);
    pub const PERROR: Self = Self(0x20);

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for LogOptions {
    fn default() -> Self {
        Self::PID
    }
}

/// Syslog facility, already shifted (`LOG_USER` is `1 << 3`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Facility(pub i32);

impl Facility {
    pub const KERN: Self = Self(0);
    pub const USER: Self = Self(1 << 3);
    pub const DAEMON: Self = Self(3 << 3);
    pub const SYSLOG: Self = Self(5 << 3);
    pub const LOCAL0: Self = Self(16 << 3);

    #[must_use]
    pub fn name(self) -> &'static str {
        match self.0 >> 3 {
            0 => "kern",
            1 => "user",
            2 => "mail",
            3 => "daemon",
            4 => "auth",
            5 => "syslog",
            6 => "lpr",
            7 => "news",
            16 => "local0",
            17 => "local1",
            18 => "local2",
            19 => "local3",
            20 => "local4",
            21 => "local5",
            22 => "local6",
            23 => "local7",
            _ => "unknown",
        }
    }
}

impl Default for Facility {
    fn default() -> Self {
        Self::USER
    }
}

/// An open job log, identified by the job name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSink {
    ident: String,
    options: LogOptions,
    facility: Facility,
}

impl Default for LogSink {
    fn default() -> Self {
        Self {
            ident: "collect_agent".to_string(),
            options: LogOptions::default(),
            facility: Facility::default(),
        }
    }
}

impl LogSink {
    #[must_use]
    pub fn open(ident: impl Into<String>, options: LogOptions, facility: Facility) -> Self {
        let sink = Self {
            ident: ident.into(),
            options,
            facility,
        };
        tracing::debug!(
            ident = %sink.ident,
            facility = sink.facility.name(),
            "Opened job log"
        );
        sink
    }

    #[must_use]
    pub fn ident(&self) -> &str {
        &self.ident
    }

    #[must_use]
    pub fn facility(&self) -> Facility {
        self.facility
    }

    pub fn emit(&self, priority: Priority, message: &str) {
        let pid = self
            .options
            .contains(LogOptions::PID)
            .then(std::process::id);

        macro_rules! emit_at {
            ($level:expr) => {
                tracing::event!(
                    target: "collect_agent",
                    $level,
                    ident = %self.ident,
                    facility = self.facility.name(),
                    priority = priority.as_str(),
                    pid,
                    "{message}"
                )
            };
        }

        match priority {
            Priority::Emergency | Priority::Alert | Priority::Critical | Priority::Error => {
                emit_at!(tracing::Level::ERROR);
            }
            Priority::Warning => emit_at!(tracing::Level::WARN),
            Priority::Notice | Priority::Info => emit_at!(tracing::Level::INFO),
            Priority::Debug => emit_at!(tracing::Level::DEBUG),
        }
    }
}

/// Where job logs are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    Stderr,
    File(PathBuf),
}

/// Install the global log subscriber.
///
/// Only the first call installs anything; later calls are no-ops. Keep the
/// returned guard alive for as long as file logs should be flushed.
#[must_use]
pub fn init(destination: &LogDestination) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("collect_agent=info"));

    let (result, guard) = match destination {
        LogDestination::Stderr => {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true);
            (
                tracing_subscriber::registry()
                    .with(layer)
                    .with(filter)
                    .try_init(),
                None,
            )
        }
        LogDestination::File(path) => {
            let (dir, file_name) = split_log_path(path);
            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true);
            (
                tracing_subscriber::registry()
                    .with(layer)
                    .with(filter)
                    .try_init(),
                Some(guard),
            )
        }
    };

    if let Err(e) = result {
        tracing::debug!("Log subscriber already installed: {e}");
        return None;
    }
    guard
}

fn split_log_path(path: &Path) -> (PathBuf, PathBuf) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let file_name = path
        .file_name()
        .map_or_else(|| PathBuf::from("collect-agent.log"), PathBuf::from);
    (dir, file_name)
}
