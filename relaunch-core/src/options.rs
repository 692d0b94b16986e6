//! Parsed supervisor options. Built once at startup and never mutated.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::debounce::Debounce;
use crate::error::ConfigError;
use crate::filter::PathFilter;
use crate::markers::ClearMode;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const DEFAULT_RESTART_GRACE: Duration = Duration::from_secs(5);
pub const DEFAULT_WATCH: &str = ".";
/// Build output directories, ignored unless `--ignore` replaces the list.
/// Commands that compile into the working tree would otherwise restart
/// themselves.
pub const DEFAULT_IGNORE: &[&str] = &["target", "node_modules", "dist"];

/// Log output formatter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::UnknownLogFormat(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Minimum gap between accepted restarts.
    pub debounce: Debounce,
    /// Ignore changes while the command is still running.
    pub lazy: bool,
    pub verbose: bool,
    /// Skip the bootstrap run and wait for the first relevant change.
    pub postpone: bool,
    /// Put the terminal in raw mode and interpret hotkeys on stdin.
    pub raw: bool,
    pub clear: ClearMode,
    /// Printed on its own line after every run.
    pub separator: Option<String>,
    /// Roots watched recursively.
    pub watch: Vec<PathBuf>,
    pub filter: PathFilter,
    /// How long a replaced run may take to exit before it is killed.
    pub restart_grace: Duration,
    pub log_format: LogFormat,
    /// Program followed by its arguments.
    pub command: Vec<String>,
}

impl Options {
    /// Options with every flag at its default, supervising `command`.
    pub fn new(command: Vec<String>) -> Self {
        Self {
            debounce: Debounce(DEFAULT_DEBOUNCE),
            lazy: false,
            verbose: false,
            postpone: false,
            raw: true,
            clear: ClearMode::None,
            separator: None,
            watch: vec![PathBuf::from(DEFAULT_WATCH)],
            filter: PathFilter::relative(Vec::<&str>::new(), DEFAULT_IGNORE),
            restart_grace: DEFAULT_RESTART_GRACE,
            log_format: LogFormat::Text,
            command,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.first().map_or(true, |program| program.is_empty()) {
            return Err(ConfigError::EmptyCommand);
        }
        if self.watch.is_empty() {
            return Err(ConfigError::EmptyWatchList);
        }
        Ok(())
    }

    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }

    /// Human-readable command line, for log lines.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}
