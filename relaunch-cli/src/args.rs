//! Command-line surface and its conversion into [`Options`].

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use relaunch_core::options::DEFAULT_IGNORE;
use relaunch_core::{parse_duration, ClearMode, Debounce, LogFormat, Options, PathFilter};

#[derive(Parser, Debug)]
#[command(
    name = "relaunch",
    version,
    about = "Run a command and restart it whenever watched files change",
    long_about = None,
)]
pub struct Cli {
    /// Log restarts, signals and filtered events to stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Don't restart while the command is still running.
    #[arg(short, long)]
    pub lazy: bool,

    /// Skip the initial run and wait for the first change.
    #[arg(short, long)]
    pub postpone: bool,

    /// Minimum gap between restarts (e.g. 250ms, 2s).
    #[arg(short, long, value_name = "DUR", default_value = "100ms", value_parser = parse_duration)]
    pub debounce: Duration,

    /// Extensions that trigger a restart; empty means any.
    #[arg(short, long = "ext", value_name = "EXT", value_delimiter = ',')]
    pub ext: Vec<String>,

    /// Paths to ignore, relative to the working directory. Replaces the
    /// default build-output list.
    #[arg(
        short,
        long,
        value_name = "PATH",
        value_delimiter = ',',
        default_values = DEFAULT_IGNORE.iter().copied()
    )]
    pub ignore: Vec<PathBuf>,

    /// Paths to watch recursively.
    #[arg(short, long, value_name = "PATH", value_delimiter = ',', default_value = ".")]
    pub watch: Vec<PathBuf>,

    /// Reset the terminal and scrollback before each restart.
    #[arg(short, long, conflicts_with = "soft_clear")]
    pub clear: bool,

    /// Clear the visible screen before each restart, keeping scrollback.
    #[arg(short, long)]
    pub soft_clear: bool,

    /// Line printed after each run exits.
    #[arg(short = 'S', long = "sep", value_name = "STRING")]
    pub separator: Option<String>,

    /// Raw terminal mode with ^C / ^\ / ^R hotkeys.
    #[arg(short, long, value_name = "BOOL", action = ArgAction::Set, default_value_t = true)]
    pub raw: bool,

    /// How long a replaced run may take to exit before SIGKILL.
    #[arg(long, value_name = "DUR", default_value = "5s", value_parser = parse_duration)]
    pub restart_grace: Duration,

    /// Diagnostic log format.
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// Command to supervise, followed by its arguments.
    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

impl Cli {
    /// Resolve into runtime options. Ignored paths stay relative until the
    /// runtime anchors them at the working directory.
    pub fn into_options(self) -> Options {
        let clear = if self.clear {
            ClearMode::Hard
        } else if self.soft_clear {
            ClearMode::Soft
        } else {
            ClearMode::None
        };

        let mut options = Options::new(self.command);
        options.debounce = Debounce(self.debounce);
        options.lazy = self.lazy;
        options.verbose = self.verbose;
        options.postpone = self.postpone;
        options.raw = self.raw;
        options.clear = clear;
        options.separator = self.separator;
        options.watch = self.watch;
        options.filter = PathFilter::relative(&self.ext, &self.ignore);
        options.restart_grace = self.restart_grace;
        options.log_format = self.log_format;
        options
    }
}
