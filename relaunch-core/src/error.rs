//! Error types for relaunch-core.

use thiserror::Error;

/// Errors raised while turning command-line input into [`crate::Options`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A duration flag could not be parsed.
    #[error("invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    /// No command was given to supervise.
    #[error("no command given; usage: relaunch [OPTIONS] <COMMAND>...")]
    EmptyCommand,

    /// `--watch` resolved to an empty list.
    #[error("nothing to watch; pass at least one --watch path")]
    EmptyWatchList,

    /// `--log-format` named an unknown formatter.
    #[error("unknown log format '{0}'; expected: text, json")]
    UnknownLogFormat(String),
}
