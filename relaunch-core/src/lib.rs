//! relaunch core library: options, path filtering, debounce and the restart
//! admission predicate.
//!
//! Everything here is free of I/O and async so it can be tested without
//! spawning processes or watching directories:
//! - [`options`]: parsed, immutable [`Options`]
//! - [`filter`]: [`PathFilter`] allow/deny rules
//! - [`debounce`]: [`Debounce`] window and duration parsing
//! - [`admission`]: [`FsEvent`] and [`should_restart`]
//! - [`markers`]: terminal bytes printed around restarts
//! - [`error`]: [`ConfigError`]

pub mod admission;
pub mod debounce;
pub mod error;
pub mod filter;
pub mod markers;
pub mod options;

pub use admission::{should_restart, FsEvent};
pub use debounce::{parse_duration, Debounce};
pub use error::ConfigError;
pub use filter::PathFilter;
pub use markers::ClearMode;
pub use options::{LogFormat, Options};
