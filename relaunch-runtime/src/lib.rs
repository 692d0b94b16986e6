//! relaunch runtime: the signal relay, change source, child process handle,
//! terminal guard, stdio relay and the arbitration loop that ties them
//! together.

pub mod arbiter;
pub mod context;
mod error;
pub mod process;
mod runtime;
pub mod signals;
pub mod stdio;
pub mod terminal;
pub mod watcher;

pub use arbiter::{Arbiter, Inlets, Outcome};
pub use context::Context;
pub use error::RuntimeError;
pub use process::{ProcessHandle, ProcessState};
pub use runtime::{run, start_blocking, Supervisor};
pub use signals::{SignalRelay, KILL_SIGNALS};
pub use stdio::Input;
