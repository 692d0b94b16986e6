//! relaunch: run a command and restart it when files change.
//!
//! # Usage
//!
//! ```text
//! relaunch [OPTIONS] <COMMAND>...
//! relaunch -e rs,toml -i target cargo run
//! relaunch -p -d 500ms -w src make test
//! ```
//!
//! Everything from the first positional argument on is handed to the command
//! untouched. A termination signal is forwarded to the command's process
//! group, the terminal is restored, and relaunch then dies by that signal.

mod args;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;

use args::Cli;

const PREFIX: &str = "[relaunch]";

fn run(cli: Cli) -> Result<()> {
    let options = cli.into_options();
    relaunch_runtime::start_blocking(options).context("supervisor exited with error")?;
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn panic_report(message: &str, location: Option<&str>) -> String {
    match location {
        Some(at) => format!("{PREFIX} panic: {message} ({at})"),
        None => format!("{PREFIX} panic: {message}"),
    }
}

/// Replace the default hook so a panic prints one prefixed line instead of
/// Rust's own report. Unwinding then reaches `catch_unwind` in `main`.
fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()));
        eprintln!("{}", panic_report(panic_message(info.payload()), location.as_deref()));
    }));
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprint!("{PREFIX} {err}");
            return ExitCode::FAILURE;
        }
    };

    install_panic_hook();
    match panic::catch_unwind(AssertUnwindSafe(|| run(cli))) {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            eprintln!("{PREFIX} {err:#}");
            ExitCode::FAILURE
        }
        // The hook already reported it.
        Err(_) => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_report_is_a_single_prefixed_line() {
        assert_eq!(
            panic_report("boom", Some("src/main.rs:7")),
            "[relaunch] panic: boom (src/main.rs:7)"
        );
        assert_eq!(panic_report("boom", None), "[relaunch] panic: boom");
    }

    #[test]
    fn panic_message_reads_both_payload_kinds() {
        let literal = panic::catch_unwind(|| panic!("static text")).unwrap_err();
        assert_eq!(panic_message(literal.as_ref()), "static text");

        let formatted = panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(formatted.as_ref()), "code 7");
    }
}
