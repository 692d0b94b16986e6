use std::time::Duration;

use relaunch_core::{LogFormat, Options};

use crate::arbiter::{Arbiter, Inlets, Outcome};
use crate::context::Context;
use crate::error::{io_err, RuntimeError};
use crate::signals::{self, SignalRelay};
use crate::stdio::StdioRelay;
use crate::terminal::TermGuard;
use crate::watcher::ChangeSource;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(250);
/// Target prefix match: covers `relaunch_runtime` and `relaunch_core` too.
const DEFAULT_VERBOSE_FILTER: &str = "relaunch=debug";

/// Owns every resource acquired for one supervised session.
///
/// Teardown runs on every exit path: explicitly after a kill signal, and
/// from `Drop` after an early error return or a panic.
pub struct Supervisor {
    arbiter: Arbiter,
    inlets: Inlets,
    signals: Option<SignalRelay>,
    watcher: Option<ChangeSource>,
    term: Option<TermGuard>,
    stdio: Option<StdioRelay>,
}

impl Supervisor {
    /// Acquire signals, the change source, the terminal mode and the stdio
    /// relay, in that order. Must be called from inside a tokio runtime.
    ///
    /// On failure whatever was acquired so far is released before returning.
    pub fn init(ctx: Context) -> Result<Self, RuntimeError> {
        let (arbiter, inlets) = Arbiter::new(ctx.clone());
        let mut supervisor = Self {
            arbiter,
            inlets,
            signals: None,
            watcher: None,
            term: None,
            stdio: None,
        };

        supervisor.signals = Some(SignalRelay::subscribe(supervisor.inlets.kill_tx.clone())?);
        supervisor.watcher = Some(ChangeSource::start(
            &ctx.watch_roots(),
            supervisor.inlets.change_tx.clone(),
        )?);

        let term = TermGuard::init(ctx.options().raw)?;
        let hotkeys = term.is_active();
        supervisor.term = Some(term);
        supervisor.stdio = Some(StdioRelay::start(supervisor.inlets.input_tx.clone(), hotkeys)?);

        tracing::debug!(
            command = %ctx.options().command_line(),
            cwd = %ctx.cwd().display(),
            hotkeys,
            "supervisor initialised",
        );
        Ok(supervisor)
    }

    pub fn inlets(&self) -> &Inlets {
        &self.inlets
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    /// Run the arbitration loop until a kill signal has been broadcast.
    pub async fn run(&mut self) -> Outcome {
        self.arbiter.run().await
    }

    /// Release everything, in order: stdio relay, terminal mode, change
    /// source, signal subscription, process handle. Safe to call repeatedly
    /// and after a partial [`Supervisor::init`].
    pub fn deinit(&mut self) {
        if let Some(mut stdio) = self.stdio.take() {
            stdio.stop();
        }
        if let Some(mut term) = self.term.take() {
            term.restore();
        }
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        if let Some(mut relay) = self.signals.take() {
            relay.unsubscribe();
        }
        self.arbiter.process_mut().release();
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.deinit();
    }
}

/// Supervise until a kill signal arrives, then tear down and re-raise the
/// signal with its default disposition.
pub async fn run(ctx: Context) -> Result<(), RuntimeError> {
    let mut supervisor = Supervisor::init(ctx)?;
    let Outcome::Killed(sig) = supervisor.run().await;
    supervisor.deinit();
    signals::raise_default(sig);
    Ok(())
}

/// Start the supervisor and block the current thread until it exits.
pub fn start_blocking(options: Options) -> Result<(), RuntimeError> {
    init_tracing(options.verbose, options.log_format);
    let ctx = Context::new(options)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    let result = runtime.block_on(run(ctx));
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    result
}

fn init_tracing(verbose: bool, format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        DEFAULT_VERBOSE_FILTER
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::EnvFilter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("capture lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn verbose_filter_enables_every_relaunch_crate_only() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(DEFAULT_VERBOSE_FILTER))
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "relaunch_runtime::process", "runtime line");
            tracing::debug!(target: "relaunch_core::filter", "core line");
            tracing::debug!(target: "notify::inotify", "backend line");
        });

        let output = String::from_utf8(captured.0.lock().expect("capture lock").clone()).expect("utf8");
        assert!(output.contains("runtime line"), "{output}");
        assert!(output.contains("core line"), "{output}");
        assert!(!output.contains("backend line"), "{output}");
    }
}
