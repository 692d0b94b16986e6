//! The restart arbiter: one loop on the main task that owns the child process
//! and the last-restart instant, fed by every other task through channels.

use std::io::Write;
use std::time::Instant;

use nix::sys::signal::Signal;
use relaunch_core::{should_restart, FsEvent};
use tokio::sync::mpsc;

use crate::context::Context;
use crate::process::ProcessHandle;
use crate::stdio::Input;

const CHANGE_CAPACITY: usize = 64;
const INPUT_CAPACITY: usize = 64;

/// How the arbitration loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A kill signal arrived and was broadcast to the command.
    Killed(Signal),
}

/// Sending halves of the arbiter's inbound channels.
#[derive(Debug, Clone)]
pub struct Inlets {
    /// Doorbell: one buffered slot, rapid rings coalesce.
    pub restart_tx: mpsc::Sender<()>,
    pub kill_tx: mpsc::Sender<Signal>,
    pub change_tx: mpsc::Sender<FsEvent>,
    pub input_tx: mpsc::Sender<Input>,
}

pub struct Arbiter {
    ctx: Context,
    process: ProcessHandle,
    last_restart: Instant,
    restart_tx: mpsc::Sender<()>,
    restart_rx: mpsc::Receiver<()>,
    kill_tx: mpsc::Sender<Signal>,
    kill_rx: mpsc::Receiver<Signal>,
    change_rx: mpsc::Receiver<FsEvent>,
    input_rx: mpsc::Receiver<Input>,
}

impl Arbiter {
    /// The debounce baseline starts at construction time, so changes in the
    /// first window after startup are dropped.
    pub fn new(ctx: Context) -> (Self, Inlets) {
        let (restart_tx, restart_rx) = mpsc::channel(1);
        let (kill_tx, kill_rx) = mpsc::channel(1);
        let (change_tx, change_rx) = mpsc::channel(CHANGE_CAPACITY);
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);

        let inlets = Inlets {
            restart_tx: restart_tx.clone(),
            kill_tx: kill_tx.clone(),
            change_tx,
            input_tx,
        };
        let arbiter = Self {
            process: ProcessHandle::new(ctx.clone()),
            ctx,
            last_restart: Instant::now(),
            restart_tx,
            restart_rx,
            kill_tx,
            kill_rx,
            change_rx,
            input_rx,
        };
        (arbiter, inlets)
    }

    pub fn process(&self) -> &ProcessHandle {
        &self.process
    }

    pub fn process_mut(&mut self) -> &mut ProcessHandle {
        &mut self.process
    }

    /// Run until a kill signal arrives. The signal is broadcast to the
    /// command before returning; teardown is left to the caller.
    ///
    /// Branches are polled in priority order kill, restart, change, input, so
    /// a pending kill always wins over a pending restart.
    pub async fn run(&mut self) -> Outcome {
        if !self.ctx.options().postpone {
            self.restart().await;
        }

        loop {
            tokio::select! {
                biased;
                Some(sig) = self.kill_rx.recv() => {
                    self.terminate(sig);
                    return Outcome::Killed(sig);
                }
                Some(()) = self.restart_rx.recv() => self.restart().await,
                Some(event) = self.change_rx.recv() => self.on_change(event),
                Some(input) = self.input_rx.recv() => self.on_input(input).await,
            }
        }
    }

    fn on_change(&mut self, event: FsEvent) {
        let admitted = should_restart(
            Some(&event),
            self.ctx.options(),
            self.process.is_running(),
            self.last_restart,
            Instant::now(),
        );
        if !admitted {
            tracing::trace!(path = %event, "ignoring change");
            return;
        }
        tracing::debug!(path = %event, "restarting on change");
        self.ring_restart();
    }

    async fn on_input(&mut self, input: Input) {
        match input {
            Input::Data(bytes) => self.process.write_stdin(&bytes).await,
            Input::Eof => self.process.close_stdin(),
            Input::Restart => {
                tracing::debug!("restart requested from keyboard");
                self.ring_restart();
            }
            Input::Interrupt(sig) if self.process.is_running() => {
                tracing::debug!(signal = %sig, "forwarding hotkey signal to command");
                self.process.broadcast(sig);
            }
            Input::Interrupt(sig) => {
                let _ = self.kill_tx.try_send(sig);
            }
        }
    }

    fn ring_restart(&self) {
        // Full means a restart is already due.
        let _ = self.restart_tx.try_send(());
    }

    async fn restart(&mut self) {
        self.last_restart = Instant::now();
        self.print_inter_marker();
        if let Err(err) = self.process.restart().await {
            tracing::error!(error = %err, "failed to start command");
        }
    }

    fn print_inter_marker(&self) {
        let marker = self.ctx.options().clear.inter();
        if marker.is_empty() {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(marker);
        let _ = stdout.flush();
    }

    fn terminate(&mut self, sig: Signal) {
        tracing::debug!(signal = %sig, "broadcasting kill signal to command");
        self.process.broadcast(sig);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use relaunch_core::{Debounce, Options, PathFilter};
    use tempfile::TempDir;

    const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
    const SETTLE: Duration = Duration::from_millis(300);

    fn options(script: &str) -> Options {
        let mut options = Options::new(vec!["sh".into(), "-c".into(), script.into()]);
        options.debounce = Debounce(Duration::ZERO);
        options.restart_grace = Duration::from_secs(2);
        options
    }

    fn arbiter(options: Options, dir: &TempDir) -> (Arbiter, Inlets) {
        let ctx = Context::with_cwd(options, dir.path()).expect("context");
        Arbiter::new(ctx)
    }

    fn change(dir: &TempDir, name: &str) -> FsEvent {
        FsEvent::new(dir.path().join(name))
    }

    /// Run the arbiter on its own task, hand the inlets to `feed`, then kill
    /// it with SIGTERM and return the arbiter with its outcome.
    async fn drive<F, Fut>(mut arbiter: Arbiter, inlets: Inlets, feed: F) -> (Arbiter, Outcome)
    where
        F: FnOnce(Inlets) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let kill_tx = inlets.kill_tx.clone();
        let task = tokio::spawn(async move {
            let outcome = arbiter.run().await;
            (arbiter, outcome)
        });
        tokio::time::sleep(SETTLE).await;
        feed(inlets).await;
        tokio::time::sleep(SETTLE).await;
        let _ = kill_tx.try_send(Signal::SIGTERM);
        tokio::time::timeout(JOIN_TIMEOUT, task)
            .await
            .expect("arbiter stops on kill")
            .expect("arbiter task")
    }

    #[tokio::test]
    async fn bootstrap_run_happens_exactly_once() {
        let dir = TempDir::new().expect("tempdir");
        let (mut arbiter, inlets) = arbiter(options("sleep 30"), &dir);
        inlets.kill_tx.try_send(Signal::SIGTERM).expect("queue kill");

        assert_eq!(arbiter.run().await, Outcome::Killed(Signal::SIGTERM));
        assert_eq!(arbiter.process().generation(), 1);
    }

    #[tokio::test]
    async fn postpone_skips_bootstrap_run() {
        let dir = TempDir::new().expect("tempdir");
        let mut opts = options("sleep 30");
        opts.postpone = true;
        let (arbiter, inlets) = arbiter(opts, &dir);

        let (arbiter, outcome) = drive(arbiter, inlets, |_| async {}).await;
        assert_eq!(outcome, Outcome::Killed(Signal::SIGTERM));
        assert_eq!(arbiter.process().generation(), 0);
    }

    #[tokio::test]
    async fn pending_kill_wins_over_pending_restart() {
        let dir = TempDir::new().expect("tempdir");
        let mut opts = options("sleep 30");
        opts.postpone = true;
        let (mut arbiter, inlets) = arbiter(opts, &dir);
        inlets.restart_tx.try_send(()).expect("ring");
        inlets.kill_tx.try_send(Signal::SIGINT).expect("queue kill");
        inlets.change_tx.try_send(change(&dir, "a.rs")).expect("queue change");

        assert_eq!(arbiter.run().await, Outcome::Killed(Signal::SIGINT));
        assert_eq!(arbiter.process().generation(), 0);
    }

    #[tokio::test]
    async fn each_admitted_change_restarts_sequentially() {
        let dir = TempDir::new().expect("tempdir");
        let (arbiter, inlets) = arbiter(options("sleep 30"), &dir);

        let (arbiter, _) = drive(arbiter, inlets, |inlets| async move {
            for name in ["a.rs", "b.rs", "c.rs"] {
                inlets.change_tx.send(FsEvent::new(name)).await.expect("send");
                tokio::time::sleep(SETTLE).await;
            }
        })
        .await;
        assert_eq!(arbiter.process().generation(), 4);
    }

    #[tokio::test]
    async fn changes_inside_debounce_window_are_dropped() {
        let dir = TempDir::new().expect("tempdir");
        let mut opts = options("sleep 30");
        opts.debounce = Debounce(Duration::from_secs(3600));
        let (arbiter, inlets) = arbiter(opts, &dir);

        let (arbiter, _) = drive(arbiter, inlets, |inlets| async move {
            for name in ["a.rs", "b.rs", "c.rs"] {
                inlets.change_tx.send(FsEvent::new(name)).await.expect("send");
            }
        })
        .await;
        assert_eq!(arbiter.process().generation(), 1);
    }

    #[tokio::test]
    async fn lazy_mode_waits_for_the_run_to_finish() {
        let dir = TempDir::new().expect("tempdir");
        let mut opts = options("sleep 30");
        opts.lazy = true;
        let (arbiter, inlets) = arbiter(opts, &dir);

        let (arbiter, _) = drive(arbiter, inlets, |inlets| async move {
            inlets.change_tx.send(FsEvent::new("a.rs")).await.expect("send");
        })
        .await;
        assert_eq!(arbiter.process().generation(), 1);
    }

    #[tokio::test]
    async fn lazy_mode_restarts_once_the_run_exited() {
        let dir = TempDir::new().expect("tempdir");
        let mut opts = options("exit 0");
        opts.lazy = true;
        let (arbiter, inlets) = arbiter(opts, &dir);

        let (arbiter, _) = drive(arbiter, inlets, |inlets| async move {
            inlets.change_tx.send(FsEvent::new("a.rs")).await.expect("send");
        })
        .await;
        assert_eq!(arbiter.process().generation(), 2);
    }

    #[tokio::test]
    async fn filtered_paths_do_not_restart() {
        let dir = TempDir::new().expect("tempdir");
        let mut opts = options("sleep 30");
        opts.filter = PathFilter::new(["rs"], ["target"], dir.path());
        let (arbiter, inlets) = arbiter(opts, &dir);
        let notes = change(&dir, "notes.txt");
        let build = change(&dir, "target/out.rs");
        let source = change(&dir, "main.rs");

        let (arbiter, _) = drive(arbiter, inlets, |inlets| async move {
            inlets.change_tx.send(notes).await.expect("send");
            inlets.change_tx.send(build).await.expect("send");
            tokio::time::sleep(SETTLE).await;
            inlets.change_tx.send(source).await.expect("send");
        })
        .await;
        assert_eq!(arbiter.process().generation(), 2);
    }

    #[tokio::test]
    async fn keyboard_restart_bypasses_debounce() {
        let dir = TempDir::new().expect("tempdir");
        let mut opts = options("sleep 30");
        opts.debounce = Debounce(Duration::from_secs(3600));
        let (arbiter, inlets) = arbiter(opts, &dir);

        let (arbiter, _) = drive(arbiter, inlets, |inlets| async move {
            inlets.input_tx.send(Input::Restart).await.expect("send");
        })
        .await;
        assert_eq!(arbiter.process().generation(), 2);
    }

    #[tokio::test]
    async fn interrupt_hotkey_signals_running_command_only() {
        let dir = TempDir::new().expect("tempdir");
        let (arbiter, inlets) = arbiter(options("sleep 30"), &dir);

        let (arbiter, outcome) = drive(arbiter, inlets, |inlets| async move {
            inlets.input_tx.send(Input::Interrupt(Signal::SIGINT)).await.expect("send");
        })
        .await;
        // The supervisor kept going until the explicit SIGTERM.
        assert_eq!(outcome, Outcome::Killed(Signal::SIGTERM));
        assert!(!arbiter.process().is_running());
    }

    #[tokio::test]
    async fn interrupt_hotkey_without_command_stops_supervisor() {
        let dir = TempDir::new().expect("tempdir");
        let mut opts = options("sleep 30");
        opts.postpone = true;
        let (mut arbiter, inlets) = arbiter(opts, &dir);
        inlets.input_tx.try_send(Input::Interrupt(Signal::SIGQUIT)).expect("queue");

        let outcome = tokio::time::timeout(JOIN_TIMEOUT, arbiter.run())
            .await
            .expect("arbiter stops");
        assert_eq!(outcome, Outcome::Killed(Signal::SIGQUIT));
    }

    #[tokio::test]
    async fn stdin_data_reaches_the_command() {
        let dir = TempDir::new().expect("tempdir");
        let script = "read line; printf '%s' \"$line\" > out.txt; sleep 30";
        let (arbiter, inlets) = arbiter(options(script), &dir);

        drive(arbiter, inlets, |inlets| async move {
            inlets.input_tx.send(Input::Data(b"ping\n".to_vec())).await.expect("send");
        })
        .await;
        let written = std::fs::read_to_string(dir.path().join("out.txt")).expect("out.txt");
        assert_eq!(written, "ping");
    }
}
