//! The single supervised child process.
//!
//! Only the arbiter task touches a [`ProcessHandle`], so the slot needs no
//! locking. Each run gets its own process group; signals are broadcast to the
//! whole group so descendants see them too.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use relaunch_core::markers;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use crate::context::Context;
use crate::error::RuntimeError;

const GROUP_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    Exited,
}

struct Instance {
    pid: Option<u32>,
    wait: JoinHandle<()>,
    stdin: Option<ChildStdin>,
    signalled: bool,
}

impl Instance {
    fn is_running(&self) -> bool {
        !self.wait.is_finished()
    }

    /// Send `sig` to the instance's process group. Descendants may keep the
    /// group alive after the leader exits, so the leader's state is not
    /// consulted. A group that is already gone counts as not delivered.
    fn signal(&mut self, sig: Signal) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        match killpg(Pid::from_raw(pid as i32), sig) {
            Ok(()) => {
                self.signalled = true;
                true
            }
            Err(Errno::ESRCH) => false,
            Err(err) => {
                tracing::warn!(pid, signal = %sig, error = %err, "failed to signal command");
                false
            }
        }
    }

    fn group_alive(&self) -> bool {
        self.pid
            .map(|pid| killpg(Pid::from_raw(pid as i32), None::<Signal>).is_ok())
            .unwrap_or(false)
    }

    async fn wait_leader(&mut self) {
        if !self.wait.is_finished() {
            let _ = (&mut self.wait).await;
        }
    }

    /// Wait for the leader, then for every other member of the group.
    async fn settle(&mut self) {
        self.wait_leader().await;
        while self.group_alive() {
            tokio::time::sleep(GROUP_POLL).await;
        }
    }
}

pub struct ProcessHandle {
    ctx: Context,
    current: Option<Instance>,
    generation: u64,
    stdin_closed: bool,
}

impl ProcessHandle {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            current: None,
            generation: 0,
            stdin_closed: false,
        }
    }

    pub fn state(&self) -> ProcessState {
        match &self.current {
            Some(instance) if instance.is_running() => ProcessState::Running,
            _ if self.generation == 0 => ProcessState::NotStarted,
            _ => ProcessState::Exited,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    /// Number of runs started so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pid(&self) -> Option<u32> {
        self.current.as_ref().and_then(|instance| instance.pid)
    }

    /// Replace the current run with a fresh one. The previous run is fully
    /// waited on first: SIGTERM, then SIGKILL once the restart grace expires.
    pub async fn restart(&mut self) -> Result<(), RuntimeError> {
        self.stop_current().await;
        self.spawn()
    }

    /// Broadcast `sig` to the current run and its descendants. Returns `false`
    /// when there is nothing to signal.
    pub fn broadcast(&mut self, sig: Signal) -> bool {
        match self.current.as_mut() {
            Some(instance) => instance.signal(sig),
            None => false,
        }
    }

    /// Forward bytes to the current run's stdin.
    pub async fn write_stdin(&mut self, data: &[u8]) {
        let Some(instance) = self.current.as_mut() else {
            return;
        };
        let Some(stdin) = instance.stdin.as_mut() else {
            return;
        };
        let result = match stdin.write_all(data).await {
            Ok(()) => stdin.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            tracing::debug!(error = %err, "command stdin closed");
            instance.stdin = None;
        }
    }

    /// Close the current run's stdin; later runs get a null stdin.
    pub fn close_stdin(&mut self) {
        self.stdin_closed = true;
        if let Some(instance) = self.current.as_mut() {
            instance.stdin = None;
        }
    }

    /// Forget the current run, terminating its process group first unless
    /// it was already signalled. Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Some(mut instance) = self.current.take() {
            if !instance.signalled {
                instance.signal(Signal::SIGTERM);
            }
        }
    }

    async fn stop_current(&mut self) {
        let Some(mut instance) = self.current.take() else {
            return;
        };
        if !instance.signal(Signal::SIGTERM) {
            instance.wait_leader().await;
            return;
        }

        let grace = self.ctx.options().restart_grace;
        if tokio::time::timeout(grace, instance.settle()).await.is_err() {
            tracing::warn!(
                pid = instance.pid,
                grace_ms = grace.as_millis() as u64,
                "previous run ignored SIGTERM, killing its process group",
            );
            instance.signal(Signal::SIGKILL);
            // Orphans are reaped by init, not by us; only the leader is awaited.
            instance.wait_leader().await;
        }
    }

    fn spawn(&mut self) -> Result<(), RuntimeError> {
        let options = self.ctx.options();
        let stdin = if self.stdin_closed {
            Stdio::null()
        } else {
            Stdio::piped()
        };

        let mut child = Command::new(options.program())
            .args(options.args())
            .current_dir(self.ctx.cwd())
            .stdin(stdin)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .process_group(0)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                program: options.program().to_string(),
                source,
            })?;

        self.generation += 1;
        let pid = child.id();
        tracing::debug!(
            pid,
            generation = self.generation,
            command = %options.command_line(),
            "started command",
        );

        let stdin = child.stdin.take();
        let suffix = markers::suffix(options.separator.as_deref());
        let wait = tokio::spawn(wait_child(child, self.generation, suffix));
        self.current = Some(Instance {
            pid,
            wait,
            stdin,
            signalled: false,
        });
        Ok(())
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.release();
    }
}

async fn wait_child(mut child: Child, generation: u64, suffix: Vec<u8>) {
    match child.wait().await {
        Ok(status) => log_exit(generation, status),
        Err(err) => tracing::error!(generation, error = %err, "failed to wait for command"),
    }

    if !suffix.is_empty() {
        let mut stdout = tokio::io::stdout();
        let _ = stdout.write_all(&suffix).await;
        let _ = stdout.flush().await;
    }
}

fn log_exit(generation: u64, status: ExitStatus) {
    if status.success() {
        tracing::debug!(generation, "command exited");
    } else if let Some(sig) = status.signal() {
        tracing::debug!(generation, signal = sig, "command terminated by signal");
    } else {
        tracing::warn!(generation, %status, "command failed");
    }
}
