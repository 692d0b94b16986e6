//! Relays the supervisor's stdin to the arbiter, translating hotkeys.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use nix::sys::signal::Signal;
use tokio::sync::mpsc;

use crate::error::{io_err, RuntimeError};

const CTRL_C: u8 = 0x03;
const CTRL_R: u8 = 0x12;
const CTRL_BACKSLASH: u8 = 0x1c;
const READ_BUF: usize = 4096;

/// What the relay hands to the arbiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Bytes for the command's stdin.
    Data(Vec<u8>),
    /// Restart now, bypassing admission.
    Restart,
    /// Signal the command, or stop the supervisor if nothing is running.
    Interrupt(Signal),
    /// Stdin reached end of file.
    Eof,
}

/// Split one read into inputs. With hotkeys off the chunk is passed through
/// untouched.
pub fn classify_input(chunk: &[u8], hotkeys: bool) -> Vec<Input> {
    if !hotkeys {
        return vec![Input::Data(chunk.to_vec())];
    }

    let mut out = Vec::new();
    let mut pending = Vec::new();
    for &byte in chunk {
        let hotkey = match byte {
            CTRL_C => Input::Interrupt(Signal::SIGINT),
            CTRL_BACKSLASH => Input::Interrupt(Signal::SIGQUIT),
            CTRL_R => Input::Restart,
            other => {
                pending.push(other);
                continue;
            }
        };
        if !pending.is_empty() {
            out.push(Input::Data(std::mem::take(&mut pending)));
        }
        out.push(hotkey);
    }
    if !pending.is_empty() {
        out.push(Input::Data(pending));
    }
    out
}

/// Background reader thread. Blocking stdin reads cannot be cancelled, so
/// stopping detaches the thread and makes it drop whatever it reads next.
pub struct StdioRelay {
    stopped: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl StdioRelay {
    pub fn start(input_tx: mpsc::Sender<Input>, hotkeys: bool) -> Result<Self, RuntimeError> {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        let thread = thread::Builder::new()
            .name("relaunch-stdin".into())
            .spawn(move || read_loop(io::stdin().lock(), &input_tx, hotkeys, &flag))
            .map_err(|e| io_err("stdin relay thread", e))?;
        Ok(Self {
            stopped,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.thread.take();
    }
}

impl Drop for StdioRelay {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop<R: Read>(mut reader: R, input_tx: &mpsc::Sender<Input>, hotkeys: bool, stopped: &AtomicBool) {
    let mut buf = [0u8; READ_BUF];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read stdin");
                0
            }
        };
        if stopped.load(Ordering::SeqCst) {
            return;
        }
        if n == 0 {
            let _ = input_tx.blocking_send(Input::Eof);
            return;
        }
        for input in classify_input(&buf[..n], hotkeys) {
            if input_tx.blocking_send(input).is_err() {
                return;
            }
        }
    }
}
