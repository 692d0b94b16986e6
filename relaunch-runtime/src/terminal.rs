use std::io::{self, IsTerminal};

use nix::sys::termios::{self, LocalFlags, SetArg, Termios};

use crate::error::RuntimeError;

/// Saves the terminal mode on init and puts it back on restore.
///
/// Raw here means no line buffering, no echo and no signal generation, so
/// `^C` arrives on stdin as a byte. Output processing is left alone.
#[derive(Default)]
pub struct TermGuard {
    saved: Option<Termios>,
}

impl TermGuard {
    /// Enter raw mode when `raw` is set and stdin is a terminal; otherwise
    /// return an inactive guard.
    pub fn init(raw: bool) -> Result<Self, RuntimeError> {
        let stdin = io::stdin();
        if !raw || !stdin.is_terminal() {
            return Ok(Self::default());
        }

        let saved = termios::tcgetattr(&stdin)?;
        let mut raw_mode = saved.clone();
        raw_mode
            .local_flags
            .remove(LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ISIG);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw_mode)?;
        tracing::debug!("terminal switched to raw mode");

        Ok(Self { saved: Some(saved) })
    }

    pub fn is_active(&self) -> bool {
        self.saved.is_some()
    }

    /// Write the saved mode back. Only the first call does anything.
    pub fn restore(&mut self) {
        let Some(saved) = self.saved.take() else {
            return;
        };
        if let Err(err) = termios::tcsetattr(io::stdin(), SetArg::TCSANOW, &saved) {
            tracing::warn!(error = %err, "failed to restore terminal mode");
        }
    }
}

impl Drop for TermGuard {
    fn drop(&mut self) {
        self.restore();
    }
}
