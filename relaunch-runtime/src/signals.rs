//! OS termination signals, turned into messages on the kill channel.
//!
//! The set in [`KILL_SIGNALS`] is both what gets subscribed and what gets
//! classified as a kill request. Anything outside it is logged and dropped.

use nix::sys::signal::{self, SigHandler, Signal};
use tokio::signal::unix::{signal as subscribe_kind, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::RuntimeError;

pub const KILL_SIGNALS: [Signal; 4] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGHUP,
    Signal::SIGQUIT,
];

const RAW_CAPACITY: usize = 4;

pub fn is_kill_signal(sig: Signal) -> bool {
    KILL_SIGNALS.contains(&sig)
}

/// Owns the signal listener tasks for the lifetime of the program.
#[derive(Debug, Default)]
pub struct SignalRelay {
    tasks: Vec<JoinHandle<()>>,
    registered: Vec<Signal>,
}

impl SignalRelay {
    /// Subscribe to every signal in [`KILL_SIGNALS`] and start relaying them
    /// onto `kill_tx`. Must be called from inside a tokio runtime.
    ///
    /// On failure, whatever was already registered is unsubscribed again.
    pub fn subscribe(kill_tx: mpsc::Sender<Signal>) -> Result<Self, RuntimeError> {
        let mut relay = Self::default();
        let (raw_tx, raw_rx) = mpsc::channel::<Signal>(RAW_CAPACITY);

        for sig in KILL_SIGNALS {
            let mut stream = subscribe_kind(SignalKind::from_raw(sig as i32))
                .map_err(|source| RuntimeError::Signal { signal: sig, source })?;
            relay.registered.push(sig);

            let raw_tx = raw_tx.clone();
            relay.tasks.push(tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    if raw_tx.send(sig).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(raw_tx);

        relay.tasks.push(tokio::spawn(dispatch(raw_rx, kill_tx)));
        Ok(relay)
    }

    pub fn is_subscribed(&self) -> bool {
        !self.registered.is_empty()
    }

    /// Stop the listener tasks and give every registered signal its default
    /// disposition back. Safe to call repeatedly.
    pub fn unsubscribe(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        for sig in self.registered.drain(..) {
            // SAFETY: SIG_DFL installs no handler code of ours.
            if let Err(err) = unsafe { signal::signal(sig, SigHandler::SigDfl) } {
                tracing::warn!(signal = %sig, error = %err, "failed to restore default signal handler");
            }
        }
    }
}

impl Drop for SignalRelay {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

async fn dispatch(mut raw_rx: mpsc::Receiver<Signal>, kill_tx: mpsc::Sender<Signal>) {
    while let Some(sig) = raw_rx.recv().await {
        relay_one(sig, &kill_tx);
    }
}

/// Classify one raw signal. Returns `true` when it was a kill request.
pub(crate) fn relay_one(sig: Signal, kill_tx: &mpsc::Sender<Signal>) -> bool {
    if !is_kill_signal(sig) {
        tracing::debug!(signal = %sig, "received unknown signal");
        return false;
    }

    tracing::debug!(signal = %sig, "received kill signal");
    // A full slot already holds a pending kill; one is enough.
    if let Err(mpsc::error::TrySendError::Closed(_)) = kill_tx.try_send(sig) {
        tracing::debug!(signal = %sig, "kill channel closed, dropping signal");
    }
    true
}

/// Deliver `sig` to this process. Call only after [`SignalRelay::unsubscribe`]
/// so the default disposition applies.
pub fn raise_default(sig: Signal) {
    if let Err(err) = signal::raise(sig) {
        tracing::warn!(signal = %sig, error = %err, "failed to re-raise signal");
    }
}
