//! Process-wide cancellation shared by every watch and schedule lane.
//!
//! The token is a `crossbeam-channel` receiver whose only sender lives in the
//! [`ShutdownTrigger`]. Nothing is ever sent: dropping the sender disconnects
//! the channel, which wakes every blocked `recv` at once.

use crate::backup::result_error::result::Result;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Shutdown {
    rx: Receiver<()>,
}

#[derive(Clone, Debug)]
pub struct ShutdownTrigger {
    tx: Arc<Mutex<Option<Sender<()>>>>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = bounded(0);
    (
        ShutdownTrigger {
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        Shutdown { rx },
    )
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        if self.tx.lock().take().is_some() {
            tracing::info!("Shutdown requested, stopping all lanes");
        }
    }

    /// Installs a Ctrl-C handler that fires this trigger.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let trigger = self.clone();
        ctrlc::set_handler(move || trigger.trigger())?;
        Ok(())
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleeps for `timeout` unless shutdown fires first. Returns `true` on shutdown.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }

    /// Channel to use in `crossbeam_channel::select!`; becomes ready on shutdown.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
