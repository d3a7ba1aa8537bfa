//! Pause gate - a shared open/closed primitive that progress points await

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Returned when cancellation is observed while waiting on the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Binary gate: `pause` closes it, `resume` opens it
#[derive(Debug, Clone)]
pub struct PauseGate {
    open: watch::Sender<bool>,
}

impl PauseGate {
    /// Create an open gate
    pub fn new() -> Self {
        let (open, _) = watch::channel(true);
        Self { open }
    }

    pub fn pause(&self) {
        self.open.send_replace(false);
    }

    pub fn resume(&self) {
        self.open.send_replace(true);
    }

    pub fn is_paused(&self) -> bool {
        !*self.open.borrow()
    }

    /// Wait until the gate is open or cancellation is requested
    pub async fn wait_open(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let mut rx = self.open.subscribe();
        tokio::select! {
            // The sender lives in `self`, so the channel cannot close here
            _ = rx.wait_for(|open| *open) => {}
            () = cancel.cancelled() => return Err(Cancelled),
        }

        if cancel.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}
