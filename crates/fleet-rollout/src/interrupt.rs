//! Operator interrupts.
//!
//! Same shape as a daemon shutdown signal: a `watch` channel whose value
//! flips to `true` once. The coordinator races each node install against
//! [`Interrupt::wait`] and checks [`Interrupt::is_triggered`] before
//! starting the next node.

use tokio::sync::watch;
use tracing::info;

/// Receiving side, cheap to clone.
#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

/// Sending side, held by whatever listens for Ctrl-C.
#[derive(Debug)]
pub struct InterruptHandle {
    tx: watch::Sender<bool>,
}

impl Interrupt {
    pub fn pair() -> (InterruptHandle, Interrupt) {
        let (tx, rx) = watch::channel(false);
        (InterruptHandle { tx }, Interrupt { rx })
    }

    /// An interrupt that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Interrupt { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the interrupt fires. Pends forever if the handle is
    /// dropped without firing.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl InterruptHandle {
    pub fn trigger(&self) {
        if !self.tx.send_replace(true) {
            info!("interrupt requested");
        }
    }
}
