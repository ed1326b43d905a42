//! Cooperative interruption.
//!
//! Signals never raise out of arbitrary points: a ctrl-c listener sets a
//! shared flag, and the coordinator and the completion waiter observe it at
//! their loop boundaries. Durable state is therefore always consistent when
//! the process winds down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::info;

/// Shared cancellation flag polled between suspension points.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Guard over the ctrl-c listener task. Aborting the task on drop stands in
/// for restoring the previous signal disposition.
pub struct SignalGuard {
    handle: JoinHandle<()>,
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Install a ctrl-c listener that sets `token` instead of terminating the
/// process. Returns a guard that detaches the listener when dropped.
pub fn install_interrupt_handler(token: CancelToken) -> SignalGuard {
    let handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; finishing the current step then stopping");
            token.set();
        }
    });
    SignalGuard { handle }
}
