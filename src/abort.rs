use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

type Listener = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct AbortState {
    aborted: AtomicBool,
    notify: Notify,
    listeners: Mutex<Vec<Listener>>,
}

/// Shared cancellation handle.
///
/// Cloning yields another handle to the same signal. Aborting cancels the
/// in-flight transport call of every request using this controller and stops
/// further retry attempts from being scheduled.
#[derive(Clone, Default)]
pub struct AbortController {
    state: Arc<AbortState>,
}

impl fmt::Debug for AbortController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortController")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }

    /// Raises the signal. Calling it again is a no-op.
    pub fn abort(&self) {
        // The flag flips under the listener lock so registration cannot slip in between.
        let listeners = {
            let mut listeners = self
                .state
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.state.aborted.swap(true, Ordering::SeqCst) {
                return;
            }
            std::mem::take(&mut *listeners)
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(listeners = listeners.len(), "abort signal raised");

        self.state.notify.notify_waiters();
        for listener in listeners {
            listener();
        }
    }

    /// Registers a callback run once when the signal is raised.
    ///
    /// If the signal is already raised the callback runs immediately.
    pub fn on_abort<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        {
            let mut listeners = self
                .state
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.is_aborted() {
                listeners.push(Box::new(listener));
                return;
            }
        }
        listener();
    }

    /// Resolves once the signal has been raised.
    pub async fn aborted(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}
