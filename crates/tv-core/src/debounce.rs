//! Cancel-and-reschedule timer

use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Runs the most recently scheduled callback once `window` has passed
/// without another `schedule` call. Dropping the debouncer cancels the
/// pending callback.
pub struct Debouncer {
    handle: Handle,
    window: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(handle: Handle, window: Duration) -> Self {
        Self {
            handle,
            window,
            pending: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Replace any pending callback with `f`, restarting the window
    pub fn schedule<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let window = self.window;
        let mut pending = self.pending.lock();
        if let Some(task) = pending.take() {
            task.abort();
        }
        *pending = Some(self.handle.spawn(async move {
            tokio::time::sleep(window).await;
            f();
        }));
    }

    /// Drop the pending callback, if any. Returns true if one was waiting.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(task) => {
                let waiting = !task.is_finished();
                task.abort();
                waiting
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_only_last_call_fires() {
        let debouncer = Debouncer::new(Handle::current(), Duration::from_millis(500));
        let fired = Arc::new(AtomicUsize::new(0));

        for value in 1..=3 {
            let fired = fired.clone();
            debouncer.schedule(move || fired.store(value, Ordering::SeqCst));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_drop_prevent_callback() {
        let fired = Arc::new(AtomicUsize::new(0));

        let debouncer = Debouncer::new(Handle::current(), Duration::from_millis(500));
        let counter = fired.clone();
        debouncer.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());

        let counter = fired.clone();
        debouncer.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(debouncer);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
