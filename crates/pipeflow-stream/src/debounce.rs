use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Trailing-edge debouncer for writes to shared state
///
/// Each [`Debouncer::call`] replaces the pending task; only the last one runs,
/// `delay` after it was scheduled. Dropping the debouncer cancels whatever is
/// still pending, so the owner's lifetime bounds the scheduled work.
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Schedule `task`, superseding any task not yet run
    pub fn call<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }));
    }

    /// Abort the pending task; returns whether one was still waiting
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn delay(&self) -> Duration {
        self.delay
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

    fn counting(
        hits: &Arc<AtomicUsize>,
        last: &Arc<AtomicUsize>,
        value: usize,
    ) -> impl Future<Output = ()> + Send + 'static {
        let hits = Arc::clone(hits);
        let last = Arc::clone(last);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            last.store(value, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_call_runs() {
        let hits = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(100));

        debouncer.call(counting(&hits, &last, 1));
        tokio::time::sleep(Duration::from_millis(40)).await;
        debouncer.call(counting(&hits, &last, 2));
        tokio::time::sleep(Duration::from_millis(40)).await;
        debouncer.call(counting(&hits, &last, 3));

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 3);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending() {
        let hits = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(100));

        debouncer.call(counting(&hits, &last, 7));
        assert!(debouncer.is_pending());
        drop(debouncer);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_reports_pending_state() {
        let hits = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(10));

        assert!(!debouncer.cancel());
        debouncer.call(counting(&hits, &last, 1));
        assert!(debouncer.cancel());
        assert!(!debouncer.is_pending());
    }
}
