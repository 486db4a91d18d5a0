use tokio::time::{Duration, Instant};

/// Event batcher with a deadline armed by the first pending event
///
/// `add` never flushes by itself: the owner awaits [`until_due`] on
/// [`EventBatcher::deadline`] inside its `tokio::select!` loop and calls
/// [`EventBatcher::flush`] when it fires, or earlier to force a flush.
pub struct EventBatcher<T> {
    pending: Vec<T>,
    window: Duration,
    deadline: Option<Instant>,
    total_events: u64,
    total_flushes: u64,
}

impl<T> EventBatcher<T> {
    pub const DEFAULT_WINDOW: Duration = Duration::from_millis(50);

    /// Create a batcher with the given coalescing window (clamped to at least 1 ms)
    pub fn new(window: Duration) -> Self {
        Self {
            pending: Vec::new(),
            window: window.max(Duration::from_millis(1)),
            deadline: None,
            total_events: 0,
            total_flushes: 0,
        }
    }

    /// Buffer an event; returns `true` when this call scheduled the flush
    pub fn add(&mut self, event: T) -> bool {
        self.pending.push(event);
        self.total_events += 1;

        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.window);
            true
        } else {
            false
        }
    }

    /// Drain everything buffered so far, in arrival order
    ///
    /// Returns `None` (and leaves the batcher untouched) when nothing is pending.
    pub fn flush(&mut self) -> Option<Vec<T>> {
        if self.pending.is_empty() {
            return None;
        }

        self.deadline = None;
        self.total_flushes += 1;
        Some(std::mem::take(&mut self.pending))
    }

    /// Instant at which the scheduled flush is due
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn stats(&self) -> BatcherStats {
        BatcherStats {
            window_ms: self.window.as_millis() as u64,
            total_events: self.total_events,
            total_flushes: self.total_flushes,
            avg_events_per_flush: if self.total_flushes > 0 {
                self.total_events as f64 / self.total_flushes as f64
            } else {
                0.0
            },
        }
    }
}

impl<T> Default for EventBatcher<T> {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

/// Resolve when `deadline` passes; never resolves for `None`
pub async fn until_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[derive(Debug, Clone)]
pub struct BatcherStats {
    pub window_ms: u64,
    pub total_events: u64,
    pub total_flushes: u64,
    pub avg_events_per_flush: f64,
}
