//! Generic quiet-period debouncing: each submission cancels the pending
//! one, waits out the quiet period, then runs. Its output is applied only
//! if no newer submission arrived meanwhile.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

pub struct Debouncer {
    quiet: Duration,
    counter: AtomicU64,
    token: Mutex<CancellationToken>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            counter: AtomicU64::new(0),
            token: Mutex::new(CancellationToken::new()),
        }
    }

    /// Cancel the pending run, wait the quiet period, then execute `task`.
    /// Returns `None` when superseded by a newer submission at any point;
    /// `Some(output)` only when this submission was still the latest after
    /// the task finished.
    pub async fn run<T, F, Fut>(&self, task: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let my_generation = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let token = {
            let mut slot = self.token.lock();
            slot.cancel();
            *slot = CancellationToken::new();
            slot.clone()
        };

        tokio::select! {
            _ = tokio::time::sleep(self.quiet) => {}
            _ = token.cancelled() => return None,
        }
        if self.counter.load(Ordering::SeqCst) != my_generation {
            return None;
        }

        let output = tokio::select! {
            output = task() => output,
            _ = token.cancelled() => return None,
        };

        if self.counter.load(Ordering::SeqCst) == my_generation {
            Some(output)
        } else {
            None
        }
    }
}
