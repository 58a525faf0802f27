use std::time::Duration;

use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{sleep_until, Instant},
};

/// Single-shot timer. Scheduling always cancels the pending shot first, so
/// only the last action of a burst runs.
#[derive(Debug)]
pub struct DebounceTimer {
    delay: Duration,
    runtime: Handle,
    pending: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    pub fn new(delay: Duration, runtime: Handle) -> Self {
        Self {
            delay,
            runtime,
            pending: None,
        }
    }

    pub fn schedule<F>(&mut self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        let deadline = Instant::now() + self.delay;
        self.pending = Some(self.runtime.spawn(async move {
            sleep_until(deadline).await;
            action();
        }));
    }

    /// Returns true when a shot was still waiting to fire.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
