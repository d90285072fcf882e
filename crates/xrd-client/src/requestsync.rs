//! Coordination for fan-out request swarms: a concurrency quota plus a
//! wait-for-everything barrier.

use std::sync::Mutex;

use tokio::sync::{Notify, Semaphore};

/// Tracks `total` requests of which at most `quota` run at once.
pub struct RequestSync {
    quota: Semaphore,
    state: Mutex<SyncState>,
    all_done: Notify,
}

struct SyncState {
    left: u32,
    failures: u32,
}

impl RequestSync {
    /// Set up for `total` requests with `quota` in flight at most.
    pub fn new(total: u32, quota: u32) -> Self {
        RequestSync {
            quota: Semaphore::new(quota.max(1) as usize),
            state: Mutex::new(SyncState {
                left: total,
                failures: 0,
            }),
            all_done: Notify::new(),
        }
    }

    /// Wait until a request slot is free.
    pub async fn wait_for_quota(&self) {
        // The semaphore is never closed, so acquire cannot fail.
        if let Ok(permit) = self.quota.acquire().await {
            permit.forget();
        }
    }

    /// Report one request finished, freeing its slot.
    pub fn task_done(&self, success: bool) {
        self.quota.add_permits(1);
        let mut state = self.state.lock().unwrap();
        if !success {
            state.failures += 1;
        }
        state.left = state.left.saturating_sub(1);
        if state.left == 0 {
            self.all_done.notify_waiters();
        }
    }

    /// Wait until every request reported in.
    pub async fn wait_for_all(&self) {
        loop {
            let notified = self.all_done.notified();
            if self.state.lock().unwrap().left == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Number of requests that reported failure.
    pub fn failures(&self) -> u32 {
        self.state.lock().unwrap().failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn all_done_without_tasks() {
        let sync = RequestSync::new(0, 4);
        sync.wait_for_all().await;
        assert_eq!(sync.failures(), 0);
    }

    #[tokio::test]
    async fn quota_limits_concurrency() {
        let sync = Arc::new(RequestSync::new(8, 2));
        let running = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let peak = Arc::new(std::sync::atomic::AtomicU32::new(0));

        for i in 0..8u32 {
            sync.wait_for_quota().await;
            let sync = sync.clone();
            let running = running.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                let now = running.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                peak.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                running.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                sync.task_done(i % 4 != 0);
            });
        }
        sync.wait_for_all().await;
        assert!(peak.load(std::sync::atomic::Ordering::SeqCst) <= 2);
        assert_eq!(sync.failures(), 2);
    }
}
