//! Background eviction of expired entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::HandoffStore;

/// Periodic task that calls [`HandoffStore::reap_expired`].
///
/// The reaper owns its lifecycle: [`stop`](Reaper::stop) cancels the loop
/// and waits for it to finish, and dropping a running reaper cancels it.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use handoff_relay::store::{HandoffStore, Reaper};
///
/// # #[tokio::main]
/// # async fn main() {
/// let store = Arc::new(HandoffStore::new(Duration::from_secs(1800)));
/// let reaper = Reaper::spawn(Arc::clone(&store), Duration::from_secs(300));
/// assert!(reaper.is_running());
/// reaper.stop().await;
/// # }
/// ```
#[derive(Debug)]
pub struct Reaper {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Starts reaping `store` every `interval`.
    ///
    /// The first cycle runs one full interval after spawning. A zero
    /// interval is raised to one millisecond.
    pub fn spawn(store: Arc<HandoffStore>, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let period = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() completes its first tick immediately
            ticker.tick().await;

            tracing::debug!(interval_secs = period.as_secs(), "reaper started");
            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.reap_expired();
                        if removed > 0 {
                            tracing::info!(removed, remaining = store.len(), "expired entries reaped");
                        } else {
                            tracing::debug!(remaining = store.len(), "reaper cycle");
                        }
                    }
                }
            }
            tracing::debug!("reaper stopped");
        });

        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Whether the background loop is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancels the loop and waits for it to exit.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "reaper task ended abnormally");
            }
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ResultPayload, TaskPayload};

    const TTL: Duration = Duration::from_secs(60);
    const INTERVAL: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn evicts_stale_entries_on_schedule() {
        let store = Arc::new(HandoffStore::new(TTL));
        store
            .publish_task("AB12", TaskPayload::new("u1", "t1"))
            .unwrap();
        let reaper = Reaper::spawn(Arc::clone(&store), INTERVAL);

        tokio::time::sleep(Duration::from_secs(55)).await;
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(store.is_empty());
        assert!(store.fetch_task("AB12").is_none());

        reaper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_active_entries() {
        let store = Arc::new(HandoffStore::new(TTL));
        let reaper = Reaper::spawn(Arc::clone(&store), INTERVAL);

        store
            .publish_task("AB12", TaskPayload::new("u1", "t1"))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(45)).await;
        store
            .publish_result("AB12", ResultPayload::new("s1"))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(45)).await;

        assert_eq!(store.fetch_result("AB12").unwrap().session_id, "s1");
        reaper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_the_loop() {
        let store = Arc::new(HandoffStore::new(TTL));
        let reaper = Reaper::spawn(Arc::clone(&store), INTERVAL);
        assert!(reaper.is_running());

        reaper.stop().await;

        store
            .publish_task("AB12", TaskPayload::new("u1", "t1"))
            .unwrap();
        tokio::time::sleep(TTL * 3).await;
        // nothing reaps once stopped; the entry is only logically expired
        assert_eq!(store.len(), 1);
        assert!(store.fetch_task("AB12").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn tolerates_concurrent_clear() {
        let store = Arc::new(HandoffStore::new(TTL));
        store
            .publish_task("AB12", TaskPayload::new("u1", "t1"))
            .unwrap();
        let reaper = Reaper::spawn(Arc::clone(&store), INTERVAL);

        tokio::time::sleep(Duration::from_secs(65)).await;
        store.clear("AB12");
        tokio::time::sleep(INTERVAL * 2).await;

        assert!(reaper.is_running());
        reaper.stop().await;
    }
}
