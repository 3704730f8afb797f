//! Tagged background timers on the tokio runtime.
//!
//! Every task is filed under a tag so a whole family (the energy tick, the encounter
//! close) can be cancelled at once. Finished handles are pruned on each insert.

use ahash::AHashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Mutex<AHashMap<String, Vec<JoinHandle<()>>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    async fn track(&self, tag: &str, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, handles| {
            handles.retain(|h| !h.is_finished());
            !handles.is_empty()
        });
        tasks.entry(tag.to_string()).or_default().push(handle);
    }

    /// Runs `fut` once after `delay`.
    pub async fn run_after<F>(&self, tag: &str, delay: Duration, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        trace!(target: "quest.scheduler", tag, ?delay, "one-shot scheduled");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fut.await;
        });
        self.track(tag, handle).await;
    }

    /// Runs `make()` every `period`, first after one full period.
    pub async fn run_every<M, F>(&self, tag: &str, period: Duration, make: M)
    where
        M: Fn() -> F + Send + Sync + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(target: "quest.scheduler", tag, ?period, "recurring task scheduled");
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                make().await;
            }
        });
        self.track(tag, handle).await;
    }

    /// Aborts every task filed under `tag`. Returns how many were still running.
    pub async fn cancel_tag(&self, tag: &str) -> usize {
        let Some(handles) = self.tasks.lock().await.remove(tag) else {
            return 0;
        };
        let live = handles.iter().filter(|h| !h.is_finished()).count();
        for h in handles {
            h.abort();
        }
        if live > 0 {
            debug!(target: "quest.scheduler", tag, live, "tasks cancelled");
        }
        live
    }

    /// Number of unfinished tasks under `tag`.
    pub async fn pending(&self, tag: &str) -> usize {
        self.tasks
            .lock()
            .await
            .get(tag)
            .map(|hs| hs.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    /// Aborts everything.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, handles) in tasks.drain() {
            for h in handles {
                h.abort();
            }
        }
    }
}
