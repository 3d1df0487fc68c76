use parking_lot::Mutex;
use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{runtime::Handle, task::JoinHandle};

type Pending<K> = Arc<Mutex<HashMap<K, (u64, JoinHandle<()>)>>>;

/// Per-key deferred jobs. Scheduling a key again before its delay elapses cancels the earlier
/// job and restarts the timer, so a burst of events runs the last job once.
///
/// A job that has started is never cancelled; it leaves the pending map before running.
pub struct Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    handle: Handle,
    delay: Duration,
    pending: Pending<K>,
    tickets: AtomicU64,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(handle: Handle, delay: Duration) -> Self {
        Debouncer {
            handle,
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            tickets: AtomicU64::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule<F, Fut>(&self, key: K, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let pending = self.pending.clone();
        let delay = self.delay;
        let task_key = key.clone();

        // Held across the spawn so the timer cannot look for its ticket before it is recorded.
        let mut map = self.pending.lock();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let mut map = pending.lock();
                match map.get(&task_key) {
                    Some((t, _)) if *t == ticket => {
                        map.remove(&task_key);
                        true
                    }
                    _ => false,
                }
            };
            if current {
                job().await;
            }
        });
        if let Some((_, previous)) = map.insert(key, (ticket, task)) {
            previous.abort();
        }
    }

    /// Keys whose timers have not fired yet.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            tracing::debug!("[Debouncer] cancelling {} pending jobs", drained.len());
        }
        for (_, (_, task)) in drained {
            task.abort();
        }
    }
}

impl<K> Drop for Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    #[tokio::test]
    async fn burst_runs_once_with_the_last_job() {
        let debouncer = Debouncer::new(Handle::current(), Duration::from_millis(80));
        let runs = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));
        for n in 1..=5 {
            let runs = runs.clone();
            let last = last.clone();
            debouncer.schedule("/a.md", move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                last.store(n, Ordering::SeqCst);
            });
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(debouncer.pending(), 1);
        sleep(Duration::from_millis(300)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 5);
        assert_eq!(debouncer.pending(), 0);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let debouncer = Debouncer::new(Handle::current(), Duration::from_millis(20));
        let runs = Arc::new(AtomicUsize::new(0));
        for key in ["/a.md", "/b.md", "/a.md"] {
            let runs = runs.clone();
            debouncer.schedule(key, move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_jobs_never_run() {
        let debouncer = Debouncer::new(Handle::current(), Duration::from_millis(20));
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        debouncer.schedule(1u32, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(debouncer);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
