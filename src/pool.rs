use parking_lot::Mutex;
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};
use tokio::sync::mpsc;

/// Everything [`WorkerPool::map`] collected.
#[derive(Debug)]
pub struct MapResults<T> {
    pub results: Vec<T>,
    /// Jobs that panicked. Each loses only its own item.
    pub panicked: usize,
}

/// Fixed set of blocking workers draining a bounded queue.
///
/// Jobs are synchronous (file reads and parsing), so workers run on tokio's blocking thread pool
/// while the producer awaits queue capacity. Results come back in no particular order.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        WorkerPool {
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` over every item, collecting the `Some` results. Returns once the queue is drained
    /// and every worker has exited.
    pub async fn map<I, T, F>(&self, items: Vec<I>, job: F) -> MapResults<T>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Option<T> + Send + Sync + 'static,
    {
        if items.is_empty() {
            return MapResults {
                results: Vec::new(),
                panicked: 0,
            };
        }
        let workers = self.workers.min(items.len());
        let (tx, rx) = mpsc::channel::<I>(self.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let job = Arc::new(job);

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let rx = rx.clone();
                let job = job.clone();
                tokio::task::spawn_blocking(move || {
                    let mut out = Vec::new();
                    let mut panicked = 0;
                    loop {
                        // Hold the lock only while pulling the next item.
                        let next = rx.lock().blocking_recv();
                        let Some(item) = next else {
                            break;
                        };
                        match panic::catch_unwind(AssertUnwindSafe(|| job(item))) {
                            Ok(Some(result)) => out.push(result),
                            Ok(None) => {}
                            Err(payload) => {
                                panicked += 1;
                                tracing::error!(
                                    "[WorkerPool] job panicked on worker {worker}: {}",
                                    panic_message(&*payload)
                                );
                            }
                        }
                    }
                    tracing::trace!("[WorkerPool] worker {worker} finished {} jobs", out.len());
                    (out, panicked)
                })
            })
            .collect();

        for item in items {
            if tx.send(item).await.is_err() {
                tracing::error!("[WorkerPool] all workers exited early, dropping remaining jobs");
                break;
            }
        }
        drop(tx);

        let mut collected = MapResults {
            results: Vec::new(),
            panicked: 0,
        };
        for handle in handles {
            match handle.await {
                Ok((mut out, panicked)) => {
                    collected.results.append(&mut out);
                    collected.panicked += panicked;
                }
                Err(e) => tracing::error!("[WorkerPool] worker exited abnormally: {e}"),
            }
        }
        collected
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
