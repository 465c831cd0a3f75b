//! Bounded worker pool for paused-event processing.
//!
//! The queue holds `size * 8` tasks; submission is never blocking. A full
//! queue rejects the task and the caller degrades to continuing the event
//! untouched, since backpressure toward the browser is not an option. A
//! monitor task reports utilization every 30 seconds while traffic flows.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

const QUEUE_FACTOR: usize = 8;
const MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Queue and drop counters exposed for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub queue_len: usize,
    pub queue_cap: usize,
    pub submitted: u64,
    pub dropped: u64,
}

struct Inner {
    size: usize,
    queue_cap: usize,
    task_tx: mpsc::Sender<Task>,
    task_rx: parking_lot::Mutex<Option<mpsc::Receiver<Task>>>,
    submitted: AtomicU64,
    dropped: AtomicU64,
    started: AtomicBool,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    stop_tx: parking_lot::Mutex<Option<watch::Sender<bool>>>,
}

/// Fixed-size task pool with a bounded queue and drop-on-overflow.
pub struct WorkerPool {
    inner: Option<Arc<Inner>>,
}

impl WorkerPool {
    /// `size <= 0` disables the pool: submissions spawn directly, unbounded.
    pub fn new(size: i64) -> Self {
        if size <= 0 {
            return Self { inner: None };
        }
        let size = size as usize;
        let queue_cap = size * QUEUE_FACTOR;
        let (task_tx, task_rx) = mpsc::channel(queue_cap);
        Self {
            inner: Some(Arc::new(Inner {
                size,
                queue_cap,
                task_tx,
                task_rx: parking_lot::Mutex::new(Some(task_rx)),
                submitted: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                started: AtomicBool::new(false),
                handles: parking_lot::Mutex::new(Vec::new()),
                stop_tx: parking_lot::Mutex::new(None),
            })),
        }
    }

    /// Launch the workers and the stats monitor. Idempotent.
    pub fn start(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        if inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(task_rx) = inner.task_rx.lock().take() else {
            return;
        };
        let task_rx = Arc::new(tokio::sync::Mutex::new(task_rx));

        let mut handles = inner.handles.lock();
        for _ in 0..inner.size {
            let rx = task_rx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let task = { rx.lock().await.recv().await };
                    match task {
                        Some(task) => task.await,
                        None => break,
                    }
                }
            }));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        *inner.stop_tx.lock() = Some(stop_tx);
        handles.push(tokio::spawn(monitor(inner.clone(), stop_rx)));
    }

    /// Stop the monitor and terminate the workers.
    pub fn stop(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        if let Some(stop_tx) = inner.stop_tx.lock().take() {
            let _ = stop_tx.send(true);
        }
        for handle in inner.handles.lock().drain(..) {
            handle.abort();
        }
    }

    /// Enqueue a task without blocking. Returns false when the queue is
    /// full; the caller must degrade gracefully.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(inner) = &self.inner else {
            tokio::spawn(task);
            return true;
        };
        inner.submitted.fetch_add(1, Ordering::Relaxed);
        match inner.task_tx.try_send(Box::pin(task)) {
            Ok(()) => true,
            Err(_) => {
                let dropped = inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    queue_cap = inner.queue_cap,
                    submitted = inner.submitted.load(Ordering::Relaxed),
                    dropped,
                    "worker queue full, task dropped"
                );
                false
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let Some(inner) = &self.inner else {
            return PoolStats::default();
        };
        PoolStats {
            queue_len: inner.queue_cap - inner.task_tx.capacity(),
            queue_cap: inner.queue_cap,
            submitted: inner.submitted.load(Ordering::Relaxed),
            dropped: inner.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn monitor(inner: Arc<Inner>, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // immediate first tick
    loop {
        tokio::select! {
            _ = stop_rx.changed() => return,
            _ = ticker.tick() => {
                let submitted = inner.submitted.load(Ordering::Relaxed);
                if submitted == 0 {
                    continue;
                }
                let dropped = inner.dropped.load(Ordering::Relaxed);
                let queue_len = inner.queue_cap - inner.task_tx.capacity();
                let usage = queue_len as f64 / inner.queue_cap as f64 * 100.0;
                let drop_rate = dropped as f64 / submitted as f64 * 100.0;
                info!(
                    queue_len,
                    queue_cap = inner.queue_cap,
                    usage = format!("{usage:.1}%"),
                    submitted,
                    dropped,
                    drop_rate = format!("{drop_rate:.2}%"),
                    "worker pool status"
                );
            }
        }
    }
}
