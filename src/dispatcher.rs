use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dead_letter::{DeadLetterSink, InMemoryDeadLetters};
use crate::delivery::DeliveryClient;
use crate::error::DispatchError;
use crate::types::{DeadLetter, InboundEvent};
use crate::worker::{metric_inc, worker_loop, Job, RetryPolicy, WorkerContext};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Fixed number of workers, and so the cap on concurrent deliveries.
    pub worker_count: usize,
    /// Jobs that may wait for a worker before dispatch reports backpressure.
    pub queue_capacity: usize,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub retry_jitter_ms: u64,
    pub dlq_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            worker_count,
            queue_capacity: 1_000,
            retry_base_ms: 100,
            retry_max_ms: 5_000,
            retry_jitter_ms: 50,
            dlq_capacity: 10_000,
        }
    }
}

/// Hands accepted events to a bounded pool of delivery workers.
///
/// `dispatch` never waits: it either places the event on the bounded queue
/// or reports [`DispatchError::Backpressure`]. Events are processed
/// concurrently, so deliveries may complete out of submission order.
pub struct Dispatcher {
    tx: std::sync::Mutex<Option<mpsc::Sender<Job>>>,
    is_running: AtomicBool,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    dead_letters: Arc<dyn DeadLetterSink>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Start the worker pool with an in-memory dead-letter buffer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: DispatcherConfig, client: DeliveryClient) -> Self {
        let sink: Arc<dyn DeadLetterSink> = Arc::new(InMemoryDeadLetters::new(config.dlq_capacity));
        Self::with_dead_letter_sink(config, client, sink)
    }

    pub fn with_dead_letter_sink(
        config: DispatcherConfig,
        client: DeliveryClient,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        let worker_count = config.worker_count.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let shared_rx = Arc::new(Mutex::new(rx));

        let retry = RetryPolicy {
            max_retries: client.collector().max_retries,
            base_ms: config.retry_base_ms,
            max_ms: config.retry_max_ms,
            jitter_ms: config.retry_jitter_ms,
        };

        let ctx = Arc::new(WorkerContext {
            client,
            retry,
            dead_letters: dead_letters.clone(),
        });

        let worker_handles = (0..worker_count)
            .map(|worker_id| tokio::spawn(worker_loop(worker_id, shared_rx.clone(), ctx.clone())))
            .collect();

        info!(
            worker_count,
            queue_capacity = config.queue_capacity.max(1),
            collector = %ctx.client.collector().url,
            "dispatcher started"
        );

        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            is_running: AtomicBool::new(true),
            worker_handles: Mutex::new(worker_handles),
            dead_letters,
            config,
        }
    }

    /// Queue an event for transform and delivery.
    ///
    /// Returns as soon as the event is queued; delivery outcome is never
    /// reported back to the caller.
    pub fn dispatch(&self, event: InboundEvent) -> Result<(), DispatchError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(DispatchError::Shutdown);
        }

        let guard = self.tx.lock().map_err(|_| DispatchError::Shutdown)?;
        let Some(tx) = guard.as_ref() else {
            return Err(DispatchError::Shutdown);
        };

        match tx.try_send(Job::new(event)) {
            Ok(()) => {
                metric_inc("relay.dispatch.enqueued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                metric_inc("relay.dispatch.backpressure");
                warn!(
                    message_id = %job.event.message_id,
                    queue_capacity = self.config.queue_capacity,
                    "dispatch queue full, rejecting event"
                );
                Err(DispatchError::Backpressure)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                metric_inc("relay.dispatch.shutdown");
                Err(DispatchError::Shutdown)
            }
        }
    }

    /// Stop accepting events, let workers drain the queue, and wait for them.
    pub async fn shutdown(&self) {
        self.is_running.store(false, Ordering::SeqCst);

        // Dropping the only sender closes the queue once it is drained.
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }

        let handles: Vec<_> = self.worker_handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "worker task ended abnormally");
            }
        }

        debug!("dispatcher shut down");
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Number of jobs waiting for a worker.
    pub fn queue_depth(&self) -> usize {
        match self.tx.lock() {
            Ok(guard) => guard
                .as_ref()
                .map(|tx| tx.max_capacity() - tx.capacity())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.snapshot().await
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }
}
