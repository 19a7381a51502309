use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, warn};

use crate::dead_letter::DeadLetterSink;
use crate::delivery::DeliveryClient;
use crate::transform::transform;
use crate::types::{DeadLetter, InboundEvent};

#[cfg(feature = "metrics")]
pub(crate) fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn metric_inc(_name: &'static str) {}

/// A unit of work consumed by workers.
#[derive(Debug)]
pub struct Job {
    pub event: InboundEvent,
    pub accepted_at: Instant,
}

impl Job {
    pub fn new(event: InboundEvent) -> Self {
        Self {
            event,
            accepted_at: Instant::now(),
        }
    }
}

/// Exponential backoff between delivery attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_ms: u64,
    pub max_ms: u64,
    pub jitter_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_ms.max(1);
        let max = self.max_ms.max(base);
        let pow = 2u64.saturating_pow(attempt.saturating_sub(1));
        let exp = base.saturating_mul(pow);
        Duration::from_millis(exp.min(max))
    }

    fn jitter(&self) -> Duration {
        if self.jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(fastrand::u64(0..=self.jitter_ms))
    }
}

/// Shared, read-only context for all workers.
pub struct WorkerContext {
    /// Outbound client; safe for concurrent use.
    pub client: DeliveryClient,

    pub retry: RetryPolicy,

    /// Where exhausted or permanently failed deliveries end up.
    pub dead_letters: Arc<dyn DeadLetterSink>,
}

/// Main worker loop.
///
/// Each worker:
/// - Pulls jobs from the shared queue
/// - Transforms and delivers one event at a time
/// - Retries retryable failures with exponential backoff
/// - Exits once the queue is closed and drained
pub async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    ctx: Arc<WorkerContext>,
) {
    loop {
        let job = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };

        let Some(job) = job else { break };

        process_job(job, &ctx).await;
    }

    debug!(worker_id, "worker stopped");
}

async fn process_job(job: Job, ctx: &WorkerContext) {
    let queued_for = job.accepted_at.elapsed();
    let event = transform(job.event);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let err = match ctx.client.deliver(&event).await {
            Ok(()) => {
                metric_inc("relay.delivery.success");
                debug!(
                    message_id = %event.message_id,
                    attempt,
                    queued_ms = queued_for.as_millis() as u64,
                    "event delivered"
                );
                return;
            }
            Err(err) => err,
        };

        metric_inc("relay.delivery.failure");

        if err.is_retryable() && attempt <= ctx.retry.max_retries {
            let delay = ctx.retry.delay_for_attempt(attempt) + ctx.retry.jitter();
            metric_inc("relay.delivery.retry");
            warn!(
                message_id = %event.message_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "delivery failed, retrying"
            );
            sleep(delay).await;
            continue;
        }

        error!(
            message_id = %event.message_id,
            attempt,
            status = err.status(),
            retryable = err.is_retryable(),
            error = %err,
            "delivery failed, dead-lettering event"
        );

        let letter = DeadLetter {
            status: err.status(),
            error: err.to_string(),
            attempts: attempt,
            failed_at_secs: now_secs(),
            event,
        };
        ctx.dead_letters.record(letter).await;
        metric_inc("relay.dlq.inserted");
        return;
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
