//! # Worker Pool
//!
//! Polls the subscription queue and runs up to `max_concurrent_tasks`
//! coordinators at once. A message is only pulled when a permit is free, so
//! nothing sits invisible in a local buffer waiting for capacity.
//!
//! ## Shutdown
//!
//! [`WorkerHandle::shutdown`] stops polling, lets in-flight attempts finish
//! within the grace period and aborts whatever is still running after that.
//! Aborted attempts are neither acknowledged nor rejected; their messages
//! reappear once the visibility timeout lapses.
//!
//! A rejected message is hidden for `messaging.reject_delay_seconds` before
//! it is offered again, so one bad message cannot monopolize the pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::messaging::{MessagingProvider, QueuedMessage, Redelivery};
use crate::worker::attempt::{AttemptReport, Disposition};
use crate::worker::coordinator::TaskCoordinator;

/// Pause after the queue could not be read
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Running totals kept by the pool
#[derive(Debug, Default)]
pub struct PoolStats {
    received: AtomicU64,
    acknowledged: AtomicU64,
    rejected: AtomicU64,
    transport_errors: AtomicU64,
    abandoned: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatsSnapshot {
    pub received: u64,
    pub acknowledged: u64,
    pub rejected: u64,
    pub transport_errors: u64,
    pub abandoned: u64,
}

impl PoolStats {
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct WorkerPool {
    coordinator: Arc<TaskCoordinator>,
    messaging: Arc<MessagingProvider>,
    queue_name: String,
    max_concurrent: usize,
    batch_size: usize,
    visibility_timeout: Duration,
    polling_interval: Duration,
    reject_delay: Duration,
    default_grace: Duration,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    pub fn new(
        config: &WorkerConfig,
        coordinator: Arc<TaskCoordinator>,
        messaging: Arc<MessagingProvider>,
    ) -> Self {
        Self {
            coordinator,
            messaging,
            queue_name: config.subscription_queue_name(),
            max_concurrent: config.worker.max_concurrent_tasks.max(1),
            batch_size: config.messaging.batch_size.max(1),
            visibility_timeout: config.visibility_timeout(),
            polling_interval: config.polling_interval(),
            reject_delay: config.reject_delay(),
            default_grace: config.shutdown_grace(),
            stats: Arc::new(PoolStats::default()),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Spawn the polling loop
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        let stats = self.stats.clone();
        let queue_name = self.queue_name.clone();

        info!(
            queue = %self.queue_name,
            max_concurrent_tasks = self.max_concurrent,
            batch_size = self.batch_size,
            visibility_timeout_secs = self.visibility_timeout.as_secs(),
            reject_delay_secs = self.reject_delay.as_secs(),
            "Worker pool started"
        );

        let task = tokio::spawn(self.run(shutdown_rx));

        WorkerHandle {
            shutdown_tx,
            task,
            stats,
            queue_name,
        }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<Option<Duration>>) -> PoolStatsSnapshot {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks: JoinSet<()> = JoinSet::new();

        let grace = loop {
            if let Some(grace) = self.shutdown_requested(&shutdown_rx) {
                break grace;
            }

            while let Some(joined) = tasks.try_join_next() {
                self.reap(joined);
            }

            let first = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => continue,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break self.default_grace,
                },
            };

            let mut permits = vec![first];
            while permits.len() < self.batch_size {
                match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permits.push(permit),
                    Err(_) => break,
                }
            }

            match self
                .messaging
                .receive_messages::<Value>(&self.queue_name, permits.len(), self.visibility_timeout)
                .await
            {
                Ok(messages) if messages.is_empty() => {
                    drop(permits);
                    idle(&mut shutdown_rx, self.polling_interval).await;
                }
                Ok(messages) => {
                    debug!(queue = %self.queue_name, count = messages.len(), "Received messages");
                    PoolStats::bump(&self.stats.received, messages.len() as u64);
                    for (message, permit) in messages.into_iter().zip(permits) {
                        self.dispatch(&mut tasks, message, permit);
                    }
                }
                Err(e) => {
                    drop(permits);
                    PoolStats::bump(&self.stats.transport_errors, 1);
                    error!(
                        queue = %self.queue_name,
                        error = %e,
                        backoff_secs = RECEIVE_ERROR_BACKOFF.as_secs(),
                        "Failed to receive messages"
                    );
                    idle(&mut shutdown_rx, RECEIVE_ERROR_BACKOFF).await;
                }
            }
        };

        self.drain(tasks, grace).await;
        self.stats.snapshot()
    }

    fn shutdown_requested(&self, shutdown_rx: &watch::Receiver<Option<Duration>>) -> Option<Duration> {
        if let Some(grace) = *shutdown_rx.borrow() {
            return Some(grace);
        }
        // Handle dropped without an explicit shutdown
        shutdown_rx.has_changed().is_err().then_some(self.default_grace)
    }

    fn dispatch(
        &self,
        tasks: &mut JoinSet<()>,
        message: QueuedMessage<Value>,
        permit: OwnedSemaphorePermit,
    ) {
        let coordinator = self.coordinator.clone();
        let messaging = self.messaging.clone();
        let stats = self.stats.clone();
        let queue_name = self.queue_name.clone();
        let redelivery = Redelivery::After(self.reject_delay);

        tasks.spawn(async move {
            let _permit = permit;
            let report = coordinator.process(&message).await;
            settle(&messaging, &queue_name, &message, &report, redelivery, &stats).await;
        });
    }

    fn reap(&self, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                PoolStats::bump(&self.stats.abandoned, 1);
                error!(queue = %self.queue_name, error = %e, "Attempt task panicked");
            }
        }
    }

    async fn drain(&self, mut tasks: JoinSet<()>, grace: Duration) {
        info!(
            queue = %self.queue_name,
            in_flight = tasks.len(),
            grace_secs = grace.as_secs(),
            "Worker pool draining"
        );

        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                self.reap(joined);
            }
        })
        .await;

        if drained.is_err() {
            let remaining = tasks.len() as u64;
            PoolStats::bump(&self.stats.abandoned, remaining);
            warn!(
                queue = %self.queue_name,
                abandoned = remaining,
                "Grace period elapsed, aborting in-flight attempts"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        info!(queue = %self.queue_name, "Worker pool stopped");
    }
}

/// Apply the coordinator's disposition to the transport
async fn settle(
    messaging: &MessagingProvider,
    queue_name: &str,
    message: &QueuedMessage<Value>,
    report: &AttemptReport,
    redelivery: Redelivery,
    stats: &PoolStats,
) {
    let result = match report.disposition {
        Disposition::Ack => {
            PoolStats::bump(&stats.acknowledged, 1);
            messaging.ack_message(queue_name, &message.receipt_handle).await
        }
        Disposition::Reject => {
            PoolStats::bump(&stats.rejected, 1);
            messaging
                .nack_message(queue_name, &message.receipt_handle, redelivery)
                .await
        }
    };

    if let Err(e) = result {
        PoolStats::bump(&stats.transport_errors, 1);
        warn!(
            queue = %queue_name,
            receipt_handle = %message.receipt_handle,
            key = ?report.key,
            disposition = ?report.disposition,
            error = %e,
            "Failed to settle message"
        );
    }
}

async fn idle(shutdown_rx: &mut watch::Receiver<Option<Duration>>, pause: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(pause) => {}
        _ = shutdown_rx.changed() => {}
    }
}

/// Control handle for a running pool
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<Option<Duration>>,
    task: JoinHandle<PoolStatsSnapshot>,
    stats: Arc<PoolStats>,
    queue_name: String,
}

impl WorkerHandle {
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop polling and wait up to `grace` for in-flight attempts
    pub async fn shutdown(self, grace: Duration) -> PoolStatsSnapshot {
        // Err only means the loop already exited
        let _ = self.shutdown_tx.send(Some(grace));

        match self.task.await {
            Ok(summary) => summary,
            Err(e) => {
                error!(queue = %self.queue_name, error = %e, "Worker pool task failed");
                self.stats.snapshot()
            }
        }
    }
}
