use crate::config::RelayConfig;
use crate::error::ReportingFailure;
use crate::queue::{DeliveryTask, TaskReceiver};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Final destination of error reports
///
/// Anything that goes wrong here is a `ReportingFailure`.
#[async_trait]
pub trait ReportSink: Send + Sync + 'static {
    async fn deliver(&self, task: &DeliveryTask) -> Result<(), ReportingFailure>;
}

/// Sink that writes each report to the log
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl ReportSink for TracingSink {
    async fn deliver(&self, task: &DeliveryTask) -> Result<(), ReportingFailure> {
        let payload = std::str::from_utf8(&task.payload)
            .map_err(|e| ReportingFailure::with_source("payload is not valid UTF-8", e))?;
        tracing::info!(task_id = %task.id, payload, "error report");
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub delivered: u64,
    pub dropped: u64,
}

/// Drains a `ChannelQueue` into a `ReportSink`
pub struct DeliveryWorker {
    receiver: TaskReceiver,
    sink: Arc<dyn ReportSink>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl DeliveryWorker {
    pub fn new(receiver: TaskReceiver, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            receiver,
            sink,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn from_config(
        receiver: TaskReceiver,
        sink: Arc<dyn ReportSink>,
        config: &RelayConfig,
    ) -> Self {
        Self::new(receiver, sink)
            .max_attempts(config.max_attempts)
            .retry_delay(config.retry_delay)
    }

    /// Delivery attempts per task, at least one
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Deliver tasks until every queue handle is dropped.
    pub async fn run(self) -> WorkerStats {
        let (_keep_open, shutdown) = oneshot::channel();
        self.run_until(shutdown).await
    }

    /// Run on the tokio runtime.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(self.run_until(shutdown_rx));
        WorkerHandle {
            shutdown: shutdown_tx,
            join,
        }
    }

    async fn run_until(mut self, mut shutdown: oneshot::Receiver<()>) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let mut listening = true;

        loop {
            tokio::select! {
                task = self.receiver.recv() => match task {
                    Some(task) => self.process(task, &mut stats).await,
                    None => break,
                },
                signal = &mut shutdown, if listening => {
                    if signal.is_err() {
                        // Handle dropped without asking for shutdown
                        listening = false;
                        continue;
                    }
                    tracing::info!("Delivery worker shutting down, draining queue...");
                    self.receiver.close();
                    while let Some(task) = self.receiver.recv().await {
                        self.process(task, &mut stats).await;
                    }
                    break;
                }
            }
        }

        tracing::info!(
            delivered = stats.delivered,
            dropped = stats.dropped,
            "Delivery worker stopped"
        );
        stats
    }

    async fn process(&self, task: DeliveryTask, stats: &mut WorkerStats) {
        for attempt in 1..=self.max_attempts {
            match self.sink.deliver(&task).await {
                Ok(()) => {
                    tracing::debug!(task_id = %task.id, attempt, "error report delivered");
                    stats.delivered += 1;
                    return;
                }
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(task_id = %task.id, attempt, error = %e, "error report delivery failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    tracing::warn!(task_id = %task.id, attempt, error = %e, "error report delivery failed, dropping task");
                }
            }
        }
        stats.dropped += 1;
    }
}

/// Handle to a spawned `DeliveryWorker`
pub struct WorkerHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<WorkerStats>,
}

impl WorkerHandle {
    /// Stop accepting tasks, deliver what is already queued, and wait for the worker.
    pub async fn shutdown(self) -> Result<WorkerStats, ReportingFailure> {
        let _ = self.shutdown.send(());
        self.join
            .await
            .map_err(|e| ReportingFailure::with_source("delivery worker failed", e))
    }
}
