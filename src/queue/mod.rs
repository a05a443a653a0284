use crate::error::{RelayError, SubmissionError};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

pub mod worker;

pub use worker::{DeliveryWorker, ReportSink, TracingSink, WorkerHandle, WorkerStats};

/// One report waiting to be delivered
#[derive(Debug, Clone)]
pub struct DeliveryTask {
    pub id: Uuid,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl DeliveryTask {
    pub fn new(payload: Vec<u8>) -> Self {
        Self::with_id(Uuid::new_v4(), payload)
    }

    /// A task whose id was already written into its payload
    pub fn with_id(id: Uuid, payload: Vec<u8>) -> Self {
        Self {
            id,
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Asynchronous work queue for delivery tasks
///
/// `submit` is called on the request path and must not wait: hand the task over
/// or fail right away. Delivery and retries are the queue's business.
pub trait TaskQueue: Send + Sync + 'static {
    fn submit(&self, task: DeliveryTask) -> Result<(), SubmissionError>;
}

/// In-process queue backed by a bounded tokio channel
#[derive(Clone, Debug)]
pub struct ChannelQueue {
    sender: mpsc::Sender<DeliveryTask>,
    capacity: usize,
}

/// Consuming end of a `ChannelQueue`
#[derive(Debug)]
pub struct TaskReceiver {
    receiver: mpsc::Receiver<DeliveryTask>,
}

impl ChannelQueue {
    pub fn new(capacity: usize) -> crate::Result<(Self, TaskReceiver)> {
        if capacity == 0 {
            return Err(RelayError::config(
                "queue_capacity",
                "capacity must be greater than zero",
            ));
        }
        let (sender, receiver) = mpsc::channel(capacity);
        Ok((Self { sender, capacity }, TaskReceiver { receiver }))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks currently waiting
    pub fn len(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskQueue for ChannelQueue {
    fn submit(&self, task: DeliveryTask) -> Result<(), SubmissionError> {
        self.sender.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmissionError::Full {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => SubmissionError::Closed,
        })
    }
}

impl TaskReceiver {
    /// Next task, or `None` once every queue handle is dropped and the queue is drained
    pub async fn recv(&mut self) -> Option<DeliveryTask> {
        self.receiver.recv().await
    }

    /// Stop accepting tasks; already queued tasks can still be received.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}
