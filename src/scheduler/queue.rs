//! Hand-off of claimed units from the scheduler to workers.
//!
//! Delivery is at-least-once; workers check the unit is still
//! `processing` before running it, so a duplicate is harmless.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::error::QueueError;
use crate::models::UnitKey;

#[async_trait]
pub trait UnitQueue: Send + Sync {
    async fn enqueue(&self, key: UnitKey) -> Result<(), QueueError>;

    /// Next queued unit, or `None` when the queue is empty.
    async fn dequeue(&self) -> Result<Option<UnitKey>, QueueError>;
}

/// In-process queue over an unbounded tokio channel.
pub struct ChannelQueue {
    tx: mpsc::UnboundedSender<UnitKey>,
    rx: Mutex<mpsc::UnboundedReceiver<UnitKey>>,
}

impl Default for ChannelQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

#[async_trait]
impl UnitQueue for ChannelQueue {
    async fn enqueue(&self, key: UnitKey) -> Result<(), QueueError> {
        self.tx.send(key).map_err(|_| QueueError::Closed)
    }

    async fn dequeue(&self) -> Result<Option<UnitKey>, QueueError> {
        let mut rx = self.rx.lock().await;
        match rx.try_recv() {
            Ok(key) => Ok(Some(key)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(QueueError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_then_empty() {
        let queue = ChannelQueue::new();
        let a = UnitKey::new(2020, 1).unwrap();
        let b = UnitKey::new(2020, 2).unwrap();
        queue.enqueue(a).await.unwrap();
        queue.enqueue(b).await.unwrap();
        assert_eq!(queue.dequeue().await.unwrap(), Some(a));
        assert_eq!(queue.dequeue().await.unwrap(), Some(b));
        assert_eq!(queue.dequeue().await.unwrap(), None);
    }
}
