//! Queue sender: a lazily opened channel with one reopen-and-retry per send.

use tokio::sync::Mutex;

use crate::error::{Result, SyncError};
use crate::transport::{Channel, Connector};

/// Owns the engine's single egress channel.
///
/// The channel is opened on first use and reused afterwards. A failed send
/// replaces the channel and retries the same payload exactly once.
pub struct QueueSender<C: Connector> {
    connector: C,
    location: String,
    channel: Mutex<Option<C::Channel>>,
}

impl<C: Connector> QueueSender<C> {
    /// Create a sender for `location`. Nothing is opened yet.
    pub fn new(connector: C, location: impl Into<String>) -> Self {
        Self {
            connector,
            location: location.into(),
            channel: Mutex::new(None),
        }
    }

    /// The queue location this sender targets.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The underlying connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Check whether a channel is currently held.
    pub async fn is_open(&self) -> bool {
        self.channel.lock().await.is_some()
    }

    /// Open the channel if it is not open yet.
    pub async fn ensure_open(&self) -> Result<()> {
        let mut guard = self.channel.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        Ok(())
    }

    /// Send one payload, reopening the channel once on failure.
    pub async fn send(&self, payload: &[u8], label: &str) -> Result<()> {
        let mut guard = self.channel.lock().await;

        let channel = match guard.take() {
            Some(channel) => channel,
            None => self.open().await?,
        };

        let first = channel.send(payload, label).await;
        match first {
            Ok(()) => {
                *guard = Some(channel);
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(
                    location = %self.location,
                    label,
                    error = %e,
                    "send failed, reopening queue"
                );
            }
        }
        drop(channel);

        let channel = self.open().await?;
        if let Err(e) = channel.send(payload, label).await {
            tracing::warn!(location = %self.location, label, error = %e, "send failed after retry");
            return Err(SyncError::SendFailed(e.to_string()));
        }

        *guard = Some(channel);
        Ok(())
    }

    async fn open(&self) -> Result<C::Channel> {
        self.connector
            .connect(&self.location)
            .await
            .map_err(|e| SyncError::TransportUnavailable {
                location: self.location.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryConnector;

    #[tokio::test]
    async fn test_lazy_open_and_reuse() {
        let queue = MemoryConnector::new();
        let sender = QueueSender::new(queue.clone(), "q");

        assert!(!sender.is_open().await);
        assert_eq!(queue.connect_count(), 0);

        sender.send(b"a", "fim").await.unwrap();
        sender.send(b"b", "fim").await.unwrap();

        assert!(sender.is_open().await);
        assert_eq!(queue.connect_count(), 1);
        assert_eq!(queue.frames().len(), 2);
    }

    #[tokio::test]
    async fn test_reopen_once_then_succeed() {
        let queue = MemoryConnector::new();
        let sender = QueueSender::new(queue.clone(), "q");
        sender.ensure_open().await.unwrap();

        queue.fail_next_sends(1);
        sender.send(b"payload", "fim").await.unwrap();

        assert_eq!(queue.connect_count(), 2);
        assert_eq!(queue.send_attempts(), 2);
        assert_eq!(queue.frames()[0].payload, b"payload".to_vec());
    }

    #[tokio::test]
    async fn test_second_failure_is_send_failed() {
        let queue = MemoryConnector::new();
        let sender = QueueSender::new(queue.clone(), "q");

        queue.fail_next_sends(2);
        let err = sender.send(b"payload", "fim").await.unwrap_err();

        assert!(matches!(err, SyncError::SendFailed(_)));
        assert_eq!(queue.send_attempts(), 2);
        assert!(queue.frames().is_empty());
        assert!(!sender.is_open().await);
    }

    #[tokio::test]
    async fn test_reopen_refused_is_transport_unavailable() {
        let queue = MemoryConnector::new();
        let sender = QueueSender::new(queue.clone(), "q");
        sender.ensure_open().await.unwrap();

        queue.fail_next_sends(1);
        queue.fail_next_connects(1);
        let err = sender.send(b"payload", "fim").await.unwrap_err();

        assert!(matches!(err, SyncError::TransportUnavailable { .. }));
        assert_eq!(queue.send_attempts(), 1);
    }

    #[tokio::test]
    async fn test_ensure_open_reports_unavailable() {
        let queue = MemoryConnector::new();
        queue.fail_next_connects(1);
        let sender = QueueSender::new(queue.clone(), "queue/sockets/queue");

        let err = sender.ensure_open().await.unwrap_err();
        match err {
            SyncError::TransportUnavailable { location, .. } => {
                assert_eq!(location, "queue/sockets/queue")
            }
            other => panic!("unexpected error: {other}"),
        }

        sender.ensure_open().await.unwrap();
        assert!(sender.is_open().await);
    }
}
