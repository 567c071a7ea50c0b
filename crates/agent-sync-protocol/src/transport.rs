//! Transport abstraction for the sync protocol.
//!
//! The egress side is a send-only channel opened by a [`Connector`] against a
//! fixed location. Responses from the remote arrive through a separate
//! [`Inbox`]. Neither side guarantees delivery.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Opens send-only channels to a queue location.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The channel type produced by this connector.
    type Channel: Channel;

    /// Open a fresh channel to `location`.
    async fn connect(&self, location: &str) -> Result<Self::Channel>;
}

/// A send-only, best-effort channel.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Send one opaque payload tagged with a routing label.
    async fn send(&self, payload: &[u8], label: &str) -> Result<()>;
}

/// Source of remote responses.
#[async_trait]
pub trait Inbox: Send + Sync {
    /// Receive the next response.
    ///
    /// Returns None if the timeout expires before a response arrives.
    async fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Discard every response that is already waiting.
    ///
    /// Returns the number of responses discarded.
    async fn drain(&self) -> Result<usize> {
        let mut discarded = 0;
        while self.recv_timeout(Duration::ZERO).await?.is_some() {
            discarded += 1;
        }
        Ok(discarded)
    }
}

/// In-memory transports for testing.
///
/// [`MemoryConnector`] records every frame that reaches it and can be told to
/// fail connects or sends; [`MemoryInbox`] hands out whatever was pushed into
/// it, in order.
pub mod memory {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex, PoisonError};
    use tokio::sync::{mpsc, Mutex as AsyncMutex};

    use crate::error::SyncError;

    /// One payload as it reached the queue.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Frame {
        /// Location of the channel it was sent on.
        pub location: String,
        /// Routing label supplied by the sender.
        pub label: String,
        /// Opaque payload.
        pub payload: Vec<u8>,
    }

    #[derive(Default)]
    struct QueueState {
        frames: Vec<Frame>,
        connects: usize,
        failing_connects: usize,
        send_attempts: usize,
        failing_attempts: BTreeSet<usize>,
    }

    /// In-memory queue endpoint. Cloning shares the same queue.
    #[derive(Clone, Default)]
    pub struct MemoryConnector {
        state: Arc<Mutex<QueueState>>,
    }

    impl MemoryConnector {
        /// Create a connector over an empty queue.
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `count` connect attempts fail.
        pub fn fail_next_connects(&self, count: usize) {
            self.with_state(|s| s.failing_connects += count);
        }

        /// Make the next `count` send attempts fail.
        pub fn fail_next_sends(&self, count: usize) {
            self.with_state(|s| {
                let first = s.send_attempts;
                s.failing_attempts.extend(first..first + count);
            });
        }

        /// Make the send attempts with these zero-based indices fail.
        pub fn fail_send_attempts(&self, attempts: impl IntoIterator<Item = usize>) {
            self.with_state(|s| s.failing_attempts.extend(attempts));
        }

        /// Frames delivered so far.
        pub fn frames(&self) -> Vec<Frame> {
            self.with_state(|s| s.frames.clone())
        }

        /// Number of connect attempts, successful or not.
        pub fn connect_count(&self) -> usize {
            self.with_state(|s| s.connects)
        }

        /// Number of send attempts, successful or not.
        pub fn send_attempts(&self) -> usize {
            self.with_state(|s| s.send_attempts)
        }

        fn with_state<T>(&self, f: impl FnOnce(&mut QueueState) -> T) -> T {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut state)
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        type Channel = MemoryChannel;

        async fn connect(&self, location: &str) -> Result<MemoryChannel> {
            let refused = self.with_state(|s| {
                s.connects += 1;
                if s.failing_connects > 0 {
                    s.failing_connects -= 1;
                    true
                } else {
                    false
                }
            });

            if refused {
                return Err(SyncError::TransportError("connection refused".into()));
            }

            Ok(MemoryChannel {
                location: location.to_string(),
                queue: self.clone(),
            })
        }
    }

    /// Channel handed out by [`MemoryConnector`].
    pub struct MemoryChannel {
        location: String,
        queue: MemoryConnector,
    }

    #[async_trait]
    impl Channel for MemoryChannel {
        async fn send(&self, payload: &[u8], label: &str) -> Result<()> {
            let delivered = self.queue.with_state(|s| {
                let attempt = s.send_attempts;
                s.send_attempts += 1;
                if s.failing_attempts.remove(&attempt) {
                    return false;
                }
                s.frames.push(Frame {
                    location: self.location.clone(),
                    label: label.to_string(),
                    payload: payload.to_vec(),
                });
                true
            });

            if delivered {
                Ok(())
            } else {
                Err(SyncError::TransportError("queue rejected message".into()))
            }
        }
    }

    /// Response queue fed by the test.
    pub struct MemoryInbox {
        sender: mpsc::UnboundedSender<Vec<u8>>,
        receiver: AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    }

    impl MemoryInbox {
        /// Create an empty inbox.
        pub fn new() -> Self {
            let (sender, receiver) = mpsc::unbounded_channel();
            Self {
                sender,
                receiver: AsyncMutex::new(receiver),
            }
        }

        /// Queue a raw response.
        pub fn push(&self, bytes: Vec<u8>) {
            // The receiver lives as long as self, so this cannot fail.
            let _ = self.sender.send(bytes);
        }

        /// A handle that can queue responses from elsewhere.
        pub fn handle(&self) -> mpsc::UnboundedSender<Vec<u8>> {
            self.sender.clone()
        }
    }

    impl Default for MemoryInbox {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Inbox for MemoryInbox {
        async fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
            let mut rx = self.receiver.lock().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(bytes)) => Ok(Some(bytes)),
                Ok(None) => Err(SyncError::InboxClosed),
                Err(_) => Ok(None),
            }
        }

        async fn drain(&self) -> Result<usize> {
            let mut rx = self.receiver.lock().await;
            let mut discarded = 0;
            while rx.try_recv().is_ok() {
                discarded += 1;
            }
            Ok(discarded)
        }
    }
}

/// Unix datagram transport.
///
/// Every payload is one datagram framed as `<tag>:<label>:<payload>`, sent to
/// the socket bound at the queue location.
#[cfg(unix)]
pub mod unix {
    use super::*;
    use std::path::Path;
    use tokio::net::UnixDatagram;

    use crate::error::SyncError;

    /// Largest datagram [`UnixInbox`] accepts by default.
    pub const DEFAULT_MAX_DATAGRAM: usize = 64 * 1024;

    /// Build the datagram for one payload.
    pub fn frame_message(tag: u8, label: &str, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(payload.len() + label.len() + 3);
        buf.push(tag);
        buf.push(b':');
        buf.extend_from_slice(label.as_bytes());
        buf.push(b':');
        buf.extend_from_slice(payload);
        buf
    }

    /// Opens datagram channels to a Unix socket path.
    #[derive(Debug, Clone, Copy)]
    pub struct UnixQueueConnector {
        tag: u8,
    }

    impl UnixQueueConnector {
        /// Create a connector that frames messages with `tag`.
        pub fn new(tag: u8) -> Self {
            Self { tag }
        }
    }

    #[async_trait]
    impl Connector for UnixQueueConnector {
        type Channel = UnixQueueChannel;

        async fn connect(&self, location: &str) -> Result<UnixQueueChannel> {
            let socket =
                UnixDatagram::unbound().map_err(|e| SyncError::TransportError(e.to_string()))?;
            socket
                .connect(location)
                .map_err(|e| SyncError::TransportError(format!("{location}: {e}")))?;

            Ok(UnixQueueChannel {
                socket,
                tag: self.tag,
            })
        }
    }

    /// A connected datagram socket.
    pub struct UnixQueueChannel {
        socket: UnixDatagram,
        tag: u8,
    }

    #[async_trait]
    impl Channel for UnixQueueChannel {
        async fn send(&self, payload: &[u8], label: &str) -> Result<()> {
            let frame = frame_message(self.tag, label, payload);
            let written = self
                .socket
                .send(&frame)
                .await
                .map_err(|e| SyncError::TransportError(e.to_string()))?;

            if written != frame.len() {
                return Err(SyncError::TransportError(format!(
                    "short datagram: {written} of {} bytes",
                    frame.len()
                )));
            }
            Ok(())
        }
    }

    /// Receives remote responses on a bound datagram socket.
    pub struct UnixInbox {
        socket: UnixDatagram,
        max_datagram: usize,
    }

    impl UnixInbox {
        /// Bind a response socket at `path`.
        pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
            let path = path.as_ref();
            let socket = UnixDatagram::bind(path).map_err(|e| SyncError::TransportUnavailable {
                location: path.display().to_string(),
                reason: e.to_string(),
            })?;

            Ok(Self {
                socket,
                max_datagram: DEFAULT_MAX_DATAGRAM,
            })
        }

        /// Change the largest accepted datagram.
        pub fn with_max_datagram(mut self, max_datagram: usize) -> Self {
            self.max_datagram = max_datagram;
            self
        }
    }

    #[async_trait]
    impl Inbox for UnixInbox {
        async fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
            let mut buf = vec![0u8; self.max_datagram];
            match tokio::time::timeout(timeout, self.socket.recv(&mut buf)).await {
                Ok(Ok(len)) => {
                    buf.truncate(len);
                    Ok(Some(buf))
                }
                Ok(Err(e)) => Err(SyncError::TransportError(e.to_string())),
                Err(_) => Ok(None),
            }
        }

        async fn drain(&self) -> Result<usize> {
            let mut buf = vec![0u8; self.max_datagram];
            let mut discarded = 0;
            loop {
                match self.socket.try_recv(&mut buf) {
                    Ok(_) => discarded += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(discarded),
                    Err(e) => return Err(SyncError::TransportError(e.to_string())),
                }
            }
        }
    }
}
