//! The engine: persist + synchronize over an owned buffer and queue.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use agent_sync_buffer::{DifferenceBuffer, MemoryBuffer};
use agent_sync_core::{Mode, Operation, SessionId};
use agent_sync_protocol::{
    CborCodec, Connector, Inbox, MessageCodec, QueueSender, Result, SyncConfig, SyncReport,
    SyncSession,
};

/// How many finished sessions are remembered for discarding late replies.
const RETIRED_SESSIONS: usize = 16;

/// The two operations producers and schedulers need.
#[async_trait]
pub trait AgentSyncProtocol: Send + Sync {
    /// Buffer one difference for `module`.
    ///
    /// Never fails. Returns the sequence number assigned to the difference.
    fn persist(
        &self,
        module: &str,
        id: &str,
        operation: Operation,
        index: &str,
        payload: Bytes,
    ) -> u64;

    /// Run one synchronization cycle for `module`.
    ///
    /// On success the differences included in the cycle are gone from the
    /// buffer. On failure the buffer is exactly as it was.
    async fn synchronize(&self, module: &str, mode: Mode, realtime: bool) -> Result<SyncReport>;
}

/// Concrete sync engine.
///
/// Owns the difference buffer, the egress queue and the response inbox.
/// Cycles are serialized through the inbox so their responses never
/// interleave; `persist` never waits for a running cycle. Replies left over
/// from an earlier cycle are discarded before the next one starts.
pub struct SyncEngine<C: Connector, I: Inbox> {
    buffer: Arc<dyn DifferenceBuffer>,
    sender: QueueSender<C>,
    inbox: Mutex<InboxSlot<I>>,
    codec: Box<dyn MessageCodec>,
    config: SyncConfig,
}

struct InboxSlot<I> {
    inbox: I,
    retired: VecDeque<SessionId>,
}

impl<I> InboxSlot<I> {
    fn retire(&mut self, session_id: SessionId) {
        if self.retired.contains(&session_id) {
            return;
        }
        if self.retired.len() == RETIRED_SESSIONS {
            self.retired.pop_front();
        }
        self.retired.push_back(session_id);
    }
}

impl<C: Connector, I: Inbox> SyncEngine<C, I> {
    /// Create an engine with an empty in-memory buffer and the CBOR codec.
    pub fn new(connector: C, inbox: I, config: SyncConfig) -> Self {
        Self {
            buffer: Arc::new(MemoryBuffer::new()),
            sender: QueueSender::new(connector, config.queue_location.clone()),
            inbox: Mutex::new(InboxSlot {
                inbox,
                retired: VecDeque::new(),
            }),
            codec: Box::new(CborCodec),
            config,
        }
    }

    /// Use a different buffer implementation.
    pub fn with_buffer(mut self, buffer: Arc<dyn DifferenceBuffer>) -> Self {
        self.buffer = buffer;
        self
    }

    /// Use a different message codec.
    pub fn with_codec(mut self, codec: impl MessageCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// The difference buffer, for producers or inspection.
    pub fn buffer(&self) -> &Arc<dyn DifferenceBuffer> {
        &self.buffer
    }

    /// The egress queue sender.
    pub fn sender(&self) -> &QueueSender<C> {
        &self.sender
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Synchronize every module that currently has buffered differences.
    ///
    /// Modules are processed one after another; a failure in one does not
    /// stop the others.
    pub async fn synchronize_all(
        &self,
        mode: Mode,
        realtime: bool,
    ) -> Vec<(String, Result<SyncReport>)> {
        let mut results = Vec::new();
        for module in self.buffer.modules() {
            let result = self.synchronize(&module, mode, realtime).await;
            results.push((module, result));
        }
        results
    }
}

#[cfg(unix)]
impl SyncEngine<agent_sync_protocol::UnixQueueConnector, agent_sync_protocol::UnixInbox> {
    /// Create an engine that sends datagrams to the configured Unix queue.
    pub fn unix(inbox: agent_sync_protocol::UnixInbox, config: SyncConfig) -> Self {
        let connector = agent_sync_protocol::UnixQueueConnector::new(config.queue_tag);
        Self::new(connector, inbox, config)
    }
}

#[async_trait]
impl<C: Connector, I: Inbox> AgentSyncProtocol for SyncEngine<C, I> {
    fn persist(
        &self,
        module: &str,
        id: &str,
        operation: Operation,
        index: &str,
        payload: Bytes,
    ) -> u64 {
        self.buffer.append(module, id, index, operation, payload)
    }

    async fn synchronize(&self, module: &str, mode: Mode, realtime: bool) -> Result<SyncReport> {
        let mut slot = self.inbox.lock().await;

        let stale = slot.inbox.drain().await?;
        if stale > 0 {
            tracing::debug!(module, count = stale, "discarded replies left from an earlier cycle");
        }

        let mut session = SyncSession::new(
            &self.sender,
            &slot.inbox,
            self.buffer.as_ref(),
            self.codec.as_ref(),
            &self.config,
            module,
            mode,
            realtime,
        )
        .with_retired_sessions(slot.retired.iter().copied());

        let result = session.run().await;
        let session_id = session.session_id();
        if let Some(session_id) = session_id {
            slot.retire(session_id);
        }

        if let Err(e) = &result {
            tracing::warn!(
                module,
                session = ?session_id,
                error = %e,
                "synchronization failed, differences kept for next cycle"
            );
        }
        result
    }
}
