//! Sync session state machine.
//!
//! One session drives one synchronization cycle for one module:
//!
//! ```text
//! Idle -> AwaitingStartAck -> Streaming -> AwaitingEndResolution -> Complete
//!   \            \                \                  \
//!    +------------+----------------+------------------+--> Failed
//! ```
//!
//! The buffer is only read while the cycle runs. Entries are removed after
//! the remote confirms completion, and only up to the watermark captured when
//! Start was built.

use agent_sync_buffer::DifferenceBuffer;
use agent_sync_core::{Difference, Mode, SeqRange, SessionId};

use crate::codec::MessageCodec;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::messages::{AckStatus, SyncMessage};
use crate::sender::QueueSender;
use crate::transport::{Connector, Inbox};

/// Where a session is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing sent yet.
    Idle,
    /// Start sent, waiting for the session token.
    AwaitingStartAck,
    /// Sending every buffered difference once.
    Streaming,
    /// End sent, answering retransmission requests.
    AwaitingEndResolution,
    /// The remote confirmed every difference; confirmed entries were cleared.
    Complete,
    /// The cycle stopped early; the buffer is untouched.
    Failed,
}

impl SessionState {
    /// Check whether the session can make no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Failed)
    }
}

/// Result of a completed sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Module that was synchronized.
    pub module: String,
    /// Session token assigned by the remote.
    pub session_id: SessionId,
    /// Number of differences advertised in Start.
    pub advertised: u64,
    /// Data messages sent while streaming.
    pub data_sent: usize,
    /// Data messages resent on request.
    pub retransmitted: usize,
    /// Retransmission requests answered.
    pub rounds: u32,
    /// Highest sequence included in the cycle, if any.
    pub watermark: Option<u64>,
    /// Entries removed from the buffer on completion.
    pub cleared: usize,
}

/// One synchronization cycle.
///
/// Borrows the engine's collaborators for the duration of the cycle; nothing
/// about the session outlives [`SyncSession::run`].
pub struct SyncSession<'a, C: Connector, I: Inbox> {
    sender: &'a QueueSender<C>,
    inbox: &'a I,
    buffer: &'a dyn DifferenceBuffer,
    codec: &'a dyn MessageCodec,
    config: &'a SyncConfig,
    module: String,
    mode: Mode,
    realtime: bool,
    state: SessionState,
    session_id: Option<SessionId>,
    retired: Vec<SessionId>,
}

impl<'a, C: Connector, I: Inbox> SyncSession<'a, C, I> {
    /// Create a session in the Idle state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sender: &'a QueueSender<C>,
        inbox: &'a I,
        buffer: &'a dyn DifferenceBuffer,
        codec: &'a dyn MessageCodec,
        config: &'a SyncConfig,
        module: impl Into<String>,
        mode: Mode,
        realtime: bool,
    ) -> Self {
        Self {
            sender,
            inbox,
            buffer,
            codec,
            config,
            module: module.into(),
            mode,
            realtime,
            state: SessionState::Idle,
            session_id: None,
            retired: Vec::new(),
        }
    }

    /// Sessions that ended earlier. Late replies addressed to them are
    /// discarded instead of failing this cycle.
    pub fn with_retired_sessions(mut self, retired: impl IntoIterator<Item = SessionId>) -> Self {
        self.retired = retired.into_iter().collect();
        self
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session token, once StartAck was received.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// Run the cycle to Complete or Failed.
    pub async fn run(&mut self) -> Result<SyncReport> {
        match self.drive().await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::debug!(
                    module = %self.module,
                    state = ?self.state,
                    error = %e,
                    "sync cycle aborted"
                );
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<SyncReport> {
        self.sender.ensure_open().await?;

        let snapshot = self.buffer.snapshot(&self.module);
        let watermark = snapshot.last().map(|diff| diff.sequence);
        let advertised = snapshot.len() as u64;

        // Idle -> AwaitingStartAck
        self.send(&SyncMessage::Start {
            module: self.module.clone(),
            mode: self.mode,
            realtime: self.realtime,
            size: advertised,
        })
        .await?;
        self.state = SessionState::AwaitingStartAck;

        // AwaitingStartAck -> Streaming
        let session_id = self.receive_start_ack().await?;
        self.session_id = Some(session_id);
        self.state = SessionState::Streaming;
        tracing::info!(
            module = %self.module,
            session = %session_id,
            count = advertised,
            "sync session started"
        );

        let mut report = SyncReport {
            module: self.module.clone(),
            session_id,
            advertised,
            data_sent: 0,
            retransmitted: 0,
            rounds: 0,
            watermark,
            cleared: 0,
        };

        report.data_sent = self.send_data(session_id, &snapshot).await?;

        // Streaming -> AwaitingEndResolution
        self.send(&SyncMessage::End { session_id }).await?;
        self.state = SessionState::AwaitingEndResolution;

        self.resolve_end(session_id, &mut report).await?;

        // Complete
        self.state = SessionState::Complete;
        if let Some(watermark) = watermark {
            report.cleared = self.buffer.clear_through(&self.module, watermark);
        }

        tracing::info!(
            module = %self.module,
            session = %session_id,
            sent = report.data_sent,
            retransmitted = report.retransmitted,
            rounds = report.rounds,
            "sync session complete"
        );
        Ok(report)
    }

    async fn receive_start_ack(&self) -> Result<SessionId> {
        match self.receive("StartAck").await? {
            SyncMessage::StartAck {
                status: AckStatus::Ok,
                session_id,
            } => Ok(session_id),
            SyncMessage::StartAck {
                status: AckStatus::Error,
                ..
            } => Err(SyncError::Negotiation {
                module: self.module.clone(),
            }),
            other => Err(SyncError::UnexpectedMessage {
                expected: "StartAck",
                got: other.kind(),
            }),
        }
    }

    /// Answer retransmission requests until the remote reports no gaps.
    async fn resolve_end(&self, session_id: SessionId, report: &mut SyncReport) -> Result<()> {
        loop {
            match self.receive("EndAck or RequestRetransmit").await? {
                SyncMessage::EndAck {
                    status,
                    session_id: got,
                } => {
                    check_session(session_id, got)?;
                    return match status {
                        AckStatus::Ok => Ok(()),
                        AckStatus::Error => Err(SyncError::Rejected(session_id)),
                    };
                }
                SyncMessage::RequestRetransmit {
                    session_id: got,
                    ranges,
                } => {
                    check_session(session_id, got)?;
                    if ranges.is_empty() {
                        return Ok(());
                    }
                    if let Some(max) = self.config.max_retransmit_rounds {
                        if report.rounds >= max {
                            return Err(SyncError::RetransmitLimit(max));
                        }
                    }
                    report.rounds += 1;
                    let resent = self.retransmit(session_id, &ranges, report.rounds).await?;
                    report.retransmitted += resent;
                }
                other => {
                    return Err(SyncError::UnexpectedMessage {
                        expected: "EndAck or RequestRetransmit",
                        got: other.kind(),
                    })
                }
            }
        }
    }

    /// Resend every currently buffered entry inside `ranges`, once each.
    async fn retransmit(&self, session_id: SessionId, ranges: &[SeqRange], round: u32) -> Result<usize> {
        let entries = self.buffer.select(&self.module, ranges);
        tracing::debug!(
            module = %self.module,
            session = %session_id,
            round,
            ranges = ranges.len(),
            count = entries.len(),
            "retransmitting requested differences"
        );
        self.send_data(session_id, &entries).await
    }

    async fn send_data(&self, session_id: SessionId, entries: &[Difference]) -> Result<usize> {
        for diff in entries {
            self.send(&SyncMessage::data(session_id, diff)).await?;
        }
        Ok(entries.len())
    }

    async fn send(&self, message: &SyncMessage) -> Result<()> {
        let bytes = self.codec.encode(message)?;
        self.sender.send(&bytes, &self.module).await
    }

    async fn receive(&self, expected: &'static str) -> Result<SyncMessage> {
        loop {
            let bytes = self
                .inbox
                .recv_timeout(self.config.response_timeout)
                .await?
                .ok_or_else(|| SyncError::Timeout(format!("waiting for {expected}")))?;
            let message = self.codec.decode(&bytes)?;

            match message.session_id() {
                Some(id) if self.is_retired(id) => {
                    tracing::debug!(
                        module = %self.module,
                        session = %id,
                        kind = message.kind(),
                        "discarding late reply for an earlier session"
                    );
                }
                _ => return Ok(message),
            }
        }
    }

    fn is_retired(&self, id: SessionId) -> bool {
        self.session_id != Some(id) && self.retired.contains(&id)
    }
}

fn check_session(expected: SessionId, got: SessionId) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(SyncError::SessionMismatch { expected, got })
    }
}
