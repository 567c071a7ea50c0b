//! A simulated remote counterpart.
//!
//! [`SimulatedRemote`] plays both sides of the engine's transport: it is the
//! [`Connector`] the engine sends to and the [`Inbox`] it reads answers from.
//! Every frame is decoded and answered the way a real manager would, with
//! optional data loss so the retransmission loop has work to do.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use agent_sync_core::{coalesce_ranges, SeqRange, SessionId};
use agent_sync_protocol::{
    AckStatus, CborCodec, Channel, Connector, Inbox, MessageCodec, Result, SyncError, SyncMessage,
};

/// Shared handle to a simulated remote. Clones observe the same remote.
#[derive(Clone)]
pub struct SimulatedRemote {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<RemoteState>,
    responses: mpsc::UnboundedSender<Vec<u8>>,
    inbox: AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

#[derive(Default)]
struct RemoteState {
    refuse_start: bool,
    silent: bool,
    gap_script: Option<Vec<Vec<SeqRange>>>,
    /// seq -> how many more deliveries to lose.
    loss_plan: HashMap<u64, usize>,
    failing_connects: usize,
    failing_attempts: BTreeSet<usize>,
    next_session: u64,

    connects: usize,
    locations: Vec<String>,
    send_attempts: usize,
    log: Vec<(String, SyncMessage)>,
    sessions: Vec<SessionId>,

    session: Option<SessionId>,
    ended: bool,
    lost: BTreeSet<u64>,
    outstanding: BTreeSet<u64>,
    applied: BTreeMap<u64, SyncMessage>,
}

impl SimulatedRemote {
    /// A remote that accepts every session and loses nothing.
    pub fn new() -> Self {
        let (responses, inbox) = mpsc::unbounded_channel();
        let state = RemoteState {
            next_session: rand::thread_rng().gen_range(1..1_000_000),
            ..RemoteState::default()
        };

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                responses,
                inbox: AsyncMutex::new(inbox),
            }),
        }
    }

    /// Answer every Start with a negative StartAck.
    pub fn refuse_start(self) -> Self {
        self.with_state(|s| s.refuse_start = true);
        self
    }

    /// Never answer anything.
    pub fn silent(self) -> Self {
        self.with_state(|s| s.silent = true);
        self
    }

    /// Start or stop answering.
    pub fn set_silent(&self, silent: bool) {
        self.with_state(|s| s.silent = silent);
    }

    /// Queue a reply the remote did not produce itself, such as a late
    /// answer to a cycle the engine already gave up on.
    pub fn inject(&self, message: &SyncMessage) {
        if let Ok(bytes) = CborCodec.encode(message) {
            let _ = self.shared.responses.send(bytes);
        }
    }

    /// Answer End with these retransmission requests, in order, then EndAck.
    ///
    /// Loss planning is ignored while a script is set.
    pub fn with_gap_script(self, script: Vec<Vec<SeqRange>>) -> Self {
        self.with_state(|s| s.gap_script = Some(script));
        self
    }

    /// Lose the Data message for `seq` the next `times` times it arrives.
    pub fn drop_times(self, seq: u64, times: usize) -> Self {
        self.with_state(|s| {
            *s.loss_plan.entry(seq).or_default() += times;
        });
        self
    }

    /// Lose the first delivery of each of `seqs`.
    pub fn drop_once(self, seqs: impl IntoIterator<Item = u64>) -> Self {
        self.with_state(|s| {
            for seq in seqs {
                *s.loss_plan.entry(seq).or_default() += 1;
            }
        });
        self
    }

    /// Refuse the next `count` connect attempts.
    pub fn fail_connects(&self, count: usize) {
        self.with_state(|s| s.failing_connects += count);
    }

    /// Reject the next `count` send attempts at the transport level.
    pub fn fail_next_sends(&self, count: usize) {
        self.with_state(|s| {
            let first = s.send_attempts;
            s.failing_attempts.extend(first..first + count);
        });
    }

    /// Reject the send attempts with these zero-based indices.
    pub fn fail_send_attempts(&self, attempts: impl IntoIterator<Item = usize>) {
        self.with_state(|s| s.failing_attempts.extend(attempts));
    }

    /// Every message that reached the remote, in arrival order.
    pub fn received(&self) -> Vec<SyncMessage> {
        self.with_state(|s| s.log.iter().map(|(_, m)| m.clone()).collect())
    }

    /// Routing labels of every message that reached the remote.
    pub fn labels(&self) -> Vec<String> {
        self.with_state(|s| s.log.iter().map(|(l, _)| l.clone()).collect())
    }

    /// Sequences of every Data message that reached the remote, lost or not.
    pub fn data_sequences(&self) -> Vec<u64> {
        self.with_state(|s| {
            s.log
                .iter()
                .filter_map(|(_, m)| match m {
                    SyncMessage::Data { sequence, .. } => Some(*sequence),
                    _ => None,
                })
                .collect()
        })
    }

    /// Sequences the remote kept, ascending.
    pub fn applied_sequences(&self) -> Vec<u64> {
        self.with_state(|s| s.applied.keys().copied().collect())
    }

    /// The Data message kept for `seq`.
    pub fn applied(&self, seq: u64) -> Option<SyncMessage> {
        self.with_state(|s| s.applied.get(&seq).cloned())
    }

    /// Sessions handed out so far.
    pub fn sessions(&self) -> Vec<SessionId> {
        self.with_state(|s| s.sessions.clone())
    }

    /// Number of connect attempts, successful or not.
    pub fn connect_count(&self) -> usize {
        self.with_state(|s| s.connects)
    }

    /// Locations connected to.
    pub fn locations(&self) -> Vec<String> {
        self.with_state(|s| s.locations.clone())
    }

    /// Number of send attempts, successful or not.
    pub fn send_attempts(&self) -> usize {
        self.with_state(|s| s.send_attempts)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RemoteState) -> T) -> T {
        let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn deliver(&self, label: &str, message: SyncMessage) {
        let responses = self.with_state(|s| {
            s.log.push((label.to_string(), message.clone()));
            s.react(message)
        });

        for response in responses {
            self.inject(&response);
        }
    }
}

impl Default for SimulatedRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteState {
    fn react(&mut self, message: SyncMessage) -> Vec<SyncMessage> {
        if self.silent {
            return Vec::new();
        }

        match message {
            SyncMessage::Start { .. } => self.open_session(),
            SyncMessage::Data {
                sequence,
                session_id,
                ..
            } => {
                if self.session != Some(session_id) {
                    return Vec::new();
                }
                self.receive_data(sequence, message);
                if self.ended && self.outstanding.is_empty() {
                    self.report_gaps(session_id)
                } else {
                    Vec::new()
                }
            }
            SyncMessage::End { session_id } => {
                if self.session != Some(session_id) {
                    return Vec::new();
                }
                self.ended = true;
                match self.gap_script.clone() {
                    Some(script) => self.play_script(session_id, script),
                    None => self.report_gaps(session_id),
                }
            }
            // Remote-bound kinds only; anything else is ignored.
            SyncMessage::StartAck { .. }
            | SyncMessage::EndAck { .. }
            | SyncMessage::RequestRetransmit { .. } => Vec::new(),
        }
    }

    fn open_session(&mut self) -> Vec<SyncMessage> {
        if self.refuse_start {
            return vec![SyncMessage::StartAck {
                status: AckStatus::Error,
                session_id: SessionId(0),
            }];
        }

        let session_id = SessionId(self.next_session);
        self.next_session += 1;
        self.sessions.push(session_id);
        self.session = Some(session_id);
        self.ended = false;
        self.lost.clear();
        self.outstanding.clear();

        vec![SyncMessage::StartAck {
            status: AckStatus::Ok,
            session_id,
        }]
    }

    fn receive_data(&mut self, sequence: u64, message: SyncMessage) {
        self.outstanding.remove(&sequence);

        let lose = match self.loss_plan.get_mut(&sequence) {
            Some(remaining) if *remaining > 0 && self.gap_script.is_none() => {
                *remaining -= 1;
                true
            }
            _ => false,
        };

        if lose {
            self.lost.insert(sequence);
        } else {
            self.lost.remove(&sequence);
            self.applied.insert(sequence, message);
        }
    }

    fn report_gaps(&mut self, session_id: SessionId) -> Vec<SyncMessage> {
        if self.lost.is_empty() {
            self.session = None;
            return vec![SyncMessage::EndAck {
                status: AckStatus::Ok,
                session_id,
            }];
        }

        let ranges = coalesce_ranges(self.lost.iter().copied());
        self.outstanding = std::mem::take(&mut self.lost);
        vec![SyncMessage::RequestRetransmit { session_id, ranges }]
    }

    fn play_script(&mut self, session_id: SessionId, script: Vec<Vec<SeqRange>>) -> Vec<SyncMessage> {
        let mut responses: Vec<SyncMessage> = script
            .into_iter()
            .map(|ranges| SyncMessage::RequestRetransmit { session_id, ranges })
            .collect();
        responses.push(SyncMessage::EndAck {
            status: AckStatus::Ok,
            session_id,
        });
        self.session = None;
        responses
    }
}

#[async_trait]
impl Connector for SimulatedRemote {
    type Channel = SimulatedChannel;

    async fn connect(&self, location: &str) -> Result<SimulatedChannel> {
        let refused = self.with_state(|s| {
            s.connects += 1;
            if s.failing_connects > 0 {
                s.failing_connects -= 1;
                return true;
            }
            s.locations.push(location.to_string());
            false
        });

        if refused {
            return Err(SyncError::TransportError("remote queue not listening".into()));
        }
        Ok(SimulatedChannel {
            remote: self.clone(),
        })
    }
}

/// Channel into a [`SimulatedRemote`].
pub struct SimulatedChannel {
    remote: SimulatedRemote,
}

#[async_trait]
impl Channel for SimulatedChannel {
    async fn send(&self, payload: &[u8], label: &str) -> Result<()> {
        let rejected = self.remote.with_state(|s| {
            let attempt = s.send_attempts;
            s.send_attempts += 1;
            s.failing_attempts.remove(&attempt)
        });
        if rejected {
            return Err(SyncError::TransportError("queue full".into()));
        }

        // Undecodable frames are accepted by the queue and dropped by the remote.
        if let Ok(message) = CborCodec.decode(payload) {
            self.remote.deliver(label, message);
        }
        Ok(())
    }
}

#[async_trait]
impl Inbox for SimulatedRemote {
    async fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut rx = self.shared.inbox.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(bytes)) => Ok(Some(bytes)),
            Ok(None) => Err(SyncError::InboxClosed),
            Err(_) => Ok(None),
        }
    }

    async fn drain(&self) -> Result<usize> {
        let mut rx = self.shared.inbox.lock().await;
        let mut discarded = 0;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }
        Ok(discarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_sync_core::{Mode, Operation};
    use bytes::Bytes;

    async fn next(remote: &SimulatedRemote) -> SyncMessage {
        let bytes = remote
            .recv_timeout(Duration::from_millis(50))
            .await
            .unwrap()
            .expect("response");
        CborCodec.decode(&bytes).unwrap()
    }

    fn data(session_id: SessionId, sequence: u64) -> Vec<u8> {
        CborCodec
            .encode(&SyncMessage::Data {
                sequence,
                session_id,
                id: format!("h{sequence}"),
                index: "files".into(),
                operation: Operation::Create,
                payload: Bytes::from_static(b"{}"),
            })
            .unwrap()
    }

    fn start() -> Vec<u8> {
        CborCodec
            .encode(&SyncMessage::Start {
                module: "fim".into(),
                mode: Mode::Full,
                realtime: false,
                size: 2,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_remote_reports_lost_data_until_delivered() {
        let remote = SimulatedRemote::new().drop_times(2, 2);
        let channel = remote.connect("q").await.unwrap();

        channel.send(&start(), "fim").await.unwrap();
        let session_id = match next(&remote).await {
            SyncMessage::StartAck { session_id, .. } => session_id,
            other => panic!("expected StartAck, got {}", other.kind()),
        };

        channel.send(&data(session_id, 1), "fim").await.unwrap();
        channel.send(&data(session_id, 2), "fim").await.unwrap();
        channel
            .send(&CborCodec.encode(&SyncMessage::End { session_id }).unwrap(), "fim")
            .await
            .unwrap();

        for _ in 0..2 {
            assert_eq!(
                next(&remote).await,
                SyncMessage::RequestRetransmit {
                    session_id,
                    ranges: vec![SeqRange::single(2)],
                }
            );
            channel.send(&data(session_id, 2), "fim").await.unwrap();
        }

        assert_eq!(
            next(&remote).await,
            SyncMessage::EndAck {
                status: AckStatus::Ok,
                session_id,
            }
        );
        assert_eq!(remote.applied_sequences(), vec![1, 2]);
        assert_eq!(remote.data_sequences(), vec![1, 2, 2, 2]);
    }

    #[tokio::test]
    async fn test_remote_refuses_start() {
        let remote = SimulatedRemote::new().refuse_start();
        let channel = remote.connect("q").await.unwrap();
        channel.send(&start(), "fim").await.unwrap();

        match next(&remote).await {
            SyncMessage::StartAck { status, .. } => assert_eq!(status, AckStatus::Error),
            other => panic!("expected StartAck, got {}", other.kind()),
        }
        assert!(remote.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_remote_ignores_foreign_session_data() {
        let remote = SimulatedRemote::new();
        let channel = remote.connect("q").await.unwrap();
        channel.send(&start(), "fim").await.unwrap();
        let _ = next(&remote).await;

        channel.send(&data(SessionId(0), 1), "fim").await.unwrap();
        assert!(remote.applied_sequences().is_empty());
        assert_eq!(remote.data_sequences(), vec![1]);
    }
}
