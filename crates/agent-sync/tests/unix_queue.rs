//! Synchronization over real Unix datagram sockets.
#![cfg(unix)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use tokio::net::UnixDatagram;

use agent_sync::protocol::{AckStatus, CborCodec, MessageCodec, SyncMessage, UnixInbox};
use agent_sync::{AgentSyncProtocol, Mode, Operation, SessionId, SyncConfig, SyncEngine};

const SESSION: SessionId = SessionId(4242);

/// Split `<tag>:<label>:<payload>`.
fn parse_frame(frame: &[u8]) -> Result<(u8, String, &[u8])> {
    let mut parts = frame.splitn(3, |b| *b == b':');
    let (Some(tag), Some(label), Some(payload)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("malformed frame");
    };
    if tag.len() != 1 {
        bail!("tag must be one byte");
    }
    Ok((tag[0], String::from_utf8(label.to_vec())?, payload))
}

/// Minimal remote: acknowledges one session, asks for seq 1 again once.
async fn run_remote(queue: UnixDatagram, reply_to: PathBuf) -> Result<Vec<(u8, String, SyncMessage)>> {
    let replies = UnixDatagram::unbound()?;
    let mut seen = Vec::new();
    let mut asked = false;
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let len = queue.recv(&mut buf).await?;
        let (tag, label, payload) = parse_frame(&buf[..len])?;
        let message = CborCodec.decode(payload)?;

        let reply = match &message {
            SyncMessage::Start { .. } => Some(SyncMessage::StartAck {
                status: AckStatus::Ok,
                session_id: SESSION,
            }),
            SyncMessage::End { .. } => {
                asked = true;
                Some(SyncMessage::RequestRetransmit {
                    session_id: SESSION,
                    ranges: vec![agent_sync::SeqRange::single(1)],
                })
            }
            SyncMessage::Data { sequence: 1, .. } if asked => Some(SyncMessage::EndAck {
                status: AckStatus::Ok,
                session_id: SESSION,
            }),
            _ => None,
        };
        let done = matches!(reply, Some(SyncMessage::EndAck { .. }));
        seen.push((tag, label, message));

        if let Some(reply) = reply {
            replies.send_to(&CborCodec.encode(&reply)?, &reply_to).await?;
        }
        if done {
            return Ok(seen);
        }
    }
}

#[tokio::test]
async fn test_cycle_over_unix_sockets() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let queue_path = dir.path().join("queue");
    let inbox_path = dir.path().join("sync-inbox");

    let queue = UnixDatagram::bind(&queue_path)?;
    let inbox = UnixInbox::bind(&inbox_path)?;
    let remote = tokio::spawn(run_remote(queue, inbox_path.clone()));

    let config = SyncConfig::default()
        .with_queue_location(queue_path.to_string_lossy())
        .with_response_timeout(Duration::from_secs(2));
    let engine = SyncEngine::unix(inbox, config);

    engine.persist("fim", "h1", Operation::Create, "files", Bytes::from_static(b"{\"a\":1}"));
    engine.persist("fim", "h2", Operation::Delete, "files", Bytes::from_static(b"{\"a\":2}"));

    let report = engine.synchronize("fim", Mode::Full, false).await?;
    assert_eq!(report.session_id, SESSION);
    assert_eq!(report.rounds, 1);
    assert_eq!(report.retransmitted, 1);
    assert!(engine.buffer().is_empty("fim"));

    let seen = remote.await.context("remote task panicked")??;
    assert!(seen.iter().all(|(tag, label, _)| *tag == b's' && label == "fim"));

    let kinds: Vec<_> = seen.iter().map(|(_, _, m)| m.kind()).collect();
    assert_eq!(kinds, vec!["Start", "Data", "Data", "End", "Data"]);
    Ok(())
}

#[tokio::test]
async fn test_missing_queue_is_transport_unavailable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let inbox = UnixInbox::bind(dir.path().join("sync-inbox"))?;

    let config = SyncConfig::default()
        .with_queue_location(dir.path().join("nobody-listens").to_string_lossy())
        .with_response_timeout(Duration::from_millis(100));
    let engine = SyncEngine::unix(inbox, config);
    engine.persist("sca", "c1", Operation::Modify, "checks", Bytes::from_static(b"{}"));

    let err = engine.synchronize("sca", Mode::Delta, false).await.unwrap_err();

    assert!(matches!(err, agent_sync::SyncError::TransportUnavailable { .. }));
    assert_eq!(engine.buffer().len("sca"), 1);
    Ok(())
}
