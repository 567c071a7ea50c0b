//! Message codec: typed messages to bytes and back.
//!
//! The session only depends on [`MessageCodec`]; [`CborCodec`] is the
//! default wire encoding.

use crate::error::{Result, SyncError};
use crate::messages::SyncMessage;

/// Encodes and decodes sync messages.
pub trait MessageCodec: Send + Sync {
    /// Serialize a message to a single opaque payload.
    fn encode(&self, message: &SyncMessage) -> Result<Vec<u8>>;

    /// Parse a payload received from the remote.
    fn decode(&self, bytes: &[u8]) -> Result<SyncMessage>;
}

/// CBOR encoding via serde.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl MessageCodec for CborCodec {
    fn encode(&self, message: &SyncMessage) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(message, &mut buf).map_err(|e| SyncError::Codec(e.to_string()))?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<SyncMessage> {
        ciborium::from_reader(bytes).map_err(|e| SyncError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::AckStatus;
    use agent_sync_core::{Mode, Operation, SeqRange, SessionId};
    use bytes::Bytes;

    #[test]
    fn test_cbor_preserves_binary_payload() {
        let codec = CborCodec;
        let msg = SyncMessage::Data {
            sequence: u64::MAX,
            session_id: SessionId(99999),
            id: "h1".into(),
            index: "files".into(),
            operation: Operation::Create,
            payload: Bytes::from_static(&[0x00, 0xff, 0x10, 0x00]),
        };

        let bytes = codec.encode(&msg).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_cbor_retransmit_ranges_keep_order() {
        let codec = CborCodec;
        let msg = SyncMessage::RequestRetransmit {
            session_id: SessionId(1),
            ranges: vec![SeqRange::new(9, 12), SeqRange::single(3)],
        };

        let decoded = codec.decode(&codec.encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_cbor_start_fields() {
        let codec = CborCodec;
        let msg = SyncMessage::Start {
            module: "syscollector".into(),
            mode: Mode::Delta,
            realtime: true,
            size: 12,
        };
        assert_eq!(codec.decode(&codec.encode(&msg).unwrap()).unwrap(), msg);

        let ack = SyncMessage::StartAck {
            status: AckStatus::Error,
            session_id: SessionId(0),
        };
        assert_eq!(codec.decode(&codec.encode(&ack).unwrap()).unwrap(), ack);
    }

    fn start_fields(bytes: &[u8]) -> Vec<(ciborium::Value, ciborium::Value)> {
        let value: ciborium::Value = ciborium::from_reader(bytes).unwrap();
        let mut outer = value.into_map().unwrap();
        let (_, fields) = outer.remove(0);
        fields.into_map().unwrap()
    }

    fn field<'a>(fields: &'a [(ciborium::Value, ciborium::Value)], name: &str) -> &'a ciborium::Value {
        fields
            .iter()
            .find(|(k, _)| k.as_text() == Some(name))
            .map(|(_, v)| v)
            .unwrap()
    }

    #[test]
    fn test_cbor_mode_travels_as_numeric_code() {
        let msg = SyncMessage::Start {
            module: "fim".into(),
            mode: Mode::Delta,
            realtime: false,
            size: 1,
        };
        let fields = start_fields(&CborCodec.encode(&msg).unwrap());
        assert_eq!(field(&fields, "mode"), &ciborium::Value::Integer(1u8.into()));
    }

    #[test]
    fn test_cbor_unknown_mode_code_is_codec_error() {
        let msg = SyncMessage::Start {
            module: "fim".into(),
            mode: Mode::Full,
            realtime: false,
            size: 1,
        };
        let mut fields = start_fields(&CborCodec.encode(&msg).unwrap());
        for (key, value) in fields.iter_mut() {
            if key.as_text() == Some("mode") {
                *value = ciborium::Value::Integer(9u8.into());
            }
        }
        let tampered = ciborium::Value::Map(vec![(
            ciborium::Value::Text("Start".into()),
            ciborium::Value::Map(fields),
        )]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&tampered, &mut bytes).unwrap();

        let err = CborCodec.decode(&bytes).unwrap_err();
        assert!(matches!(err, SyncError::Codec(ref m) if m.contains("unknown sync mode code: 9")));
    }

    #[test]
    fn test_cbor_rejects_garbage() {
        let err = CborCodec.decode(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, SyncError::Codec(_)));
    }
}
