//! Canonical CBOR encoding for transaction payloads.
//!
//! Signatures cover these bytes, so both parties must produce the same
//! encoding for the same payload:
//! - Map keys are small integers, sorted by encoded bytes
//! - Integers use the smallest valid encoding
//! - Definite lengths only, no floats
//!
//! Decoding re-encodes and rejects anything that is not byte-identical,
//! so a payload has exactly one accepted encoding.

use bytes::Bytes;
use ciborium::value::{Integer, Value};

use crate::crypto::Pubkey;
use crate::error::EnvelopeError;
use crate::tx::{OpeningTx, TxKind, TxPayload, UpdateTx};
use crate::types::ChannelId;

/// Payload field keys. Keys 0-23 encode as a single byte.
mod keys {
    pub const KIND: u64 = 0;
    pub const CHANNEL_ID: u64 = 1;
    pub const PUBKEYS: u64 = 2;
    pub const STATE: u64 = 3;
    pub const HOLD_PERIOD: u64 = 4;
    pub const SEQUENCE_NUMBER: u64 = 5;
    pub const FAST: u64 = 6;
}

/// Encode a payload to canonical bytes.
pub fn encode_payload(payload: &TxPayload) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &payload_to_value(payload));
    buf
}

/// Decode canonical bytes back into a payload.
pub fn decode_payload(bytes: &[u8]) -> Result<TxPayload, EnvelopeError> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| EnvelopeError::Decode(e.to_string()))?;
    let payload = value_to_payload(&value)?;

    if encode_payload(&payload) != bytes {
        return Err(EnvelopeError::Decode("non-canonical payload encoding".into()));
    }
    Ok(payload)
}

fn int(n: u64) -> Value {
    Value::Integer(n.into())
}

fn payload_to_value(payload: &TxPayload) -> Value {
    let pubkeys = |pks: &[Pubkey; 2]| {
        Value::Array(pks.iter().map(|pk| Value::Bytes(pk.0.to_vec())).collect())
    };

    let mut entries = vec![
        (int(keys::KIND), int(payload.kind().to_u8().into())),
        (
            int(keys::CHANNEL_ID),
            Value::Bytes(payload.channel_id().0.to_vec()),
        ),
        (int(keys::PUBKEYS), pubkeys(payload.pubkeys())),
    ];

    match payload {
        TxPayload::Opening(otx) => {
            entries.push((int(keys::STATE), Value::Bytes(otx.state.to_vec())));
            entries.push((int(keys::HOLD_PERIOD), int(otx.hold_period.into())));
        }
        TxPayload::Update(utx) => {
            entries.push((int(keys::STATE), Value::Bytes(utx.state.to_vec())));
            entries.push((int(keys::SEQUENCE_NUMBER), int(utx.sequence_number)));
            entries.push((int(keys::FAST), Value::Bool(utx.fast)));
        }
    }

    Value::Map(entries)
}

fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        // payload_to_value only builds the variants above
        _ => unreachable!("unsupported CBOR value in payload"),
    }
}

fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n: i128 = i.into();
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer head with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Keys are sorted by their encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

fn malformed(msg: &str) -> EnvelopeError {
    EnvelopeError::Decode(msg.to_string())
}

fn value_to_payload(value: &Value) -> Result<TxPayload, EnvelopeError> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(malformed("expected map")),
    };

    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if u64::try_from(*i).ok() == Some(key)))
            .map(|(_, v)| v)
    };
    let get_u64 = |key: u64, name: &str| -> Result<u64, EnvelopeError> {
        match get(key) {
            Some(Value::Integer(i)) => {
                u64::try_from(*i).map_err(|_| malformed(&format!("invalid {}", name)))
            }
            _ => Err(malformed(&format!("missing {}", name))),
        }
    };

    let kind = u8::try_from(get_u64(keys::KIND, "kind")?)
        .ok()
        .and_then(TxKind::from_u8)
        .ok_or_else(|| malformed("invalid kind"))?;

    let channel_id = match get(keys::CHANNEL_ID) {
        Some(Value::Bytes(b)) => {
            ChannelId::try_from(b.as_slice()).map_err(|_| malformed("invalid channel_id"))?
        }
        _ => return Err(malformed("missing channel_id")),
    };

    let pubkeys = match get(keys::PUBKEYS) {
        Some(Value::Array(arr)) if arr.len() == 2 => {
            let mut out = [Pubkey([0u8; 32]); 2];
            for (slot, item) in arr.iter().enumerate() {
                out[slot] = match item {
                    Value::Bytes(b) => {
                        Pubkey::try_from(b.as_slice()).map_err(|_| malformed("invalid pubkey"))?
                    }
                    _ => return Err(malformed("invalid pubkey")),
                };
            }
            out
        }
        _ => return Err(malformed("pubkeys must be an array of two")),
    };

    let state = match get(keys::STATE) {
        Some(Value::Bytes(b)) => Bytes::from(b.clone()),
        _ => return Err(malformed("missing state")),
    };

    match kind {
        TxKind::Opening => {
            let hold_period = u32::try_from(get_u64(keys::HOLD_PERIOD, "hold_period")?)
                .map_err(|_| malformed("hold_period out of range"))?;
            Ok(TxPayload::Opening(OpeningTx {
                channel_id,
                pubkeys,
                state,
                hold_period,
            }))
        }
        TxKind::Update => {
            let sequence_number = get_u64(keys::SEQUENCE_NUMBER, "sequence_number")?;
            let fast = match get(keys::FAST) {
                Some(Value::Bool(b)) => *b,
                _ => return Err(malformed("missing fast flag")),
            };
            Ok(TxPayload::Update(UpdateTx {
                channel_id,
                pubkeys,
                sequence_number,
                state,
                fast,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(seq: u64) -> TxPayload {
        TxPayload::Update(UpdateTx {
            channel_id: ChannelId::from_bytes([3; 32]),
            pubkeys: [Pubkey([0xaa; 32]), Pubkey([0xbb; 32])],
            sequence_number: seq,
            state: Bytes::from_static(b"balance:40/60"),
            fast: true,
        })
    }

    #[test]
    fn test_encoding_deterministic() {
        assert_eq!(encode_payload(&update(7)), encode_payload(&update(7)));
        assert_ne!(encode_payload(&update(7)), encode_payload(&update(8)));
    }

    #[test]
    fn test_decode_update() {
        let payload = update(300);
        assert_eq!(decode_payload(&encode_payload(&payload)).unwrap(), payload);
    }

    #[test]
    fn test_decode_opening() {
        let payload = TxPayload::Opening(OpeningTx {
            channel_id: ChannelId::from_bytes([5; 32]),
            pubkeys: [Pubkey([1; 32]), Pubkey([2; 32])],
            state: Bytes::new(),
            hold_period: 86_400,
        });
        assert_eq!(decode_payload(&encode_payload(&payload)).unwrap(), payload);
    }

    #[test]
    fn test_rejects_non_canonical_bytes() {
        // Same payload, but the map written with keys out of order.
        let payload = update(1);
        let mut entries = match payload_to_value(&payload) {
            Value::Map(m) => m,
            _ => unreachable!(),
        };
        entries.reverse();
        let mut buf = Vec::new();
        ciborium::into_writer(&Value::Map(entries), &mut buf).unwrap();

        assert!(matches!(decode_payload(&buf), Err(EnvelopeError::Decode(_))));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(decode_payload(&[0xff, 0x00]).is_err());
        assert!(decode_payload(&[0xa0]).is_err()); // empty map
    }

    #[test]
    fn test_integer_encoding() {
        let mut buf = Vec::new();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);
    }

    #[test]
    fn test_map_key_ordering() {
        let mut buf = Vec::new();
        let entries = vec![(int(6), int(60)), (int(0), int(0)), (int(3), int(1))];
        encode_map_canonical(&mut buf, &entries);

        assert_eq!(buf[0], 0xa3);
        assert_eq!(buf[1], 0x00);
        assert_eq!(buf[3], 0x03);
        assert_eq!(buf[5], 0x06);
    }
}
