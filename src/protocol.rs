//! Wire Codec (C3, spec §4.3).
//!
//! Newline-delimited JSON over a reliable byte stream, the same shape as the
//! teacher's `lan/protocol.rs` `PeerMessage`, except framed by a newline
//! terminator instead of a 4-byte length prefix, and capped at 64 KiB rather
//! than 16 MiB, per spec.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::device::{AxisRange, CapabilityProfile};
use crate::error::{Error, Result};

/// spec §4.3: "Messages exceeding 64 KiB are a protocol violation."
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

pub const PROTOCOL_VERSION: &str = "1.0";

/// The synthetic synchronization code terminating an event batch.
pub const SYN_REPORT: &str = crate::device::codes::SYN_REPORT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub code: String,
    pub value: i32,
    pub ts: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "handshake")]
    Handshake {
        host_name: String,
        host_id: String,
        version: String,
        devices: Vec<CapabilityProfile>,
    },
    #[serde(rename = "auth_response")]
    AuthResponse {
        accepted: bool,
        consumer_name: String,
        consumer_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "event")]
    Event {
        device_type: String,
        events: Vec<EventRecord>,
    },
    #[serde(rename = "bye")]
    Bye {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Message {
    pub fn handshake(host_name: String, host_id: String, devices: Vec<CapabilityProfile>) -> Self {
        Message::Handshake {
            host_name,
            host_id,
            version: PROTOCOL_VERSION.to_string(),
            devices,
        }
    }

    pub fn accept(consumer_name: String, consumer_id: String) -> Self {
        Message::AuthResponse {
            accepted: true,
            consumer_name,
            consumer_id,
            reason: None,
        }
    }

    pub fn refuse(consumer_name: String, consumer_id: String, reason: impl Into<String>) -> Self {
        Message::AuthResponse {
            accepted: false,
            consumer_name,
            consumer_id,
            reason: Some(reason.into()),
        }
    }

    /// A zero-event frame used as a keepalive at the Streaming state (spec
    /// §4.7 liveness rule).
    pub fn keepalive(device_type: impl Into<String>) -> Self {
        Message::Event {
            device_type: device_type.into(),
            events: Vec::new(),
        }
    }

    pub fn bye(reason: Option<String>) -> Self {
        Message::Bye { reason }
    }

    /// Major-version compatibility check (spec §9 open question: minor
    /// differences are ignored, a mismatching major is a `Protocol` error).
    pub fn check_handshake_version(version: &str, peer: &str) -> Result<()> {
        let major = version.split('.').next().unwrap_or(version);
        let expected_major = PROTOCOL_VERSION.split('.').next().unwrap_or(PROTOCOL_VERSION);
        if major != expected_major {
            return Err(Error::protocol(
                peer,
                format!("incompatible protocol version {version}"),
            ));
        }
        Ok(())
    }
}

/// Encode one message as a newline-terminated JSON frame. Fails (as a
/// `Protocol` error against `peer`) if the encoded frame would exceed
/// [`MAX_FRAME_SIZE`].
pub fn encode(msg: &Message, peer: &str) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(msg)
        .map_err(|err| Error::protocol(peer, format!("failed to encode message: {err}")))?;
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(Error::protocol(
            peer,
            format!("outgoing frame of {} bytes exceeds {MAX_FRAME_SIZE}", bytes.len()),
        ));
    }
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode one newline-terminated JSON frame. Unknown top-level keys are
/// ignored by serde's default behavior; an unknown `type` tag surfaces as a
/// `Protocol` error, matching the forward-compat rule in spec §4.3.
pub fn decode(line: &str, peer: &str) -> Result<Message> {
    if line.len() > MAX_FRAME_SIZE {
        return Err(Error::protocol(
            peer,
            format!("incoming frame of {} bytes exceeds {MAX_FRAME_SIZE}", line.len()),
        ));
    }
    serde_json::from_str(line)
        .map_err(|err| Error::protocol(peer, format!("malformed or unknown message: {err}")))
}

/// Write one message, appending the frame terminator, to an async writer.
pub async fn write_message<W>(writer: &mut W, msg: &Message, peer: &str) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let bytes = encode(msg, peer)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message from a buffered async reader. Returns `Ok(None)` on
/// clean EOF (peer closed the socket without a `bye`).
pub async fn read_message<R>(reader: &mut BufReader<R>, peer: &str) -> Result<Option<Message>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']);
    Ok(Some(decode(trimmed, peer)?))
}

/// Append a trailing `SYN_REPORT` if the sender omitted one, per the
/// defensive rule in spec §4.6.
pub fn ensure_syn_terminated(events: &mut Vec<EventRecord>, ts: f64) {
    let already_terminated = events
        .last()
        .map(|e| e.code == SYN_REPORT)
        .unwrap_or(false);
    if !already_terminated {
        events.push(EventRecord {
            code: SYN_REPORT.to_string(),
            value: 0,
            ts,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_profile() -> CapabilityProfile {
        let mut axes = BTreeMap::new();
        axes.insert(
            "ABS_X".to_string(),
            AxisRange {
                min: 0,
                max: 32767,
                resolution: 0,
            },
        );
        CapabilityProfile {
            kind: crate::device::PhysicalDeviceKind::Tablet,
            display_name: "TransWacom Virtual tablet (HostA)".to_string(),
            capabilities: vec!["ABS_X".to_string(), "BTN_STYLUS".to_string()],
            axes,
        }
    }

    #[test]
    fn handshake_round_trips() {
        let msg = Message::handshake("HostA".into(), "H1".into(), vec![sample_profile()]);
        let bytes = encode(&msg, "HostA").unwrap();
        let line = std::str::from_utf8(&bytes).unwrap().trim_end();
        let decoded = decode(line, "HostA").unwrap();
        match decoded {
            Message::Handshake { host_name, host_id, version, devices } => {
                assert_eq!(host_name, "HostA");
                assert_eq!(host_id, "H1");
                assert_eq!(version, "1.0");
                assert_eq!(devices.len(), 1);
            }
            other => panic!("expected Handshake, got {other:?}"),
        }
    }

    #[test]
    fn event_round_trips() {
        let msg = Message::Event {
            device_type: "tablet".into(),
            events: vec![
                EventRecord { code: "ABS_X".into(), value: 100, ts: 1.0 },
                EventRecord { code: "ABS_Y".into(), value: 200, ts: 1.0 },
                EventRecord { code: SYN_REPORT.into(), value: 0, ts: 1.0 },
            ],
        };
        let bytes = encode(&msg, "p").unwrap();
        let line = std::str::from_utf8(&bytes).unwrap().trim_end();
        let decoded = decode(line, "p").unwrap();
        match decoded {
            Message::Event { events, .. } => assert_eq!(events.len(), 3),
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn unknown_top_level_keys_are_ignored() {
        let line = r#"{"type":"bye","reason":"done","extra_future_field":42}"#;
        let decoded = decode(line, "p").unwrap();
        assert!(matches!(decoded, Message::Bye { .. }));
    }

    #[test]
    fn unknown_type_is_protocol_error() {
        let line = r#"{"type":"teleport","payload":1}"#;
        let err = decode(line, "p").unwrap_err();
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn oversized_frame_is_protocol_error() {
        let huge = "x".repeat(MAX_FRAME_SIZE + 1);
        let err = decode(&huge, "p").unwrap_err();
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn major_version_mismatch_is_protocol_error() {
        assert!(Message::check_handshake_version("2.0", "p").is_err());
        assert!(Message::check_handshake_version("1.7", "p").is_ok());
    }

    #[test]
    fn ensure_syn_terminated_appends_only_when_missing() {
        let mut events = vec![EventRecord { code: "ABS_X".into(), value: 1, ts: 0.0 }];
        ensure_syn_terminated(&mut events, 0.5);
        assert_eq!(events.len(), 2);
        assert_eq!(events.last().unwrap().code, SYN_REPORT);

        ensure_syn_terminated(&mut events, 0.6);
        assert_eq!(events.len(), 2, "already terminated, should not append twice");
    }
}
