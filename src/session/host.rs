//! Host-role session task (spec §4.7, Host column of the state table).
//!
//! Dials the Consumer, performs the handshake, waits for `auth_response`,
//! then runs the steady-state streaming loop until `bye`, a liveness
//! failure, or cancellation — at which point the restoration guard
//! (owned by [`HostCapture`]) always runs before the session reaches
//! Closed. Shaped after the teacher's `host_session`/`run_peer_session`
//! split in `src-tauri/src/runtime/lan/peer.rs`: one function performs the
//! role-specific handshake, then control passes into a steady-state loop
//! shared in spirit (not code, since framing and liveness timing differ)
//! with the Consumer side.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::device::PhysicalDevice;
use crate::error::{Error, Result};
use crate::host::{EventBatch, HostCapture, HostCaptureOptions};
use crate::identity::MachineIdentity;
use crate::protocol::{self, EventRecord, Message};
use crate::session::state::{ClosedReason, SessionState};
use crate::session::{LivenessClock, SessionHandle};

pub async fn run_host_session(
    device: PhysicalDevice,
    peer_addr: SocketAddr,
    identity: MachineIdentity,
    capture_opts: HostCaptureOptions,
    handle: SessionHandle,
    cancel: CancellationToken,
) -> Result<()> {
    let stream = match TcpStream::connect(peer_addr).await {
        Ok(stream) => stream,
        Err(err) => {
            let mapped: Error = err.into();
            handle.close(ClosedReason::Error(mapped.to_string()));
            return Err(mapped);
        }
    };

    handle.set_state(SessionState::Handshaking)?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let peer_label = peer_addr.to_string();

    let handshake = Message::handshake(
        identity.machine_name.clone(),
        identity.machine_id.clone(),
        vec![device.to_capability_profile()],
    );
    protocol::write_message(&mut write_half, &handshake, &peer_label).await?;

    handle.set_state(SessionState::AwaitingAuth)?;
    let response = protocol::read_message(&mut reader, &peer_label).await?;
    let (accepted, reason) = match response {
        Some(Message::AuthResponse { accepted, consumer_name, reason, .. }) => {
            handle.set_peer_name(consumer_name);
            (accepted, reason)
        }
        Some(other) => {
            return Err(Error::protocol(
                peer_label,
                format!("expected auth_response, got {other:?}"),
            ))
        }
        None => {
            return Err(Error::transient(peer_label, "connection closed before auth_response"))
        }
    };

    if !accepted {
        handle.close(ClosedReason::Refused(reason.unwrap_or_default()));
        return Ok(());
    }

    handle.set_state(SessionState::Streaming)?;
    let result = stream_events(
        &device,
        capture_opts,
        &mut write_half,
        &mut reader,
        &peer_label,
        &handle,
        &cancel,
    )
    .await;

    handle.set_state(SessionState::Draining).ok();
    let outcome = match &result {
        Ok(()) => ClosedReason::Clean,
        Err(err) => ClosedReason::Error(err.to_string()),
    };
    handle.close(outcome);
    result
}

async fn stream_events(
    device: &PhysicalDevice,
    capture_opts: HostCaptureOptions,
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    peer_label: &str,
    handle: &SessionHandle,
    cancel: &CancellationToken,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<EventBatch>(64);
    let mut capture = HostCapture::start(device, tx, capture_opts)?;

    let mut liveness = LivenessClock::new();
    let mut keepalive_tick = interval(Duration::from_secs(1));
    let device_type = device.kind.as_str().to_string();

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),

            _ = keepalive_tick.tick() => {
                if liveness.is_dead() {
                    break Err(Error::transient(peer_label.to_string(), "no inbound bytes for 10s"));
                }
                if liveness.should_send_keepalive() {
                    let keepalive = Message::keepalive(device_type.clone());
                    if let Err(err) = protocol::write_message(write_half, &keepalive, peer_label).await {
                        break Err(err);
                    }
                    liveness.mark_outbound();
                    handle.add_bytes_out(1);
                }
            }

            batch = rx.recv() => {
                let Some(events) = batch else { break Ok(()) };
                let msg = Message::Event { device_type: device_type.clone(), events };
                if let Err(err) = protocol::write_message(write_half, &msg, peer_label).await {
                    break Err(err);
                }
                liveness.mark_outbound();
                handle.add_bytes_out(1);
            }

            incoming = protocol::read_message(reader, peer_label) => {
                match incoming {
                    Ok(Some(Message::Bye { .. })) => break Ok(()),
                    Ok(Some(_)) => {
                        liveness.mark_inbound();
                        handle.add_bytes_in(1);
                    }
                    Ok(None) => break Ok(()),
                    Err(err) => break Err(err),
                }
            }
        }
    };

    // `bye` from the Host always follows the last in-flight batch, never
    // precedes it (spec §5 ordering guarantee) — sending it here, after the
    // loop above has drained, satisfies that by construction.
    let reason = match &result {
        Ok(()) => None,
        Err(err) => Some(err.to_string()),
    };
    let _ = protocol::write_message(write_half, &Message::bye(reason), peer_label).await;
    // Restoration hooks run strictly after the socket is closed (spec §5):
    // shut the write half down here rather than leaving it for `Drop` once
    // this function returns, which would otherwise run after `Closed`.
    let _ = write_half.shutdown().await;

    capture.stop().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::SessionRole;

    #[test]
    fn liveness_clock_starts_alive() {
        let clock = LivenessClock::new();
        assert!(!clock.is_dead());
        assert!(!clock.should_send_keepalive());
    }

    #[test]
    fn session_handle_tracks_byte_counters() {
        let handle = SessionHandle::new("s1".into(), SessionRole::Host, Some("/dev/input/event3".into()));
        handle.add_bytes_out(10);
        handle.add_bytes_in(3);
        let snap = handle.snapshot();
        assert_eq!(snap.bytes_out, 10);
        assert_eq!(snap.bytes_in, 3);
    }
}
