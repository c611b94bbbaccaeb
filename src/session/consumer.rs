//! Consumer-role session task (spec §4.7, Consumer column of the state
//! table; authorization decision logic in §4.7).

use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{ConfigStore, DeviceKind, Role};
use crate::consumer::emulation;
use crate::device::PhysicalDeviceKind;
use crate::error::{Error, Result};
use crate::protocol::{self, Message};
use crate::session::state::{ClosedReason, SessionState};
use crate::session::{AuthDecision, AuthorizationPrompt, LivenessClock, SessionHandle, AUTH_PROMPT_DEADLINE_SECS};

pub async fn run_consumer_session(
    stream: TcpStream,
    config: std::sync::Arc<parking_lot::RwLock<ConfigStore>>,
    identity_name: String,
    identity_id: String,
    prompts: mpsc::Sender<AuthorizationPrompt>,
    handle: SessionHandle,
    cancel: CancellationToken,
) -> Result<()> {
    let peer_label = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    handle.set_state(SessionState::Handshaking)?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let handshake = protocol::read_message(&mut reader, &peer_label).await?;
    let (host_name, host_id, profile) = match handshake {
        Some(Message::Handshake { host_name, host_id, version, devices }) => {
            Message::check_handshake_version(&version, &peer_label)?;
            let profile = devices
                .into_iter()
                .next()
                .ok_or_else(|| Error::protocol(peer_label.clone(), "handshake carried no devices"))?;
            (host_name, host_id, profile)
        }
        Some(other) => {
            return Err(Error::protocol(
                peer_label,
                format!("expected handshake, got {other:?}"),
            ))
        }
        None => return Err(Error::transient(peer_label, "connection closed before handshake")),
    };
    handle.set_peer_name(host_name.clone());

    handle.set_state(SessionState::AwaitingAuth)?;
    let decision = decide_authorization(&config, &prompts, &host_name, profile.kind).await;

    let (accepted, reason) = match &decision {
        Authorization::Accept { .. } => (true, None),
        Authorization::Refuse(reason) => (false, Some(reason.clone())),
    };
    let response = if accepted {
        Message::accept(identity_name.clone(), identity_id.clone())
    } else {
        Message::refuse(identity_name.clone(), identity_id.clone(), reason.clone().unwrap_or_default())
    };
    protocol::write_message(&mut write_half, &response, &peer_label).await?;

    if let Authorization::Accept { trust } = &decision {
        if *trust {
            config.write().trust_host(&host_name, &host_id, true);
            let _ = config.read().persist();
        }
    }

    if !accepted {
        handle.close(ClosedReason::Refused(reason.unwrap_or_default()));
        return Ok(());
    }

    handle.set_state(SessionState::Streaming)?;
    let result = receive_events(&mut reader, &mut write_half, &peer_label, profile, &handle, &cancel, &config).await;

    handle.set_state(SessionState::Draining).ok();
    let outcome = match &result {
        Ok(()) => ClosedReason::Clean,
        Err(err) => ClosedReason::Error(err.to_string()),
    };
    handle.close(outcome);
    result
}

enum Authorization {
    Accept { trust: bool },
    Refuse(String),
}

/// Spec §4.7 authorization decision, Consumer side:
/// 1. kind disabled in config -> refuse immediately, no prompt.
/// 2. `should_auto_accept(peer)` -> accept.
/// 3. otherwise raise an AuthorizationPrompt with a 30s deadline.
async fn decide_authorization(
    config: &std::sync::Arc<parking_lot::RwLock<ConfigStore>>,
    prompts: &mpsc::Sender<AuthorizationPrompt>,
    peer_name: &str,
    kind: PhysicalDeviceKind,
) -> Authorization {
    let device_kind = match kind {
        PhysicalDeviceKind::Tablet => DeviceKind::Tablet,
        PhysicalDeviceKind::Joystick => DeviceKind::Joystick,
    };

    {
        let snapshot = config.read();
        if !snapshot.kind_enabled(device_kind) {
            return Authorization::Refuse("kind_disabled".to_string());
        }
        if snapshot.should_auto_accept(Role::Host, peer_name) {
            return Authorization::Accept { trust: false };
        }
    }

    let (tx, rx) = oneshot::channel();
    let prompt = AuthorizationPrompt {
        prompt_id: Uuid::new_v4().to_string(),
        peer_name: peer_name.to_string(),
        kind,
        respond: tx,
    };
    if prompts.send(prompt).await.is_err() {
        return Authorization::Refuse("timeout".to_string());
    }

    match timeout(Duration::from_secs(AUTH_PROMPT_DEADLINE_SECS), rx).await {
        Ok(Ok(AuthDecision::Accept { trust })) => Authorization::Accept { trust },
        Ok(Ok(AuthDecision::Decline)) => Authorization::Refuse("declined".to_string()),
        Ok(Err(_)) => Authorization::Refuse("timeout".to_string()),
        Err(_) => Authorization::Refuse("timeout".to_string()),
    }
}

async fn receive_events(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    peer_label: &str,
    profile: crate::device::CapabilityProfile,
    handle: &SessionHandle,
    cancel: &CancellationToken,
    config: &std::sync::Arc<parking_lot::RwLock<ConfigStore>>,
) -> Result<()> {
    let peer_name = handle.snapshot().peer_name.unwrap_or_else(|| peer_label.to_string());
    let mut virtual_device = {
        let snapshot = config.read();
        emulation::create(profile, &peer_name, snapshot.config())?
    };

    let mut liveness = LivenessClock::new();
    let mut check_tick = interval(Duration::from_secs(1));

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),

            _ = check_tick.tick() => {
                if liveness.is_dead() {
                    break Err(Error::transient(peer_label.to_string(), "no inbound bytes for 10s"));
                }
            }

            incoming = protocol::read_message(reader, peer_label) => {
                match incoming {
                    Ok(Some(Message::Event { events, .. })) => {
                        liveness.mark_inbound();
                        handle.add_bytes_in(1);
                        if let Err(err) = virtual_device.inject(events) {
                            break Err(err);
                        }
                    }
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

    let reason = match &result {
        Ok(()) => None,
        Err(err) => Some(err.to_string()),
    };
    let _ = protocol::write_message(write_half, &Message::bye(reason), peer_label).await;
    // Restoration hooks run strictly after the socket is closed (spec §5):
    // shut the write half down here rather than leaving it for `Drop` once
    // this function returns, which would otherwise run after `Closed`.
    let _ = write_half.shutdown().await;

    virtual_device.destroy();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decide_authorization_refuses_disabled_kind_without_prompting() {
        let (mut store, _warning) = ConfigStore::load(std::env::temp_dir().join(format!(
            "transwacom-test-{}/config.yml",
            Uuid::new_v4()
        )));
        store.set_kind_enabled(DeviceKind::Joystick, false);
        let config = std::sync::Arc::new(parking_lot::RwLock::new(store));
        let (tx, mut rx) = mpsc::channel(1);

        let decision = decide_authorization(&config, &tx, "HostA", PhysicalDeviceKind::Joystick).await;
        assert!(matches!(decision, Authorization::Refuse(ref reason) if reason == "kind_disabled"));
        assert!(rx.try_recv().is_err(), "no prompt should have been raised");
    }
}
