//! Supervisor (C8, spec §4.8): ties C1–C7 together, owns the session
//! registry, and exposes the async driver API to whatever UI layer sits
//! above the core. Modeled directly on the teacher's
//! `GUI/src/runtime/mod.rs` `RuntimeWorker`/`RuntimeHandle` split — mutating
//! calls return immediately, a background worker task owns the real state,
//! and progress is reported over an event channel the UI subscribes to.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ConfigStore;
use crate::device::{self, PhysicalDevice};
use crate::discovery::{Discovery, DiscoveredConsumer, DiscoveryEvent};
use crate::error::{Error, Result};
use crate::host::HostCaptureOptions;
use crate::identity::MachineIdentity;
use crate::session::state::{SessionRole, SessionState};
use crate::session::{consumer, host, AuthDecision, AuthorizationPrompt, SessionHandle};

#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    SessionStateChanged { session_id: String, state: SessionState },
    AuthorizationPrompt { prompt_id: String, peer_name: String, kind: String },
    DeviceArrived(String),
    DeviceDeparted(String),
    Error(String),
}

enum SupervisorCommand {
    Share {
        device_path: String,
        consumer_name: String,
        consumer_addr: SocketAddr,
        respond: oneshot::Sender<Result<String>>,
    },
    Stop {
        session_id: String,
    },
    Accept {
        prompt_id: String,
        trust: bool,
    },
    Decline {
        prompt_id: String,
    },
    Shutdown {
        respond: oneshot::Sender<()>,
    },
}

/// Cheap, cloneable front for the Supervisor. Every mutating call sends a
/// command and returns immediately (or, for `share`, awaits a one-shot
/// result once the connect attempt resolves) — actual session progress
/// happens on the worker's tasks (spec §4.8: "all mutating calls return
/// immediately").
#[derive(Clone)]
pub struct SupervisorHandle {
    command_tx: mpsc::Sender<SupervisorCommand>,
    registry: Arc<Mutex<HashMap<String, SessionHandle>>>,
    discovered: Arc<Mutex<HashMap<String, DiscoveredConsumer>>>,
}

impl SupervisorHandle {
    pub fn list_local_devices(&self) -> Vec<PhysicalDevice> {
        device::enumerate()
    }

    pub fn list_discovered_consumers(&self) -> Vec<DiscoveredConsumer> {
        self.discovered.lock().values().cloned().collect()
    }

    pub fn list_sessions(&self) -> Vec<crate::session::SessionInfo> {
        self.registry.lock().values().map(|h| h.snapshot()).collect()
    }

    /// `consumer_name` gates this call against `host.trusted_consumers`
    /// (spec §4.2): the Host never dials a peer it hasn't been told to
    /// trust for this device, even though the request itself is UI-driven.
    pub async fn share(
        &self,
        device_path: String,
        consumer_name: String,
        consumer_addr: SocketAddr,
    ) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(SupervisorCommand::Share { device_path, consumer_name, consumer_addr, respond: tx })
            .await
            .map_err(|_| Error::resource("supervisor worker is gone"))?;
        rx.await.map_err(|_| Error::resource("supervisor worker dropped the response"))?
    }

    pub async fn stop(&self, session_id: String) {
        let _ = self.command_tx.send(SupervisorCommand::Stop { session_id }).await;
    }

    pub async fn accept(&self, prompt_id: String, trust: bool) {
        let _ = self.command_tx.send(SupervisorCommand::Accept { prompt_id, trust }).await;
    }

    pub async fn decline(&self, prompt_id: String) {
        let _ = self.command_tx.send(SupervisorCommand::Decline { prompt_id }).await;
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.command_tx.send(SupervisorCommand::Shutdown { respond: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

struct SessionEntry {
    handle: SessionHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct SupervisorWorker {
    config: Arc<RwLock<ConfigStore>>,
    identity: MachineIdentity,
    sessions: HashMap<String, SessionEntry>,
    pending_prompts: HashMap<String, oneshot::Sender<AuthDecision>>,
    registry: Arc<Mutex<HashMap<String, SessionHandle>>>,
    events: mpsc::Sender<SupervisorEvent>,
    prompts_tx: mpsc::Sender<AuthorizationPrompt>,
}

/// Construct the Supervisor, bind the Consumer-role TCP listener on the
/// configured port, start mDNS announce/browse, and return the handle plus
/// the event stream the UI subscribes to.
pub async fn spawn_supervisor(
    config: Arc<RwLock<ConfigStore>>,
) -> Result<(SupervisorHandle, mpsc::Receiver<SupervisorEvent>)> {
    let identity = config.read().identity();
    let port = config.read().config().consumer.network.port;

    let listener = TcpListener::bind(("0.0.0.0", port)).await.map_err(Error::from)?;

    let discovery = Discovery::new()?;
    let capabilities: Vec<&str> = {
        let snapshot = config.read();
        let mut caps = Vec::new();
        if snapshot.config().consumer.devices.tablet_enabled {
            caps.push("tablet");
        }
        if snapshot.config().consumer.devices.joystick_enabled {
            caps.push("joystick");
        }
        caps
    };
    discovery.announce(
        &config.read().config().consumer.network.mdns_name.clone(),
        &identity.machine_id,
        port,
        &capabilities,
    )?;
    let mut browse_rx = discovery.browse()?;

    let (command_tx, command_rx) = mpsc::channel(64);
    let (events_tx, events_rx) = mpsc::channel(256);
    let (prompts_tx, prompts_rx) = mpsc::channel(32);

    let registry = Arc::new(Mutex::new(HashMap::new()));
    let discovered = Arc::new(Mutex::new(HashMap::new()));

    let handle = SupervisorHandle {
        command_tx,
        registry: registry.clone(),
        discovered: discovered.clone(),
    };

    let mut worker = SupervisorWorker {
        config,
        identity,
        sessions: HashMap::new(),
        pending_prompts: HashMap::new(),
        registry,
        events: events_tx,
        prompts_tx,
    };

    tokio::spawn(async move {
        worker.run(listener, command_rx, prompts_rx).await;
    });

    tokio::spawn(async move {
        while let Some(event) = browse_rx.recv().await {
            match event {
                DiscoveryEvent::Found(consumer) => {
                    discovered.lock().insert(consumer.name.clone(), consumer);
                }
                DiscoveryEvent::Removed(name) => {
                    discovered.lock().remove(&name);
                }
            }
        }
    });

    Ok((handle, events_rx))
}

impl SupervisorWorker {
    async fn run(
        &mut self,
        listener: TcpListener,
        mut command_rx: mpsc::Receiver<SupervisorCommand>,
        mut prompts_rx: mpsc::Receiver<AuthorizationPrompt>,
    ) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.accept_consumer_session(stream, addr),
                        Err(err) => warn!("consumer listener accept error: {err}"),
                    }
                }

                Some(prompt) = prompts_rx.recv() => {
                    let prompt_id = prompt.prompt_id.clone();
                    let _ = self.events.send(SupervisorEvent::AuthorizationPrompt {
                        prompt_id: prompt_id.clone(),
                        peer_name: prompt.peer_name,
                        kind: prompt.kind.as_str().to_string(),
                    }).await;
                    self.pending_prompts.insert(prompt_id, prompt.respond);
                }

                command = command_rx.recv() => {
                    match command {
                        Some(SupervisorCommand::Share { device_path, consumer_name, consumer_addr, respond }) => {
                            let result = self.share(device_path, consumer_name, consumer_addr).await;
                            let _ = respond.send(result);
                        }
                        Some(SupervisorCommand::Stop { session_id }) => self.stop_session(&session_id).await,
                        Some(SupervisorCommand::Accept { prompt_id, trust }) => {
                            if let Some(tx) = self.pending_prompts.remove(&prompt_id) {
                                let _ = tx.send(AuthDecision::Accept { trust });
                            }
                        }
                        Some(SupervisorCommand::Decline { prompt_id }) => {
                            if let Some(tx) = self.pending_prompts.remove(&prompt_id) {
                                let _ = tx.send(AuthDecision::Decline);
                            }
                        }
                        Some(SupervisorCommand::Shutdown { respond }) => {
                            self.shutdown_all().await;
                            let _ = respond.send(());
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    }

    async fn share(
        &mut self,
        device_path: String,
        consumer_name: String,
        consumer_addr: SocketAddr,
    ) -> Result<String> {
        // I1: at most one session per device path.
        if self.sessions.values().any(|e| e.handle.snapshot().device_path.as_deref() == Some(device_path.as_str())) {
            return Err(Error::resource(format!("{device_path} is already in an active session")));
        }

        // host.trusted_consumers gate (spec §4.2): a Host only shares with a
        // peer it has been configured to trust, and only the devices that
        // peer's `allowed_devices` entry permits.
        if !self.config.read().allowed_for(&consumer_name, &device_path) {
            return Err(Error::refused(consumer_name, "not permitted by host trust policy"));
        }

        let device = device::describe(&device_path)?;
        let session_id = Uuid::new_v4().to_string();
        let handle = SessionHandle::new(session_id.clone(), SessionRole::Host, Some(device_path));
        handle.set_peer_name(consumer_name);
        let cancel = CancellationToken::new();

        let capture_opts = {
            let snapshot = self.config.read();
            HostCaptureOptions {
                relative_mode: snapshot.config().host.relative_mode,
                disable_local: snapshot.config().host.disable_local,
            }
        };

        let task = self.spawn_host_task(device, consumer_addr, capture_opts, handle.clone(), cancel.clone(), session_id.clone());
        self.registry.lock().insert(session_id.clone(), handle.clone());
        self.sessions.insert(session_id.clone(), SessionEntry { handle, cancel, task });
        Ok(session_id)
    }

    fn spawn_host_task(
        &self,
        device: PhysicalDevice,
        consumer_addr: SocketAddr,
        capture_opts: HostCaptureOptions,
        handle: SessionHandle,
        cancel: CancellationToken,
        session_id: String,
    ) -> JoinHandle<()> {
        let identity = self.identity.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = host::run_host_session(device, consumer_addr, identity, capture_opts, handle.clone(), cancel).await;
            if let Err(err) = result {
                info!("host session {session_id} ended: {err}");
                let _ = events.send(SupervisorEvent::Error(err.to_string())).await;
            }
            let _ = events
                .send(SupervisorEvent::SessionStateChanged { session_id, state: handle.state() })
                .await;
        })
    }

    fn accept_consumer_session(&mut self, stream: tokio::net::TcpStream, addr: SocketAddr) {
        let session_id = Uuid::new_v4().to_string();
        let handle = SessionHandle::new(session_id.clone(), SessionRole::Consumer, None);
        let cancel = CancellationToken::new();
        let config = self.config.clone();
        let identity_name = self.identity.machine_name.clone();
        let identity_id = self.identity.machine_id.clone();
        let prompts_tx = self.prompts_tx.clone();
        let events = self.events.clone();
        let handle_for_task = handle.clone();
        let cancel_for_task = cancel.clone();

        info!("accepted consumer-role connection from {addr}");
        let task = tokio::spawn(async move {
            let result = consumer::run_consumer_session(
                stream,
                config,
                identity_name,
                identity_id,
                prompts_tx,
                handle_for_task.clone(),
                cancel_for_task,
            )
            .await;
            if let Err(err) = result {
                let _ = events.send(SupervisorEvent::Error(err.to_string())).await;
            }
            let _ = events
                .send(SupervisorEvent::SessionStateChanged {
                    session_id: handle_for_task.snapshot().session_id,
                    state: handle_for_task.state(),
                })
                .await;
        });

        self.registry.lock().insert(session_id.clone(), handle.clone());
        self.sessions.insert(session_id, SessionEntry { handle, cancel, task });
    }

    async fn stop_session(&mut self, session_id: &str) {
        if let Some(entry) = self.sessions.get(session_id) {
            entry.handle.cancel_to_draining();
            entry.cancel.cancel();
        }
    }

    async fn shutdown_all(&mut self) {
        for entry in self.sessions.values() {
            entry.handle.cancel_to_draining();
            entry.cancel.cancel();
        }
        // Process-termination path (spec §5): wait for restoration guards
        // up to a hard deadline, then give up rather than hang the exit.
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(3);
        for entry in std::mem::take(&mut self.sessions).into_values() {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let _ = tokio::time::timeout(remaining, entry.task).await;
        }
        self.registry.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_prompt_event_carries_kind_as_wire_string() {
        let event = SupervisorEvent::AuthorizationPrompt {
            prompt_id: "p1".into(),
            peer_name: "HostA".into(),
            kind: "tablet".into(),
        };
        match event {
            SupervisorEvent::AuthorizationPrompt { kind, .. } => assert_eq!(kind, "tablet"),
            _ => panic!("wrong variant"),
        }
    }
}
