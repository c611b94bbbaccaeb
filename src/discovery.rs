//! Discovery (C4, spec §4.4).
//!
//! Announces and browses `_input-consumer._tcp.local` via `mdns_sd`, the
//! same `ServiceDaemon` announce/browse idiom as
//! `other_examples/04958386_paterkleomenis-connected…discovery.rs`, in place
//! of the teacher's raw UDP-broadcast beacon (`src-tauri/src/runtime/lan/discovery.rs`)
//! — the spec mandates a named mDNS service type and TXT records, which the
//! teacher's beacon format doesn't carry.

use std::collections::HashMap;
use std::net::IpAddr;

use mdns_sd::{ResolvedService, ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

pub const SERVICE_TYPE: &str = "_input-consumer._tcp.local.";
const PROTOCOL_VERSION: &str = "1.0";

/// A Consumer seen on the LAN, reduced to what a Host needs to dial it
/// (spec §4.4 `DiscoveredConsumer`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredConsumer {
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
    pub txt: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    Found(DiscoveredConsumer),
    Removed(String),
}

/// Owns the `mdns_sd` daemon for this process. A Consumer calls
/// [`Discovery::announce`] once (and again after config changes, per spec
/// §4.4); a Host calls [`Discovery::browse`] to get a stream of
/// [`DiscoveryEvent`]s. Discovery is advisory only — nothing here prevents
/// a Host from dialing a user-supplied `address:port` directly.
pub struct Discovery {
    daemon: ServiceDaemon,
}

impl Discovery {
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|err| Error::resource(format!("failed to start mDNS daemon: {err}")))?;
        Ok(Self { daemon })
    }

    /// Publish this machine as a Consumer. `capabilities` is the set of
    /// kinds currently enabled in config (spec §4.2
    /// `consumer.devices.{tablet,joystick}_enabled`).
    pub fn announce(
        &self,
        instance_name: &str,
        machine_id: &str,
        port: u16,
        capabilities: &[&str],
    ) -> Result<()> {
        let host_name = format!("{instance_name}.local.");
        let mut properties = HashMap::new();
        properties.insert("version".to_string(), PROTOCOL_VERSION.to_string());
        properties.insert("name".to_string(), instance_name.to_string());
        properties.insert("capabilities".to_string(), capabilities.join(","));
        properties.insert("id".to_string(), machine_id.to_string());

        let ip: IpAddr = "0.0.0.0".parse().expect("valid placeholder address");
        let service_info = ServiceInfo::new(SERVICE_TYPE, instance_name, &host_name, ip, port, properties)
            .map_err(|err| Error::resource(format!("failed to build mDNS service info: {err}")))?
            .enable_addr_auto();

        self.daemon
            .register(service_info)
            .map_err(|err| Error::resource(format!("failed to register mDNS service: {err}")))
    }

    /// Withdraw this machine's announcement, e.g. before re-announcing with
    /// changed TXT records.
    pub fn unannounce(&self, instance_name: &str) -> Result<()> {
        self.daemon
            .unregister(&format!("{instance_name}.{SERVICE_TYPE}"))
            .map(|_| ())
            .map_err(|err| Error::resource(format!("failed to unregister mDNS service: {err}")))
    }

    /// Start browsing for Consumers. Returns a channel the caller polls;
    /// the browse stays active until the returned receiver (and the
    /// underlying `mdns_sd` receiver) is dropped.
    pub fn browse(&self) -> Result<mpsc::Receiver<DiscoveryEvent>> {
        let browse_rx = self
            .daemon
            .browse(SERVICE_TYPE)
            .map_err(|err| Error::resource(format!("failed to browse mDNS: {err}")))?;

        let (tx, rx) = mpsc::channel(32);
        tokio::task::spawn_blocking(move || {
            while let Ok(event) = browse_rx.recv() {
                let mapped = match event {
                    ServiceEvent::ServiceResolved(info) => resolved_to_event(&info),
                    ServiceEvent::ServiceRemoved(_service_type, fullname) => {
                        Some(DiscoveryEvent::Removed(strip_service_type(&fullname)))
                    }
                    _ => None,
                };
                if let Some(event) = mapped {
                    if tx.blocking_send(event).is_err() {
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }
}

fn resolved_to_event(info: &ResolvedService) -> Option<DiscoveryEvent> {
    let address = info.addresses.iter().next().copied()?;
    let txt: HashMap<String, String> = info
        .txt_properties
        .iter()
        .map(|p| (p.key().to_string(), p.val_str().to_string()))
        .collect();

    Some(DiscoveryEvent::Found(DiscoveredConsumer {
        name: strip_service_type(&info.fullname),
        address,
        port: info.port,
        txt,
    }))
}

fn strip_service_type(fullname: &str) -> String {
    fullname
        .strip_suffix(&format!(".{SERVICE_TYPE}"))
        .unwrap_or(fullname)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_service_type_removes_suffix() {
        let full = format!("HostA.{SERVICE_TYPE}");
        assert_eq!(strip_service_type(&full), "HostA");
    }

    #[test]
    fn strip_service_type_is_noop_on_bare_name() {
        assert_eq!(strip_service_type("HostA"), "HostA");
    }
}
