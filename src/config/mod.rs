//! Config & Trust Store (C2, spec §4.2).
//!
//! A YAML file under the user config directory, read once at start and
//! rewritten atomically (write-temp + rename, same idiom as the teacher's
//! `runtime/config.rs` uses for its TOML file). A failed read never aborts
//! startup — defaults are applied in memory and the failure is returned to
//! the caller as a warning to log, per spec §7's `Config` policy.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::MachineIdentity;

fn default_port() -> u16 {
    3333
}

fn default_mdns_name() -> String {
    "transwacom".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_mdns_name")]
    pub mdns_name: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            mdns_name: default_mdns_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesConfig {
    #[serde(default = "default_true")]
    pub tablet_enabled: bool,
    #[serde(default = "default_true")]
    pub joystick_enabled: bool,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            tablet_enabled: true,
            joystick_enabled: true,
        }
    }
}

/// An entry under `consumer.trusted_hosts.<name>`: a Host this process, when
/// acting as Consumer, already knows about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedHost {
    pub host_id: String,
    #[serde(default)]
    pub auto_accept: bool,
}

/// An entry under `host.trusted_consumers.<name>`: a Consumer this process,
/// when acting as Host, already knows about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedConsumer {
    pub consumer_id: String,
    #[serde(default)]
    pub auto_accept: bool,
    #[serde(default)]
    pub allowed_devices: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub machine_name: Option<String>,
    #[serde(default)]
    pub machine_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub trusted_hosts: BTreeMap<String, TrustedHost>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            devices: DevicesConfig::default(),
            trusted_hosts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub relative_mode: bool,
    #[serde(default)]
    pub disable_local: bool,
    #[serde(default)]
    pub trusted_consumers: BTreeMap<String, TrustedConsumer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub host: HostConfig,

    /// Keys this process doesn't understand, kept around so a rewrite never
    /// drops them (spec §6: "unknown keys are preserved on rewrite").
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_yaml::Value>,
}

/// Which side of a session a peer query is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Consumer,
}

/// The kind gate from spec §4.2 `consumer.devices.{tablet,joystick}_enabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Tablet,
    Joystick,
}

/// The in-memory view plus its backing file path. Single-writer (spec §5):
/// only the Supervisor task calls the mutating methods; everything else
/// takes a snapshot via `config()`.
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
}

impl ConfigStore {
    /// Default location: `~/.config/transwacom/config.yml`.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| Error::resource("no config directory for this platform"))?;
        Ok(base.join("transwacom").join("config.yml"))
    }

    /// Load from `path`, applying defaults and generating a machine identity
    /// if one isn't present yet. A read or parse failure is not fatal: the
    /// default config is used and the error is returned alongside it so the
    /// caller can log it per spec §7.
    pub fn load(path: impl Into<PathBuf>) -> (Self, Option<Error>) {
        let path = path.into();
        let (mut config, warning) = match fs::read_to_string(&path) {
            Ok(text) => match serde_yaml::from_str::<Config>(&text) {
                Ok(cfg) => (cfg, None),
                Err(err) => (
                    Config::default(),
                    Some(Error::config(path.clone(), err.to_string())),
                ),
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => (Config::default(), None),
            Err(err) => (
                Config::default(),
                Some(Error::config(path.clone(), err.to_string())),
            ),
        };

        if config.general.machine_id.is_none() {
            let identity = MachineIdentity::generate("pending");
            config.general.machine_id = Some(identity.machine_id);
        }
        if config.general.machine_name.is_none() {
            let id = config.general.machine_id.clone().unwrap_or_default();
            config.general.machine_name = Some(MachineIdentity::default_name(&id));
        }

        (Self { path, config }, warning)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identity(&self) -> MachineIdentity {
        MachineIdentity {
            machine_id: self.config.general.machine_id.clone().unwrap_or_default(),
            machine_name: self
                .config
                .general
                .machine_name
                .clone()
                .unwrap_or_default(),
        }
    }

    /// Write the current in-memory config to disk, atomically. Failure
    /// leaves the in-memory view untouched and is surfaced to the caller,
    /// never panics and never blocks session progress (spec §5).
    pub fn persist(&self) -> Result<()> {
        atomic_write_yaml(&self.path, &self.config)
    }

    pub fn is_trusted(&self, role: Role, peer_name: &str) -> bool {
        match role {
            Role::Host => self.config.consumer.trusted_hosts.contains_key(peer_name),
            Role::Consumer => self
                .config
                .host
                .trusted_consumers
                .contains_key(peer_name),
        }
    }

    pub fn should_auto_accept(&self, role: Role, peer_name: &str) -> bool {
        match role {
            Role::Host => self
                .config
                .consumer
                .trusted_hosts
                .get(peer_name)
                .map(|h| h.auto_accept)
                .unwrap_or(false),
            Role::Consumer => self
                .config
                .host
                .trusted_consumers
                .get(peer_name)
                .map(|c| c.auto_accept)
                .unwrap_or(false),
        }
    }

    /// Whether `kind` may be shared with `peer_name` (Host-side gate; a
    /// Consumer-side kind gate is `kind_enabled` below).
    pub fn allowed_for(&self, peer_name: &str, device_path: &str) -> bool {
        match self.config.host.trusted_consumers.get(peer_name) {
            Some(c) if c.allowed_devices.is_empty() => true,
            Some(c) => c.allowed_devices.iter().any(|d| d == device_path),
            None => false,
        }
    }

    pub fn set_kind_enabled(&mut self, kind: DeviceKind, enabled: bool) {
        match kind {
            DeviceKind::Tablet => self.config.consumer.devices.tablet_enabled = enabled,
            DeviceKind::Joystick => self.config.consumer.devices.joystick_enabled = enabled,
        }
    }

    pub fn kind_enabled(&self, kind: DeviceKind) -> bool {
        match kind {
            DeviceKind::Tablet => self.config.consumer.devices.tablet_enabled,
            DeviceKind::Joystick => self.config.consumer.devices.joystick_enabled,
        }
    }

    /// Record a Consumer's trust decision about a Host peer (this process
    /// acting as Consumer, trusting the peer it just authorized).
    pub fn trust_host(&mut self, peer_name: &str, host_id: &str, auto_accept: bool) {
        self.config.consumer.trusted_hosts.insert(
            peer_name.to_string(),
            TrustedHost {
                host_id: host_id.to_string(),
                auto_accept,
            },
        );
    }

    pub fn untrust_host(&mut self, peer_name: &str) {
        self.config.consumer.trusted_hosts.remove(peer_name);
    }

    pub fn trust_consumer(
        &mut self,
        peer_name: &str,
        consumer_id: &str,
        auto_accept: bool,
        allowed_devices: Vec<String>,
    ) {
        self.config.host.trusted_consumers.insert(
            peer_name.to_string(),
            TrustedConsumer {
                consumer_id: consumer_id.to_string(),
                auto_accept,
                allowed_devices,
            },
        );
    }

    pub fn untrust_consumer(&mut self, peer_name: &str) {
        self.config.host.trusted_consumers.remove(peer_name);
    }
}

fn atomic_write_yaml(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = serde_yaml::to_string(config)
        .map_err(|err| Error::config(path.to_path_buf(), err.to_string()))?;
    let tmp = path.with_extension("yml.tmp");
    fs::write(&tmp, text)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_applies_defaults_without_warning() {
        let dir = std::env::temp_dir().join(format!("transwacom-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.yml");
        let (store, warning) = ConfigStore::load(&path);
        assert!(warning.is_none());
        assert_eq!(store.config().consumer.network.port, 3333);
        assert!(store.config().general.machine_id.is_some());
    }

    #[test]
    fn load_malformed_file_warns_and_falls_back() {
        let dir = std::env::temp_dir().join(format!("transwacom-test-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yml");
        fs::write(&path, "not: [valid: yaml: at: all").unwrap();
        let (store, warning) = ConfigStore::load(&path);
        assert!(warning.is_some());
        assert_eq!(store.config().consumer.network.port, 3333);
    }

    #[test]
    fn persist_then_reload_round_trips_trust_entries() {
        let dir = std::env::temp_dir().join(format!("transwacom-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.yml");
        let (mut store, _) = ConfigStore::load(&path);
        store.trust_host("HostA", "H1", true);
        store.persist().unwrap();

        let (reloaded, warning) = ConfigStore::load(&path);
        assert!(warning.is_none());
        assert!(reloaded.is_trusted(Role::Host, "HostA"));
        assert!(reloaded.should_auto_accept(Role::Host, "HostA"));
    }

    #[test]
    fn unknown_keys_survive_a_rewrite() {
        let dir = std::env::temp_dir().join(format!("transwacom-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.yml");
        fs::create_dir_all(&dir).unwrap();
        fs::write(&path, "future_feature:\n  some_field: 42\n").unwrap();

        let (store, warning) = ConfigStore::load(&path);
        assert!(warning.is_none());
        store.persist().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("future_feature"));
    }

    #[test]
    fn allowed_for_empty_allowlist_means_any_device() {
        let dir = std::env::temp_dir().join(format!("transwacom-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.yml");
        let (mut store, _) = ConfigStore::load(&path);
        store.trust_consumer("ConsumerA", "C1", true, vec![]);
        assert!(store.allowed_for("ConsumerA", "/dev/input/event7"));
    }

    #[test]
    fn allowed_for_respects_explicit_allowlist() {
        let dir = std::env::temp_dir().join(format!("transwacom-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.yml");
        let (mut store, _) = ConfigStore::load(&path);
        store.trust_consumer(
            "ConsumerA",
            "C1",
            true,
            vec!["/dev/input/event3".to_string()],
        );
        assert!(store.allowed_for("ConsumerA", "/dev/input/event3"));
        assert!(!store.allowed_for("ConsumerA", "/dev/input/event7"));
    }
}
