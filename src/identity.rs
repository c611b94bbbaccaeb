//! [`MachineIdentity`] — the stable per-installation fingerprint (spec §3).
//!
//! Generated once and persisted by the Config & Trust Store; never mutated
//! by the protocol (invariant I4).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A per-installation identity: a random fingerprint with 128+ bits of
/// entropy (a UUID v4 satisfies this directly) plus a user-editable label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineIdentity {
    pub machine_id: String,
    pub machine_name: String,
}

impl MachineIdentity {
    /// Generate a fresh identity. Called once, at first start, when the
    /// config file has no `general.machine_id` entry.
    pub fn generate(machine_name: impl Into<String>) -> Self {
        Self {
            machine_id: Uuid::new_v4().to_string(),
            machine_name: machine_name.into(),
        }
    }

    /// Best-effort hostname, used as the default `machine_name` when one
    /// isn't already configured.
    pub fn default_name(machine_id: &str) -> String {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("transwacom-{}", &machine_id[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_has_distinct_high_entropy_ids() {
        let a = MachineIdentity::generate("a");
        let b = MachineIdentity::generate("b");
        assert_ne!(a.machine_id, b.machine_id);
        // UUID v4 string form is 36 chars -> well over 128 bits encoded.
        assert_eq!(a.machine_id.len(), 36);
    }

    #[test]
    fn default_name_falls_back_to_machine_id_prefix() {
        let id = "0123456789abcdef";
        let name = MachineIdentity::default_name(id);
        assert!(!name.is_empty());
    }
}
