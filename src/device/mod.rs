//! Device Detector (C1, spec §4.1).
//!
//! Enumerates `/dev/input/event*` nodes via `evdev`, classifies each as
//! `tablet` or `joystick` (or drops it, silently — not every input node is
//! reportable), and reduces it to the portable [`CapabilityProfile`] carried
//! in the handshake (spec §4.3). Grounded on the `evdev::Device` surface used
//! by `other_examples/90022bb3_barrulus-niri-mapper…device_manager.rs`
//! (`Device::open`, `.input_id()`, `.supported_*()`).

pub mod codes;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use evdev::Device;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tags that mark a device name as a known graphics-tablet vendor. Used as
/// the fallback leg of classification rule 1 (spec §4.1) when the pressure
/// + `BTN_STYLUS` test doesn't fire on its own (some tablets report styluses
/// through a sibling evdev node).
const TABLET_NAME_TAGS: &[&str] = &["wacom", "huion", "xp-pen", "gaomon", "uc-logic"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalDeviceKind {
    Tablet,
    Joystick,
}

impl PhysicalDeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhysicalDeviceKind::Tablet => "tablet",
            PhysicalDeviceKind::Joystick => "joystick",
        }
    }
}

/// Per-axis range carried alongside each capability tag so a Consumer can
/// build a faithful virtual device (spec §3 `CapabilityProfile`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: i32,
    pub max: i32,
    pub resolution: i32,
}

/// A discovered, OS-level input device (spec §3 `PhysicalDevice`). Nothing
/// here is stored across calls — `enumerate`/`describe` re-derive it from
/// the kernel each time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalDevice {
    pub path: String,
    pub kind: PhysicalDeviceKind,
    pub display_name: String,
    pub capabilities: Vec<String>,
    pub axes: BTreeMap<String, AxisRange>,
    /// Present only for tablets; used by C5 mode control. Absence is not an
    /// error (spec §4.1).
    pub vendor_id: Option<String>,
}

impl PhysicalDevice {
    /// Reduce to the portable subset carried in the `handshake` message
    /// (spec §4.3). `display_name` here is still the *physical* device's
    /// name — the `"TransWacom Virtual <kind> (<peer_name>)"` product name
    /// (spec §4.6) is a Consumer-side construction detail, built in
    /// `consumer::emulation::create`, since only the Consumer knows the
    /// peer's name at that point.
    pub fn to_capability_profile(&self) -> CapabilityProfile {
        CapabilityProfile {
            kind: self.kind,
            display_name: self.display_name.clone(),
            capabilities: self.capabilities.clone(),
            axes: self.axes.clone(),
        }
    }
}

/// The portable subset of a [`PhysicalDevice`] sent over the wire in the
/// `handshake` message (spec §3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityProfile {
    pub kind: PhysicalDeviceKind,
    pub display_name: String,
    pub capabilities: Vec<String>,
    pub axes: BTreeMap<String, AxisRange>,
}

/// List every input node the kernel exposes, classified and reduced.
/// Devices that fail classification are silently dropped, per spec §4.1
/// rule 3 ("otherwise, not reportable").
pub fn enumerate() -> Vec<PhysicalDevice> {
    evdev::enumerate()
        .filter_map(|(path, device)| classify(&path, device))
        .collect()
}

/// Describe a single device by path. `NotFound` (mapped from the
/// underlying `io::Error`) if the node doesn't exist or isn't an evdev
/// node; `Unsupported` (a `Resource` error) if it exists but classifies to
/// neither kind.
pub fn describe(path: impl AsRef<Path>) -> Result<PhysicalDevice> {
    let path = path.as_ref();
    let device = Device::open(path)?;
    classify(path, device)
        .ok_or_else(|| Error::resource(format!("{}: no recognizable capability set", path.display())))
}

fn classify(path: &Path, device: Device) -> Option<PhysicalDevice> {
    let kind = classify_kind(&device)?;
    let capabilities = capability_tags(&device);
    let axes = axis_ranges(&device);
    let vendor_id = match kind {
        PhysicalDeviceKind::Tablet => Some(format!(
            "{:04x}:{:04x}",
            device.input_id().vendor(),
            device.input_id().product()
        )),
        PhysicalDeviceKind::Joystick => None,
    };

    Some(PhysicalDevice {
        path: path.to_string_lossy().into_owned(),
        kind,
        display_name: device.name().unwrap_or("unknown input device").to_string(),
        capabilities,
        axes,
        vendor_id,
    })
}

fn classify_kind(device: &Device) -> Option<PhysicalDeviceKind> {
    let name_lower = device.name().unwrap_or_default().to_ascii_lowercase();
    let has_pressure = device
        .supported_absolute_axes()
        .map(|axes| axes.contains(evdev::AbsoluteAxisType::ABS_PRESSURE))
        .unwrap_or(false);
    let has_stylus = device
        .supported_keys()
        .map(|keys| keys.contains(evdev::Key::BTN_STYLUS))
        .unwrap_or(false);
    let name_tags_tablet = TABLET_NAME_TAGS.iter().any(|tag| name_lower.contains(tag));

    if (has_pressure && has_stylus) || name_tags_tablet {
        return Some(PhysicalDeviceKind::Tablet);
    }

    let abs_axes = device
        .supported_absolute_axes()
        .map(|axes| {
            axes.contains(evdev::AbsoluteAxisType::ABS_X)
                && axes.contains(evdev::AbsoluteAxisType::ABS_Y)
                && (axes.contains(evdev::AbsoluteAxisType::ABS_RX)
                    || axes.contains(evdev::AbsoluteAxisType::ABS_RY)
                    || axes.contains(evdev::AbsoluteAxisType::ABS_HAT0X))
        })
        .unwrap_or(false);
    let has_gamepad_buttons = device
        .supported_keys()
        .map(|keys| keys.contains(evdev::Key::BTN_SOUTH) || keys.contains(evdev::Key::BTN_TRIGGER))
        .unwrap_or(false);

    if abs_axes || has_gamepad_buttons {
        return Some(PhysicalDeviceKind::Joystick);
    }

    None
}

fn capability_tags(device: &Device) -> Vec<String> {
    let mut tags = Vec::new();
    if let Some(axes) = device.supported_absolute_axes() {
        for axis in axes.iter() {
            if let Some(name) = codes::axis_to_str(axis) {
                tags.push(name.to_string());
            }
        }
    }
    if let Some(keys) = device.supported_keys() {
        for key in keys.iter() {
            if let Some(name) = codes::key_to_str(key) {
                tags.push(name.to_string());
            }
        }
    }
    tags.sort();
    tags.dedup();
    tags
}

fn axis_ranges(device: &Device) -> BTreeMap<String, AxisRange> {
    let mut ranges = BTreeMap::new();
    let Some(axes) = device.supported_absolute_axes() else {
        return ranges;
    };
    let Ok(abs_state) = device.get_abs_state() else {
        return ranges;
    };
    for axis in axes.iter() {
        let Some(name) = codes::axis_to_str(axis) else {
            continue;
        };
        let info = &abs_state[axis.0 as usize];
        ranges.insert(
            name.to_string(),
            AxisRange {
                min: info.minimum,
                max: info.maximum,
                resolution: info.resolution,
            },
        );
    }
    ranges
}

/// Resolve a tablet's vendor-tool identifier for C5 mode control. Absence
/// (non-tablet, or no mapping known) is not an error (spec §4.1).
pub fn vendor_tool_id(device: &PhysicalDevice) -> Option<&str> {
    if device.kind != PhysicalDeviceKind::Tablet {
        return None;
    }
    device.vendor_id.as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_device() -> PhysicalDevice {
        let mut axes = BTreeMap::new();
        axes.insert(
            "ABS_X".to_string(),
            AxisRange {
                min: 0,
                max: 32767,
                resolution: 100,
            },
        );
        PhysicalDevice {
            path: "/dev/input/event3".to_string(),
            kind: PhysicalDeviceKind::Tablet,
            display_name: "Wacom Intuos Pro".to_string(),
            capabilities: vec!["ABS_X".to_string(), "BTN_STYLUS".to_string()],
            axes,
            vendor_id: Some("056a:0358".to_string()),
        }
    }

    #[test]
    fn capability_profile_carries_physical_device_name() {
        let profile = sample_device().to_capability_profile();
        assert_eq!(profile.display_name, "Wacom Intuos Pro");
        assert_eq!(profile.capabilities.len(), 2);
    }

    #[test]
    fn vendor_tool_id_absent_for_joystick() {
        let device = PhysicalDevice {
            path: "/dev/input/event5".to_string(),
            kind: PhysicalDeviceKind::Joystick,
            display_name: "Pad".to_string(),
            capabilities: vec![],
            axes: BTreeMap::new(),
            vendor_id: None,
        };
        assert_eq!(vendor_tool_id(&device), None);
    }

    #[test]
    fn kind_as_str_matches_wire_vocabulary() {
        assert_eq!(PhysicalDeviceKind::Tablet.as_str(), "tablet");
        assert_eq!(PhysicalDeviceKind::Joystick.as_str(), "joystick");
    }
}
