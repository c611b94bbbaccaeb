//! Symbolic code names ↔ `evdev` types.
//!
//! The wire protocol (spec §4.3) and the config/capability model carry axis
//! and button identifiers as strings (`"ABS_X"`, `"BTN_STYLUS"`) so that the
//! two peers never need to agree on numeric evdev codes out of band. This
//! module is the single place that translates between that wire vocabulary
//! and `evdev`'s typed `Key`/`AbsoluteAxisType`.

use evdev::{AbsoluteAxisType as Abs, Key};

/// The synthetic synchronization code that terminates an event batch
/// (spec §4.3, §4.5). It has no `evdev::Key`/`AbsoluteAxisType` counterpart
/// — it's `EV_SYN`/`SYN_REPORT` — so it's handled as a string sentinel at
/// the wire-codec/capture boundary instead of being folded into the tables
/// below.
pub const SYN_REPORT: &str = "SYN_REPORT";

/// Axis tags relevant to tablets and joysticks/gamepads.
const AXES: &[(&str, Abs)] = &[
    ("ABS_X", Abs::ABS_X),
    ("ABS_Y", Abs::ABS_Y),
    ("ABS_Z", Abs::ABS_Z),
    ("ABS_RX", Abs::ABS_RX),
    ("ABS_RY", Abs::ABS_RY),
    ("ABS_RZ", Abs::ABS_RZ),
    ("ABS_PRESSURE", Abs::ABS_PRESSURE),
    ("ABS_DISTANCE", Abs::ABS_DISTANCE),
    ("ABS_TILT_X", Abs::ABS_TILT_X),
    ("ABS_TILT_Y", Abs::ABS_TILT_Y),
    ("ABS_THROTTLE", Abs::ABS_THROTTLE),
    ("ABS_RUDDER", Abs::ABS_RUDDER),
    ("ABS_WHEEL", Abs::ABS_WHEEL),
    ("ABS_GAS", Abs::ABS_GAS),
    ("ABS_BRAKE", Abs::ABS_BRAKE),
    ("ABS_HAT0X", Abs::ABS_HAT0X),
    ("ABS_HAT0Y", Abs::ABS_HAT0Y),
    ("ABS_MISC", Abs::ABS_MISC),
];

/// Button tags relevant to tablets (stylus) and joysticks/gamepads.
const BUTTONS: &[(&str, Key)] = &[
    ("BTN_STYLUS", Key::BTN_STYLUS),
    ("BTN_STYLUS2", Key::BTN_STYLUS2),
    ("BTN_TOUCH", Key::BTN_TOUCH),
    ("BTN_TOOL_PEN", Key::BTN_TOOL_PEN),
    ("BTN_TOOL_RUBBER", Key::BTN_TOOL_RUBBER),
    ("BTN_SOUTH", Key::BTN_SOUTH),
    ("BTN_EAST", Key::BTN_EAST),
    ("BTN_NORTH", Key::BTN_NORTH),
    ("BTN_WEST", Key::BTN_WEST),
    ("BTN_TL", Key::BTN_TL),
    ("BTN_TR", Key::BTN_TR),
    ("BTN_TL2", Key::BTN_TL2),
    ("BTN_TR2", Key::BTN_TR2),
    ("BTN_SELECT", Key::BTN_SELECT),
    ("BTN_START", Key::BTN_START),
    ("BTN_MODE", Key::BTN_MODE),
    ("BTN_THUMBL", Key::BTN_THUMBL),
    ("BTN_THUMBR", Key::BTN_THUMBR),
];

pub fn str_to_axis(code: &str) -> Option<Abs> {
    AXES.iter().find(|(name, _)| *name == code).map(|(_, a)| *a)
}

pub fn axis_to_str(axis: Abs) -> Option<&'static str> {
    AXES.iter().find(|(_, a)| *a == axis).map(|(name, _)| *name)
}

pub fn str_to_key(code: &str) -> Option<Key> {
    BUTTONS
        .iter()
        .find(|(name, _)| *name == code)
        .map(|(_, k)| *k)
}

pub fn key_to_str(key: Key) -> Option<&'static str> {
    BUTTONS
        .iter()
        .find(|(_, k)| *k == key)
        .map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_round_trips() {
        for (name, axis) in AXES {
            assert_eq!(str_to_axis(name), Some(*axis));
            assert_eq!(axis_to_str(*axis), Some(*name));
        }
    }

    #[test]
    fn key_round_trips() {
        for (name, key) in BUTTONS {
            assert_eq!(str_to_key(name), Some(*key));
            assert_eq!(key_to_str(*key), Some(*name));
        }
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(str_to_axis("ABS_NOT_REAL"), None);
        assert_eq!(str_to_key("BTN_NOT_REAL"), None);
    }
}
