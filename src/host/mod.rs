//! Host Capture (C5, spec §4.5): exclusive device grab, mode-control
//! mutation, and the restoration guard.

pub mod capture;
pub mod modecontrol;

pub use capture::{EventBatch, HostCapture, HostCaptureOptions};
