//! Consumer Emulation (C6, spec §4.6): virtual-device lifecycle.

pub mod emulation;

pub use emulation::{create, kind_enabled, VirtualDevice};
