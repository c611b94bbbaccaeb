//! TransWacom core: session protocol, Host capture pipeline, Consumer
//! virtual-device lifecycle, and the trust/authorization layer that binds
//! them together. See the module-level docs in each submodule for the
//! spec section it implements.

pub mod config;
pub mod consumer;
pub mod device;
pub mod discovery;
pub mod error;
pub mod host;
pub mod identity;
pub mod log;
pub mod protocol;
pub mod session;
pub mod supervisor;

pub use error::{Error, Result};
pub use identity::MachineIdentity;
pub use supervisor::{spawn_supervisor, SupervisorEvent, SupervisorHandle};
