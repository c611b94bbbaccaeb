//! Error taxonomy for the core (see spec §7).
//!
//! Every fallible core operation returns [`Error`], which is matched on by
//! the Session Engine to decide how to transition (Draining vs. immediate
//! Closed) and by the daemon entry point to decide an OS exit code.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// One of the six kinds from spec §7. The kind never changes once an
/// [`Error`] is constructed — it's fixed at the call site that first
/// observed the failure, not recomputed downstream.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport hiccup or short timeout. Session enters Draining(Error).
    #[error("transient error{}: {reason}", context_suffix(peer.as_deref()))]
    Transient {
        peer: Option<String>,
        reason: String,
    },

    /// Peer policy declined the session.
    #[error("refused by {peer}: {reason}")]
    Refused { peer: String, reason: String },

    /// Malformed or unknown-type message. The peer is not trusted further
    /// this process run.
    #[error("protocol violation from {peer}: {reason}")]
    Protocol { peer: String, reason: String },

    /// Grab failed, uinput unavailable, or the listen port is busy. Never
    /// retried silently.
    #[error("resource unavailable: {reason}")]
    Resource { reason: String },

    /// OS denied access to an input node or the uinput control node.
    #[error("permission denied: {reason} (hint: {hint})")]
    Permission { reason: String, hint: String },

    /// Config file unreadable or malformed. Defaults are applied in memory;
    /// this variant exists to carry the warning, not to abort startup.
    #[error("config error at {path}: {reason}")]
    Config { path: PathBuf, reason: String },
}

fn context_suffix(peer: Option<&str>) -> String {
    match peer {
        Some(p) => format!(" (peer {p})"),
        None => String::new(),
    }
}

impl Error {
    pub fn transient(peer: impl Into<Option<String>>, reason: impl Into<String>) -> Self {
        Error::Transient {
            peer: peer.into(),
            reason: reason.into(),
        }
    }

    pub fn refused(peer: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Refused {
            peer: peer.into(),
            reason: reason.into(),
        }
    }

    pub fn protocol(peer: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Protocol {
            peer: peer.into(),
            reason: reason.into(),
        }
    }

    pub fn resource(reason: impl Into<String>) -> Self {
        Error::Resource {
            reason: reason.into(),
        }
    }

    pub fn permission(reason: impl Into<String>, hint: impl Into<String>) -> Self {
        Error::Permission {
            reason: reason.into(),
            hint: hint.into(),
        }
    }

    pub fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Config {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Kind label, used for log lines and for matching without exposing the
    /// full enum shape to callers that only care which bucket this fell in.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Transient { .. } => "transient",
            Error::Refused { .. } => "refused",
            Error::Protocol { .. } => "protocol",
            Error::Resource { .. } => "resource",
            Error::Permission { .. } => "permission",
            Error::Config { .. } => "config",
        }
    }

    /// Process exit code per spec §6, for the daemon's top-level handler.
    /// Only `Permission` and startup-time `Config`/`Resource` failures map
    /// to a non-zero code; mid-session errors never reach this path (they
    /// are handled by the Session Engine instead).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config { .. } => 1,
            Error::Permission { .. } => 2,
            Error::Resource { reason } if reason.contains("in use") => 3,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            PermissionDenied => Error::permission(
                err.to_string(),
                "check group membership for input/uinput device nodes",
            ),
            AddrInUse => Error::resource(format!("address in use: {err}")),
            NotFound => Error::resource(format!("not found: {err}")),
            _ => Error::transient(None, err.to_string()),
        }
    }
}
