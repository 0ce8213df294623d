// Fault taxonomy
// Every runtime fault is fatal to the current batch; there is no recoverable
// per-operation failure in the protocol.

use thiserror::Error;

/// Which part of the system a fault comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Unresolved target/operation/setter, abstract render, bad arguments.
    Programming,
    /// Send attempted while the channel is closed, or the channel went away.
    Transport,
    /// The peer (or an async operation it started) reported a failure.
    Peer,
}

#[derive(Debug, Error)]
pub enum Fault {
    #[error("no target matching '{0}'")]
    NoTarget(String),

    #[error("no operation '{op}' on target '{target}'")]
    NoOperation { target: String, op: String },

    #[error("class '{class}' has no setter for state '{key}'")]
    MissingSetter { class: String, key: String },

    #[error("render() is abstract on class '{0}'")]
    AbstractRender(String),

    #[error("operation '{0}' has no overridden implementation to call")]
    NoSuperMethod(String),

    #[error("widget id '{0}' is already registered")]
    DuplicateId(String),

    #[error("unknown widget '{0}'")]
    UnknownWidget(String),

    #[error("unknown class '{module}.{class}'")]
    UnknownClass { module: String, class: String },

    #[error("widget '{0}' is not a container")]
    NotContainer(String),

    #[error("bad argument for '{op}': {reason}")]
    BadArgument { op: String, reason: String },

    #[error("no argument transform registered for type '{0}'")]
    UnknownTransform(String),

    #[error("module '{name}' failed to load: {reason}")]
    Module { name: String, reason: String },

    #[error("async operation rejected: {0}")]
    Rejected(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("codec: {0}")]
    Codec(String),
}

impl Fault {
    pub fn kind(&self) -> FaultKind {
        match self {
            Fault::Transport(_) => FaultKind::Transport,
            Fault::Rejected(_) | Fault::Module { .. } => FaultKind::Peer,
            _ => FaultKind::Programming,
        }
    }

    pub fn bad_argument(op: &str, reason: impl Into<String>) -> Self {
        Fault::BadArgument {
            op: op.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Fault {
    fn from(err: serde_json::Error) -> Self {
        Fault::Codec(err.to_string())
    }
}

/// Raised while building a class, before any instance exists.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassError {
    #[error("class '{class}' declares state '{key}' without a setter 's_{key}'")]
    MissingSetter { class: String, key: String },
}
