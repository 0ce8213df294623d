use serde_json::{Map, Value};

use super::NodeId;

/// Listeners are plain data so dispatch never needs to borrow closures out of
/// the document while the page is being mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum Listener {
    /// Re-dispatch the event as `as_kind` on another element.
    Forward {
        kind: String,
        to: NodeId,
        as_kind: String,
    },
    /// Raise the event on a widget (local handler, then server forwarding).
    Raise { kind: String, widget: String },
}

impl Listener {
    pub fn kind(&self) -> &str {
        match self {
            Listener::Forward { kind, .. } | Listener::Raise { kind, .. } => kind,
        }
    }
}

/// One native event travelling up the document.
#[derive(Debug, Clone)]
pub struct DomEvent {
    pub kind: String,
    pub target: NodeId,
    pub fields: Map<String, Value>,
    sent: bool,
}

impl DomEvent {
    pub fn new(kind: &str, target: NodeId, fields: Map<String, Value>) -> Self {
        Self {
            kind: kind.to_string(),
            target,
            fields,
            sent: false,
        }
    }

    /// Claim the right to send this event to the server. Only the first
    /// caller gets `true`.
    pub fn claim_send(&mut self) -> bool {
        !std::mem::replace(&mut self.sent, true)
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }
}
