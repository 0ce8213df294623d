// IPC (Inter-Process Communication) Module
// Protocol types exchanged with the server: inbound actions, outbound
// envelopes, plus the codec and the channel abstraction they travel over.

pub mod channel;
pub mod codec;
#[cfg(unix)]
pub mod socket;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use channel::{Channel, MemoryChannel};
pub use codec::WireFormat;

/// One remote operation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tgt: Option<String>,
    pub fcn: String,
    #[serde(default)]
    pub arg: Vec<Value>,
    /// Correlation handle echoed back with the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cbk: Option<Value>,
}

impl Action {
    pub fn new(tgt: Option<&str>, fcn: &str, arg: Vec<Value>) -> Self {
        Self {
            tgt: tgt.map(str::to_string),
            fcn: fcn.to_string(),
            arg,
            cbk: None,
        }
    }

    pub fn with_callback(mut self, cbk: Value) -> Self {
        self.cbk = Some(cbk);
        self
    }
}

/// An inbound frame carries one action or an array of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionBatch {
    Many(Vec<Action>),
    One(Action),
}

impl ActionBatch {
    pub fn into_vec(self) -> Vec<Action> {
        match self {
            ActionBatch::Many(actions) => actions,
            ActionBatch::One(action) => vec![action],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Event,
    Init,
    Log,
    Ping,
}

/// Everything the client sends is wrapped in an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub pid: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: EnvelopeKind, pid: &str, data: Value) -> Self {
        Self {
            kind,
            pid: pid.to_string(),
            data,
        }
    }
}

/// Messages the page queues for the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A forwarded widget event or a callback result.
    Event(Map<String, Value>),
    Log { level: String, message: String },
}

impl Outbound {
    pub fn into_envelope(self, pid: &str) -> Envelope {
        match self {
            Outbound::Event(data) => Envelope::new(EnvelopeKind::Event, pid, Value::Object(data)),
            Outbound::Log { level, message } => {
                let mut data = Map::new();
                data.insert("level".to_string(), Value::String(level));
                data.insert("message".to_string(), Value::String(message));
                Envelope::new(EnvelopeKind::Log, pid, Value::Object(data))
            }
        }
    }
}
