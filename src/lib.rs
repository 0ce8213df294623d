// uimirror - client runtime for a server-driven UI
//
// The server owns application logic and drives a mirrored widget tree here
// through a stream of actions:
// - Classes (`class`): widget vtables built by extension, with super calls
// - Page (`page`): widget registry, state, containment, rendering, events
// - Processor (`processor`): ordered, suspendable execution of actions
// - Connection (`connection`, `ipc`): envelopes, keepalive, transport faults
//
// Everything runs on one thread; `session` ties the pieces together inside a
// tokio `LocalSet`.

pub mod class;
pub mod config;
pub mod connection;
pub mod dom;
pub mod error;
pub mod ipc;
pub mod page;
pub mod processor;
pub mod session;
pub mod widgets;

#[cfg(test)]
mod testing;

pub use error::{Fault, FaultKind};
