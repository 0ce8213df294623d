// Event Forwarding
// Native events bubble from their target up the document and are turned
// into widget events by `Raise` listeners. Widget events run the class's
// `on_<kind>` handler and, when the type is forwarded, go to the server
// through a single send handler.

use std::time::Instant;

use log::{debug, trace};
use serde_json::{Map, Value};

use super::{Page, Throttled};
use crate::dom::{Document, DomEvent, Listener, NodeId};
use crate::error::Fault;
use crate::ipc::Outbound;

/// Adjusts an outgoing event payload. Receives the originating node, if any.
pub type PostProcessor = fn(&Document, Option<NodeId>, &mut Map<String, Value>);

/// Copy the originating element's `value` attribute into the payload.
fn copy_value(document: &Document, origin: Option<NodeId>, payload: &mut Map<String, Value>) {
    if let Some(value) = origin.and_then(|n| document.attr(n, "value")) {
        payload.insert("value".to_string(), Value::String(value.to_string()));
    }
}

impl Page {
    pub(super) fn register_default_post_processors(&mut self) {
        self.register_post_processor("input", copy_value);
        self.register_post_processor("change", copy_value);
    }

    pub fn register_post_processor(&mut self, kind: &str, processor: PostProcessor) {
        self.post_processors.insert(kind.to_string(), processor);
    }

    /// Re-dispatch `kind` events reaching `source` as `as_kind` on `target`.
    pub fn forward_dom_event(&mut self, source: NodeId, kind: &str, target: NodeId, as_kind: &str) {
        self.document.add_listener(
            source,
            Listener::Forward {
                kind: kind.to_string(),
                to: target,
                as_kind: as_kind.to_string(),
            },
        );
    }

    /// Start or stop sending a widget event type to the server.
    pub fn forward_to_server(&mut self, id: &str, kind: &str, enabled: bool) -> Result<(), Fault> {
        let widget = self.widget_mut(id)?;
        if enabled {
            widget.forwarded.insert(kind.to_string());
        } else {
            widget.forwarded.remove(kind);
        }
        let node = widget.node;
        if enabled {
            self.listen(id, kind)?;
        } else if let Some(node) = node {
            let has_handler = self.has_operation(id, &format!("on_{kind}"));
            if !has_handler {
                self.document.remove_listeners(node, |l| {
                    matches!(l, Listener::Raise { kind: k, widget } if k == kind && widget == id)
                });
            }
        }
        debug!("[Event] {id}: forward '{kind}' = {enabled}");
        Ok(())
    }

    /// Observe `kind` events on a widget's primary node so its local handler
    /// (and server forwarding) sees them.
    pub fn listen(&mut self, id: &str, kind: &str) -> Result<(), Fault> {
        let node = self.widget(id)?.node;
        if let Some(node) = node {
            self.document.add_listener(
                node,
                Listener::Raise {
                    kind: kind.to_string(),
                    widget: id.to_string(),
                },
            );
        }
        Ok(())
    }

    /// Deliver a native event at `target` and let it bubble to the root.
    pub fn dispatch_dom_event(&mut self, target: NodeId, kind: &str, fields: Map<String, Value>) -> Result<(), Fault> {
        let mut event = DomEvent::new(kind, target, fields);
        self.bubble(&mut event)
    }

    fn bubble(&mut self, event: &mut DomEvent) -> Result<(), Fault> {
        trace!("[Event] dispatch '{}' at {:?}", event.kind, event.target);
        for node in self.document.path(event.target) {
            for listener in self.document.listeners(node, &event.kind) {
                match listener {
                    Listener::Forward { to, as_kind, .. } => {
                        let mut forwarded = DomEvent::new(&as_kind, to, event.fields.clone());
                        self.bubble(&mut forwarded)?;
                    }
                    Listener::Raise { widget, .. } => self.deliver(&widget, event)?,
                }
            }
        }
        Ok(())
    }

    fn deliver(&mut self, id: &str, event: &mut DomEvent) -> Result<(), Fault> {
        let Some(widget) = self.widgets.get(id) else {
            return Ok(());
        };
        // Read before the handler runs: it may destroy the widget.
        let forwards = widget.forwards(&event.kind);
        self.run_local_handler(id, &event.kind, &event.fields)?;
        if forwards && event.claim_send() {
            self.send_event(id, &event.kind, event.fields.clone(), Some(event.target));
        }
        Ok(())
    }

    /// Raise a widget-level event that has no native origin.
    pub fn raise_event(&mut self, id: &str, kind: &str, fields: Map<String, Value>) -> Result<(), Fault> {
        let forwards = self.widget(id)?.forwards(kind);
        self.run_local_handler(id, kind, &fields)?;
        if forwards {
            self.send_event(id, kind, fields, None);
        }
        Ok(())
    }

    fn run_local_handler(&mut self, id: &str, kind: &str, fields: &Map<String, Value>) -> Result<(), Fault> {
        let handler = format!("on_{kind}");
        if self.has_operation(id, &handler) {
            self.invoke(id, &handler, &[Value::Object(fields.clone())])?;
        }
        Ok(())
    }

    /// The send handler: post-process, then emit or throttle. `seq` is
    /// stamped on emission so the wire order matches the numbering.
    fn send_event(&mut self, id: &str, kind: &str, fields: Map<String, Value>, origin: Option<NodeId>) {
        let mut payload = Map::new();
        payload.insert("id".to_string(), Value::String(id.to_string()));
        payload.insert("type".to_string(), Value::String(kind.to_string()));
        for (key, value) in fields {
            if !matches!(key.as_str(), "seq" | "id" | "type") {
                payload.insert(key, value);
            }
        }
        if let Some(processor) = self.post_processors.get(kind) {
            processor(&self.document, origin, &mut payload);
        }
        self.queue_event(id, kind, payload);
    }

    fn queue_event(&mut self, id: &str, kind: &str, payload: Map<String, Value>) {
        let Some(window) = self.throttle.get(kind).copied() else {
            self.emit_event(payload);
            return;
        };
        let sub = payload
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let slot = (id.to_string(), kind.to_string(), sub);
        let now = Instant::now();
        let recent = self
            .last_sent
            .get(&slot)
            .copied()
            .filter(|last| now.duration_since(*last) < window);
        match recent {
            Some(last) => {
                trace!("[Event] throttled {id}/{kind}");
                let due = last + window;
                self.throttled.insert(slot, Throttled { due, payload });
            }
            None => {
                self.last_sent.insert(slot, now);
                self.emit_event(payload);
            }
        }
    }

    /// Send throttled payloads whose window has elapsed. Returns how many went out.
    pub fn flush_throttled(&mut self, now: Instant) -> usize {
        let due: Vec<_> = self
            .throttled
            .iter()
            .filter(|(_, t)| t.due <= now)
            .map(|(slot, _)| slot.clone())
            .collect();
        for slot in &due {
            if let Some(entry) = self.throttled.remove(slot) {
                self.last_sent.insert(slot.clone(), now);
                self.emit_event(entry.payload);
            }
        }
        due.len()
    }

    fn emit_event(&mut self, mut payload: Map<String, Value>) {
        payload.insert("seq".to_string(), Value::from(self.next_seq()));
        self.emit(Outbound::Event(payload));
    }

    pub fn has_throttled(&self) -> bool {
        !self.throttled.is_empty()
    }
}
