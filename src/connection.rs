// Connection Manager
// Owns the outbound channel: envelope encoding, keepalive pings, and the
// send-while-closed failure path.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, error, info, trace};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::{ClientEnvironment, RuntimeConfig};
use crate::error::Fault;
use crate::ipc::{Action, ActionBatch, Channel, Envelope, EnvelopeKind, Outbound, WireFormat};
use crate::page::Page;

pub struct ConnectionManager {
    channel: Box<dyn Channel>,
    page: Rc<RefCell<Page>>,
    pid: String,
    format: WireFormat,
    keepalive: Duration,
    production: bool,
    last_send: Instant,
    disabled: bool,
    fatal_tx: mpsc::UnboundedSender<Fault>,
}

impl ConnectionManager {
    pub fn new(
        channel: Box<dyn Channel>,
        page: Rc<RefCell<Page>>,
        config: &RuntimeConfig,
        fatal_tx: mpsc::UnboundedSender<Fault>,
    ) -> Self {
        Self {
            channel,
            page,
            pid: config.page_id.clone(),
            format: config.format,
            keepalive: config.keepalive,
            production: config.production,
            last_send: Instant::now(),
            disabled: false,
            fatal_tx,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Period of the keepalive timer.
    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive / 2
    }

    /// Announce the client to the server.
    pub fn open(&mut self, env: &ClientEnvironment) -> bool {
        info!("[Conn] opening page '{}'", self.pid);
        let data = match serde_json::to_value(env) {
            Ok(data) => data,
            Err(e) => {
                self.fail(Fault::Codec(e.to_string()));
                return false;
            }
        };
        self.send(&Envelope::new(EnvelopeKind::Init, &self.pid, data))
    }

    pub fn send_outbound(&mut self, message: Outbound) -> bool {
        let envelope = message.into_envelope(&self.pid);
        self.send(&envelope)
    }

    /// Encode and transmit one envelope. A closed channel disables the
    /// manager and posts a transport fault; nothing is transmitted.
    pub fn send(&mut self, envelope: &Envelope) -> bool {
        if self.disabled {
            trace!("[Conn] disabled, dropping {:?}", envelope.kind);
            return false;
        }
        if !self.channel.is_open() {
            self.fail(Fault::Transport(format!(
                "cannot send {:?} envelope: channel is closed",
                envelope.kind
            )));
            return false;
        }
        let frame = match self.format.encode(envelope) {
            Ok(frame) => frame,
            Err(fault) => {
                self.fail(fault);
                return false;
            }
        };
        match self.channel.send(frame) {
            Ok(()) => {
                self.last_send = Instant::now();
                true
            }
            Err(fault) => {
                self.fail(fault);
                false
            }
        }
    }

    /// Decode one inbound frame into its actions.
    pub fn decode(&self, frame: &[u8]) -> Result<Vec<Action>, Fault> {
        let batch: ActionBatch = self.format.decode(frame)?;
        Ok(batch.into_vec())
    }

    pub fn keepalive_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_send) >= self.keepalive_interval()
    }

    /// Keepalive tick: ping only when nothing else was sent recently.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.disabled || !self.keepalive_due(now) {
            return false;
        }
        debug!("[Conn] ping");
        let ping = Envelope::new(EnvelopeKind::Ping, &self.pid, Value::Object(Default::default()));
        self.send(&ping)
    }

    fn fail(&mut self, fault: Fault) {
        error!("[Conn] {fault}");
        self.disabled = true;
        if self.production {
            self.page.borrow_mut().document_mut().clear();
        }
        if self.fatal_tx.send(fault).is_err() {
            debug!("[Conn] fatal channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::ipc::MemoryChannel;
    use crate::testing::{page_with, props};

    fn manager(
        config: &RuntimeConfig,
    ) -> (
        ConnectionManager,
        MemoryChannel,
        mpsc::UnboundedReceiver<Vec<u8>>,
        mpsc::UnboundedReceiver<Fault>,
        Rc<RefCell<Page>>,
    ) {
        let (mut page, _outbox) = page_with(|_| {});
        page.create(None, props("Text"), Default::default()).unwrap();
        let page = Rc::new(RefCell::new(page));
        let (channel, frames) = MemoryChannel::pair();
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(Box::new(channel.clone()), Rc::clone(&page), config, fatal_tx);
        (manager, channel, frames, fatal_rx, page)
    }

    #[test]
    fn test_open_sends_init() {
        let mut config = RuntimeConfig::default();
        config.page_id = "p1".into();
        let (mut conn, _chan, mut frames, _fatal, _page) = manager(&config);

        assert!(conn.open(&ClientEnvironment::from_vars(|_| None)));
        let envelope: Value = serde_json::from_slice(&frames.try_recv().unwrap()).unwrap();
        assert_eq!(envelope["type"], json!("init"));
        assert_eq!(envelope["pid"], json!("p1"));
        assert_eq!(envelope["data"]["language"], json!("en"));
        assert_eq!(envelope["data"]["viewport"]["width"], json!(1280));
    }

    #[test]
    fn test_send_while_closed_is_fatal() {
        let config = RuntimeConfig::default();
        let (mut conn, chan, mut frames, mut fatal, page) = manager(&config);
        chan.close();

        let event = Outbound::Event(json!({"seq": 1, "id": "w1", "type": "click"}).as_object().unwrap().clone());
        assert!(!conn.send_outbound(event));
        assert!(frames.try_recv().is_err());
        assert!(conn.is_disabled());
        assert!(matches!(fatal.try_recv(), Ok(Fault::Transport(_))));
        // Not production: the document is left alone.
        assert!(!page.borrow().document().children(page.borrow().document().root()).is_empty());

        // Disabled managers stay quiet.
        assert!(!conn.tick(Instant::now() + Duration::from_secs(3600)));
        assert!(fatal.try_recv().is_err());
    }

    #[test]
    fn test_production_clears_document_on_failure() {
        let mut config = RuntimeConfig::default();
        config.production = true;
        let (mut conn, chan, _frames, mut fatal, page) = manager(&config);
        chan.close();

        assert!(!conn.tick(Instant::now() + Duration::from_secs(3600)));
        assert!(fatal.try_recv().is_ok());
        let page = page.borrow();
        assert!(page.document().children(page.document().root()).is_empty());
    }

    #[test]
    fn test_ping_only_after_idle() {
        let mut config = RuntimeConfig::default();
        config.keepalive = Duration::from_secs(10);
        let (mut conn, _chan, mut frames, _fatal, _page) = manager(&config);
        let start = Instant::now();

        assert!(!conn.tick(start));
        assert!(frames.try_recv().is_err());

        assert!(conn.tick(start + Duration::from_secs(6)));
        let envelope: Value = serde_json::from_slice(&frames.try_recv().unwrap()).unwrap();
        assert_eq!(envelope["type"], json!("ping"));
        // The ping itself resets the idle clock.
        assert!(!conn.keepalive_due(Instant::now()));
    }

    #[test]
    fn test_decode_in_configured_format() {
        let mut config = RuntimeConfig::default();
        config.format = WireFormat::MsgPack;
        let (conn, ..) = manager(&config);
        let frame = WireFormat::MsgPack
            .encode(&json!({"tgt": "W1", "fcn": "focus"}))
            .unwrap();
        let actions = conn.decode(&frame).unwrap();
        assert_eq!(actions, vec![Action::new(Some("W1"), "focus", vec![])]);
        assert!(matches!(conn.decode(b"\xc1"), Err(Fault::Codec(_))));
    }
}
