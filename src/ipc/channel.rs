use std::cell::Cell;
use std::rc::Rc;

use tokio::sync::mpsc;

use crate::error::Fault;

/// Outbound half of the duplex link to the server.
pub trait Channel {
    fn is_open(&self) -> bool;

    /// Transmit one encoded frame. Fails when the channel is not open.
    fn send(&self, frame: Vec<u8>) -> Result<(), Fault>;
}

/// Channel backed by a tokio mpsc queue. Clones share the open flag, so a
/// transport task holding one clone can report the link closed.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    open: Rc<Cell<bool>>,
}

impl MemoryChannel {
    /// Create a channel and the receiver the frames it sends arrive on.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                open: Rc::new(Cell::new(true)),
            },
            rx,
        )
    }

    pub fn close(&self) {
        self.open.set(false);
    }
}

impl Channel for MemoryChannel {
    fn is_open(&self) -> bool {
        self.open.get() && !self.tx.is_closed()
    }

    fn send(&self, frame: Vec<u8>) -> Result<(), Fault> {
        if !self.is_open() {
            return Err(Fault::Transport("channel is not open".to_string()));
        }
        self.tx
            .send(frame)
            .map_err(|_| Fault::Transport("channel receiver dropped".to_string()))
    }
}
