// Session
// Wires a page, its action processor and the connection together, and runs
// the event loop until a fatal fault ends it. Everything lives on one thread;
// callers must run inside a `tokio::task::LocalSet`.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, info, trace};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::class::ClassTable;
use crate::config::{ClientEnvironment, RuntimeConfig};
use crate::connection::ConnectionManager;
use crate::error::Fault;
use crate::ipc::{Channel, Outbound};
use crate::page::Page;
use crate::processor::{ActionProcessor, ModuleResolver, ProcessorHandle};

pub struct Session {
    page: Rc<RefCell<Page>>,
    connection: ConnectionManager,
    processor: ProcessorHandle,
    processor_task: JoinHandle<Result<(), Fault>>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbox: mpsc::UnboundedReceiver<Outbound>,
    fatal_rx: mpsc::UnboundedReceiver<Fault>,
    keepalive: Duration,
    poll: Duration,
}

enum Wake {
    Frame(Option<Vec<u8>>),
    Outbound(Outbound),
    Fatal(Fault),
    ProcessorDone(Result<(), Fault>),
    Keepalive,
    Poll,
}

impl Session {
    /// Build the page, spawn the processor and send `init`. A closed
    /// channel does not fail here; the fault surfaces from `run`.
    pub fn start(
        config: RuntimeConfig,
        classes: ClassTable,
        resolver: Rc<dyn ModuleResolver>,
        channel: Box<dyn Channel>,
        inbound: mpsc::UnboundedReceiver<Vec<u8>>,
        env: &ClientEnvironment,
    ) -> Self {
        let (page, outbox) = Page::new(&config, classes);
        let page = Rc::new(RefCell::new(page));
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let mut connection = ConnectionManager::new(channel, Rc::clone(&page), &config, fatal_tx);
        let (processor, handle) = ActionProcessor::new(Rc::clone(&page), resolver);
        let processor_task = tokio::task::spawn_local(processor.run());

        connection.open(env);
        info!("[Session] started page '{}'", config.page_id);
        Self {
            page,
            keepalive: connection.keepalive_interval(),
            connection,
            processor: handle,
            processor_task,
            inbound,
            outbox,
            fatal_rx,
            poll: config.visibility_poll,
        }
    }

    pub fn page(&self) -> Rc<RefCell<Page>> {
        Rc::clone(&self.page)
    }

    /// Run until a fatal fault. There is no clean end: losing the server is
    /// itself a transport fault.
    pub async fn run(mut self) -> Result<(), Fault> {
        let mut keepalive = tokio::time::interval(self.keepalive);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll = tokio::time::interval(self.poll);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = tokio::select! {
                frame = self.inbound.recv() => Wake::Frame(frame),
                Some(message) = self.outbox.recv() => Wake::Outbound(message),
                Some(fault) = self.fatal_rx.recv() => Wake::Fatal(fault),
                joined = &mut self.processor_task => Wake::ProcessorDone(
                    joined.unwrap_or_else(|e| Err(Fault::Transport(format!("action processor died: {e}"))))
                ),
                _ = keepalive.tick() => Wake::Keepalive,
                _ = poll.tick() => Wake::Poll,
            };

            match wake {
                Wake::Frame(Some(frame)) => {
                    trace!("[Session] inbound frame of {} bytes", frame.len());
                    let actions = match self.connection.decode(&frame) {
                        Ok(actions) => actions,
                        Err(fault) => return self.halt(fault),
                    };
                    if !self.processor.enqueue(actions) {
                        debug!("[Session] processor stopped, dropping batch");
                    }
                }
                Wake::Frame(None) => {
                    return self.halt(Fault::Transport("server closed the connection".to_string()));
                }
                Wake::Outbound(message) => {
                    self.connection.send_outbound(message);
                }
                Wake::Fatal(fault) => return self.halt(fault),
                Wake::ProcessorDone(Err(fault)) => return self.halt(fault),
                Wake::ProcessorDone(Ok(())) => {
                    return self.halt(Fault::Transport("action processor stopped".to_string()));
                }
                Wake::Keepalive => {
                    self.connection.tick(Instant::now());
                }
                Wake::Poll => {
                    let mut page = self.page.borrow_mut();
                    if let Err(fault) = page.poll_visibility() {
                        drop(page);
                        return self.halt(fault);
                    }
                    page.flush_throttled(Instant::now());
                }
            }
        }
    }

    fn halt(&mut self, fault: Fault) -> Result<(), Fault> {
        self.processor_task.abort();
        self.page.borrow_mut().report_fatal(&fault);
        while let Ok(message) = self.outbox.try_recv() {
            self.connection.send_outbound(message);
        }
        Err(fault)
    }
}
