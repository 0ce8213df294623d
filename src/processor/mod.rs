// Action Processor
// Single consumer of server actions. Actions run strictly in arrival order; an
// asynchronous result suspends the whole queue until it settles.

pub mod args;
pub mod modules;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use log::{debug, error, trace};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::class::Output;
use crate::error::Fault;
use crate::ipc::Action;
use crate::page::{Page, Target};

pub use args::ArgTransforms;
pub use modules::{Module, ModuleCache, ModuleResolver, StaticModules};

/// Mailbox side of the processor, held by the session.
#[derive(Debug, Clone)]
pub struct ProcessorHandle {
    tx: mpsc::UnboundedSender<Vec<Action>>,
}

impl ProcessorHandle {
    /// Queue a batch. Returns false once the processor has stopped.
    pub fn enqueue(&self, actions: Vec<Action>) -> bool {
        if actions.is_empty() {
            return true;
        }
        self.tx.send(actions).is_ok()
    }
}

pub struct ActionProcessor {
    page: Rc<RefCell<Page>>,
    modules: ModuleCache,
    transforms: ArgTransforms,
    queue: VecDeque<Action>,
    mailbox: mpsc::UnboundedReceiver<Vec<Action>>,
}

impl ActionProcessor {
    pub fn new(page: Rc<RefCell<Page>>, resolver: Rc<dyn ModuleResolver>) -> (Self, ProcessorHandle) {
        let (tx, mailbox) = mpsc::unbounded_channel();
        let processor = Self {
            page,
            modules: ModuleCache::new(resolver),
            transforms: ArgTransforms::new(),
            queue: VecDeque::new(),
            mailbox,
        };
        (processor, ProcessorHandle { tx })
    }

    pub fn transforms_mut(&mut self) -> &mut ArgTransforms {
        &mut self.transforms
    }

    /// Process batches until every handle is dropped, or until an action
    /// fails. The failing fault is returned; later actions never run.
    pub async fn run(mut self) -> Result<(), Fault> {
        while let Some(batch) = self.mailbox.recv().await {
            trace!("[Proc] batch of {} action(s)", batch.len());
            self.queue.extend(batch);
            self.drain().await?;
            self.page.borrow_mut().poll_visibility()?;
        }
        debug!("[Proc] mailbox closed");
        Ok(())
    }

    async fn drain(&mut self) -> Result<(), Fault> {
        while let Some(action) = self.queue.pop_front() {
            if let Err(fault) = self.execute(&action).await {
                error!(
                    "[Proc] {}.{} failed, abandoning {} queued action(s): {fault}",
                    action.tgt.as_deref().unwrap_or("<page>"),
                    action.fcn,
                    self.queue.len()
                );
                self.queue.clear();
                return Err(fault);
            }
        }
        Ok(())
    }

    /// Run one action to completion, including any asynchronous result.
    pub async fn execute(&mut self, action: &Action) -> Result<(), Fault> {
        debug!(
            "[Proc] {}.{} {:?}",
            action.tgt.as_deref().unwrap_or("<page>"),
            action.fcn,
            action.arg
        );
        let target = self.page.borrow().resolve_target(action.tgt.as_deref())?;
        let output = match target {
            Target::Module(name) => {
                let module = self.modules.get_or_load(&name).await?;
                let mut page = self.page.borrow_mut();
                let args = self.transforms.resolve_all(&page, &action.arg)?;
                module.invoke(&mut page, &action.fcn, &args)?
            }
            target => {
                let mut page = self.page.borrow_mut();
                let args = self.transforms.resolve_all(&page, &action.arg)?;
                page.execute(&target, &action.fcn, &args)?
            }
        };

        let value = match output {
            Output::Value(value) => value,
            Output::Node(_) => Value::Null,
            Output::Pending(pending) => {
                trace!("[Proc] waiting on {}", action.fcn);
                pending.await?
            }
        };
        if let Some(cbk) = &action.cbk {
            self.page.borrow_mut().emit_callback(cbk.clone(), value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::{Map, json};
    use tokio::sync::oneshot;
    use tokio::task::LocalSet;

    use super::*;
    use crate::class::{Extend, LocalFuture};
    use crate::ipc::Outbound;
    use crate::testing::{page_with, props};

    type Gate = Rc<RefCell<Option<oneshot::Receiver<Value>>>>;

    fn shared_page(gate: &Gate) -> (Rc<RefCell<Page>>, mpsc::UnboundedReceiver<Outbound>) {
        let gate = Rc::clone(gate);
        let (mut page, rx) = page_with(move |table| {
            let element = table.get("core", "Element").unwrap();
            let waiter = element
                .extend("Waiter")
                .method("render", |_, _, _| {
                    Ok(Output::Node(crate::dom::VElement::new("div").into()))
                })
                .method("wait", move |_, _, _| {
                    let rx = gate.borrow_mut().take();
                    Ok(Output::pending(async move {
                        match rx {
                            Some(rx) => rx.await.map_err(|_| Fault::Rejected("gate dropped".into())),
                            None => Ok(Value::Null),
                        }
                    }))
                })
                .build()
                .unwrap();
            table.register("test", waiter);
        });
        for (id, class) in [("W1", "Input"), ("W2", "Text")] {
            let mut p = props(class);
            p.insert("id".into(), json!(id));
            page.create(None, p, Map::new()).unwrap();
        }
        let mut p = props("Waiter");
        p.insert("id".into(), json!("WA"));
        p.insert("moduleName".into(), json!("test"));
        page.create(None, p, Map::new()).unwrap();
        (Rc::new(RefCell::new(page)), rx)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_actions_run_in_order() {
        let gate: Gate = Rc::new(RefCell::new(None));
        let (page, _rx) = shared_page(&gate);
        let (processor, handle) = ActionProcessor::new(Rc::clone(&page), Rc::new(StaticModules::new()));

        LocalSet::new()
            .run_until(async move {
                let task = tokio::task::spawn_local(processor.run());
                assert!(handle.enqueue(vec![
                    Action::new(Some("W1"), "focus", vec![]),
                    Action::new(Some("W1"), "s_value", vec![json!("abc")]),
                ]));
                settle().await;
                assert_eq!(page.borrow().get_state("W1", "value").unwrap(), json!("abc"));

                drop(handle);
                assert!(task.await.unwrap().is_ok());
            })
            .await;
    }

    #[tokio::test]
    async fn test_async_result_blocks_later_actions() {
        let gate: Gate = Rc::new(RefCell::new(None));
        let (release, rx) = oneshot::channel();
        *gate.borrow_mut() = Some(rx);
        let (page, mut outbox) = shared_page(&gate);
        let (processor, handle) = ActionProcessor::new(Rc::clone(&page), Rc::new(StaticModules::new()));

        LocalSet::new()
            .run_until(async move {
                tokio::task::spawn_local(processor.run());
                handle.enqueue(vec![
                    Action::new(Some("WA"), "wait", vec![]).with_callback(json!(1)),
                    Action::new(Some("W2"), "s_text", vec![json!("after")]),
                ]);
                settle().await;
                assert_eq!(page.borrow().get_state("W2", "text").unwrap(), json!(""));
                assert!(outbox.try_recv().is_err());

                release.send(json!("done")).unwrap();
                settle().await;
                assert_eq!(page.borrow().get_state("W2", "text").unwrap(), json!("after"));
                match outbox.try_recv().unwrap() {
                    Outbound::Event(data) => {
                        assert_eq!(data["type"], json!("callback"));
                        assert_eq!(data["cbk"], json!(1));
                        assert_eq!(data["value"], json!("done"));
                    }
                    other => panic!("unexpected {other:?}"),
                }
            })
            .await;
    }

    #[tokio::test]
    async fn test_failure_abandons_the_queue() {
        let gate: Gate = Rc::new(RefCell::new(None));
        let (page, _rx) = shared_page(&gate);
        let (processor, handle) = ActionProcessor::new(Rc::clone(&page), Rc::new(StaticModules::new()));

        let result = LocalSet::new()
            .run_until(async move {
                let task = tokio::task::spawn_local(processor.run());
                handle.enqueue(vec![
                    Action::new(Some("W9"), "focus", vec![]),
                    Action::new(Some("W2"), "s_text", vec![json!("never")]),
                ]);
                task.await.unwrap()
            })
            .await;

        assert!(matches!(result, Err(Fault::NoTarget(t)) if t == "W9"));
        assert_eq!(page.borrow().get_state("W2", "text").unwrap(), json!(""));
    }

    #[tokio::test]
    async fn test_rejected_async_result_is_fatal() {
        let gate: Gate = Rc::new(RefCell::new(None));
        let (release, rx) = oneshot::channel::<Value>();
        *gate.borrow_mut() = Some(rx);
        let (page, _outbox) = shared_page(&gate);
        let (processor, handle) = ActionProcessor::new(page, Rc::new(StaticModules::new()));

        let result = LocalSet::new()
            .run_until(async move {
                let task = tokio::task::spawn_local(processor.run());
                handle.enqueue(vec![Action::new(Some("WA"), "wait", vec![])]);
                drop(release);
                task.await.unwrap()
            })
            .await;
        assert!(matches!(result, Err(Fault::Rejected(_))));
    }

    struct Title;

    impl Module for Title {
        fn invoke(&self, page: &mut Page, fcn: &str, args: &[Value]) -> Result<Output, Fault> {
            page.execute(&Target::Page, "setTitle", args)?;
            Ok(Output::Value(json!(fcn)))
        }
    }

    #[tokio::test]
    async fn test_module_targets_and_references() {
        let gate: Gate = Rc::new(RefCell::new(None));
        let (page, mut outbox) = shared_page(&gate);
        let mut resolver = StaticModules::new();
        resolver.register("title", Rc::new(Title));
        let (mut processor, _handle) = ActionProcessor::new(Rc::clone(&page), Rc::new(resolver));

        page.borrow_mut()
            .execute(&Target::Widget("W1".into()), "s_value", &[json!("Orders")])
            .unwrap();
        let action = Action::new(
            Some("@title"),
            "apply",
            vec![json!({"$t": "state", "v": ["W1", "value"]})],
        )
        .with_callback(json!("c1"));
        processor.execute(&action).await.unwrap();

        assert_eq!(page.borrow().document().title(), "Orders");
        match outbox.try_recv().unwrap() {
            Outbound::Event(data) => assert_eq!(data["value"], json!("apply")),
            other => panic!("unexpected {other:?}"),
        }

        let missing = Action::new(Some("@charts"), "draw", vec![]);
        assert!(matches!(processor.execute(&missing).await, Err(Fault::Module { .. })));
    }

    /// Imports `Title` under any name once `gate` fires.
    struct SlowImport {
        gate: RefCell<Option<oneshot::Receiver<()>>>,
        imports: Cell<usize>,
    }

    impl ModuleResolver for SlowImport {
        fn resolve_and_import(&self, name: &str) -> LocalFuture<Result<Rc<dyn Module>, Fault>> {
            self.imports.set(self.imports.get() + 1);
            let gate = self.gate.borrow_mut().take();
            let name = name.to_string();
            Box::pin(async move {
                if let Some(gate) = gate {
                    gate.await.map_err(|_| Fault::Module {
                        name,
                        reason: "import aborted".to_string(),
                    })?;
                }
                Ok(Rc::new(Title) as Rc<dyn Module>)
            })
        }
    }

    #[tokio::test]
    async fn test_module_import_blocks_later_actions() {
        let gate: Gate = Rc::new(RefCell::new(None));
        let (page, _outbox) = shared_page(&gate);
        let (release, rx) = oneshot::channel();
        let resolver = Rc::new(SlowImport {
            gate: RefCell::new(Some(rx)),
            imports: Cell::new(0),
        });
        let (processor, handle) = ActionProcessor::new(Rc::clone(&page), resolver.clone());

        LocalSet::new()
            .run_until(async move {
                tokio::task::spawn_local(processor.run());
                handle.enqueue(vec![
                    Action::new(Some("@title"), "apply", vec![json!("Orders")]),
                    Action::new(Some("W2"), "s_text", vec![json!("after")]),
                    Action::new(Some("@title"), "apply", vec![json!("Invoices")]),
                ]);
                settle().await;
                assert_eq!(page.borrow().document().title(), "");
                assert_eq!(page.borrow().get_state("W2", "text").unwrap(), json!(""));

                release.send(()).unwrap();
                settle().await;
                assert_eq!(page.borrow().get_state("W2", "text").unwrap(), json!("after"));
                assert_eq!(page.borrow().document().title(), "Invoices");
                assert_eq!(resolver.imports.get(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn test_page_level_create() {
        let gate: Gate = Rc::new(RefCell::new(None));
        let (page, mut outbox) = shared_page(&gate);
        let (mut processor, _handle) = ActionProcessor::new(Rc::clone(&page), Rc::new(StaticModules::new()));

        let create = Action::new(None, "create", vec![Value::Null, json!({"id": "T9", "className": "Text"})])
            .with_callback(json!(5));
        processor.execute(&create).await.unwrap();
        assert!(page.borrow().contains("T9"));
        match outbox.try_recv().unwrap() {
            Outbound::Event(data) => assert_eq!(data["value"], json!("T9")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
