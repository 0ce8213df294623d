// Shared test fixtures

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value, json};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::class::{ClassTable, Extend, Output};
use crate::config::RuntimeConfig;
use crate::dom::VElement;
use crate::ipc::Outbound;
use crate::page::{Page, WidgetId, reflect_attr};
use crate::widgets;

pub type ProbeLog = Rc<RefCell<Vec<String>>>;

thread_local! {
    static PROBE_LOG: ProbeLog = Rc::new(RefCell::new(Vec::new()));
}

pub fn probe_log() -> ProbeLog {
    PROBE_LOG.with(Rc::clone)
}

fn record(entry: String) {
    PROBE_LOG.with(|log| log.borrow_mut().push(entry));
}

pub fn props(class: &str) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("className".to_string(), Value::String(class.to_string()));
    props
}

/// A page with the built-in classes plus whatever `extra` registers.
pub fn page_with<F>(extra: F) -> (Page, UnboundedReceiver<Outbound>)
where
    F: FnOnce(&mut ClassTable),
{
    let mut table = ClassTable::new();
    widgets::register_builtins(&mut table).unwrap();
    extra(&mut table);
    Page::new(&RuntimeConfig::default(), table)
}

/// Register `test.Probe`, an element that records its hooks and setters.
/// Resets the per-thread log.
pub fn probe_class(table: &mut ClassTable) -> ProbeLog {
    let log = probe_log();
    log.borrow_mut().clear();

    let element = table.get("core", "Element").unwrap();
    let mut builder = element
        .extend("Probe")
        .state("a", json!(1))
        .state("b", json!("x"))
        .state("layout", json!("row"))
        .structural("layout")
        .method("render", |_, _, _| {
            record("render".to_string());
            Ok(Output::Node(
                VElement::new("div")
                    .class("probe")
                    .child(VElement::new("span").part("label"))
                    .into(),
            ))
        });
    for hook in ["before_attach", "after_attach", "on_focus"] {
        builder = builder.method(hook, move |_, _, _| {
            record(hook.to_string());
            Ok(Output::none())
        });
    }
    for key in ["a", "b", "layout"] {
        builder = builder.method(&format!("s_{key}"), move |page, id, args| {
            let new = args.first().cloned().unwrap_or(Value::Null);
            let old = args.get(1).cloned().unwrap_or(Value::Null);
            record(format!("s_{key} {new} <- {old}"));
            if key == "layout" {
                reflect_attr(page, id, "data-layout", &new)?;
            }
            Ok(Output::none())
        });
    }
    table.register("test", builder.build().unwrap());
    log
}

/// Create a probe with a fixed id, optionally under `parent`.
pub fn probe(page: &mut Page, parent: Option<&str>, id: &str) -> WidgetId {
    let mut props = props("Probe");
    props.insert("moduleName".to_string(), json!("test"));
    props.insert("id".to_string(), json!(id));
    page.create(parent, props, Map::new()).unwrap()
}
