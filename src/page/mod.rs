// Page Context
// Owns everything that lives for one page session: the class table, the
// widget registry, the document mirror, the overlay stack and the outbox
// towards the connection. Nothing here is global; tests build a fresh Page.

pub mod forward;
pub mod overlay;
pub mod render;
pub mod state;
pub mod tree;

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, error};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::class::{ClassTable, MethodEntry, Output, WidgetClass};
use crate::config::RuntimeConfig;
use crate::dom::{Document, NodeId, VElement};
use crate::error::{Fault, FaultKind};
use crate::ipc::Outbound;

use self::forward::PostProcessor;
use self::overlay::OverlayStack;

pub use self::render::reflect_attr;

pub type WidgetId = String;

/// Module name used when a construction request names none.
pub const DEFAULT_MODULE: &str = "core";

/// Where an action is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// No `tgt`: a page-level operation.
    Page,
    Widget(WidgetId),
    /// A named sub-element of a widget.
    Part(WidgetId, String),
    /// `@name`: a module resolved through the module resolver.
    Module(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unattached,
    Attached,
    Detached,
}

/// One live widget instance. The registry owns the storage; the parent's
/// child list is what gives it its place in the tree.
#[derive(Debug)]
pub struct Widget {
    id: WidgetId,
    class: Rc<WidgetClass>,
    props: Map<String, Value>,
    state: Map<String, Value>,
    parent: Option<WidgetId>,
    children: Option<Vec<WidgetId>>,
    node: Option<NodeId>,
    anchor: Option<NodeId>,
    parts: HashMap<String, NodeId>,
    ancillary: Vec<NodeId>,
    phase: Phase,
    rendering: bool,
    first_render: bool,
    forwarded: BTreeSet<String>,
    track_visibility: bool,
}

impl Widget {
    fn new(id: WidgetId, class: Rc<WidgetClass>, props: Map<String, Value>) -> Self {
        let children = class.is_container().then(Vec::new);
        Self {
            id,
            class,
            props,
            state: Map::new(),
            parent: None,
            children,
            node: None,
            anchor: None,
            parts: HashMap::new(),
            ancillary: Vec::new(),
            phase: Phase::Unattached,
            rendering: false,
            first_render: false,
            forwarded: BTreeSet::new(),
            track_visibility: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn class(&self) -> &Rc<WidgetClass> {
        &self.class
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn children(&self) -> Option<&[WidgetId]> {
        self.children.as_deref()
    }

    pub fn is_container(&self) -> bool {
        self.children.is_some()
    }

    /// Primary node, once rendered.
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn anchor(&self) -> Option<NodeId> {
        self.anchor
    }

    pub fn part(&self, name: &str) -> Option<NodeId> {
        self.parts.get(name).copied()
    }

    pub fn ancillary(&self) -> &[NodeId] {
        &self.ancillary
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    pub fn in_first_render(&self) -> bool {
        self.first_render
    }

    pub fn forwards(&self, kind: &str) -> bool {
        self.forwarded.contains(kind)
    }
}

struct SuperFrame {
    op: String,
    parent: Option<Rc<MethodEntry>>,
    args: Vec<Value>,
}

struct Throttled {
    due: Instant,
    payload: Map<String, Value>,
}

pub struct Page {
    pid: String,
    production: bool,
    classes: ClassTable,
    widgets: HashMap<WidgetId, Widget>,
    document: Document,
    overlays: OverlayStack,
    super_frames: Vec<SuperFrame>,
    next_widget: u64,
    next_event: u64,
    visibility: BTreeSet<WidgetId>,
    post_processors: HashMap<String, PostProcessor>,
    throttle: HashMap<String, Duration>,
    throttled: HashMap<(WidgetId, String, String), Throttled>,
    last_sent: HashMap<(WidgetId, String, String), Instant>,
    outbox: mpsc::UnboundedSender<Outbound>,
    halted: bool,
}

impl Page {
    /// Build a page and the receiving end of its outbox.
    pub fn new(config: &RuntimeConfig, classes: ClassTable) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut page = Self {
            pid: config.page_id.clone(),
            production: config.production,
            classes,
            widgets: HashMap::new(),
            document: Document::new(),
            overlays: OverlayStack::new(config.overlay_base_z),
            super_frames: Vec::new(),
            next_widget: 0,
            next_event: 0,
            visibility: BTreeSet::new(),
            post_processors: HashMap::new(),
            throttle: config.throttle.clone(),
            throttled: HashMap::new(),
            last_sent: HashMap::new(),
            outbox: tx,
            halted: false,
        };
        page.register_default_post_processors();
        (page, rx)
    }

    pub fn pid(&self) -> &str {
        &self.pid
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn classes_mut(&mut self) -> &mut ClassTable {
        &mut self.classes
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn contains(&self, id: &str) -> bool {
        self.widgets.contains_key(id)
    }

    /// Number of registered widgets.
    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    pub fn widget(&self, id: &str) -> Result<&Widget, Fault> {
        self.widgets
            .get(id)
            .ok_or_else(|| Fault::UnknownWidget(id.to_string()))
    }

    fn widget_mut(&mut self, id: &str) -> Result<&mut Widget, Fault> {
        self.widgets
            .get_mut(id)
            .ok_or_else(|| Fault::UnknownWidget(id.to_string()))
    }

    /// Primary node of a rendered widget.
    pub fn node_of(&self, id: &str) -> Option<NodeId> {
        self.widgets.get(id).and_then(|w| w.node)
    }

    fn next_id(&mut self) -> WidgetId {
        loop {
            self.next_widget += 1;
            let id = format!("w{}", self.next_widget);
            if !self.widgets.contains_key(&id) {
                return id;
            }
        }
    }

    // ---- operation dispatch ----

    pub fn has_operation(&self, id: &str, op: &str) -> bool {
        self.widgets
            .get(id)
            .is_some_and(|w| w.class.has_method(op))
    }

    /// Call an operation through the instance's vtable.
    pub fn invoke(&mut self, id: &str, op: &str, args: &[Value]) -> Result<Output, Fault> {
        let class = Rc::clone(&self.widget(id)?.class);
        let entry = class.method(op).ok_or_else(|| Fault::NoOperation {
            target: id.to_string(),
            op: op.to_string(),
        })?;
        self.call_entry(entry, id, args)
    }

    fn call_entry(&mut self, entry: Rc<MethodEntry>, id: &str, args: &[Value]) -> Result<Output, Fault> {
        self.super_frames.push(SuperFrame {
            op: entry.name.clone(),
            parent: entry.parent.clone(),
            args: args.to_vec(),
        });
        let result = (entry.imp)(self, id, args);
        self.super_frames.pop();
        result
    }

    /// Invoke the implementation overridden by the currently running
    /// operation. `None` passes the current call's arguments along.
    pub fn call_super(&mut self, id: &str, args: Option<&[Value]>) -> Result<Output, Fault> {
        let frame = self
            .super_frames
            .last()
            .ok_or_else(|| Fault::NoSuperMethod("<none>".to_string()))?;
        let parent = frame
            .parent
            .clone()
            .ok_or_else(|| Fault::NoSuperMethod(frame.op.clone()))?;
        let args = args.map(<[Value]>::to_vec).unwrap_or_else(|| frame.args.clone());
        self.call_entry(parent, id, &args)
    }

    /// Parse an action target; `@`-prefixed names are left to the processor.
    pub fn resolve_target(&self, tgt: Option<&str>) -> Result<Target, Fault> {
        let Some(tgt) = tgt else {
            return Ok(Target::Page);
        };
        if let Some(module) = tgt.strip_prefix('@') {
            return Ok(Target::Module(module.to_string()));
        }
        if self.widgets.contains_key(tgt) {
            return Ok(Target::Widget(tgt.to_string()));
        }
        if let Some((id, part)) = tgt.rsplit_once('.') {
            if self.widgets.get(id).is_some_and(|w| w.parts.contains_key(part)) {
                return Ok(Target::Part(id.to_string(), part.to_string()));
            }
        }
        Err(Fault::NoTarget(tgt.to_string()))
    }

    /// Run one operation against a resolved page-side target.
    pub fn execute(&mut self, target: &Target, fcn: &str, args: &[Value]) -> Result<Output, Fault> {
        match target {
            Target::Page => self.page_operation(fcn, args),
            Target::Widget(id) => {
                if let Some(key) = fcn.strip_prefix(crate::class::SETTER_PREFIX) {
                    let value = args.first().cloned().unwrap_or(Value::Null);
                    let changed = self.update_state(id, key, value, true)?;
                    return Ok(Output::Value(Value::Bool(changed)));
                }
                self.invoke(id, fcn, args)
            }
            Target::Part(id, part) => {
                let node = self
                    .widget(id)?
                    .part(part)
                    .ok_or_else(|| Fault::NoTarget(format!("{id}.{part}")))?;
                self.element_operation(node, fcn, args)
            }
            Target::Module(name) => Err(Fault::NoTarget(format!("@{name}"))),
        }
    }

    fn page_operation(&mut self, fcn: &str, args: &[Value]) -> Result<Output, Fault> {
        match fcn {
            "create" => {
                let parent = args.first().and_then(Value::as_str).map(str::to_string);
                let props = object_arg(args, 1, fcn)?;
                let state = match args.get(2) {
                    Some(Value::Object(state)) => state.clone(),
                    _ => Map::new(),
                };
                let id = self.create(parent.as_deref(), props, state)?;
                Ok(Output::Value(Value::String(id)))
            }
            "destroy" => {
                let id = str_arg(args, 0, fcn)?.to_string();
                self.destroy(&id)?;
                Ok(Output::none())
            }
            "setTitle" => {
                let title = text_of(args.first().unwrap_or(&Value::Null));
                debug!("[Page] title: {title}");
                self.document.set_title(&title);
                Ok(Output::none())
            }
            _ => Err(Fault::NoOperation {
                target: "<page>".to_string(),
                op: fcn.to_string(),
            }),
        }
    }

    fn element_operation(&mut self, node: NodeId, fcn: &str, args: &[Value]) -> Result<Output, Fault> {
        match fcn {
            "focus" => self.document.focus(node),
            "blur" => self.document.blur(node),
            "click" => self.dispatch_dom_event(node, "click", Map::new())?,
            "setAttribute" => {
                let name = str_arg(args, 0, fcn)?.to_string();
                let value = text_of(args.get(1).unwrap_or(&Value::Null));
                self.document.set_attr(node, &name, &value);
            }
            "removeAttribute" => {
                let name = str_arg(args, 0, fcn)?.to_string();
                self.document.remove_attr(node, &name);
            }
            "addClass" => {
                let class = str_arg(args, 0, fcn)?.to_string();
                self.document.add_class(node, &class);
            }
            "removeClass" => {
                let class = str_arg(args, 0, fcn)?.to_string();
                self.document.remove_class(node, &class);
            }
            "setText" => {
                let text = text_of(args.first().unwrap_or(&Value::Null));
                self.document.set_text(node, &text);
            }
            _ => {
                return Err(Fault::NoOperation {
                    target: format!("{node:?}"),
                    op: fcn.to_string(),
                });
            }
        }
        Ok(Output::none())
    }

    /// Widget construction: resolve the class, assign the id, seed state,
    /// run `init`, then attach under `parent` (or the document root).
    pub fn create(
        &mut self,
        parent: Option<&str>,
        mut props: Map<String, Value>,
        state: Map<String, Value>,
    ) -> Result<WidgetId, Fault> {
        let module = props
            .get("moduleName")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MODULE)
            .to_string();
        let class_name = props
            .get("className")
            .and_then(Value::as_str)
            .ok_or_else(|| Fault::bad_argument("create", "missing className"))?
            .to_string();
        let class = self.classes.resolve(&module, &class_name)?;

        if let Some(parent) = parent {
            if !self.widget(parent)?.is_container() {
                return Err(Fault::NotContainer(parent.to_string()));
            }
        }

        let id = match props.get("id").and_then(Value::as_str) {
            Some(id) if self.widgets.contains_key(id) => {
                return Err(Fault::DuplicateId(id.to_string()));
            }
            Some(id) => id.to_string(),
            None => self.next_id(),
        };
        props.insert("id".to_string(), Value::String(id.clone()));

        debug!(
            "[Page] creating widget: id={}, class={}.{}, parent={:?}",
            id, module, class_name, parent
        );
        self.widgets
            .insert(id.clone(), Widget::new(id.clone(), Rc::clone(&class), props));

        if let Err(fault) = self.initialize(&id, &class, &state) {
            self.widgets.remove(&id);
            return Err(fault);
        }

        let attached = match parent {
            Some(parent) => self.add_child(parent, &id, None),
            None => self.rerender(&id),
        };
        if let Err(fault) = attached {
            self.discard(&id);
            return Err(fault);
        }
        Ok(id)
    }

    fn initialize(&mut self, id: &str, class: &WidgetClass, state: &Map<String, Value>) -> Result<(), Fault> {
        self.init_state(id, state, true)?;
        self.call_hook(id, "init")?;
        self.init_state(id, class.defaults(), false)
    }

    // ---- outbox ----

    pub(crate) fn emit(&self, message: Outbound) {
        if self.outbox.send(message).is_err() {
            debug!("[Page] outbox closed, dropping message");
        }
    }

    /// Report the result of an action that carried a callback handle.
    pub fn emit_callback(&mut self, cbk: Value, value: Value) {
        let mut payload = Map::new();
        payload.insert("seq".to_string(), Value::from(self.next_seq()));
        payload.insert("type".to_string(), Value::String("callback".to_string()));
        payload.insert("cbk".to_string(), cbk);
        payload.insert("value".to_string(), value);
        self.emit(Outbound::Event(payload));
    }

    fn next_seq(&mut self) -> u64 {
        self.next_event += 1;
        self.next_event
    }

    /// Global fatal handler: log, halt, and show the error in the document.
    pub fn report_fatal(&mut self, fault: &Fault) {
        error!("[Fatal] {fault}");
        self.halted = true;

        let transport = fault.kind() == FaultKind::Transport;
        if !(transport && self.production) {
            let panel = VElement::new("div")
                .class("fatal-error")
                .attr("role", "alert")
                .text(&fault.to_string());
            let built = self.document.build(&panel.into());
            let root = self.document.root();
            self.document.append_child(root, built.root);
        }
        if !transport {
            self.emit(Outbound::Log {
                level: "error".to_string(),
                message: fault.to_string(),
            });
        }
    }
}

/// Text form of an argument: strings verbatim, null empty, anything else as JSON.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn str_arg<'a>(args: &'a [Value], index: usize, op: &str) -> Result<&'a str, Fault> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| Fault::bad_argument(op, format!("argument {index} must be a string")))
}

pub fn bool_arg(args: &[Value], index: usize, op: &str) -> Result<bool, Fault> {
    args.get(index)
        .and_then(Value::as_bool)
        .ok_or_else(|| Fault::bad_argument(op, format!("argument {index} must be a boolean")))
}

fn object_arg(args: &[Value], index: usize, op: &str) -> Result<Map<String, Value>, Fault> {
    match args.get(index) {
        Some(Value::Object(map)) => Ok(map.clone()),
        _ => Err(Fault::bad_argument(op, format!("argument {index} must be an object"))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::class::Extend;
    use crate::dom::VNode;
    use crate::testing::{page_with, props};

    #[test]
    fn test_create_assigns_unique_ids() {
        let (mut page, _rx) = page_with(|_| {});
        let a = page.create(None, props("Text"), Map::new()).unwrap();
        let b = page.create(None, props("Text"), Map::new()).unwrap();
        assert_ne!(a, b);

        let mut named = props("Text");
        named.insert("id".into(), json!("W1"));
        page.create(None, named.clone(), Map::new()).unwrap();
        assert!(matches!(
            page.create(None, named, Map::new()),
            Err(Fault::DuplicateId(id)) if id == "W1"
        ));
        assert_eq!(page.len(), 3);
    }

    #[test]
    fn test_generated_ids_skip_taken_ones() {
        let (mut page, _rx) = page_with(|_| {});
        let mut named = props("Text");
        named.insert("id".into(), json!("w1"));
        page.create(None, named, Map::new()).unwrap();
        let generated = page.create(None, props("Text"), Map::new()).unwrap();
        assert_eq!(generated, "w2");
    }

    #[test]
    fn test_unknown_class_is_fatal() {
        let (mut page, _rx) = page_with(|_| {});
        let mut p = props("Nope");
        p.insert("moduleName".into(), json!("charts"));
        assert!(matches!(
            page.create(None, p, Map::new()),
            Err(Fault::UnknownClass { .. })
        ));
        assert!(page.is_empty());
    }

    #[test]
    fn test_super_call_chains_across_levels() {
        let (mut page, _rx) = page_with(|table| {
            let base = table.get("core", "Element").unwrap();
            let a = base
                .extend("A")
                .method("render", |_, _, _| {
                    Ok(Output::Node(VElement::new("div").class("a").into()))
                })
                .build()
                .unwrap();
            let b = a
                .extend("B")
                .method_with_super("render", |page, id, _args| {
                    let mut node = page.call_super(id, None)?.into_node().unwrap_or_else(|| VNode::text(""));
                    if let Some(el) = node.as_element_mut() {
                        el.children.push(VElement::new("span").class("b").into());
                    }
                    Ok(Output::Node(node))
                })
                .build()
                .unwrap();
            let c = b
                .extend("C")
                .method_with_super("render", |page, id, _| {
                    let mut node = page.call_super(id, Some(&[json!("own")]))?.into_node().unwrap_or_else(|| VNode::text(""));
                    if let Some(el) = node.as_element_mut() {
                        el.children.push(VElement::new("em").class("c").into());
                    }
                    Ok(Output::Node(node))
                })
                .build()
                .unwrap();
            table.register("test", c);
        });

        let mut p = props("C");
        p.insert("moduleName".into(), json!("test"));
        let id = page.create(None, p, Map::new()).unwrap();
        let node = page.node_of(&id).unwrap();
        let html = page.document().to_html(node);
        assert!(html.contains("class=\"a\""));
        assert!(html.contains("<span class=\"b\"></span><em class=\"c\"></em>"));
        assert!(page.super_frames.is_empty());
    }

    #[test]
    fn test_call_super_without_parent_is_fatal() {
        let (mut page, _rx) = page_with(|table| {
            let base = table.get("core", "Text").unwrap();
            let broken = base
                .extend("Broken")
                .method_with_super("poke", |page, id, _| page.call_super(id, None))
                .build()
                .unwrap();
            table.register("test", broken);
        });
        let mut p = props("Broken");
        p.insert("moduleName".into(), json!("test"));
        let id = page.create(None, p, Map::new()).unwrap();
        assert!(matches!(
            page.invoke(&id, "poke", &[]),
            Err(Fault::NoSuperMethod(op)) if op == "poke"
        ));
        assert!(page.super_frames.is_empty());
    }

    #[test]
    fn test_resolve_target_forms() {
        let (mut page, _rx) = page_with(|_| {});
        let mut p = props("Input");
        p.insert("id".into(), json!("W1"));
        page.create(None, p, Map::new()).unwrap();

        assert_eq!(page.resolve_target(None).unwrap(), Target::Page);
        assert_eq!(
            page.resolve_target(Some("W1")).unwrap(),
            Target::Widget("W1".into())
        );
        assert_eq!(
            page.resolve_target(Some("W1.input")).unwrap(),
            Target::Part("W1".into(), "input".into())
        );
        assert_eq!(
            page.resolve_target(Some("@charts")).unwrap(),
            Target::Module("charts".into())
        );
        assert!(matches!(
            page.resolve_target(Some("W2")),
            Err(Fault::NoTarget(t)) if t == "W2"
        ));
        assert!(matches!(
            page.resolve_target(Some("W1.nothing")),
            Err(Fault::NoTarget(_))
        ));
    }

    #[test]
    fn test_part_operations() {
        let (mut page, _rx) = page_with(|_| {});
        let mut p = props("Input");
        p.insert("id".into(), json!("W1"));
        page.create(None, p, Map::new()).unwrap();
        let target = page.resolve_target(Some("W1.input")).unwrap();
        let input = page.widget("W1").unwrap().part("input").unwrap();

        page.execute(&target, "focus", &[]).unwrap();
        assert_eq!(page.document().focused(), Some(input));

        page.execute(&target, "setAttribute", &[json!("placeholder"), json!("Name")])
            .unwrap();
        assert_eq!(page.document().attr(input, "placeholder"), Some("Name"));

        assert!(matches!(
            page.execute(&target, "explode", &[]),
            Err(Fault::NoOperation { .. })
        ));
    }

    #[test]
    fn test_page_operations() {
        let (mut page, _rx) = page_with(|_| {});
        let out = page
            .execute(&Target::Page, "create", &[Value::Null, json!({"className": "Panel", "id": "P"})])
            .unwrap();
        assert!(matches!(out, Output::Value(Value::String(ref id)) if id == "P"));

        page.execute(&Target::Page, "setTitle", &[json!("Orders")]).unwrap();
        assert_eq!(page.document().title(), "Orders");

        page.execute(&Target::Page, "destroy", &[json!("P")]).unwrap();
        assert!(!page.contains("P"));

        assert!(matches!(
            page.execute(&Target::Page, "reboot", &[]),
            Err(Fault::NoOperation { .. })
        ));
    }

    #[test]
    fn test_report_fatal_shows_panel_and_logs() {
        let (mut page, mut rx) = page_with(|_| {});
        page.report_fatal(&Fault::NoTarget("W9".into()));
        assert!(page.is_halted());

        let root = page.document().root();
        let html = page.document().to_html(root);
        assert!(html.contains("fatal-error"));
        assert!(html.contains("no target matching 'W9'"));

        match rx.try_recv().unwrap() {
            Outbound::Log { level, message } => {
                assert_eq!(level, "error");
                assert!(message.contains("W9"));
            }
            other => panic!("unexpected outbound {other:?}"),
        }
    }
}
