// Document model
// An arena-backed mirror of the browser document. Widgets describe their
// representation as a `VNode` tree; `Document::build` commits it into detached
// nodes that the rendering pipeline then splices into place.

pub mod events;

use std::collections::{BTreeMap, HashMap};

use log::trace;

pub use events::{DomEvent, Listener};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Root,
    Element(Element),
    Text(String),
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
    listeners: Vec<Listener>,
}

/// Arena slot. The generation is bumped on every removal so stale ids stop
/// resolving once the slot is reused.
#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            data,
            listeners: Vec::new(),
        }
    }
}

/// Result of committing a `VNode` tree.
#[derive(Debug, Clone)]
pub struct Built {
    pub root: NodeId,
    /// Element flagged with `VElement::anchor`, if any.
    pub anchor: Option<NodeId>,
    /// Elements flagged with `VElement::part`, by name.
    pub parts: HashMap<String, NodeId>,
}

pub struct Document {
    slots: Vec<Slot>,
    free: Vec<usize>,
    root: NodeId,
    focused: Option<NodeId>,
    title: String,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(Node::new(NodeData::Root)),
            }],
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            focused: None,
            title: String::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(Node::new(data));
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            node: Some(Node::new(data)),
        });
        NodeId {
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    /// Vacate a slot, returning its node.
    fn release(&mut self, id: NodeId) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element(Element {
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
            classes: Vec::new(),
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    pub fn exists(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Number of live nodes, the root included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Allocated arena slots, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.node(id).map(|n| &n.data)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.data(id) {
            Some(NodeData::Element(el)) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match self.node_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Unlink a node from its parent; the subtree stays alive.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != id);
        }
        if let Some(n) = self.node_mut(id) {
            n.parent = None;
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` under `parent` before `before`, or at the end when
    /// `before` is `None` or not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        if !self.exists(parent) || !self.exists(child) {
            return;
        }
        self.detach(child);
        if let Some(p) = self.node_mut(parent) {
            let pos = before
                .and_then(|b| p.children.iter().position(|c| *c == b))
                .unwrap_or(p.children.len());
            p.children.insert(pos, child);
        }
        if let Some(n) = self.node_mut(child) {
            n.parent = Some(parent);
        }
    }

    /// Put `new` where `old` is and unlink `old`.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        let Some(parent) = self.parent(old) else {
            return;
        };
        self.insert_before(parent, new, Some(old));
        self.detach(old);
    }

    /// Drop a node and its whole subtree, listeners included.
    pub fn remove(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        self.detach(id);
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.release(current) {
                stack.extend(node.children);
            }
            if self.focused == Some(current) {
                self.focused = None;
            }
        }
        trace!("[Dom] removed subtree at {:?}", id);
    }

    /// Remove everything below the root.
    pub fn clear(&mut self) {
        let children = self.children(self.root).to_vec();
        for child in children {
            self.remove(child);
        }
    }

    /// Nodes from `id` up to and including the root (or the top of a detached tree).
    pub fn path(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut cursor = Some(id).filter(|n| self.exists(*n));
        while let Some(current) = cursor {
            path.push(current);
            cursor = self.parent(current);
        }
        path
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        self.path(id).last() == Some(&self.root)
    }

    /// Connected and not hidden by itself or an ancestor.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let path = self.path(id);
        path.last() == Some(&self.root)
            && path
                .iter()
                .all(|n| self.element(*n).is_none_or(|el| !el.attrs.contains_key("hidden")))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)
            .and_then(|el| el.attrs.get(name))
            .map(String::as_str)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(el) = self.element_mut(id) {
            el.attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(el) = self.element_mut(id) {
            el.attrs.remove(name);
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id)
            .is_some_and(|el| el.classes.iter().any(|c| c == class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if let Some(el) = self.element_mut(id) {
            if !el.classes.iter().any(|c| c == class) {
                el.classes.push(class.to_string());
            }
        }
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        if let Some(el) = self.element_mut(id) {
            el.classes.retain(|c| c != class);
        }
    }

    /// Replace the element's children with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(NodeData::Text(existing)) = self.node_mut(id).map(|n| &mut n.data) {
            *existing = text.to_string();
            return;
        }
        let children = self.children(id).to_vec();
        for child in children {
            self.remove(child);
        }
        if !text.is_empty() {
            let node = self.create_text(text);
            self.append_child(id, node);
        }
    }

    pub fn text_content(&self, id: NodeId) -> String {
        match self.data(id) {
            Some(NodeData::Text(text)) => text.clone(),
            Some(_) => self
                .children(id)
                .iter()
                .map(|c| self.text_content(*c))
                .collect(),
            None => String::new(),
        }
    }

    pub fn focus(&mut self, id: NodeId) {
        if self.element(id).is_some() {
            self.focused = Some(id);
        }
    }

    pub fn blur(&mut self, id: NodeId) {
        if self.focused == Some(id) {
            self.focused = None;
        }
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub fn add_listener(&mut self, id: NodeId, listener: Listener) {
        if let Some(node) = self.node_mut(id) {
            if !node.listeners.contains(&listener) {
                node.listeners.push(listener);
            }
        }
    }

    pub fn remove_listeners(&mut self, id: NodeId, pred: impl Fn(&Listener) -> bool) {
        if let Some(node) = self.node_mut(id) {
            node.listeners.retain(|l| !pred(l));
        }
    }

    pub fn listeners(&self, id: NodeId, kind: &str) -> Vec<Listener> {
        self.node(id)
            .map(|n| {
                n.listeners
                    .iter()
                    .filter(|l| l.kind() == kind)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Commit a virtual tree into detached nodes.
    pub fn build(&mut self, vnode: &VNode) -> Built {
        let mut anchor = None;
        let mut parts = HashMap::new();
        let root = self.build_node(vnode, &mut anchor, &mut parts);
        Built {
            root,
            anchor,
            parts,
        }
    }

    fn build_node(
        &mut self,
        vnode: &VNode,
        anchor: &mut Option<NodeId>,
        parts: &mut HashMap<String, NodeId>,
    ) -> NodeId {
        match vnode {
            VNode::Text(text) => self.create_text(text),
            VNode::Element(velement) => {
                let id = self.create_element(&velement.tag);
                if let Some(el) = self.element_mut(id) {
                    el.attrs.extend(velement.attrs.iter().cloned());
                    el.classes.extend(velement.classes.iter().cloned());
                }
                if velement.anchor && anchor.is_none() {
                    *anchor = Some(id);
                }
                if let Some(part) = &velement.part {
                    parts.insert(part.clone(), id);
                }
                for child in &velement.children {
                    let child_id = self.build_node(child, anchor, parts);
                    self.append_child(id, child_id);
                }
                id
            }
        }
    }

    /// Serialize a subtree, mostly for logs and tests.
    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match self.data(id) {
            Some(NodeData::Text(text)) => out.push_str(text),
            Some(NodeData::Root) => {
                for child in self.children(id) {
                    self.write_html(*child, out);
                }
            }
            Some(NodeData::Element(el)) => {
                out.push('<');
                out.push_str(&el.tag);
                for (name, value) in &el.attrs {
                    out.push_str(&format!(" {name}=\"{value}\""));
                }
                if !el.classes.is_empty() {
                    out.push_str(&format!(" class=\"{}\"", el.classes.join(" ")));
                }
                out.push('>');
                for child in self.children(id) {
                    self.write_html(*child, out);
                }
                out.push_str(&format!("</{}>", el.tag));
            }
            None => {}
        }
    }
}

/// Virtual render tree produced by a widget's `render` hook.
#[derive(Debug, Clone, PartialEq)]
pub enum VNode {
    Element(VElement),
    Text(String),
}

impl VNode {
    pub fn text(text: impl Into<String>) -> Self {
        VNode::Text(text.into())
    }

    pub fn as_element_mut(&mut self) -> Option<&mut VElement> {
        match self {
            VNode::Element(el) => Some(el),
            VNode::Text(_) => None,
        }
    }
}

impl From<VElement> for VNode {
    fn from(el: VElement) -> Self {
        VNode::Element(el)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VElement {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub classes: Vec<String>,
    pub children: Vec<VNode>,
    pub part: Option<String>,
    pub anchor: bool,
}

impl VElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn child(mut self, child: impl Into<VNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.children.push(VNode::text(text));
        self
    }

    /// Name this element so it can be addressed as `<widget id>.<name>`.
    pub fn part(mut self, name: &str) -> Self {
        self.part = Some(name.to_string());
        self
    }

    /// Children of a container widget are inserted under this element.
    pub fn anchor(mut self) -> Self {
        self.anchor = true;
        self
    }
}
