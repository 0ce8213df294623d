// Containment Tree
// Parent/child links live on the widgets themselves; every mutation updates
// both sides so `parent.children` contains a widget exactly when its
// `parent` points back.

use log::{debug, trace};
use serde_json::Value;

use super::{Page, Phase, WidgetId};
use crate::error::Fault;

impl Page {
    /// Move `child` under `parent` at `index` (default: last). A child
    /// already placed elsewhere is unlinked first.
    pub fn add_child(&mut self, parent: &str, child: &str, index: Option<usize>) -> Result<(), Fault> {
        if !self.widget(parent)?.is_container() {
            return Err(Fault::NotContainer(parent.to_string()));
        }
        self.widget(child)?;
        if parent == child || self.is_ancestor(child, parent) {
            return Err(Fault::bad_argument("add", format!("'{child}' cannot contain '{parent}'")));
        }

        let old_parent = self.widget(child)?.parent.clone();
        if let Some(old) = old_parent {
            self.unlink(&old, child);
        }
        if let Some(children) = self.widget_mut(parent)?.children.as_mut() {
            let at = index.map_or(children.len(), |i| i.min(children.len()));
            children.insert(at, child.to_string());
        }
        {
            let widget = self.widget_mut(child)?;
            widget.parent = Some(parent.to_string());
            if widget.phase == Phase::Detached {
                widget.phase = Phase::Unattached;
            }
        }
        trace!("[Tree] {child} -> {parent} @ {index:?}");

        if self.widget(parent)?.anchor.is_some() {
            self.attach(child)?;
        }
        Ok(())
    }

    /// Take `child` out of `parent`. With `destroy` the child is destroyed;
    /// otherwise its nodes are kept, detached, for a later `add_child`.
    pub fn remove_child(&mut self, parent: &str, child: &str, destroy: bool) -> Result<(), Fault> {
        if self.widget(child)?.parent.as_deref() != Some(parent) {
            return Err(Fault::bad_argument(
                "remove",
                format!("'{child}' is not a child of '{parent}'"),
            ));
        }
        if destroy {
            return self.destroy(child);
        }
        self.unlink(parent, child);
        let widget = self.widget_mut(child)?;
        widget.phase = Phase::Detached;
        if let Some(node) = widget.node {
            self.document.detach(node);
        }
        trace!("[Tree] {child} detached from {parent}");
        Ok(())
    }

    fn unlink(&mut self, parent: &str, child: &str) {
        if let Some(children) = self.widgets.get_mut(parent).and_then(|w| w.children.as_mut()) {
            children.retain(|c| c != child);
        }
        if let Some(widget) = self.widgets.get_mut(child) {
            widget.parent = None;
        }
    }

    fn is_ancestor(&self, ancestor: &str, id: &str) -> bool {
        let mut cursor = self.widgets.get(id).and_then(|w| w.parent.as_deref());
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.widgets.get(current).and_then(|w| w.parent.as_deref());
        }
        false
    }

    /// Destroy a widget and its whole subtree: hooks, overlays, ancillary
    /// nodes, primary node, registry entry.
    pub fn destroy(&mut self, id: &str) -> Result<(), Fault> {
        let children = self.widget(id)?.children.clone().unwrap_or_default();
        for child in children {
            self.destroy(&child)?;
        }

        self.call_hook(id, "on_destroy")?;
        self.release(id);
        debug!("[Tree] destroyed {id}");
        Ok(())
    }

    /// Drop a widget and its subtree without running hooks. Rolls back a
    /// construction that failed part way.
    pub(super) fn discard(&mut self, id: &str) {
        let children = self
            .widgets
            .get(id)
            .and_then(|w| w.children.clone())
            .unwrap_or_default();
        for child in children {
            self.discard(&child);
        }
        self.release(id);
        debug!("[Tree] discarded {id}");
    }

    fn release(&mut self, id: &str) {
        self.close_popup(id);
        let Some(widget) = self.widgets.remove(id) else {
            return;
        };
        for node in &widget.ancillary {
            self.document.remove(*node);
        }
        if let Some(node) = widget.node {
            self.document.remove(node);
        }
        if let Some(parent) = &widget.parent {
            self.unlink(parent, id);
        }
        self.visibility.remove(id);
        self.throttled.retain(|(w, _, _), _| w != id);
        self.last_sent.retain(|(w, _, _), _| w != id);
    }

    pub fn children(&self, id: &str) -> Result<Vec<WidgetId>, Fault> {
        Ok(self.widget(id)?.children.clone().unwrap_or_default())
    }

    pub fn parent_of(&self, id: &str) -> Result<Option<WidgetId>, Fault> {
        Ok(self.widget(id)?.parent.clone())
    }

    /// Depth-first search below `scope` for a widget whose `name` prop
    /// matches. Widgets with `namespace: true` are matched but not entered.
    pub fn find_by_name(&self, scope: &str, name: &str) -> Option<WidgetId> {
        let mut stack: Vec<&str> = self
            .widgets
            .get(scope)?
            .children
            .iter()
            .flatten()
            .rev()
            .map(String::as_str)
            .collect();
        while let Some(current) = stack.pop() {
            let Some(widget) = self.widgets.get(current) else {
                continue;
            };
            if widget.props.get("name").and_then(Value::as_str) == Some(name) {
                return Some(widget.id.clone());
            }
            if widget.props.get("namespace") == Some(&Value::Bool(true)) {
                continue;
            }
            if let Some(children) = &widget.children {
                stack.extend(children.iter().rev().map(String::as_str));
            }
        }
        None
    }
}
