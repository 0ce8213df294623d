// Rendering Pipeline
// render hook -> VNode -> Document::build -> before_attach -> sync_state ->
// splice -> children -> after_attach. A render already in progress for the
// same widget swallows nested requests.

use log::{debug, trace};
use serde_json::{Map, Value};

use super::{Page, Phase};
use crate::dom::Listener;
use crate::error::Fault;

impl Page {
    /// Build (or rebuild) a widget's nodes and splice them into the document.
    pub fn rerender(&mut self, id: &str) -> Result<(), Fault> {
        if self.widget(id)?.rendering {
            debug!("[Render] {id}: already rendering, request dropped");
            return Ok(());
        }
        self.widget_mut(id)?.rendering = true;
        let result = self.render_cycle(id);
        if let Ok(widget) = self.widget_mut(id) {
            widget.rendering = false;
            widget.first_render = false;
        }
        result
    }

    fn render_cycle(&mut self, id: &str) -> Result<(), Fault> {
        let (old, children, class) = {
            let widget = self.widget(id)?;
            (
                widget.node,
                widget.children.clone().unwrap_or_default(),
                widget.class.name().to_string(),
            )
        };

        for child in &children {
            if let Some(node) = self.node_of(child) {
                self.document.detach(node);
            }
        }

        if !self.has_operation(id, "render") {
            return Err(Fault::AbstractRender(class));
        }
        let vnode = self
            .invoke(id, "render", &[])?
            .into_node()
            .ok_or(Fault::AbstractRender(class))?;
        let built = self.document.build(&vnode);
        self.document.set_attr(built.root, "id", id);
        {
            let widget = self.widget_mut(id)?;
            widget.node = Some(built.root);
            widget.anchor = Some(built.anchor.unwrap_or(built.root));
            widget.parts = built.parts;
            widget.first_render = old.is_none();
        }
        trace!("[Render] {id}: built {:?} (first={})", built.root, old.is_none());

        self.call_hook(id, "before_attach")?;
        self.sync_state(id, None)?;
        match old {
            Some(old) => {
                self.document.replace(old, built.root);
                self.document.remove(old);
            }
            None => self.insert_into_parent(id)?,
        }
        if self.widget(id)?.phase != Phase::Detached {
            self.widget_mut(id)?.phase = Phase::Attached;
        }

        for child in &children {
            self.attach(child)?;
        }

        self.call_hook(id, "after_attach")?;
        self.install_raise_listeners(id)?;
        if self.widget(id)?.track_visibility {
            self.visibility.insert(id.to_string());
        }
        Ok(())
    }

    /// Invoke an optional lifecycle hook.
    pub(crate) fn call_hook(&mut self, id: &str, hook: &str) -> Result<(), Fault> {
        if self.has_operation(id, hook) {
            self.invoke(id, hook, &[])?;
        }
        Ok(())
    }

    fn install_raise_listeners(&mut self, id: &str) -> Result<(), Fault> {
        let widget = self.widget(id)?;
        let Some(node) = widget.node else {
            return Ok(());
        };
        let kinds: Vec<String> = widget.forwarded.iter().cloned().collect();
        for kind in kinds {
            self.document.add_listener(
                node,
                Listener::Raise {
                    kind,
                    widget: id.to_string(),
                },
            );
        }
        Ok(())
    }

    /// Put a rendered widget's node under its parent's anchor, before the
    /// node of the next attached sibling so document order follows tree order.
    pub(crate) fn insert_into_parent(&mut self, id: &str) -> Result<(), Fault> {
        let widget = self.widget(id)?;
        let Some(node) = widget.node else {
            return Ok(());
        };
        let Some(parent_id) = widget.parent.clone() else {
            if widget.phase != Phase::Detached {
                let root = self.document.root();
                self.document.append_child(root, node);
            }
            return Ok(());
        };

        let parent = self.widget(&parent_id)?;
        let Some(anchor) = parent.anchor else {
            return Ok(());
        };
        let siblings = parent.children.as_deref().unwrap_or(&[]);
        let before = siblings
            .iter()
            .position(|c| c == id)
            .and_then(|pos| {
                siblings[pos + 1..]
                    .iter()
                    .filter_map(|s| self.widgets.get(s).and_then(|w| w.node))
                    .find(|n| self.document.parent(*n) == Some(anchor))
            });
        self.document.insert_before(anchor, node, before);
        Ok(())
    }

    /// Attach a child whose parent is rendered: first render, or re-insert
    /// the existing nodes.
    pub(crate) fn attach(&mut self, id: &str) -> Result<(), Fault> {
        if self.widget(id)?.node.is_none() {
            return self.rerender(id);
        }
        self.insert_into_parent(id)?;
        self.widget_mut(id)?.phase = Phase::Attached;
        Ok(())
    }

    /// Arm a one-shot `render` event for when the widget first becomes visible.
    pub fn track_visibility(&mut self, id: &str) -> Result<(), Fault> {
        let widget = self.widget_mut(id)?;
        widget.track_visibility = true;
        if widget.node.is_some() {
            self.visibility.insert(id.to_string());
        }
        Ok(())
    }

    /// Fire `render` for armed widgets that are now visible. Returns how many fired.
    pub fn poll_visibility(&mut self) -> Result<usize, Fault> {
        let armed: Vec<String> = self.visibility.iter().cloned().collect();
        let mut fired = 0;
        for id in armed {
            let Some(node) = self.widgets.get(&id).map(|w| w.node) else {
                self.visibility.remove(&id);
                continue;
            };
            if !node.is_some_and(|n| self.document.is_visible(n)) {
                continue;
            }
            self.visibility.remove(&id);
            self.widget_mut(&id)?.track_visibility = false;
            debug!("[Render] {id}: became visible");
            self.raise_event(&id, "render", Map::new())?;
            fired += 1;
        }
        Ok(fired)
    }
}

/// Setter helper: copy a state value into an attribute of the primary node.
pub fn reflect_attr(page: &mut Page, id: &str, attr: &str, value: &Value) -> Result<(), Fault> {
    let Some(node) = page.node_of(id) else {
        return Ok(());
    };
    match value {
        Value::Null | Value::Bool(false) => page.document.remove_attr(node, attr),
        Value::Bool(true) => page.document.set_attr(node, attr, ""),
        other => page.document.set_attr(node, attr, &super::text_of(other)),
    }
    Ok(())
}
