// Overlays
// Popups and ancillary nodes live outside a widget's primary node, directly
// under the document root, and are owned by the widget that opened them.

use log::debug;

use super::{Page, WidgetId};
use crate::dom::{NodeId, VNode};
use crate::error::Fault;

#[derive(Debug, Clone)]
struct OverlayEntry {
    owner: WidgetId,
    popup: NodeId,
    mask: Option<NodeId>,
    z: i64,
}

/// Z-order stack for popups. Every popup takes two levels: one for its
/// (optional) modal mask and one for itself.
#[derive(Debug)]
pub struct OverlayStack {
    base_z: i64,
    entries: Vec<OverlayEntry>,
}

impl OverlayStack {
    pub fn new(base_z: i64) -> Self {
        Self {
            base_z,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Owner of the topmost popup.
    pub fn top(&self) -> Option<&str> {
        self.entries.last().map(|e| e.owner.as_str())
    }

    /// Whether any open popup is modal.
    pub fn is_modal(&self) -> bool {
        self.entries.iter().any(|e| e.mask.is_some())
    }

    fn next_z(&self) -> i64 {
        self.entries.last().map_or(self.base_z, |e| e.z + 2)
    }

    fn take(&mut self, owner: &str) -> Vec<OverlayEntry> {
        let (taken, kept): (Vec<_>, Vec<_>) = self.entries.drain(..).partition(|e| e.owner == owner);
        self.entries = kept;
        taken
    }
}

impl Page {
    pub fn overlays(&self) -> &OverlayStack {
        &self.overlays
    }

    /// Show `vnode` as a popup owned by `owner`, above every open popup.
    /// Modal popups get a mask node one level below.
    pub fn open_popup(&mut self, owner: &str, vnode: &VNode, modal: bool) -> Result<NodeId, Fault> {
        self.widget(owner)?;
        let z = self.overlays.next_z();
        let root = self.document.root();

        let mask = if modal {
            let mask = self.document.create_element("div");
            self.document.add_class(mask, "mask");
            self.document.set_attr(mask, "style", &format!("z-index: {z}"));
            self.document.append_child(root, mask);
            Some(mask)
        } else {
            None
        };

        let built = self.document.build(vnode);
        self.document.add_class(built.root, "popup");
        self.document
            .set_attr(built.root, "style", &format!("z-index: {}", z + 1));
        self.document.append_child(root, built.root);

        self.overlays.entries.push(OverlayEntry {
            owner: owner.to_string(),
            popup: built.root,
            mask,
            z,
        });
        debug!("[Overlay] popup for {owner} at z={} (modal={modal})", z + 1);
        Ok(built.root)
    }

    /// Close every popup owned by `owner`. Returns how many were open.
    pub fn close_popup(&mut self, owner: &str) -> usize {
        let taken = self.overlays.take(owner);
        for entry in &taken {
            self.document.remove(entry.popup);
            if let Some(mask) = entry.mask {
                self.document.remove(mask);
            }
        }
        taken.len()
    }

    /// Commit `vnode` as an ancillary node of `owner` under the document root.
    pub fn add_ancillary(&mut self, owner: &str, vnode: &VNode) -> Result<NodeId, Fault> {
        self.widget(owner)?;
        let built = self.document.build(vnode);
        let root = self.document.root();
        self.document.append_child(root, built.root);
        self.widget_mut(owner)?.ancillary.push(built.root);
        Ok(built.root)
    }

    pub fn remove_ancillary(&mut self, owner: &str, node: NodeId) -> Result<(), Fault> {
        self.widget_mut(owner)?.ancillary.retain(|n| *n != node);
        self.document.remove(node);
        Ok(())
    }
}
