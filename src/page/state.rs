// State Store
// Per-instance state maps with setter dispatch. Setters are the class
// operations `s_<key>`; they receive `[new, old]` and apply the value to the
// widget's nodes.

use log::trace;
use serde_json::{Map, Value};

use super::Page;
use crate::class::{WidgetClass, is_private, setter_name};
use crate::error::Fault;

fn require_setter(class: &WidgetClass, key: &str) -> Result<(), Fault> {
    if is_private(key) || class.has_setter(key) {
        return Ok(());
    }
    Err(Fault::MissingSetter {
        class: class.name().to_string(),
        key: key.to_string(),
    })
}

impl Page {
    /// Merge `values` into the state map. Without `overwrite` only missing
    /// keys are filled. Never dispatches setters.
    pub fn init_state(&mut self, id: &str, values: &Map<String, Value>, overwrite: bool) -> Result<(), Fault> {
        let widget = self.widget_mut(id)?;
        for (key, value) in values {
            require_setter(&widget.class, key)?;
            if overwrite || !widget.state.contains_key(key) {
                widget.state.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    /// Store `value` unless it deep-equals the current one. Returns whether
    /// anything changed.
    pub fn set_state(&mut self, id: &str, key: &str, value: Value) -> Result<bool, Fault> {
        let widget = self.widget_mut(id)?;
        require_setter(&widget.class, key)?;
        if widget.state.get(key) == Some(&value) {
            return Ok(false);
        }
        widget.state.insert(key.to_string(), value);
        Ok(true)
    }

    /// Run the setter for `key` with the current value and `old`.
    pub fn apply_state(&mut self, id: &str, key: &str, old: Value) -> Result<(), Fault> {
        if is_private(key) {
            return Ok(());
        }
        let widget = self.widget(id)?;
        require_setter(&widget.class, key)?;
        let new = widget.state.get(key).cloned().unwrap_or(Value::Null);
        trace!("[State] {id}.{key} = {new}");
        self.invoke(id, &setter_name(key), &[new, old])?;
        Ok(())
    }

    /// `set_state` plus setter dispatch. The setter runs when the value
    /// changed or the widget is in its first render; a local change of a
    /// public key raises `statechange`.
    pub fn update_state(&mut self, id: &str, key: &str, value: Value, from_server: bool) -> Result<bool, Fault> {
        let old = self.widget(id)?.state.get(key).cloned().unwrap_or(Value::Null);
        let changed = self.set_state(id, key, value.clone())?;

        let widget = self.widget(id)?;
        if widget.node.is_some() && (changed || widget.first_render) {
            if changed && widget.class.is_structural(key) && !widget.rendering {
                self.rerender(id)?;
            } else {
                self.apply_state(id, key, old)?;
            }
        }

        if changed && !from_server && !is_private(key) {
            let mut fields = Map::new();
            fields.insert("key".to_string(), Value::String(key.to_string()));
            fields.insert("value".to_string(), value);
            self.raise_event(id, "statechange", fields)?;
        }
        Ok(changed)
    }

    /// Re-apply every key (or just `keys`) against the current nodes.
    pub fn sync_state(&mut self, id: &str, keys: Option<&[String]>) -> Result<(), Fault> {
        let widget = self.widget(id)?;
        let keys: Vec<String> = match keys {
            Some(keys) => keys
                .iter()
                .filter(|k| widget.state.contains_key(k.as_str()))
                .cloned()
                .collect(),
            None => widget.state.keys().cloned().collect(),
        };
        for key in keys {
            self.apply_state(id, &key, Value::Null)?;
        }
        Ok(())
    }

    pub fn get_state(&self, id: &str, key: &str) -> Result<Value, Fault> {
        Ok(self
            .widget(id)?
            .state
            .get(key)
            .cloned()
            .unwrap_or(Value::Null))
    }
}
