// Argument Transforms
// Arguments are plain JSON except for reference markers
// `{"$t": <type>, "v": <payload>}`, which are resolved against the live page.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::Fault;
use crate::page::{Page, Target};

pub const MARKER_TYPE: &str = "$t";
pub const MARKER_PAYLOAD: &str = "v";

/// Resolves the (already resolved) payload of a reference marker.
pub type Transform = fn(&Page, Value) -> Result<Value, Fault>;

pub struct ArgTransforms {
    transforms: HashMap<String, Transform>,
}

impl Default for ArgTransforms {
    fn default() -> Self {
        let mut transforms = Self {
            transforms: HashMap::new(),
        };
        transforms.register("widget", widget_ref);
        transforms.register("state", state_ref);
        transforms.register("part", part_ref);
        transforms
    }
}

impl ArgTransforms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: &str, transform: Transform) {
        self.transforms.insert(kind.to_string(), transform);
    }

    pub fn resolve_all(&self, page: &Page, args: &[Value]) -> Result<Vec<Value>, Fault> {
        args.iter().map(|arg| self.resolve(page, arg)).collect()
    }

    /// Resolve one argument, descending into arrays and objects.
    pub fn resolve(&self, page: &Page, value: &Value) -> Result<Value, Fault> {
        match value {
            Value::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve(page, item))
                    .collect::<Result<_, _>>()?,
            )),
            Value::Object(map) => match marker_type(map) {
                Some(kind) => {
                    let payload = self.resolve(page, map.get(MARKER_PAYLOAD).unwrap_or(&Value::Null))?;
                    let transform = self
                        .transforms
                        .get(kind)
                        .ok_or_else(|| Fault::UnknownTransform(kind.to_string()))?;
                    transform(page, payload)
                }
                None => {
                    let mut resolved = Map::new();
                    for (key, item) in map {
                        resolved.insert(key.clone(), self.resolve(page, item)?);
                    }
                    Ok(Value::Object(resolved))
                }
            },
            other => Ok(other.clone()),
        }
    }
}

fn marker_type(map: &Map<String, Value>) -> Option<&str> {
    let kind = map.get(MARKER_TYPE)?.as_str()?;
    let only_marker_keys = map
        .keys()
        .all(|k| k == MARKER_TYPE || k == MARKER_PAYLOAD);
    only_marker_keys.then_some(kind)
}

/// A live widget id.
fn widget_ref(page: &Page, payload: Value) -> Result<Value, Fault> {
    let id = payload
        .as_str()
        .ok_or_else(|| Fault::bad_argument("$t:widget", "payload must be a widget id"))?;
    page.widget(id)?;
    Ok(payload)
}

/// `[id, key]` -> the widget's current state value.
fn state_ref(page: &Page, payload: Value) -> Result<Value, Fault> {
    let pair = payload.as_array().filter(|a| a.len() == 2);
    let (id, key) = match pair.map(|a| (a[0].as_str(), a[1].as_str())) {
        Some((Some(id), Some(key))) => (id, key),
        _ => return Err(Fault::bad_argument("$t:state", "payload must be [id, key]")),
    };
    page.get_state(id, key)
}

/// `"id.part"` -> itself, once the sub-element is known to exist.
fn part_ref(page: &Page, payload: Value) -> Result<Value, Fault> {
    let path = payload
        .as_str()
        .ok_or_else(|| Fault::bad_argument("$t:part", "payload must be 'id.part'"))?;
    match page.resolve_target(Some(path))? {
        Target::Part(..) => Ok(payload),
        _ => Err(Fault::NoTarget(path.to_string())),
    }
}
