// Class Extension
// Widget classes are immutable vtables built once by extending a parent class
// with an override map. Overrides that want the parent implementation are
// chained explicitly; see `Page::call_super` for the call-time binding.

pub mod table;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use log::{debug, warn};
use serde_json::{Map, Value};

use crate::dom::VNode;
use crate::error::{ClassError, Fault};
use crate::page::Page;

pub use table::ClassTable;

/// Operations whose name starts with this prefix are state setters (`s_value`
/// applies the `value` state key).
pub const SETTER_PREFIX: &str = "s_";

/// State keys with this prefix are stored but never dispatched or echoed.
pub const PRIVATE_PREFIX: &str = "_";

/// Override-map entries ending with this suffix are extension-time scratch
/// and never land in the vtable.
pub const SCRATCH_SUFFIX: &str = "$";

pub type LocalFuture<T> = Pin<Box<dyn Future<Output = T>>>;

/// Signature of every class operation: the page context, the instance id and
/// the call arguments.
pub type MethodFn = Rc<dyn Fn(&mut Page, &str, &[Value]) -> Result<Output, Fault>>;

/// What an operation hands back to its caller.
pub enum Output {
    Value(Value),
    /// A render hook's virtual tree.
    Node(VNode),
    /// An asynchronous result; the action processor suspends until it settles.
    Pending(LocalFuture<Result<Value, Fault>>),
}

impl Output {
    pub fn none() -> Self {
        Output::Value(Value::Null)
    }

    pub fn into_node(self) -> Option<VNode> {
        match self {
            Output::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, Fault>> + 'static,
    {
        Output::Pending(Box::pin(future))
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Output::Node(n) => f.debug_tuple("Node").field(n).finish(),
            Output::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

pub fn setter_name(key: &str) -> String {
    format!("{SETTER_PREFIX}{key}")
}

pub fn is_private(key: &str) -> bool {
    key.starts_with(PRIVATE_PREFIX)
}

/// One vtable slot: the implementation plus the implementation it overrides,
/// if the override asked to be able to call it.
pub struct MethodEntry {
    pub name: String,
    /// Class that defined this implementation.
    pub owner: String,
    pub(crate) imp: MethodFn,
    pub(crate) parent: Option<Rc<MethodEntry>>,
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("parent", &self.parent.as_ref().map(|p| p.owner.as_str()))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Member {
    Method(Rc<MethodEntry>),
    Data(Value),
}

#[derive(Debug)]
pub struct WidgetClass {
    name: String,
    parent: Option<Rc<WidgetClass>>,
    members: HashMap<String, Member>,
    defaults: Map<String, Value>,
    structural: HashSet<String>,
    container: bool,
    warnings: Vec<String>,
}

impl WidgetClass {
    /// Start a new hierarchy with no parent.
    pub fn root(name: &str) -> ClassBuilder {
        ClassBuilder::new(name, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Rc<WidgetClass>> {
        self.parent.as_ref()
    }

    pub fn method(&self, name: &str) -> Option<Rc<MethodEntry>> {
        match self.members.get(name) {
            Some(Member::Method(entry)) => Some(Rc::clone(entry)),
            _ => None,
        }
    }

    pub fn has_method(&self, name: &str) -> bool {
        matches!(self.members.get(name), Some(Member::Method(_)))
    }

    pub fn data(&self, name: &str) -> Option<&Value> {
        match self.members.get(name) {
            Some(Member::Data(value)) => Some(value),
            _ => None,
        }
    }

    pub fn has_setter(&self, key: &str) -> bool {
        self.has_method(&setter_name(key))
    }

    /// Class-level state defaults, inherited ones included.
    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    pub fn is_structural(&self, key: &str) -> bool {
        self.structural.contains(key)
    }

    pub fn is_container(&self) -> bool {
        self.container
    }

    /// Inconsistencies detected while this class was extended.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Whether `ancestor` is this class or one of its parents.
    pub fn is_a(&self, ancestor: &str) -> bool {
        if self.name == ancestor {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.is_a(ancestor))
    }
}

/// Extension entry point on a built class.
pub trait Extend {
    fn extend(&self, name: &str) -> ClassBuilder;
}

impl Extend for Rc<WidgetClass> {
    fn extend(&self, name: &str) -> ClassBuilder {
        ClassBuilder::new(name, Some(Rc::clone(self)))
    }
}

enum Override {
    Method { imp: MethodFn, calls_super: bool },
    Data(Value),
}

/// The override map of one extension step, applied in declaration order.
pub struct ClassBuilder {
    name: String,
    parent: Option<Rc<WidgetClass>>,
    overrides: Vec<(String, Override)>,
    defaults: Map<String, Value>,
    structural: HashSet<String>,
    container: Option<bool>,
}

impl ClassBuilder {
    fn new(name: &str, parent: Option<Rc<WidgetClass>>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            overrides: Vec::new(),
            defaults: Map::new(),
            structural: HashSet::new(),
            container: None,
        }
    }

    /// Define or fully replace an operation.
    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut Page, &str, &[Value]) -> Result<Output, Fault> + 'static,
    {
        self.overrides.push((
            name.to_string(),
            Override::Method {
                imp: Rc::new(f),
                calls_super: false,
            },
        ));
        self
    }

    /// Override an operation while keeping the parent implementation callable
    /// through `Page::call_super`.
    pub fn method_with_super<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut Page, &str, &[Value]) -> Result<Output, Fault> + 'static,
    {
        self.overrides.push((
            name.to_string(),
            Override::Method {
                imp: Rc::new(f),
                calls_super: true,
            },
        ));
        self
    }

    pub fn data(mut self, name: &str, value: Value) -> Self {
        self.overrides.push((name.to_string(), Override::Data(value)));
        self
    }

    /// Declare a state key with its class-level default.
    pub fn state(mut self, key: &str, default: Value) -> Self {
        self.defaults.insert(key.to_string(), default);
        self
    }

    /// A change of this key re-renders the widget instead of calling its setter.
    pub fn structural(mut self, key: &str) -> Self {
        self.structural.insert(key.to_string());
        self
    }

    pub fn container(mut self, container: bool) -> Self {
        self.container = Some(container);
        self
    }

    pub fn build(self) -> Result<Rc<WidgetClass>, ClassError> {
        let mut members = self
            .parent
            .as_ref()
            .map(|p| p.members.clone())
            .unwrap_or_default();
        let mut warnings = Vec::new();

        for (name, member) in self.overrides {
            if name.ends_with(SCRATCH_SUFFIX) {
                debug!("[Class] {}: skipping scratch field '{}'", self.name, name);
                continue;
            }

            let inherited = match members.get(&name) {
                Some(Member::Method(entry)) => Some(Rc::clone(entry)),
                _ => None,
            };

            let slot = match member {
                Override::Method { imp, calls_super } => {
                    let parent = if calls_super {
                        inherited
                    } else {
                        if let Some(entry) = &inherited {
                            warnings.push(format!(
                                "{}.{} overrides {}.{} without calling super",
                                self.name, name, entry.owner, name
                            ));
                        }
                        None
                    };
                    Member::Method(Rc::new(MethodEntry {
                        name: name.clone(),
                        owner: self.name.clone(),
                        imp,
                        parent,
                    }))
                }
                Override::Data(value) => {
                    if let Some(entry) = &inherited {
                        warnings.push(format!(
                            "{}.{} is data and hides method {}.{}",
                            self.name, name, entry.owner, name
                        ));
                    }
                    Member::Data(value)
                }
            };
            members.insert(name, slot);
        }

        for warning in &warnings {
            warn!("[Class] {warning}");
        }

        let mut defaults = self
            .parent
            .as_ref()
            .map(|p| p.defaults.clone())
            .unwrap_or_default();
        defaults.extend(self.defaults);

        let mut structural = self
            .parent
            .as_ref()
            .map(|p| p.structural.clone())
            .unwrap_or_default();
        structural.extend(self.structural);

        for key in defaults.keys().filter(|k| !is_private(k)) {
            let has_setter = matches!(members.get(&setter_name(key)), Some(Member::Method(_)));
            if !has_setter {
                return Err(ClassError::MissingSetter {
                    class: self.name,
                    key: key.clone(),
                });
            }
        }

        let container = self
            .container
            .unwrap_or_else(|| self.parent.as_ref().is_some_and(|p| p.container));

        Ok(Rc::new(WidgetClass {
            name: self.name,
            parent: self.parent,
            members,
            defaults,
            structural,
            container,
            warnings,
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dom::VElement;

    fn noop(_: &mut Page, _: &str, _: &[Value]) -> Result<Output, Fault> {
        Ok(Output::none())
    }

    #[test]
    fn test_multi_level_inheritance() {
        let a = WidgetClass::root("A").method("ping", noop).build().unwrap();
        let b = a.extend("B").method("pong", noop).build().unwrap();
        let c = b.extend("C").build().unwrap();
        let d = c.extend("D").build().unwrap();

        assert!(d.has_method("ping"));
        assert!(d.has_method("pong"));
        assert_eq!(d.method("ping").unwrap().owner, "A");
        assert!(d.is_a("B"));
        assert!(!b.is_a("D"));
        assert!(d.warnings().is_empty());
    }

    #[test]
    fn test_override_without_super_warns_and_replaces() {
        let a = WidgetClass::root("A").method("render", noop).build().unwrap();
        let b = a
            .extend("B")
            .method_with_super("render", noop)
            .build()
            .unwrap();
        let c = b.extend("C").method("render", noop).build().unwrap();

        assert!(b.warnings().is_empty());
        assert_eq!(c.warnings().len(), 1);
        assert!(c.warnings()[0].contains("C.render overrides B.render"));

        let entry = c.method("render").unwrap();
        assert_eq!(entry.owner, "C");
        assert!(entry.parent.is_none());

        let entry = b.method("render").unwrap();
        assert_eq!(entry.parent.as_ref().unwrap().owner, "A");
    }

    #[test]
    fn test_data_member_hides_method() {
        let a = WidgetClass::root("A").method("size", noop).build().unwrap();
        let b = a.extend("B").data("size", json!(3)).build().unwrap();

        assert_eq!(b.warnings().len(), 1);
        assert!(!b.has_method("size"));
        assert_eq!(b.data("size"), Some(&json!(3)));
    }

    #[test]
    fn test_scratch_fields_are_not_copied() {
        let a = WidgetClass::root("A")
            .data("config$", json!({"rows": 3}))
            .method("render$", noop)
            .build()
            .unwrap();
        assert!(a.data("config$").is_none());
        assert!(!a.has_method("render$"));
    }

    #[test]
    fn test_state_requires_setter() {
        let err = WidgetClass::root("A")
            .state("value", json!(""))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ClassError::MissingSetter {
                class: "A".into(),
                key: "value".into()
            }
        );

        // Private keys never need one.
        assert!(WidgetClass::root("B").state("_cache", json!(1)).build().is_ok());

        // An inherited setter satisfies a key declared further down.
        let a = WidgetClass::root("A").method("s_value", noop).build().unwrap();
        let b = a.extend("B").state("value", json!("")).build().unwrap();
        assert!(b.has_setter("value"));
        assert_eq!(b.defaults().get("value"), Some(&json!("")));
    }

    #[test]
    fn test_container_flag_is_inherited() {
        let a = WidgetClass::root("A").container(true).build().unwrap();
        let b = a.extend("B").build().unwrap();
        let c = b.extend("C").container(false).build().unwrap();
        assert!(b.is_container());
        assert!(!c.is_container());
    }

    #[test]
    fn test_output_into_node() {
        let out = Output::Node(VElement::new("div").into());
        assert!(out.into_node().is_some());
        assert!(Output::none().into_node().is_none());
    }
}
