use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use super::WidgetClass;
use crate::error::Fault;

/// Classes addressable by widget construction, keyed by (module, class).
#[derive(Default)]
pub struct ClassTable {
    classes: HashMap<(String, String), Rc<WidgetClass>>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: &str, class: Rc<WidgetClass>) {
        debug!("[Class] registered {}.{}", module, class.name());
        self.classes
            .insert((module.to_string(), class.name().to_string()), class);
    }

    pub fn get(&self, module: &str, class: &str) -> Option<Rc<WidgetClass>> {
        self.classes
            .get(&(module.to_string(), class.to_string()))
            .cloned()
    }

    pub fn resolve(&self, module: &str, class: &str) -> Result<Rc<WidgetClass>, Fault> {
        self.get(module, class).ok_or_else(|| Fault::UnknownClass {
            module: module.to_string(),
            class: class.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_module_qualified() {
        let mut table = ClassTable::new();
        table.register("core", WidgetClass::root("Panel").build().unwrap());

        assert!(table.get("core", "Panel").is_some());
        assert!(table.get("charts", "Panel").is_none());
        assert!(matches!(
            table.resolve("charts", "Panel"),
            Err(Fault::UnknownClass { .. })
        ));
        assert_eq!(table.len(), 1);
    }
}
